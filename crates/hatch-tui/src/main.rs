use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hatch_core::{
    default_config_dir, default_config_path, has_errors, load_config, ConfigError, Validate,
    ValidationLevel,
};
use hatch_tui::{run_tui, AppContext, AppSettings, HatchApp, RefreshGate};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICK_MS: u64 = 250;
const LOG_FILTER_ENV: &str = "HATCH_LOG";

#[derive(Debug, Parser)]
#[command(name = "hatch", about = "Dashboard for issue sessions: status, logs and cleanup")]
struct Args {
    /// Config file. Defaults to ~/.hatch/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start in the global view even inside a repository.
    #[arg(long)]
    global: bool,

    /// Input poll interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TICK_MS, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Diagnostics log file. Defaults to ~/.hatch/hatch.log.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    ConfigLoad(#[from] ConfigError),
    #[error(transparent)]
    Tui(#[from] hatch_tui::TuiError),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("hatch failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), MainError> {
    let args = Args::parse();
    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| default_config_dir().join("hatch.log"));
    init_logging(&log_file);

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;
    let issues = config.validate();
    for issue in &issues {
        match issue.level {
            ValidationLevel::Error => error!(code = issue.code, "{}", issue.message),
            ValidationLevel::Warning => warn!(code = issue.code, "{}", issue.message),
        }
    }
    if has_errors(&issues) {
        let messages: Vec<_> = issues
            .iter()
            .filter(|issue| issue.level == ValidationLevel::Error)
            .map(|issue| issue.message.as_str())
            .collect();
        return Err(MainError::Config(messages.join("; ")));
    }

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let settings = AppSettings::from_config(&config);
    let ctx = Arc::new(AppContext::from_config(config, &cwd));
    info!(
        config = %config_path.display(),
        store = %ctx.store.path().display(),
        repository = ctx.repository.is_some(),
        "starting hatch"
    );

    let mut app = HatchApp::new(settings, ctx.repository.clone(), RefreshGate::new(), args.global);
    run_tui(&mut app, ctx, Duration::from_millis(args.tick_ms))?;
    info!("hatch exited");
    Ok(())
}

/// The dashboard owns stdout, so diagnostics go to a file or nowhere.
fn init_logging(path: &Path) {
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);
    let _ = match open_log_file(path) {
        Ok(file) => builder.with_writer(Mutex::new(file)).try_init(),
        Err(_) => builder.with_writer(io::sink).try_init(),
    };
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
