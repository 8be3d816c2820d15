//! Dashboard configuration, loaded from `~/.hatch/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOG_SCRIPT: &str = ".hooks/log";
pub const MIN_LOG_REFRESH_SECS: u64 = 2;
pub const MAX_LOG_REFRESH_SECS: u64 = 120;
const DEFAULT_LOG_REFRESH_SECS: u64 = 5;
const DEFAULT_STATUS_REFRESH_SECS: u64 = 10;
const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 30;
pub const MAX_SCRIPT_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_LOG_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
const CONFIG_DIR_NAME: &str = ".hatch";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HatchConfig {
    /// Periodically re-probe every session while the dashboard is open.
    pub status_tracking: bool,
    pub status_refresh_interval_secs: u64,
    /// Log view auto-refresh period, clamped to 2..=120 seconds.
    pub log_refresh_interval_secs: u64,
    /// Wall-clock bound for one log script execution.
    pub status_timeout_seconds: u64,
    pub log_max_output_bytes: usize,
    /// Script path relative to each worktree.
    pub log_script: PathBuf,
    pub store_path: Option<PathBuf>,
    pub audit_log_path: Option<PathBuf>,
    pub multiplexer_bin: String,
    pub sandbox_bin: String,
}

impl Default for HatchConfig {
    fn default() -> Self {
        Self {
            status_tracking: true,
            status_refresh_interval_secs: DEFAULT_STATUS_REFRESH_SECS,
            log_refresh_interval_secs: DEFAULT_LOG_REFRESH_SECS,
            status_timeout_seconds: DEFAULT_SCRIPT_TIMEOUT_SECS,
            log_max_output_bytes: DEFAULT_LOG_MAX_OUTPUT_BYTES,
            log_script: PathBuf::from(DEFAULT_LOG_SCRIPT),
            store_path: None,
            audit_log_path: None,
            multiplexer_bin: "tmux".to_string(),
            sandbox_bin: "docker".to_string(),
        }
    }
}

impl HatchConfig {
    pub fn log_refresh_interval(&self) -> Duration {
        let secs = if self.log_refresh_interval_secs == 0 {
            DEFAULT_LOG_REFRESH_SECS
        } else {
            self.log_refresh_interval_secs
        };
        Duration::from_secs(secs.clamp(MIN_LOG_REFRESH_SECS, MAX_LOG_REFRESH_SECS))
    }

    /// `None` disables periodic status refresh.
    pub fn status_refresh_interval(&self) -> Option<Duration> {
        if !self.status_tracking {
            return None;
        }
        Some(Duration::from_secs(self.status_refresh_interval_secs.max(1)))
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_seconds.clamp(1, MAX_SCRIPT_TIMEOUT_SECS))
    }

    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| default_config_dir().join("sessions.json"))
    }
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

pub fn parse_config(contents: &str) -> Result<HatchConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Loads the config, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<HatchConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = match fs::read_to_string(path_ref) {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(HatchConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path_ref.to_path_buf(),
                source,
            })
        }
    };
    parse_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_config(path: impl AsRef<Path>, config: &HatchConfig) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().map(Path::to_path_buf) {
        fs::create_dir_all(&parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir,
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })?;
    Ok(())
}
