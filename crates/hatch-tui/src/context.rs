use std::path::Path;
use std::sync::Arc;

use hatch_core::{CleanupEngine, HatchConfig, SessionStore, StatusDetector};
use hatch_exec::LogScriptRunner;
use hatch_probe::{
    discover_repository, CliRunner, Multiplexer, ProbeError, RepositoryInfo, SandboxCli,
    SandboxManager, TmuxCli,
};
use tracing::{debug, info, warn};

/// Shared handles for background work. Cloned into worker threads behind an
/// `Arc`; nothing in here is mutated after startup.
pub struct AppContext {
    pub config: HatchConfig,
    pub store: SessionStore,
    pub multiplexer: Arc<dyn Multiplexer>,
    pub sandbox: Arc<dyn SandboxManager>,
    pub detector: StatusDetector,
    pub cleanup: CleanupEngine,
    pub log_runner: LogScriptRunner,
    pub repository: Option<RepositoryInfo>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("store", &self.store)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn new(
        config: HatchConfig,
        store: SessionStore,
        multiplexer: Arc<dyn Multiplexer>,
        sandbox: Arc<dyn SandboxManager>,
        log_runner: LogScriptRunner,
        repository: Option<RepositoryInfo>,
    ) -> Self {
        let detector = StatusDetector::new(multiplexer.clone(), sandbox.clone());
        let cleanup = CleanupEngine::new(store.clone(), multiplexer.clone(), sandbox.clone());
        Self {
            config,
            store,
            multiplexer,
            sandbox,
            detector,
            cleanup,
            log_runner,
            repository,
        }
    }

    /// Wires the real CLIs named in `config` and looks for a repository
    /// around `cwd`. Outside a repository only the global view is offered.
    pub fn from_config(config: HatchConfig, cwd: &Path) -> Self {
        let repository = match discover_repository(cwd, &CliRunner::new("git")) {
            Ok(repo) => {
                info!(root = %repo.root.display(), "repository context found");
                Some(repo)
            }
            Err(ProbeError::NotARepository { .. }) => {
                debug!(cwd = %cwd.display(), "no repository context");
                None
            }
            Err(err) => {
                warn!(error = %err, "repository discovery failed, using global view");
                None
            }
        };

        let store = SessionStore::new(config.resolved_store_path());
        let multiplexer: Arc<dyn Multiplexer> =
            Arc::new(TmuxCli::new(CliRunner::new(&config.multiplexer_bin)));
        let sandbox: Arc<dyn SandboxManager> =
            Arc::new(SandboxCli::new(CliRunner::new(&config.sandbox_bin)));
        let log_runner = LogScriptRunner::from_config(&config);

        Self::new(config, store, multiplexer, sandbox, log_runner, repository)
    }
}
