use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("path validation failed for {path}: {reason}")]
    PathValidation { path: PathBuf, reason: String },
    #[error("log script not found at {path}")]
    ScriptNotFound { path: PathBuf },
    #[error("log script rejected ({path}): {reason}")]
    Security { path: PathBuf, reason: String },
    #[error("log script failed to start ({path}): {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("log script timed out after {}s", .timeout.as_secs())]
    TimedOut { timeout: Duration },
    #[error("log script exited with {}", render_exit(*.code))]
    NonZeroExit { code: Option<i32> },
    #[error("log script i/o error ({context}): {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    /// Conditions that cannot heal without user action. Auto-refresh stops
    /// on these until a manual retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecError::PathValidation { .. }
                | ExecError::ScriptNotFound { .. }
                | ExecError::Security { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::TimedOut { .. })
    }
}

fn render_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// A failed execution together with whatever output was captured before it
/// failed. Callers display `output` even on error.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ScriptFailure {
    pub output: String,
    #[source]
    pub error: ExecError,
}

impl ScriptFailure {
    pub fn new(output: impl Into<String>, error: ExecError) -> Self {
        Self {
            output: output.into(),
            error,
        }
    }
}
