//! Audit trail for log script executions.
//!
//! Every execution yields one `AuditRecord`, emitted on the `hatch::audit`
//! tracing target and, when a file is configured, appended as a JSON line.
//! A broken sink is logged and never fails the execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::error::ExecError;

#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("failed to create audit log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize audit record: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to audit log {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    PathRejected,
    NotFound,
    SecurityRejected,
    SpawnFailed,
    TimedOut,
    NonZeroExit,
    IoError,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::PathRejected => "path_rejected",
            AuditOutcome::NotFound => "not_found",
            AuditOutcome::SecurityRejected => "security_rejected",
            AuditOutcome::SpawnFailed => "spawn_failed",
            AuditOutcome::TimedOut => "timed_out",
            AuditOutcome::NonZeroExit => "non_zero_exit",
            AuditOutcome::IoError => "io_error",
        }
    }

    pub fn from_result(result: Result<(), &ExecError>) -> Self {
        match result {
            Ok(()) => AuditOutcome::Success,
            Err(ExecError::PathValidation { .. }) => AuditOutcome::PathRejected,
            Err(ExecError::ScriptNotFound { .. }) => AuditOutcome::NotFound,
            Err(ExecError::Security { .. }) => AuditOutcome::SecurityRejected,
            Err(ExecError::Spawn { .. }) => AuditOutcome::SpawnFailed,
            Err(ExecError::TimedOut { .. }) => AuditOutcome::TimedOut,
            Err(ExecError::NonZeroExit { .. }) => AuditOutcome::NonZeroExit,
            Err(ExecError::Io { .. }) => AuditOutcome::IoError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    pub session_id: String,
    pub script_path: PathBuf,
    pub working_dir: PathBuf,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub output_bytes: usize,
    pub truncated: bool,
    pub timed_out: bool,
    pub outcome: AuditOutcome,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditSink {
    path: Option<PathBuf>,
    append_lock: Arc<Mutex<()>>,
}

impl AuditSink {
    /// Tracing only.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, record: &AuditRecord) {
        info!(
            target: "hatch::audit",
            session = %record.session_id,
            script = %record.script_path.display(),
            working_dir = %record.working_dir.display(),
            duration_ms = record.duration_ms,
            exit_code = ?record.exit_code,
            output_bytes = record.output_bytes,
            truncated = record.truncated,
            timed_out = record.timed_out,
            outcome = record.outcome.as_str(),
            error = record.error.as_deref().unwrap_or(""),
            "log script executed"
        );

        if let Some(path) = &self.path {
            let _guard = self
                .append_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(err) = append_json_line(path, record) {
                warn!(error = %err, "failed to write audit record");
            }
        }
    }
}

fn append_json_line(path: &Path, record: &AuditRecord) -> Result<(), AuditLogError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| AuditLogError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut line =
        serde_json::to_string(record).map_err(|source| AuditLogError::Serialize { source })?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AuditLogError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(line.as_bytes())
        .map_err(|source| AuditLogError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
