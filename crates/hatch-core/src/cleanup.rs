//! Finds stale sessions and tears down every resource they own.
//!
//! Records are processed independently: one failure never blocks the rest.
//! Each record is re-read from the store and each resource re-probed
//! immediately before it is torn down, so a candidate set computed earlier
//! cannot drive teardown of something that changed in the meantime.

use hatch_probe::{Multiplexer, ProbeError, SandboxManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::status::StatusDetector;
use crate::store::{SessionStore, StoreError};
use crate::types::{SessionId, SessionRecord, SessionState, ViewScope};

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("failed to kill multiplexer session {session}: {source}")]
    Multiplexer {
        session: String,
        #[source]
        source: ProbeError,
    },
    #[error("failed to delete sandbox {sandbox}: {source}")]
    Sandbox {
        sandbox: String,
        #[source]
        source: ProbeError,
    },
    #[error("session store error: {source}")]
    Store {
        #[from]
        source: StoreError,
    },
}

impl CleanupError {
    pub fn stage(&self) -> CleanupStage {
        match self {
            CleanupError::Multiplexer { .. } => CleanupStage::Multiplexer,
            CleanupError::Sandbox { .. } => CleanupStage::Sandbox,
            CleanupError::Store { .. } => CleanupStage::Store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStage {
    Multiplexer,
    Sandbox,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupOptions {
    /// Report what would be cleaned without touching anything.
    pub dry_run: bool,
    /// Skip records that are no longer stale at teardown time.
    pub require_stale: bool,
}

impl CleanupOptions {
    pub fn stale_only() -> Self {
        Self {
            dry_run: false,
            require_stale: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub session_id: SessionId,
    pub stage: CleanupStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSession {
    pub session_id: SessionId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cleaned_count: usize,
    pub dry_run: bool,
    pub skipped: Vec<SkippedSession>,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would clean" } else { "cleaned" };
        let mut summary = format!("{verb} {} session(s)", self.cleaned_count);
        if !self.skipped.is_empty() {
            summary.push_str(&format!(", skipped {}", self.skipped.len()));
        }
        if !self.errors.is_empty() {
            summary.push_str(&format!(", {} failed", self.errors.len()));
        }
        summary
    }
}

enum RecordOutcome {
    Cleaned,
    Skipped(String),
}

/// Stale records within `scope`, in input order.
pub fn identify_stale_sessions(
    detector: &StatusDetector,
    records: &[SessionRecord],
    scope: &ViewScope,
) -> Vec<SessionRecord> {
    records
        .iter()
        .filter(|record| record.in_scope(scope))
        .filter(|record| detector.detect_session_status(record).state == SessionState::Stale)
        .cloned()
        .collect()
}

/// Body of the cleanup confirmation dialog.
pub fn render_candidate_summary(records: &[SessionRecord]) -> String {
    let mut lines = vec![format!(
        "Remove {} stale session(s)? Their records will be deleted.",
        records.len()
    )];
    for record in records {
        let title = if record.issue_title.trim().is_empty() {
            String::new()
        } else {
            format!(" {}", record.issue_title.trim())
        };
        lines.push(format!(
            "  {} #{}{} ({})",
            record.namespaced_id,
            record.issue_number,
            title,
            record.worktree_path.display()
        ));
    }
    lines.join("\n")
}

#[derive(Clone)]
pub struct CleanupEngine {
    store: SessionStore,
    detector: StatusDetector,
    multiplexer: Arc<dyn Multiplexer>,
    sandbox: Arc<dyn SandboxManager>,
}

impl std::fmt::Debug for CleanupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupEngine")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CleanupEngine {
    pub fn new(
        store: SessionStore,
        multiplexer: Arc<dyn Multiplexer>,
        sandbox: Arc<dyn SandboxManager>,
    ) -> Self {
        let detector = StatusDetector::new(multiplexer.clone(), sandbox.clone());
        Self {
            store,
            detector,
            multiplexer,
            sandbox,
        }
    }

    pub fn detector(&self) -> &StatusDetector {
        &self.detector
    }

    pub fn cleanup_sessions(
        &self,
        records: &[SessionRecord],
        options: CleanupOptions,
    ) -> CleanupReport {
        let mut report = CleanupReport {
            dry_run: options.dry_run,
            ..CleanupReport::default()
        };

        for record in records {
            match self.cleanup_record(record, options) {
                Ok(RecordOutcome::Cleaned) => report.cleaned_count += 1,
                Ok(RecordOutcome::Skipped(reason)) => {
                    debug!(session = %record.namespaced_id, %reason, "cleanup skipped");
                    report.skipped.push(SkippedSession {
                        session_id: record.namespaced_id.clone(),
                        reason,
                    });
                }
                Err(err) => {
                    warn!(session = %record.namespaced_id, error = %err, "cleanup failed");
                    report.errors.push(CleanupFailure {
                        session_id: record.namespaced_id.clone(),
                        stage: err.stage(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            cleaned = report.cleaned_count,
            skipped = report.skipped.len(),
            failed = report.errors.len(),
            dry_run = report.dry_run,
            "cleanup finished"
        );
        report
    }

    /// Explicit stop: tears the session down regardless of its state.
    pub fn stop_session(&self, record: &SessionRecord) -> CleanupReport {
        self.cleanup_sessions(std::slice::from_ref(record), CleanupOptions::default())
    }

    fn cleanup_record(
        &self,
        record: &SessionRecord,
        options: CleanupOptions,
    ) -> Result<RecordOutcome, CleanupError> {
        let Some(current) = self.store.get(&record.namespaced_id)? else {
            return Ok(RecordOutcome::Skipped(
                "record already removed from the store".to_string(),
            ));
        };

        if options.require_stale {
            let state = self.detector.detect_session_status(&current).state;
            if state != SessionState::Stale {
                return Ok(RecordOutcome::Skipped(format!("session is now {state}")));
            }
        }

        if options.dry_run {
            return Ok(RecordOutcome::Cleaned);
        }

        self.teardown_multiplexer(&current)?;
        self.teardown_sandbox(&current)?;
        self.store.remove(&current.namespaced_id)?;
        info!(session = %current.namespaced_id, "session cleaned up");
        Ok(RecordOutcome::Cleaned)
    }

    fn teardown_multiplexer(&self, record: &SessionRecord) -> Result<(), CleanupError> {
        let name = record.multiplexer_session.as_str();
        if !self.detector.multiplexer_alive(record) {
            debug!(session = %record.namespaced_id, multiplexer = name, "multiplexer session already gone");
            return Ok(());
        }
        match self.multiplexer.kill_session(name) {
            Ok(()) => Ok(()),
            // Lost a race with an external kill: the goal state is reached.
            Err(_) if !self.detector.multiplexer_alive(record) => Ok(()),
            Err(source) => Err(CleanupError::Multiplexer {
                session: name.to_string(),
                source,
            }),
        }
    }

    fn teardown_sandbox(&self, record: &SessionRecord) -> Result<(), CleanupError> {
        let name = record.effective_sandbox_name();
        if !self.detector.sandbox_alive(record) {
            debug!(session = %record.namespaced_id, sandbox = %name, "sandbox already gone");
            return Ok(());
        }
        match self.sandbox.delete_sandbox(&name) {
            Ok(()) => Ok(()),
            Err(_) if !self.detector.sandbox_alive(record) => Ok(()),
            Err(source) => Err(CleanupError::Sandbox {
                sandbox: name,
                source,
            }),
        }
    }
}
