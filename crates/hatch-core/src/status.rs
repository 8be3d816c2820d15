//! Reconciles a session record with live multiplexer and sandbox probes.

use chrono::{DateTime, Utc};
use hatch_probe::{Multiplexer, SandboxManager};
use std::sync::Arc;
use tracing::debug;

use crate::types::{SessionRecord, SessionState, SessionStatus};

#[derive(Clone)]
pub struct StatusDetector {
    multiplexer: Arc<dyn Multiplexer>,
    sandbox: Arc<dyn SandboxManager>,
}

impl std::fmt::Debug for StatusDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusDetector").finish_non_exhaustive()
    }
}

impl StatusDetector {
    pub fn new(multiplexer: Arc<dyn Multiplexer>, sandbox: Arc<dyn SandboxManager>) -> Self {
        Self {
            multiplexer,
            sandbox,
        }
    }

    pub fn detect_session_status(&self, record: &SessionRecord) -> SessionStatus {
        self.detect_at(record, Utc::now())
    }

    pub fn detect_at(&self, record: &SessionRecord, now: DateTime<Utc>) -> SessionStatus {
        let multiplexer_alive = self.multiplexer_alive(record);
        let sandbox_alive = self.sandbox_alive(record);
        SessionStatus {
            state: SessionState::from_probes(multiplexer_alive, sandbox_alive),
            time_delta: format_time_delta(&record.last_activity, now),
            multiplexer_alive,
            sandbox_alive,
        }
    }

    pub fn detect_all(&self, records: Vec<SessionRecord>) -> Vec<(SessionRecord, SessionStatus)> {
        let now = Utc::now();
        records
            .into_iter()
            .map(|record| {
                let status = self.detect_at(&record, now);
                (record, status)
            })
            .collect()
    }

    // A failed probe counts as "absent": a false stale is recoverable, a
    // leaked dead session is not.
    pub fn multiplexer_alive(&self, record: &SessionRecord) -> bool {
        match self.multiplexer.session_exists(&record.multiplexer_session) {
            Ok(alive) => alive,
            Err(err) => {
                debug!(
                    session = %record.namespaced_id,
                    error = %err,
                    "multiplexer probe failed, treating session as absent"
                );
                false
            }
        }
    }

    pub fn sandbox_alive(&self, record: &SessionRecord) -> bool {
        let name = record.effective_sandbox_name();
        match self.sandbox.sandbox_exists(&name) {
            Ok(alive) => alive,
            Err(err) => {
                debug!(
                    session = %record.namespaced_id,
                    sandbox = %name,
                    error = %err,
                    "sandbox probe failed, treating sandbox as absent"
                );
                false
            }
        }
    }
}

/// Buckets `now - last_activity` into `now`, `Nm ago`, `Nh ago` or `Nd ago`.
/// Unparseable timestamps render as `unknown`.
pub fn format_time_delta(last_activity: &str, now: DateTime<Utc>) -> String {
    let Ok(at) = DateTime::parse_from_rfc3339(last_activity.trim()) else {
        return "unknown".to_string();
    };
    let elapsed = now.signed_duration_since(at.with_timezone(&Utc));

    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", elapsed.num_days())
}
