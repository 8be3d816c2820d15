use hatch_core::{CleanupReport, SessionId, SessionRecord, ViewScope};
use hatch_exec::ScriptFailure;
use std::time::Duration;

use crate::model::SessionRow;

/// A failed log execution, flattened for the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFailure {
    pub output: String,
    pub message: String,
    /// Retrying on a timer cannot fix this; wait for the user.
    pub terminal: bool,
    pub timed_out: bool,
}

impl From<ScriptFailure> for LogFailure {
    fn from(failure: ScriptFailure) -> Self {
        Self {
            message: failure.error.to_string(),
            terminal: failure.error.is_terminal(),
            timed_out: failure.error.is_timeout(),
            output: failure.output,
        }
    }
}

/// Everything that reaches the event loop. Background work reports back only
/// through these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMessage {
    SessionsLoaded {
        request_id: u64,
        result: Result<Vec<SessionRow>, String>,
    },
    StatusTick,
    /// Sent by the log timer after it claimed the refresh gate.
    LogTick {
        session_id: SessionId,
        generation: u64,
    },
    LogResult {
        session_id: SessionId,
        generation: u64,
        result: Result<String, LogFailure>,
    },
    /// Stale sessions found by a fresh scan of the store.
    CandidatesIdentified {
        request_id: u64,
        result: Result<Vec<SessionRecord>, String>,
    },
    CleanupFinished {
        report: CleanupReport,
    },
    StopFinished {
        session_id: SessionId,
        report: CleanupReport,
    },
    AttachFinished {
        session_id: SessionId,
        result: Result<(), String>,
    },
}

/// Work requested by the state machine, executed outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LoadSessions {
        request_id: u64,
        scope: ViewScope,
    },
    /// The refresh gate is already held on behalf of this execution.
    RunLogScript {
        session: SessionRecord,
        generation: u64,
    },
    StartLogTimer {
        session_id: SessionId,
        generation: u64,
        interval: Duration,
    },
    StopLogTimer,
    IdentifyStale {
        request_id: u64,
        scope: ViewScope,
    },
    RunCleanup {
        candidates: Vec<SessionRecord>,
    },
    StopSession {
        record: SessionRecord,
    },
    Attach {
        record: SessionRecord,
    },
}
