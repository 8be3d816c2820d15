//! Background execution of `Effect`s. Every task resolves to exactly one
//! `AppMessage` on the event loop's queue, including when it panics.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hatch_core::{
    identify_stale_sessions, CleanupOptions, CleanupReport, SessionRecord, SkippedSession,
    ViewScope,
};
use tracing::{debug, error};

use crate::context::AppContext;
use crate::gate::{GateRelease, RefreshGate};
use crate::message::{AppMessage, Effect, LogFailure};
use crate::model::SessionRow;
use crate::scheduler::Ticker;

#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task. Its message has been sent once this returns.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

pub fn spawn_task<F, P>(name: &'static str, tx: Sender<AppMessage>, task: F, on_panic: P) -> TaskHandle
where
    F: FnOnce() -> AppMessage + Send + 'static,
    P: FnOnce(String) -> AppMessage + Send + 'static,
{
    let handle = thread::spawn(move || {
        let message = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(message) => message,
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!(task = name, %reason, "background task panicked");
                on_panic(reason)
            }
        };
        if tx.send(message).is_err() {
            debug!(task = name, "event loop gone, dropping task result");
        }
    });
    TaskHandle { name, handle }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Reads the store fresh and probes every record in `scope`.
pub fn load_session_rows(ctx: &AppContext, scope: &ViewScope) -> Result<Vec<SessionRow>, String> {
    let records = ctx
        .store
        .load_all_sessions()
        .map_err(|err| err.to_string())?
        .into_iter()
        .filter(|record| record.in_scope(scope))
        .collect();

    Ok(ctx
        .detector
        .detect_all(records)
        .into_iter()
        .map(|(record, status)| SessionRow::new(record, status))
        .collect())
}

/// Re-reads the store and probes it for cleanup candidates in `scope`.
pub fn identify_stale_candidates(
    ctx: &AppContext,
    scope: &ViewScope,
) -> Result<Vec<SessionRecord>, String> {
    let records = ctx.store.load_all_sessions().map_err(|err| err.to_string())?;
    Ok(identify_stale_sessions(&ctx.detector, &records, scope))
}

fn crashed_report(records: &[SessionRecord], reason: &str) -> CleanupReport {
    CleanupReport {
        skipped: records
            .iter()
            .map(|record| SkippedSession {
                session_id: record.namespaced_id.clone(),
                reason: format!("cleanup worker crashed: {reason}"),
            })
            .collect(),
        ..CleanupReport::default()
    }
}

/// Runs effects off the event loop thread and owns the log timer.
#[derive(Debug)]
pub struct EffectExecutor {
    ctx: Arc<AppContext>,
    tx: Sender<AppMessage>,
    gate: RefreshGate,
    log_timer: Option<Ticker>,
    tasks: Vec<TaskHandle>,
}

impl EffectExecutor {
    pub fn new(ctx: Arc<AppContext>, tx: Sender<AppMessage>, gate: RefreshGate) -> Self {
        Self {
            ctx,
            tx,
            gate,
            log_timer: None,
            tasks: Vec::new(),
        }
    }

    pub fn has_log_timer(&self) -> bool {
        self.log_timer.is_some()
    }

    pub fn running_tasks(&mut self) -> usize {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.len()
    }

    /// Dispatches `effect`. Attaching needs the terminal, so that record is
    /// handed back to the caller instead.
    pub fn execute(&mut self, effect: Effect) -> Option<SessionRecord> {
        self.tasks.retain(|task| !task.is_finished());
        match effect {
            Effect::LoadSessions { request_id, scope } => {
                let ctx = self.ctx.clone();
                self.spawn(
                    "load-sessions",
                    move || AppMessage::SessionsLoaded {
                        request_id,
                        result: load_session_rows(&ctx, &scope),
                    },
                    move |reason| AppMessage::SessionsLoaded {
                        request_id,
                        result: Err(format!("session refresh crashed: {reason}")),
                    },
                );
            }
            Effect::RunLogScript {
                session,
                generation,
            } => {
                let ctx = self.ctx.clone();
                let release = GateRelease::new(self.gate.clone());
                let session_id = session.namespaced_id.clone();
                let panic_session_id = session_id.clone();
                self.spawn(
                    "log-script",
                    move || {
                        let _release = release;
                        let result = ctx
                            .log_runner
                            .execute_log_script(
                                &session,
                                ctx.config.script_timeout(),
                                ctx.config.log_max_output_bytes,
                            )
                            .map_err(LogFailure::from);
                        AppMessage::LogResult {
                            session_id,
                            generation,
                            result,
                        }
                    },
                    move |reason| AppMessage::LogResult {
                        session_id: panic_session_id,
                        generation,
                        result: Err(LogFailure {
                            output: String::new(),
                            message: format!("log script runner crashed: {reason}"),
                            terminal: false,
                            timed_out: false,
                        }),
                    },
                );
            }
            Effect::StartLogTimer {
                session_id,
                generation,
                interval,
            } => {
                self.log_timer = None;
                let gate = self.gate.clone();
                self.log_timer = Some(Ticker::spawn("log", interval, self.tx.clone(), move || {
                    gate.try_begin().then(|| AppMessage::LogTick {
                        session_id: session_id.clone(),
                        generation,
                    })
                }));
            }
            Effect::StopLogTimer => {
                self.log_timer = None;
            }
            Effect::IdentifyStale { request_id, scope } => {
                let ctx = self.ctx.clone();
                self.spawn(
                    "identify-stale",
                    move || AppMessage::CandidatesIdentified {
                        request_id,
                        result: identify_stale_candidates(&ctx, &scope),
                    },
                    move |reason| AppMessage::CandidatesIdentified {
                        request_id,
                        result: Err(format!("stale session scan crashed: {reason}")),
                    },
                );
            }
            Effect::RunCleanup { candidates } => {
                let ctx = self.ctx.clone();
                let on_panic_candidates = candidates.clone();
                self.spawn(
                    "cleanup",
                    move || AppMessage::CleanupFinished {
                        report: ctx
                            .cleanup
                            .cleanup_sessions(&candidates, CleanupOptions::stale_only()),
                    },
                    move |reason| AppMessage::CleanupFinished {
                        report: crashed_report(&on_panic_candidates, &reason),
                    },
                );
            }
            Effect::StopSession { record } => {
                let ctx = self.ctx.clone();
                let on_panic_record = record.clone();
                self.spawn(
                    "stop-session",
                    move || AppMessage::StopFinished {
                        session_id: record.namespaced_id.clone(),
                        report: ctx.cleanup.stop_session(&record),
                    },
                    move |reason| AppMessage::StopFinished {
                        session_id: on_panic_record.namespaced_id.clone(),
                        report: crashed_report(std::slice::from_ref(&on_panic_record), &reason),
                    },
                );
            }
            Effect::Attach { record } => return Some(record),
        }
        None
    }

    fn spawn<F, P>(&mut self, name: &'static str, task: F, on_panic: P)
    where
        F: FnOnce() -> AppMessage + Send + 'static,
        P: FnOnce(String) -> AppMessage + Send + 'static,
    {
        self.tasks.push(spawn_task(name, self.tx.clone(), task, on_panic));
    }
}
