use chrono::Utc;
use hatch_core::{HatchConfig, SessionRecord, DEFAULT_LOG_SCRIPT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::audit::{AuditOutcome, AuditRecord, AuditSink};
use crate::capture::{spawn_reader, CappedBuffer};
use crate::error::{ExecError, ScriptFailure};
use crate::launcher::{terminate_process_group, LaunchRequest, ScriptLauncher, SystemLauncher};
use crate::path::resolve_script_path;
use crate::security::check_script;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_READER_GRACE: Duration = Duration::from_millis(500);

/// Runs a session's log script with path and security validation, a hard
/// timeout and a cap on captured output.
#[derive(Clone)]
pub struct LogScriptRunner {
    launcher: Arc<dyn ScriptLauncher>,
    script_subpath: PathBuf,
    audit: AuditSink,
    pub poll_interval: Duration,
    pub reader_grace: Duration,
}

impl std::fmt::Debug for LogScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogScriptRunner")
            .field("script_subpath", &self.script_subpath)
            .field("audit", &self.audit)
            .field("poll_interval", &self.poll_interval)
            .field("reader_grace", &self.reader_grace)
            .finish_non_exhaustive()
    }
}

impl Default for LogScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_SCRIPT)
    }
}

struct RunOutcome {
    script: PathBuf,
    working_dir: PathBuf,
    output: String,
    output_bytes: usize,
    truncated: bool,
    exit_code: Option<i32>,
    result: Result<(), ExecError>,
}

impl RunOutcome {
    fn rejected(script: PathBuf, working_dir: PathBuf, output: String, error: ExecError) -> Self {
        Self {
            script,
            working_dir,
            output,
            output_bytes: 0,
            truncated: false,
            exit_code: None,
            result: Err(error),
        }
    }
}

impl LogScriptRunner {
    pub fn new(script_subpath: impl Into<PathBuf>) -> Self {
        Self {
            launcher: Arc::new(SystemLauncher),
            script_subpath: script_subpath.into(),
            audit: AuditSink::disabled(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reader_grace: DEFAULT_READER_GRACE,
        }
    }

    pub fn from_config(config: &HatchConfig) -> Self {
        let audit = match &config.audit_log_path {
            Some(path) => AuditSink::to_file(path),
            None => AuditSink::disabled(),
        };
        Self::new(config.log_script.clone()).with_audit(audit)
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ScriptLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = audit;
        self
    }

    pub fn script_subpath(&self) -> &Path {
        &self.script_subpath
    }

    /// Runs the script and returns its combined stdout and stderr.
    ///
    /// Every failure carries the output captured before it happened: a
    /// timeout or non-zero exit still yields the partial log, a missing
    /// script yields a hint naming the expected path.
    pub fn execute_log_script(
        &self,
        record: &SessionRecord,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Result<String, ScriptFailure> {
        let at = Utc::now();
        let started = Instant::now();
        let outcome = self.run(record, timeout, max_output_bytes);

        self.audit.record(&AuditRecord {
            at,
            session_id: record.namespaced_id.to_string(),
            script_path: outcome.script.clone(),
            working_dir: outcome.working_dir.clone(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            exit_code: outcome.exit_code,
            output_bytes: outcome.output_bytes,
            truncated: outcome.truncated,
            timed_out: matches!(&outcome.result, Err(err) if err.is_timeout()),
            outcome: AuditOutcome::from_result(outcome.result.as_ref().map(|_| ())),
            error: outcome.result.as_ref().err().map(ToString::to_string),
        });

        match outcome.result {
            Ok(()) => Ok(outcome.output),
            Err(error) => Err(ScriptFailure::new(outcome.output, error)),
        }
    }

    fn run(&self, record: &SessionRecord, timeout: Duration, max_output_bytes: usize) -> RunOutcome {
        let worktree = record.worktree_path.clone();
        let paths = match resolve_script_path(&worktree, &self.script_subpath) {
            Ok(paths) => paths,
            Err(error) => {
                let script = worktree.join(&self.script_subpath);
                return RunOutcome::rejected(script, worktree, String::new(), error);
            }
        };

        if let Err(error) = check_script(&paths.script) {
            let output = match &error {
                ExecError::ScriptNotFound { path } => missing_script_message(path),
                _ => String::new(),
            };
            return RunOutcome::rejected(paths.script, paths.worktree, output, error);
        }

        let session_id = record.namespaced_id.to_string();
        let mut child = match self.launcher.launch(&LaunchRequest {
            script: &paths.script,
            working_dir: &paths.worktree,
            session_id: &session_id,
        }) {
            Ok(child) => child,
            Err(source) => {
                let error = ExecError::Spawn {
                    path: paths.script.clone(),
                    source,
                };
                return RunOutcome::rejected(paths.script, paths.worktree, String::new(), error);
            }
        };

        let buffer = CappedBuffer::new(max_output_bytes);
        let mut readers = Vec::with_capacity(2);
        let streams = [
            child.stdout.take().map(|s| spawn_reader(s, buffer.clone(), "stdout")),
            child.stderr.take().map(|s| spawn_reader(s, buffer.clone(), "stderr")),
        ];
        for reader in streams.into_iter().flatten() {
            match reader {
                Ok(handle) => readers.push(handle),
                Err(source) => {
                    terminate_process_group(&mut child);
                    let error = ExecError::Io {
                        context: "start output reader",
                        source,
                    };
                    return RunOutcome::rejected(paths.script, paths.worktree, String::new(), error);
                }
            }
        }

        // A timeout past the end of the clock means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        let waited = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(source) => {
                    terminate_process_group(&mut child);
                    break Err(ExecError::Io {
                        context: "wait for log script",
                        source,
                    });
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(session = %record.namespaced_id, "log script timed out, killing process group");
                terminate_process_group(&mut child);
                break Err(ExecError::TimedOut { timeout });
            }
            thread::sleep(self.poll_interval);
        };

        self.wait_for_readers(readers);

        let (exit_code, result) = match waited {
            Ok(status) if status.success() => (status.code(), Ok(())),
            Ok(status) => (
                status.code(),
                Err(ExecError::NonZeroExit {
                    code: status.code(),
                }),
            ),
            Err(error) => (None, Err(error)),
        };

        RunOutcome {
            script: paths.script,
            working_dir: paths.worktree,
            output: buffer.snapshot(),
            output_bytes: buffer.len(),
            truncated: buffer.truncated(),
            exit_code,
            result,
        }
    }

    // A background process that inherited the pipes can keep them open after
    // the script exits; stop waiting after the grace period.
    fn wait_for_readers(&self, readers: Vec<JoinHandle<()>>) {
        let grace_deadline = Instant::now().checked_add(self.reader_grace);
        while readers.iter().any(|reader| !reader.is_finished()) {
            if grace_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!("output readers still draining after grace period, detaching");
                return;
            }
            thread::sleep(self.poll_interval);
        }
        for reader in readers {
            let _ = reader.join();
        }
    }
}

fn missing_script_message(path: &Path) -> String {
    format!(
        "No log script found at {}\nAdd an executable script there to stream logs for this session.\n",
        path.display()
    )
}
