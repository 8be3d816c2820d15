//! In-memory collaborators for exercising reconciliation and cleanup without
//! spawning tmux or docker.

use std::collections::BTreeSet;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::ProbeError;
use crate::multiplexer::{Multiplexer, MultiplexerSession};
use crate::sandbox::SandboxManager;

fn spawn_failure(command: &str) -> ProbeError {
    ProbeError::Io {
        command: command.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "probe unavailable"),
    }
}

fn teardown_failure(command: &str) -> ProbeError {
    ProbeError::CommandFailed {
        command: command.to_string(),
        status: Some(1),
        stdout: String::new(),
        stderr: "refused".to_string(),
    }
}

#[derive(Debug, Default)]
pub struct FakeMultiplexer {
    sessions: Mutex<BTreeSet<String>>,
    failing_kills: Mutex<BTreeSet<String>>,
    probe_unavailable: AtomicBool,
    exists_calls: AtomicUsize,
    kill_calls: AtomicUsize,
}

impl FakeMultiplexer {
    pub fn with_sessions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fake = Self::default();
        for name in names {
            fake.add_session(name);
        }
        fake
    }

    pub fn add_session(&self, name: impl Into<String>) {
        lock(&self.sessions).insert(name.into());
    }

    pub fn remove_session(&self, name: &str) {
        lock(&self.sessions).remove(name);
    }

    pub fn has_session(&self, name: &str) -> bool {
        lock(&self.sessions).contains(name)
    }

    /// Makes every existence probe fail as if the binary could not be spawned.
    pub fn set_probe_unavailable(&self, unavailable: bool) {
        self.probe_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_kill_for(&self, name: impl Into<String>) {
        lock(&self.failing_kills).insert(name.into());
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }
}

impl Multiplexer for FakeMultiplexer {
    fn session_exists(&self, name: &str) -> Result<bool, ProbeError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_unavailable.load(Ordering::SeqCst) {
            return Err(spawn_failure("tmux has-session"));
        }
        Ok(self.has_session(name))
    }

    fn kill_session(&self, name: &str) -> Result<(), ProbeError> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_kills).contains(name) {
            return Err(teardown_failure(&format!("tmux kill-session -t ={name}")));
        }
        if !lock(&self.sessions).remove(name) {
            return Err(teardown_failure(&format!("tmux kill-session -t ={name}")));
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<MultiplexerSession>, ProbeError> {
        if self.probe_unavailable.load(Ordering::SeqCst) {
            return Err(spawn_failure("tmux list-sessions"));
        }
        Ok(lock(&self.sessions)
            .iter()
            .map(|name| MultiplexerSession {
                name: name.clone(),
                attached: false,
                windows: 1,
                created: 0,
            })
            .collect())
    }

    fn attach_command(&self, _name: &str) -> Command {
        Command::new("true")
    }
}

#[derive(Debug, Default)]
pub struct FakeSandbox {
    sandboxes: Mutex<BTreeSet<String>>,
    failing_deletes: Mutex<BTreeSet<String>>,
    probe_unavailable: AtomicBool,
    exists_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FakeSandbox {
    pub fn with_sandboxes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fake = Self::default();
        for name in names {
            fake.add_sandbox(name);
        }
        fake
    }

    pub fn add_sandbox(&self, name: impl Into<String>) {
        lock(&self.sandboxes).insert(name.into());
    }

    pub fn remove_sandbox(&self, name: &str) {
        lock(&self.sandboxes).remove(name);
    }

    pub fn has_sandbox(&self, name: &str) -> bool {
        lock(&self.sandboxes).contains(name)
    }

    pub fn set_probe_unavailable(&self, unavailable: bool) {
        self.probe_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_delete_for(&self, name: impl Into<String>) {
        lock(&self.failing_deletes).insert(name.into());
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

impl SandboxManager for FakeSandbox {
    fn sandbox_exists(&self, name: &str) -> Result<bool, ProbeError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_unavailable.load(Ordering::SeqCst) {
            return Err(spawn_failure("docker container inspect"));
        }
        Ok(self.has_sandbox(name))
    }

    fn delete_sandbox(&self, name: &str) -> Result<(), ProbeError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_deletes).contains(name) {
            return Err(teardown_failure(&format!("docker rm --force {name}")));
        }
        lock(&self.sandboxes).remove(name);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
