use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::command::CliRunner;
use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexerSession {
    pub name: String,
    pub attached: bool,
    pub windows: u32,
    pub created: i64,
}

/// Terminal multiplexer collaborator.
///
/// Existence checks are read-only and may run concurrently from worker
/// threads, hence the `Send + Sync` bound.
pub trait Multiplexer: Send + Sync {
    fn session_exists(&self, name: &str) -> Result<bool, ProbeError>;
    fn kill_session(&self, name: &str) -> Result<(), ProbeError>;
    fn list_sessions(&self) -> Result<Vec<MultiplexerSession>, ProbeError>;
    /// Command that attaches the current terminal to `name`. The caller runs
    /// it with inherited stdio after releasing the terminal.
    fn attach_command(&self, name: &str) -> Command;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxCli {
    runner: CliRunner,
}

impl Default for TmuxCli {
    fn default() -> Self {
        Self {
            runner: CliRunner::new("tmux"),
        }
    }
}

impl TmuxCli {
    pub fn new(runner: CliRunner) -> Self {
        Self { runner }
    }
}

// `=name` asks tmux for an exact match instead of a prefix match.
fn exact_target(name: &str) -> String {
    format!("={name}")
}

impl Multiplexer for TmuxCli {
    fn session_exists(&self, name: &str) -> Result<bool, ProbeError> {
        self.runner
            .succeeds(["has-session", "-t", exact_target(name).as_str()])
    }

    fn kill_session(&self, name: &str) -> Result<(), ProbeError> {
        self.runner
            .run(None, ["kill-session", "-t", exact_target(name).as_str()])?;
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<MultiplexerSession>, ProbeError> {
        let result = self.runner.run(
            None,
            [
                "list-sessions",
                "-F",
                "#{session_name}\t#{session_attached}\t#{session_windows}\t#{session_created}",
            ],
        );
        match result {
            Ok(output) => parse_session_list(&output.stdout),
            Err(err) if is_no_server(&err) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    fn attach_command(&self, name: &str) -> Command {
        let target = exact_target(name);
        if std::env::var_os("TMUX").is_some() {
            self.runner.command(["switch-client", "-t", target.as_str()])
        } else {
            self.runner.command(["attach-session", "-t", target.as_str()])
        }
    }
}

fn is_no_server(err: &ProbeError) -> bool {
    let stderr = err.stderr();
    stderr.contains("no server running") || stderr.contains("no sessions")
}

fn parse_session_list(raw: &str) -> Result<Vec<MultiplexerSession>, ProbeError> {
    let mut sessions = Vec::new();
    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 4 {
            return Err(ProbeError::Parse {
                context: format!("expected 4 tab separated fields in session line: {line}"),
            });
        }
        sessions.push(MultiplexerSession {
            name: parts[0].to_string(),
            attached: parts[1] != "0",
            windows: parts[2].parse().unwrap_or(1),
            created: parts[3].parse().unwrap_or(0),
        });
    }
    Ok(sessions)
}
