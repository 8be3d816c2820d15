use crate::command::CliRunner;
use crate::error::ProbeError;

/// Sandbox manager collaborator (one container per session).
pub trait SandboxManager: Send + Sync {
    fn sandbox_exists(&self, name: &str) -> Result<bool, ProbeError>;
    fn delete_sandbox(&self, name: &str) -> Result<(), ProbeError>;
}

/// Sandbox manager backed by a docker-compatible CLI (`docker`, `podman`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCli {
    runner: CliRunner,
}

impl Default for SandboxCli {
    fn default() -> Self {
        Self {
            runner: CliRunner::new("docker"),
        }
    }
}

impl SandboxCli {
    pub fn new(runner: CliRunner) -> Self {
        Self { runner }
    }
}

impl SandboxManager for SandboxCli {
    fn sandbox_exists(&self, name: &str) -> Result<bool, ProbeError> {
        self.runner
            .succeeds(["container", "inspect", "--format", "{{.Name}}", name])
    }

    fn delete_sandbox(&self, name: &str) -> Result<(), ProbeError> {
        self.runner.run(None, ["rm", "--force", name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{SandboxCli, SandboxManager};
    use crate::command::CliRunner;
    use crate::error::ProbeError;

    #[test]
    fn existence_probe_uses_exit_status() {
        // `true`/`false` ignore their arguments, which makes them a stand-in
        // for a sandbox CLI that reports present/absent.
        let present = SandboxCli::new(CliRunner::new("true"));
        assert!(present.sandbox_exists("hatch-repo-42").expect("spawn true"));

        let absent = SandboxCli::new(CliRunner::new("false"));
        assert!(!absent.sandbox_exists("hatch-repo-42").expect("spawn false"));
    }

    #[test]
    fn delete_failure_is_reported_as_command_failed() {
        let failing = SandboxCli::new(CliRunner::new("false"));
        let err = failing
            .delete_sandbox("hatch-repo-42")
            .expect_err("false exits non-zero");
        match err {
            ProbeError::CommandFailed { command, .. } => {
                assert!(command.contains("rm --force hatch-repo-42"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_binary_is_an_io_error() {
        let missing = SandboxCli::new(CliRunner::new("/definitely/missing/docker"));
        assert!(matches!(
            missing.sandbox_exists("hatch-repo-42"),
            Err(ProbeError::Io { .. })
        ));
    }
}
