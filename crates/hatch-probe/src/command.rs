use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Thin wrapper around an external binary (tmux, docker, git).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliRunner {
    pub binary: PathBuf,
}

impl CliRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs the binary and fails with `CommandFailed` on a non-zero exit.
    pub fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<CliOutput, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned_args = collect_args(args);
        let rendered = render_command(&self.binary, &owned_args);

        let mut command = Command::new(&self.binary);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.args(&owned_args);

        let output = command.output().map_err(|source| ProbeError::Io {
            command: rendered.clone(),
            source,
        })?;

        let stdout =
            String::from_utf8(output.stdout).map_err(|source| ProbeError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stdout",
                source,
            })?;
        let stderr =
            String::from_utf8(output.stderr).map_err(|source| ProbeError::NonUtf8Output {
                command: rendered.clone(),
                stream: "stderr",
                source,
            })?;

        if !output.status.success() {
            debug!(command = %rendered, status = ?output.status.code(), "command failed");
            return Err(ProbeError::CommandFailed {
                command: rendered,
                status: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(CliOutput { stdout, stderr })
    }

    /// Runs the binary for its exit status only. A non-zero exit is `Ok(false)`;
    /// only a spawn failure is an error.
    pub fn succeeds<I, S>(&self, args: I) -> Result<bool, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned_args = collect_args(args);
        let status = Command::new(&self.binary)
            .args(&owned_args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map_err(|source| ProbeError::Io {
                command: render_command(&self.binary, &owned_args),
                source,
            })?;
        debug!(binary = %self.binary.display(), success = status.success(), "probe finished");
        Ok(status.success())
    }

    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command.args(collect_args(args));
        command
    }
}

fn collect_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect()
}

pub(crate) fn render_command(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::CliRunner;
    use crate::error::ProbeError;

    #[test]
    fn run_returns_stdout_for_successful_command() {
        let sh = CliRunner::new("sh");
        let output = sh
            .run(None, ["-c", "echo probe-ok"])
            .expect("sh -c echo should succeed");
        assert_eq!(output.stdout.trim(), "probe-ok");
    }

    #[test]
    fn run_honours_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sh = CliRunner::new("sh");
        let output = sh.run(Some(dir.path()), ["-c", "pwd"]).expect("pwd");
        let reported = std::fs::canonicalize(output.stdout.trim()).expect("canonical pwd");
        let expected = std::fs::canonicalize(dir.path()).expect("canonical tempdir");
        assert_eq!(reported, expected);
    }

    #[test]
    fn run_classifies_non_zero_exit_as_command_failed() {
        let sh = CliRunner::new("sh");
        let err = sh
            .run(None, ["-c", "echo boom >&2; exit 3"])
            .expect_err("exit 3 should fail");
        match err {
            ProbeError::CommandFailed {
                command,
                status,
                stderr,
                ..
            } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(status, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn run_classifies_missing_binary_as_io_error() {
        let missing = CliRunner::new("/definitely/missing/tmux-binary");
        let err = missing
            .run(None, ["list-sessions"])
            .expect_err("missing binary should fail");
        match err {
            ProbeError::Io { command, source } => {
                assert!(command.contains("/definitely/missing/tmux-binary"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn succeeds_maps_exit_status_to_bool_and_spawn_failure_to_error() {
        let sh = CliRunner::new("sh");
        assert!(sh.succeeds(["-c", "exit 0"]).expect("spawn sh"));
        assert!(!sh.succeeds(["-c", "exit 1"]).expect("spawn sh"));

        let missing = CliRunner::new("/definitely/missing/docker-binary");
        assert!(matches!(
            missing.succeeds(["ps"]),
            Err(ProbeError::Io { .. })
        ));
    }
}
