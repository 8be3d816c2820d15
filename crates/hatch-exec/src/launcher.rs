use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;

const TEXT_BUSY_RETRIES: usize = 3;
const TEXT_BUSY_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub script: &'a Path,
    pub working_dir: &'a Path,
    pub session_id: &'a str,
}

/// Starts an already validated script. The child must have piped stdout and
/// stderr and lead its own process group.
pub trait ScriptLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest<'_>) -> std::io::Result<Child>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(request: &LaunchRequest<'_>) -> Command {
        let mut command = Command::new(request.script);
        command
            .current_dir(request.working_dir)
            .env("HATCH_SESSION_ID", request.session_id)
            .env("HATCH_WORKTREE", request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        command
    }
}

impl ScriptLauncher for SystemLauncher {
    fn launch(&self, request: &LaunchRequest<'_>) -> std::io::Result<Child> {
        let mut attempt = 0;
        loop {
            match Self::command(request).spawn() {
                // A script that was just written may still be open for
                // writing in a concurrently forked process.
                Err(err) if err.raw_os_error() == Some(libc::ETXTBSY) && attempt < TEXT_BUSY_RETRIES => {
                    attempt += 1;
                    debug!(script = %request.script.display(), attempt, "log script busy, retrying spawn");
                    thread::sleep(TEXT_BUSY_BACKOFF);
                }
                result => return result,
            }
        }
    }
}

/// Kills the child's whole process group, then reaps the child.
pub fn terminate_process_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill takes plain integers; the group id comes from a child
        // spawned as its own group leader and not yet reaped.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
