//! Filesystem checks run against the resolved script before it is launched.

use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::warn;

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptCheck {
    pub owner_uid: u32,
    pub owned_by_current_user: bool,
}

/// The script must exist, be a regular file (symlinks are not followed) and
/// be executable by the current user. An owner other than the effective user
/// is logged and allowed.
pub fn check_script(path: &Path) -> Result<ScriptCheck, ExecError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExecError::ScriptNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ExecError::Io {
                context: "stat log script",
                source,
            })
        }
    };

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        return Err(security(path, "is a symlink"));
    }
    if file_type.is_dir() {
        return Err(security(path, "is a directory"));
    }
    if !file_type.is_file() {
        return Err(security(path, "is not a regular file"));
    }
    if !executable_by_current_user(path)? {
        return Err(security(path, "is not executable by the current user"));
    }

    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    let owned_by_current_user = metadata.uid() == euid;
    if !owned_by_current_user {
        warn!(
            script = %path.display(),
            owner_uid = metadata.uid(),
            euid,
            "log script is owned by another user"
        );
    }

    Ok(ScriptCheck {
        owner_uid: metadata.uid(),
        owned_by_current_user,
    })
}

fn executable_by_current_user(path: &Path) -> Result<bool, ExecError> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| security(path, "path contains a NUL byte"))?;
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::X_OK) };
    Ok(rc == 0)
}

fn security(path: &Path, reason: &str) -> ExecError {
    ExecError::Security {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
