//! Lexical validation of the worktree and script paths.
//!
//! Nothing here touches the filesystem. A path that fails any check is never
//! handed to the launcher.

use std::path::{Component, Path, PathBuf};

use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    pub worktree: PathBuf,
    pub script: PathBuf,
}

pub fn resolve_script_path(worktree: &Path, subpath: &Path) -> Result<ScriptPaths, ExecError> {
    if worktree.as_os_str().is_empty() || !worktree.is_absolute() {
        return Err(reject(worktree, "worktree path must be absolute"));
    }
    if has_parent_segment(worktree) {
        return Err(reject(worktree, "worktree path contains a '..' segment"));
    }
    let worktree = normalize(worktree);
    if has_parent_segment(&worktree) {
        return Err(reject(&worktree, "worktree path contains a '..' segment"));
    }

    if subpath.as_os_str().is_empty()
        || subpath
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(reject(
            subpath,
            "script subpath must be relative without '..' segments",
        ));
    }

    let script = normalize(&worktree.join(subpath));
    if script == worktree || !script.starts_with(&worktree) {
        return Err(reject(&script, "script path escapes the worktree"));
    }

    Ok(ScriptPaths { worktree, script })
}

fn has_parent_segment(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::ParentDir))
}

/// Drops `.` segments and folds `..` into its parent.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn reject(path: &Path, reason: &str) -> ExecError {
    ExecError::PathValidation {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
