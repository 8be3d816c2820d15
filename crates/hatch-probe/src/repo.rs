use std::path::{Path, PathBuf};

use crate::command::CliRunner;
use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub root: PathBuf,
    pub name: String,
}

/// Resolves the git repository containing `start_path`.
pub fn discover_repository(start_path: &Path, git: &CliRunner) -> Result<RepositoryInfo, ProbeError> {
    let inside = match git.run(Some(start_path), ["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => output.stdout.trim().eq("true"),
        Err(ProbeError::CommandFailed { .. }) => false,
        Err(err) => return Err(err),
    };

    if !inside {
        return Err(ProbeError::NotARepository {
            path: start_path.to_path_buf(),
        });
    }

    let root_raw = git.run(Some(start_path), ["rev-parse", "--show-toplevel"])?;
    let root = PathBuf::from(root_raw.stdout.trim());
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ProbeError::Parse {
            context: format!("repository root has no final component: {}", root.display()),
        })?;

    Ok(RepositoryInfo { root, name })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use super::discover_repository;
    use crate::command::CliRunner;
    use crate::error::ProbeError;

    fn run_git(cwd: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    #[test]
    fn discover_repository_returns_root_and_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo_root = dir.path().join("widgets");
        std::fs::create_dir_all(repo_root.join("src/nested")).expect("create nested");
        run_git(&repo_root, &["init", "-q"]);

        let info = discover_repository(&repo_root.join("src/nested"), &CliRunner::new("git"))
            .expect("discover repo");
        assert_eq!(info.name, "widgets");
        assert_eq!(
            std::fs::canonicalize(&info.root).expect("canonical root"),
            std::fs::canonicalize(&repo_root).expect("canonical expected")
        );
    }

    #[test]
    fn discover_repository_rejects_plain_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = discover_repository(dir.path(), &CliRunner::new("git"))
            .expect_err("plain dir is not a repo");
        assert!(matches!(err, ProbeError::NotARepository { .. }));
    }
}
