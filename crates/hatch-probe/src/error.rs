use std::path::PathBuf;
use std::string::FromUtf8Error;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe command failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("probe command returned non-zero exit ({command}) status={status:?}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("probe command output was not valid UTF-8 ({command}, {stream}): {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: FromUtf8Error,
    },
    #[error("path is not inside a git repository: {path}")]
    NotARepository { path: PathBuf },
    #[error("invalid probe output: {context}")]
    Parse { context: String },
}

impl ProbeError {
    /// Stderr of a failed command, empty for every other variant.
    pub fn stderr(&self) -> &str {
        match self {
            ProbeError::CommandFailed { stderr, .. } => stderr.as_str(),
            _ => "",
        }
    }
}
