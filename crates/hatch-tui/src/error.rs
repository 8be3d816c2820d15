#[derive(Debug, thiserror::Error)]
pub enum TuiError {
    #[error("terminal io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to run {command}: {source}")]
    Attach {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::TuiError;
    use std::error::Error;

    #[test]
    fn io_error_converts_via_from_and_preserves_source() {
        let source = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "tty closed");
        let err: TuiError = source.into();

        let rendered = err.to_string();
        assert!(rendered.contains("terminal io error"));
        assert!(rendered.contains("tty closed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn attach_error_names_command() {
        let err = TuiError::Attach {
            command: "tmux attach-session -t =repo-42".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no tmux"),
        };
        assert!(err.to_string().contains("failed to run tmux attach-session -t =repo-42"));
        assert!(err.source().is_some());
    }
}
