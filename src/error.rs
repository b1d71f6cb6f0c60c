use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Unsupported,
    Timeout,
    Canceled,
    DecodeError,
    ExitError,
    NotFound,
    PermissionDenied,
    MalformedData,
    InternalError,
}

/// Failure of a single probe, command or collector. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectError {
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error("timed out after {}", human(.0))]
    Timeout(Duration),
    #[error("canceled")]
    Canceled,
    #[error("output of `{0}` is not readable text")]
    Decode(String),
    #[error("`{command}` exited with code {code}: {message}")]
    Exit {
        command: String,
        code: i32,
        message: String,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("malformed data: {0}")]
    Malformed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CollectError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        Self::Malformed(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Canceled => ErrorKind::Canceled,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Exit { .. } => ErrorKind::ExitError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Malformed(_) => ErrorKind::MalformedData,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Maps a failed file read. A missing file means the platform does not
    /// expose the resource.
    pub fn from_io(what: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(what.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(what.to_string()),
            _ => Self::Internal(format!("{what}: {err}")),
        }
    }

    /// Maps a failed process spawn. A binary absent from PATH is Unsupported.
    pub fn from_spawn(program: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::Unsupported(format!("`{program}` is not on PATH")),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Internal(format!("failed to start `{program}`: {err}")),
        }
    }
}

fn human(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unable to identify host: {0}")]
    HostIdentification(String),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write report to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to render report: {0}")]
    Template(#[from] askama::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_not_found_is_unsupported() {
        let err = CollectError::from_spawn("netsh", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("netsh"));
    }

    #[test]
    fn timeout_message_is_human_readable() {
        let err = CollectError::Timeout(Duration::from_secs(20));
        assert_eq!(err.to_string(), "timed out after 20s");
    }
}
