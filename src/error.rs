//! Error types for filebin.

use thiserror::Error;

use crate::auth::{PasswordError, SessionError};
use crate::file::FileNameError;
use crate::server::ErrorKind;

/// Common error type for filebin.
#[derive(Error, Debug)]
pub enum FilebinError {
    /// I/O error, either on disk or on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Username/password pair was rejected.
    #[error("authentication failed")]
    AuthFailed,

    /// Request carried a missing or unknown session token.
    #[error("not authenticated")]
    Unauthenticated,

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Request could not be parsed or carried invalid arguments.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Password hashing error.
    #[error("password error: {0}")]
    Password(#[from] PasswordError),
}

impl From<FileNameError> for FilebinError {
    fn from(e: FileNameError) -> Self {
        FilebinError::MalformedRequest(e.to_string())
    }
}

impl From<SessionError> for FilebinError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials | SessionError::AccountLocked(_) => {
                FilebinError::AuthFailed
            }
            SessionError::SessionNotFound | SessionError::ForeignConnection => {
                FilebinError::Unauthenticated
            }
        }
    }
}

impl FilebinError {
    /// Wire error category reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FilebinError::AuthFailed => ErrorKind::AuthFailed,
            FilebinError::Unauthenticated => ErrorKind::Unauthenticated,
            FilebinError::NotFound(_) => ErrorKind::NotFound,
            FilebinError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            FilebinError::Io(_) | FilebinError::Config(_) | FilebinError::Password(_) => {
                ErrorKind::IoFailure
            }
        }
    }
}

/// Result type alias for filebin operations.
pub type Result<T> = std::result::Result<T, FilebinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_display() {
        let err = FilebinError::NotFound("report.pdf".to_string());
        assert_eq!(err.to_string(), "report.pdf not found");
    }

    #[test]
    fn test_malformed_error_display() {
        let err = FilebinError::MalformedRequest("missing filename".to_string());
        assert_eq!(err.to_string(), "malformed request: missing filename");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: FilebinError = io_err.into();
        assert!(matches!(err, FilebinError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_file_name_error_is_malformed() {
        let err: FilebinError = FileNameError::Traversal.into();
        assert!(matches!(err, FilebinError::MalformedRequest(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn test_session_error_conversion() {
        let err: FilebinError = SessionError::AccountLocked(10).into();
        assert!(matches!(err, FilebinError::AuthFailed));
        let err: FilebinError = SessionError::ForeignConnection.into();
        assert!(matches!(err, FilebinError::Unauthenticated));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(FilebinError::AuthFailed.kind(), ErrorKind::AuthFailed);
        assert_eq!(
            FilebinError::Unauthenticated.kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            FilebinError::NotFound("x".to_string()).kind(),
            ErrorKind::NotFound
        );
        let io_err: FilebinError = std::io::Error::other("disk full").into();
        assert_eq!(io_err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<u64> {
            Ok(42)
        }

        fn sample_err() -> Result<u64> {
            Err(FilebinError::Unauthenticated)
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
