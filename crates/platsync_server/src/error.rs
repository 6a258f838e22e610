//! Error types for the owning service.

use platsync_protocol::CodecError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur on the owning side.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The schema migration never succeeded.
    #[error("migration failed after {attempts} attempts: {last_error}")]
    MigrationFailure {
        /// Attempts made.
        attempts: u32,
        /// Error reported by the last attempt.
        last_error: String,
    },

    /// A call to a peer service failed.
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    /// The record store failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_) => true,
            ServerError::Codec(e) => e.is_decode(),
            _ => false,
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Repository("disk full".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn migration_failure_display() {
        let err = ServerError::MigrationFailure {
            attempts: 5,
            last_error: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration failed after 5 attempts: connection refused"
        );
    }
}
