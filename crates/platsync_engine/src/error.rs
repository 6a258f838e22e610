//! Error types for the following side.

use platsync_protocol::CodecError;
use thiserror::Error;

/// Result type for follower operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur on the following side.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote call to the owner failed.
    #[error("remote call failed: {0}")]
    RemoteCallFailure(String),

    /// A request or response could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The client reported itself unhealthy before the call.
    #[error("not connected to peer")]
    NotConnected,

    /// The local store failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// No platform with this local identifier is stored.
    #[error("platform not found: {0}")]
    PlatformNotFound(i32),

    /// A command was missing a required field.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl SyncError {
    /// Returns true if the error came from talking to the owner.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteCallFailure(_) | SyncError::NotConnected | SyncError::Codec(_)
        )
    }
}
