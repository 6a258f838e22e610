//! Error types for the message bus.

use platsync_protocol::CodecError;
use thiserror::Error;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur on the message bus.
///
/// None of these ever reach the owner's write path: the publisher and the
/// subscriber turn them into outcomes and log entries at their boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("broker unreachable: {0}")]
    BrokerUnreachable(String),

    /// An operation was attempted on a connection that is not connected.
    #[error("channel closed")]
    ChannelClosed,

    /// The broker refused an operation (missing exchange, type mismatch, ...).
    #[error("broker refused operation: {0}")]
    Broker(String),

    /// A payload could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A payload did not match the event schema.
    #[error("decode error: {0}")]
    Decode(String),

    /// A payload carried a discriminator with no registered handler.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// A handler rejected a decoded event.
    #[error("handler failed: {0}")]
    Handler(String),
}

impl BusError {
    /// Returns true if the error came from the transport rather than a payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BusError::BrokerUnreachable(_) | BusError::ChannelClosed | BusError::Broker(_)
        )
    }

    pub(crate) fn decode(err: CodecError) -> Self {
        BusError::Decode(err.to_string())
    }

    pub(crate) fn encode(err: CodecError) -> Self {
        BusError::Encode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(BusError::BrokerUnreachable("refused".into()).is_transport());
        assert!(BusError::ChannelClosed.is_transport());
        assert!(!BusError::Decode("eof".into()).is_transport());
        assert!(!BusError::UnknownEventKind("X".into()).is_transport());
    }

    #[test]
    fn error_display() {
        let err = BusError::UnknownEventKind("Platform_Deleted".into());
        assert_eq!(err.to_string(), "unknown event kind: Platform_Deleted");
    }
}
