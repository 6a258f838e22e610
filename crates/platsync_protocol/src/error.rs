//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR encoding failed.
    #[error("cbor encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed.
    #[error("cbor decode error: {0}")]
    CborDecode(String),
}

impl CodecError {
    /// Returns true if the error came from malformed input rather than encoding.
    pub fn is_decode(&self) -> bool {
        match self {
            CodecError::Json(e) => e.is_data() || e.is_syntax() || e.is_eof(),
            CodecError::CborDecode(_) => true,
            CodecError::CborEncode(_) => false,
        }
    }
}
