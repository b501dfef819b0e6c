//! Wire-level errors.

use thiserror::Error;

/// Errors produced while framing or parsing protocol traffic.
///
/// Anything in here is a protocol violation or transport fault; the
/// server terminates the offending connection rather than replying.
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying transport I/O failure.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame length prefix exceeds the negotiated maximum.
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Declared payload length.
        len: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Payload was not valid JSON for the expected envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A binary argument was not valid base64.
    #[error("invalid binary payload: {0}")]
    Payload(#[from] base64::DecodeError),

    /// A binary argument was not carried as a JSON string.
    #[error("binary payload must be a base64 string")]
    PayloadType,
}
