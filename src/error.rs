//! Error types for streamfn.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the socket or the server-info file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (server-info file only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol violation (malformed frame, wrong flags, frame for another method).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// First frame of a streaming channel was not a handshake.
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// No operation is registered under the given method ID.
    #[error("Unknown method ID: {0}")]
    UnknownMethod(u16),

    /// The user function returned an error.
    #[error("User function error: {0}")]
    User(String),

    /// The channel was closed; nothing more can be written to it.
    #[error("Channel closed")]
    ChannelClosed,

    /// A frame payload exceeds the configured maximum message size.
    #[error("Message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Offending payload size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Batch responses do not line up with the batch that was handed to the user function.
    #[error("Batch mismatch: {0}")]
    BatchMismatch(String),
}

impl Error {
    /// Wrap an error returned by a user function.
    pub(crate) fn user(err: BoxError) -> Self {
        Error::User(err.to_string())
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error type user functions may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for user functions.
pub type HandlerResult<T> = std::result::Result<T, BoxError>;
