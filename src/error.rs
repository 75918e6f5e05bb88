use thiserror::Error;

/// Errors returned by message encoding, sending and transports.
///
/// Every variant is returned to the immediate caller. Nothing here is
/// retried internally; retry and backoff policy belong to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transport could not be reached, or the connection was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A message could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be decoded into a message.
    ///
    /// Malformed input and wire version mismatches both land here.
    #[error("decode error: {0}")]
    Decode(String),

    /// The sender or transport was already closed.
    #[error("sender is closed")]
    Closed,

    /// The caller-supplied deadline elapsed before the operation finished.
    ///
    /// For `send` the delivery outcome is unknown: the broker may or may
    /// not have accepted the message.
    #[error("operation timed out (delivery outcome unknown)")]
    Timeout,

    /// The caller canceled the operation before it finished.
    ///
    /// Same ambiguity as [`Error::Timeout`].
    #[error("operation canceled (delivery outcome unknown)")]
    Canceled,

    /// Transport-level publish or close failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A required configuration value was not provided.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration values contradict each other.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// No transport matches the configured type or URI scheme.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
