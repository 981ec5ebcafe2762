//! Error types for uwblib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Codec, transport, correlation and
//! dispatch failures are all captured here.

/// The error type for all uwblib operations.
///
/// Variants cover the failure modes of the protocol engine: specifier
/// lookups, argument shape checks, garbled frames from the wire, reply
/// timeouts, transport failures, and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No specifier is registered for the given class + ID (e.g. `"C42"`).
    ///
    /// This is a programming or configuration error and is surfaced
    /// immediately to the caller.
    #[error("unknown message id: {0}")]
    UnknownMessageId(String),

    /// The number of supplied field values does not match the specifier.
    #[error("{key}: expected {expected} fields, got {actual}")]
    FieldArityMismatch {
        /// Message key the values were supplied for.
        key: String,
        /// Field count declared by the specifier.
        expected: usize,
        /// Field count actually supplied.
        actual: usize,
    },

    /// A supplied value cannot be converted to its declared field type.
    #[error("{key}: field {index} expected {expected}, got {found}")]
    FieldTypeMismatch {
        /// Message key the values were supplied for.
        key: String,
        /// Zero-based index of the offending field.
        index: usize,
        /// Declared field type.
        expected: &'static str,
        /// Description of the value that was supplied.
        found: String,
    },

    /// Bytes received from the transport could not be decoded.
    ///
    /// The reader loop logs and drops these; they never stop the loop.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Timed out waiting for a reply from the module.
    #[error("timeout waiting for response")]
    Timeout,

    /// Writing a command to the transport failed.
    #[error("transport write failed: {0}")]
    TransportWrite(String),

    /// A transport-level error (serial port, mock transport).
    #[error("transport error: {0}")]
    Transport(String),

    /// No connection to the module has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the module was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The module has been stopped, or its loops exited while the
    /// operation was pending.
    #[error("module closed")]
    Closed,

    /// A registered callback failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// An invalid parameter or lifecycle request was passed to the module.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error means the transport is gone for good.
    ///
    /// The reader loop stops on these instead of retrying.
    pub fn is_fatal_transport(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::ConnectionLost | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
