//! Error types for `termdict`.

use std::path::PathBuf;

/// Result type for term dictionary operations.
pub type TermDictResult<T> = Result<T, TermDictError>;

/// Errors returned by the `termdict` crate.
#[derive(thiserror::Error, Debug)]
pub enum TermDictError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (corrupt, unexpected, unsupported).
    #[error("format error: {0}")]
    Format(String),

    /// Format error with optional expected/actual context.
    ///
    /// `expected`/`actual` exist to make “format mismatch” debugging concrete without
    /// forcing every caller into bespoke error enums.
    #[error("format error: {message}")]
    FormatDetail {
        /// Short, human-readable description of the mismatch.
        message: String,
        /// Optional “expected” value (stringified) for debugging.
        expected: Option<String>,
        /// Optional “actual” value (stringified) for debugging.
        actual: Option<String>,
    },

    /// CRC mismatch (data corruption detected).
    #[error("crc mismatch (expected {expected:#010x}, got {actual:#010x})")]
    CrcMismatch {
        /// CRC stored in the file/record footer.
        expected: u32,
        /// CRC computed from the bytes that were read.
        actual: u32,
    },

    /// Block bytes failed structural decoding when actually read.
    ///
    /// This is the deferred-detection path: a dictionary that opened fine can still
    /// surface corruption here once the damaged block is loaded.
    #[error("corrupt block: {0}")]
    Corruption(String),

    /// Encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid state (operation not allowed in current state).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not supported.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Resource not found (file/field/format name).
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested path does not exist.
    #[error("missing path: {0}")]
    MissingPath(PathBuf),
}
