//! Error types for the inflate crate.

use thiserror::Error;

/// Errors that can occur while decompressing a DEFLATE stream.
#[derive(Debug, Error)]
pub enum Error {
    /// The compressed stream is malformed or truncated.
    #[error("corrupt deflate stream: {0}")]
    Corrupt(&'static str),

    /// A Huffman code-length array demands more codes than the bit
    /// patterns of its lengths can provide.
    #[error("oversubscribed huffman code")]
    OversubscribedCode,

    /// I/O error from the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cancellation was requested and observed at a block boundary.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for inflate operations.
pub type Result<T> = std::result::Result<T, Error>;
