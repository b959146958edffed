//! Error types for the archive engine.
//!
//! The taxonomy distinguishes fatal refusals (format damage, unsupported
//! variants) from recoverable conditions (wrong password, per-entry
//! corruption) and from cancellation, which is a terminal outcome but not
//! a failure. The engine never retries internally; retry/skip decisions
//! belong to the caller's decision sink.

use thiserror::Error;

/// Errors that can occur when working with archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] kovcheg_common::Error),

    /// Invalid record signature.
    #[error("invalid signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Malformed archive structure.
    #[error("archive format error: {0}")]
    Format(&'static str),

    /// Could not find a valid end-of-directory record.
    #[error("could not find end of central directory record")]
    DirectoryNotFound,

    /// The directory declares zero entries.
    #[error("archive contains no entries")]
    EmptyArchive,

    /// The archive uses the 64-bit directory extension, which is
    /// explicitly rejected rather than partially supported.
    #[error("64-bit archive variant is not supported")]
    UnsupportedVariant,

    /// Compression method outside the supported set (stored, deflate).
    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    /// Spanned archive encountered where the operation requires a single
    /// volume.
    #[error("multi-volume archive is not supported by this operation")]
    MultiVolumeUnsupported,

    /// Candidate password failed header verification. Recoverable: loop
    /// back to the password prompt or skip the entry.
    #[error("wrong password")]
    PasswordMismatch,

    /// Decompressed data does not match the directory's checksum.
    #[error("CRC-32 mismatch in {name}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Entry data failed to decode.
    #[error("corrupt entry data: {0}")]
    CorruptData(String),

    /// Allocation failure, reported distinctly so callers can show a
    /// specific message rather than a generic I/O failure.
    #[error("not enough memory to complete the operation")]
    LowMemory,

    /// Cancellation was requested and observed at a safe boundary.
    #[error("operation cancelled")]
    Cancelled,

    /// No entry with the given name exists.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

impl Error {
    /// Whether this outcome is user-initiated cancellation rather than a
    /// failure. Callers use this to avoid describing it as an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<kovcheg_inflate::Error> for Error {
    fn from(err: kovcheg_inflate::Error) -> Self {
        match err {
            kovcheg_inflate::Error::Io(e) => Error::Io(e),
            kovcheg_inflate::Error::Cancelled => Error::Cancelled,
            other => Error::CorruptData(other.to_string()),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
