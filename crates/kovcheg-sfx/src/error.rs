//! Error types for the self-extractor codec.

use thiserror::Error;

/// Errors from locating, decoding or building self-extractor headers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] kovcheg_common::Error),

    /// Archive engine error while validating the payload.
    #[error("archive error: {0}")]
    Zip(#[from] kovcheg_zip::Error),

    /// The executable carries no extractor header: either the section
    /// walk failed or the signature past the last section is absent.
    #[error("executable is not a self-extractor")]
    NotASelfExtractor,

    /// Malformed header block.
    #[error("self-extractor header error: {0}")]
    Format(&'static str),
}

/// Result type for self-extractor operations.
pub type Result<T> = std::result::Result<T, Error>;
