//! ZIP record structures.
//!
//! Low-level fixed-layout records of the archive format, all
//! little-endian and byte-exact. Signatures are read and written
//! separately from the packed structs.

pub mod central;
mod eocd;
mod local;

pub use central::CentralDirectoryHeader;
pub use central::{flags, zip64_sentinel};
pub use eocd::EocdRecord;
pub use local::{LocalFileHeader, DESCRIPTOR_SIGNATURE, DESCRIPTOR_SIZE};

/// Compression methods supported by the engine.
///
/// Anything else in a directory entry is an explicit refusal
/// (`UnsupportedMethod`), not a best-effort attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// DEFLATE compression.
    Deflate = 8,
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            other => Err(other),
        }
    }
}
