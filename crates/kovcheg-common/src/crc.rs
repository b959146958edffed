//! CRC-32 hashing utilities.
//!
//! The archive format uses CRC-32 with the IEEE polynomial (0xEDB88320)
//! for per-entry integrity checks. These helpers wrap `crc32fast`, which
//! uses hardware acceleration when available.

/// Compute the CRC-32 of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Continue a previous CRC-32 computation with more data.
#[inline]
pub fn hash_bytes_with_seed(data: &[u8], seed: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(data);
    hasher.finalize()
}

/// A streaming CRC-32 accumulator.
///
/// Used by the decompressor to maintain a running checksum as output is
/// produced block by block.
#[derive(Debug, Default, Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Create a new accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold more bytes into the checksum.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish and return the checksum value.
    #[inline]
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }

    /// Peek at the current checksum without consuming the accumulator.
    #[inline]
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}
