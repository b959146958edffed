//! End of Central Directory (EOCD) structures.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::central::zip64_sentinel;

/// End of Central Directory Record (without signature).
///
/// The fixed trailer found near the end of the archive. The 4-byte
/// signature (0x06054b50) is read separately before this struct. Archives
/// using the 64-bit extension mark fields with 0xFFFF / 0xFFFFFFFF
/// sentinels; that variant is rejected outright.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct EocdRecord {
    /// Number of this disk
    pub disk_number: u16,
    /// Disk where central directory starts
    pub central_dir_disk: u16,
    /// Number of central directory records on this disk
    pub central_dir_count_disk: u16,
    /// Total number of central directory records
    pub central_dir_count_total: u16,
    /// Size of central directory (bytes)
    pub central_dir_size: u32,
    /// Offset of start of central directory on its start disk
    pub central_dir_offset: u32,
    /// Comment length
    pub comment_length: u16,
}

impl EocdRecord {
    /// EOCD signature bytes.
    pub const MAGIC: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

    /// EOCD signature as u32.
    pub const SIGNATURE: u32 = 0x06054b50;

    /// Size of the fixed record including the signature.
    pub const FIXED_SIZE: usize = 4 + std::mem::size_of::<EocdRecord>();

    /// Largest possible EOCD footprint: fixed record plus a maximal
    /// comment. Bounds the backward signature scan.
    pub const MAX_FOOTPRINT: usize = Self::FIXED_SIZE + u16::MAX as usize;

    /// Check whether the record declares the rejected 64-bit extension.
    pub fn uses_zip64(&self) -> bool {
        self.central_dir_count_total == zip64_sentinel::U16
            || self.central_dir_offset == zip64_sentinel::U32
            || self.central_dir_size == zip64_sentinel::U32
    }

    /// Whether the archive is split across multiple volumes.
    pub fn is_spanned(&self) -> bool {
        self.disk_number != 0 || self.central_dir_disk != 0
    }
}
