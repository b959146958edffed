//! Central Directory Header structures.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Central Directory File Header (without signature).
///
/// Describes a single entry in the archive's central directory. The
/// 4-byte signature (0x02014b50) is read separately before this struct.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CentralDirectoryHeader {
    /// Version made by
    pub version_made_by: u16,
    /// Version needed to extract
    pub version_needed: u16,
    /// General purpose bit flag
    pub flags: u16,
    /// Compression method
    pub compression_method: u16,
    /// File last modification time and date (DOS format)
    pub last_modified: u32,
    /// CRC-32 of uncompressed data
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u32,
    /// Uncompressed size
    pub uncompressed_size: u32,
    /// File name length
    pub file_name_length: u16,
    /// Extra field length
    pub extra_field_length: u16,
    /// File comment length
    pub file_comment_length: u16,
    /// Disk number where the entry's local header starts
    pub disk_number_start: u16,
    /// Internal file attributes
    pub internal_attrs: u16,
    /// External file attributes
    pub external_attrs: u32,
    /// Relative offset of local file header on the start disk
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    /// Central Directory signature bytes.
    pub const MAGIC: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];

    /// Central Directory signature as u32.
    pub const SIGNATURE: u32 = 0x02014b50;

    /// Total variable-length data size following this header.
    pub fn variable_data_size(&self) -> usize {
        self.file_name_length as usize
            + self.extra_field_length as usize
            + self.file_comment_length as usize
    }
}

/// General-purpose flag bits of interest.
pub mod flags {
    /// Bit 0: entry data is encrypted with the legacy stream cipher.
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Bit 3: CRC and sizes live in a trailing descriptor rather than the
    /// local header.
    pub const TRAILING_DESCRIPTOR: u16 = 1 << 3;
}

/// Sentinel values announcing the rejected 64-bit directory extension.
pub mod zip64_sentinel {
    /// 32-bit size/offset sentinel.
    pub const U32: u32 = 0xFFFF_FFFF;
    /// 16-bit count/disk sentinel.
    pub const U16: u16 = 0xFFFF;
}
