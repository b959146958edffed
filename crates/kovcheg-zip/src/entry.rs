//! Archive entry model.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use kovcheg_common::BinaryReader;

use crate::records::{flags, CompressionMethod, LocalFileHeader};
use crate::{Error, Result};

/// An entry (file or directory) within an archive.
///
/// This holds the central-directory metadata, not the entry data itself.
/// Use [`crate::ZipArchive::read`] to get the contents.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Raw name bytes as stored in the directory (slash-separated).
    raw_name: Vec<u8>,
    /// Lossy UTF-8 rendering of the name.
    name: String,
    /// DOS date/time of last modification.
    dos_datetime: u32,
    /// CRC-32 of uncompressed data.
    crc32: u32,
    /// Compressed size in bytes.
    compressed_size: u32,
    /// Uncompressed size in bytes.
    uncompressed_size: u32,
    /// Compression method.
    method: CompressionMethod,
    /// General purpose flags.
    flags: u16,
    /// Internal file attributes.
    internal_attrs: u16,
    /// External file attributes.
    external_attrs: u32,
    /// Disk the local header starts on.
    start_disk: u16,
    /// Offset of the local header on its start disk.
    local_header_offset: u32,
    /// Raw extra field bytes, preserved for rewrites.
    extra: Vec<u8>,
    /// Raw comment bytes, preserved for rewrites.
    comment: Vec<u8>,
}

impl FileEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        raw_name: Vec<u8>,
        dos_datetime: u32,
        crc32: u32,
        compressed_size: u32,
        uncompressed_size: u32,
        method: CompressionMethod,
        flags: u16,
        internal_attrs: u16,
        external_attrs: u32,
        start_disk: u16,
        local_header_offset: u32,
        extra: Vec<u8>,
        comment: Vec<u8>,
    ) -> Self {
        let name = String::from_utf8_lossy(&raw_name).into_owned();
        Self {
            raw_name,
            name,
            dos_datetime,
            crc32,
            compressed_size,
            uncompressed_size,
            method,
            flags,
            internal_attrs,
            external_attrs,
            start_disk,
            local_header_offset,
            extra,
            comment,
        }
    }

    /// Entry name as stored, rendered as UTF-8.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw name bytes exactly as stored in the directory.
    #[inline]
    pub fn raw_name(&self) -> &[u8] {
        &self.raw_name
    }

    /// CRC-32 of the uncompressed data.
    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Compressed size in bytes (includes the 12-byte encryption header
    /// for encrypted entries).
    #[inline]
    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// Uncompressed size in bytes.
    #[inline]
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Compression method.
    #[inline]
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// General purpose flag word.
    #[inline]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Whether the entry data is encrypted with the legacy cipher.
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & flags::ENCRYPTED != 0
    }

    /// Whether CRC/sizes live in a trailing descriptor after the data.
    #[inline]
    pub fn has_trailing_descriptor(&self) -> bool {
        self.flags & flags::TRAILING_DESCRIPTOR != 0
    }

    /// Internal file attributes.
    #[inline]
    pub fn internal_attrs(&self) -> u16 {
        self.internal_attrs
    }

    /// External file attributes.
    #[inline]
    pub fn external_attrs(&self) -> u32 {
        self.external_attrs
    }

    /// Disk number the entry's local header starts on.
    #[inline]
    pub fn start_disk(&self) -> u16 {
        self.start_disk
    }

    /// Offset of the local header on its start disk.
    #[inline]
    pub fn local_header_offset(&self) -> u32 {
        self.local_header_offset
    }

    /// DOS date/time word (time in the low half, date in the high half).
    #[inline]
    pub fn dos_datetime(&self) -> u32 {
        self.dos_datetime
    }

    /// Raw extra field bytes.
    #[inline]
    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    /// Raw comment bytes.
    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Check if this entry represents a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }

    /// Case-insensitive name comparison, tolerant of either separator.
    pub fn matches_name(&self, other: &str) -> bool {
        let a = self.name.replace('\\', "/");
        let b = other.replace('\\', "/");
        a.eq_ignore_ascii_case(&b)
    }

    /// The byte the cipher's header verification compares against.
    ///
    /// With a trailing descriptor the directory CRC may not be final at
    /// encryption time, so the format substitutes the high byte of the
    /// DOS time field.
    pub fn password_check_byte(&self) -> u8 {
        if self.has_trailing_descriptor() {
            (self.dos_datetime >> 8) as u8
        } else {
            (self.crc32 >> 24) as u8
        }
    }

    /// Get the last modification time as a SystemTime.
    ///
    /// Returns None if the DOS datetime is invalid.
    pub fn last_modified(&self) -> Option<SystemTime> {
        dos_datetime_to_system_time(self.dos_datetime)
    }

    /// Relative output path for extraction, re-encoded to the platform's
    /// separator and stripped of absolute or parent components.
    pub fn output_path(&self) -> Option<PathBuf> {
        let normalized = self.name.replace('\\', "/");
        let mut path = PathBuf::new();
        for component in Path::new(&normalized).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                // Absolute prefixes and `..` would escape the target root.
                _ => return None,
            }
        }
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }
}

/// A parsed view of a local file header at an entry's offset.
///
/// Used only to skip the variable-length name/extra fields that precede
/// the entry data; the authoritative metadata lives in the directory.
#[derive(Debug, Clone, Copy)]
pub struct LocalHeaderView {
    /// The fixed header fields.
    pub header: LocalFileHeader,
    /// Offset of the first byte of entry data.
    pub data_offset: u64,
}

impl LocalHeaderView {
    /// Parse the local header at `offset` within `data`, range-checking
    /// the signature, the fixed fields and the variable tail.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        let offset = offset as usize;
        if offset.checked_add(4).map_or(true, |end| end > data.len()) {
            return Err(Error::Format("local header offset out of bounds"));
        }

        let mut reader = BinaryReader::new_at(data, offset);
        let signature = reader.read_u32()?;
        if signature != LocalFileHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: LocalFileHeader::SIGNATURE,
                actual: signature,
            });
        }

        let header: LocalFileHeader = reader.read_struct()?;
        let data_offset = reader.position() + header.variable_data_size();
        if data_offset > data.len() {
            return Err(Error::Format("local header tail out of bounds"));
        }

        Ok(Self {
            header,
            data_offset: data_offset as u64,
        })
    }
}

/// Convert DOS date/time format to SystemTime.
///
/// DOS date/time format:
/// - Time: bits 0-4 = seconds/2, bits 5-10 = minutes, bits 11-15 = hours
/// - Date: bits 16-20 = day, bits 21-24 = month, bits 25-31 = year-1980
fn dos_datetime_to_system_time(datetime: u32) -> Option<SystemTime> {
    let year = 1980 + ((datetime >> 25) & 0x7F) as i32;
    let month = (datetime >> 21) & 0x0F;
    let day = (datetime >> 16) & 0x1F;
    let hour = (datetime >> 11) & 0x1F;
    let minute = (datetime >> 5) & 0x3F;
    let second = (datetime & 0x1F) * 2;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    let mut days = 0i64;
    for y in 1970..year {
        days += if is_leap_year(y) { 366 } else { 365 };
    }

    const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    for m in 1..month {
        days += DAYS_IN_MONTH[(m - 1) as usize] as i64;
        if m == 2 && is_leap_year(year) {
            days += 1;
        }
    }
    days += (day - 1) as i64;

    let secs = days * 86400 + hour as i64 * 3600 + minute as i64 * 60 + second as i64;
    std::time::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(secs as u64))
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_named(name: &str) -> FileEntry {
        FileEntry::new(
            name.as_bytes().to_vec(),
            0,
            0,
            0,
            0,
            CompressionMethod::Store,
            0,
            0,
            0,
            0,
            0,
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let entry = entry_named("Docs/Readme.TXT");
        assert!(entry.matches_name("docs/readme.txt"));
        assert!(entry.matches_name("DOCS\\README.TXT"));
        assert!(!entry.matches_name("docs/other.txt"));
    }

    #[test]
    fn test_output_path_rejects_traversal() {
        assert!(entry_named("../evil").output_path().is_none());
        assert!(entry_named("/etc/passwd").output_path().is_none());
        assert_eq!(
            entry_named("a/./b.txt").output_path(),
            Some(PathBuf::from("a/b.txt"))
        );
    }

    #[test]
    fn test_is_dir() {
        assert!(entry_named("folder/").is_dir());
        assert!(!entry_named("folder/file").is_dir());
    }

    #[test]
    fn test_check_byte_selection() {
        let mut entry = entry_named("x");
        entry.crc32 = 0xAABBCCDD;
        entry.dos_datetime = 0x1234_5678;

        assert_eq!(entry.password_check_byte(), 0xAA);

        entry.flags |= flags::TRAILING_DESCRIPTOR;
        assert_eq!(entry.password_check_byte(), 0x56);
    }

    #[test]
    fn test_local_header_view_bounds() {
        // Header claiming a name longer than the buffer.
        let mut data = Vec::new();
        data.extend_from_slice(&LocalFileHeader::SIGNATURE.to_le_bytes());
        data.extend_from_slice(&[0u8; 26]);
        // Name length field sits at offset 4 + 22 = 26.
        data[26] = 0xFF;
        data[27] = 0xFF;

        assert!(LocalHeaderView::parse(&data, 0).is_err());
    }

    #[test]
    fn test_local_header_view_bad_signature() {
        let mut data = vec![0u8; 64];
        data[..4].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());

        assert!(matches!(
            LocalHeaderView::parse(&data, 0),
            Err(Error::InvalidSignature { .. })
        ));
    }
}
