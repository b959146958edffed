//! Central directory discovery, parsing and validation.
//!
//! The end-of-directory record is found by scanning the archive's last
//! 64 KiB backward for the signature, accepting only a candidate whose
//! position is consistent with the directory bounds it declares — a magic
//! that merely appears inside a trailing comment fails that test. The
//! walk over directory entries range-checks every variable-length field
//! before use and refuses unsupported variants outright.

use memchr::memmem;

use kovcheg_common::BinaryReader;

use crate::entry::FileEntry;
use crate::records::{zip64_sentinel, CentralDirectoryHeader, CompressionMethod, EocdRecord};
use crate::{Error, Result};

/// A validated, fully parsed central directory.
#[derive(Debug)]
pub struct Directory {
    /// The end-of-directory record.
    pub eocd: EocdRecord,
    /// Absolute offset of the record's signature in the buffer.
    pub eocd_offset: u64,
    /// Archive comment bytes.
    pub comment: Vec<u8>,
    /// Parsed entries in directory order.
    pub entries: Vec<FileEntry>,
}

impl Directory {
    /// Whether the archive is split across volumes.
    pub fn is_spanned(&self) -> bool {
        self.eocd.is_spanned()
    }
}

/// Locate and parse the central directory of the archive in `data`.
///
/// `allow_spanning` permits archives whose entries live on earlier
/// volumes, as long as the directory itself is wholly contained in this
/// (final) volume. Contexts that rewrite the archive pass `false` and get
/// [`Error::MultiVolumeUnsupported`] instead.
///
/// Never mutates anything; the only side effect is the in-memory entry
/// table.
pub fn read_directory(data: &[u8], allow_spanning: bool) -> Result<Directory> {
    let (eocd, eocd_offset) = find_eocd(data)?;

    if eocd.uses_zip64() {
        return Err(Error::UnsupportedVariant);
    }
    if eocd.is_spanned() {
        if !allow_spanning {
            return Err(Error::MultiVolumeUnsupported);
        }
        // The directory must start on the volume we are looking at.
        if eocd.central_dir_disk != eocd.disk_number
            || eocd.central_dir_count_disk != eocd.central_dir_count_total
        {
            return Err(Error::MultiVolumeUnsupported);
        }
    }
    if eocd.central_dir_count_total == 0 {
        return Err(Error::EmptyArchive);
    }

    let comment_start = eocd_offset as usize + EocdRecord::FIXED_SIZE;
    let comment = data[comment_start..comment_start + eocd.comment_length as usize].to_vec();

    let entries = walk_entries(data, &eocd, eocd_offset)?;

    Ok(Directory {
        eocd,
        eocd_offset,
        comment,
        entries,
    })
}

/// Backward scan for a structurally valid end-of-directory record.
fn find_eocd(data: &[u8]) -> Result<(EocdRecord, u64)> {
    let window_start = data.len().saturating_sub(EocdRecord::MAX_FOOTPRINT);
    let window = &data[window_start..];

    for pos in memmem::rfind_iter(window, &EocdRecord::MAGIC) {
        let offset = window_start + pos;
        if offset + EocdRecord::FIXED_SIZE > data.len() {
            continue;
        }

        let mut reader = BinaryReader::new_at(data, offset + 4);
        let Ok(eocd) = reader.read_struct::<EocdRecord>() else {
            continue;
        };

        // The declared comment must fit in the remaining bytes.
        if offset + EocdRecord::FIXED_SIZE + eocd.comment_length as usize > data.len() {
            continue;
        }

        // The signature must sit at or past the end of the directory it
        // points to; anything else is a byte-coincidental magic.
        if eocd.central_dir_disk == eocd.disk_number {
            let dir_end = eocd.central_dir_offset as u64 + eocd.central_dir_size as u64;
            if dir_end > offset as u64 {
                continue;
            }
        }

        return Ok((eocd, offset as u64));
    }

    Err(Error::DirectoryNotFound)
}

fn walk_entries(data: &[u8], eocd: &EocdRecord, eocd_offset: u64) -> Result<Vec<FileEntry>> {
    let count = eocd.central_dir_count_total as usize;
    let dir_offset = eocd.central_dir_offset as usize;
    let dir_end = dir_offset + eocd.central_dir_size as usize;

    let mut entries = Vec::new();
    entries.try_reserve(count).map_err(|_| Error::LowMemory)?;

    let mut reader = BinaryReader::new_at(data, dir_offset);
    for _ in 0..count {
        let signature = reader
            .read_u32()
            .map_err(|_| Error::Format("directory entry truncated"))?;
        if signature != CentralDirectoryHeader::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: CentralDirectoryHeader::SIGNATURE,
                actual: signature,
            });
        }

        let header: CentralDirectoryHeader = reader
            .read_struct()
            .map_err(|_| Error::Format("directory entry truncated"))?;

        if header.compressed_size == zip64_sentinel::U32
            || header.uncompressed_size == zip64_sentinel::U32
            || header.local_header_offset == zip64_sentinel::U32
            || header.disk_number_start == zip64_sentinel::U16
        {
            return Err(Error::UnsupportedVariant);
        }

        let method = CompressionMethod::try_from(header.compression_method)
            .map_err(Error::UnsupportedMethod)?;

        let name = reader
            .read_bytes(header.file_name_length as usize)
            .map_err(|_| Error::Format("entry name out of bounds"))?
            .to_vec();
        let extra = reader
            .read_bytes(header.extra_field_length as usize)
            .map_err(|_| Error::Format("entry extra field out of bounds"))?
            .to_vec();
        let comment = reader
            .read_bytes(header.file_comment_length as usize)
            .map_err(|_| Error::Format("entry comment out of bounds"))?
            .to_vec();

        // On a single volume the local header must precede the directory.
        if !eocd.is_spanned() && header.local_header_offset as u64 >= eocd_offset {
            return Err(Error::Format("entry offset points past the directory"));
        }

        entries.push(FileEntry::new(
            name,
            header.last_modified,
            header.crc32,
            header.compressed_size,
            header.uncompressed_size,
            method,
            header.flags,
            header.internal_attrs,
            header.external_attrs,
            header.disk_number_start,
            header.local_header_offset,
            extra,
            comment,
        ));
    }

    if reader.position() > dir_end {
        return Err(Error::Format("directory overruns its declared size"));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kovcheg_common::BinaryWriter;

    /// Serialize a minimal EOCD record.
    fn eocd_bytes(
        count: u16,
        dir_size: u32,
        dir_offset: u32,
        comment: &[u8],
    ) -> Vec<u8> {
        let mut w = BinaryWriter::new();
        w.write_u32(EocdRecord::SIGNATURE);
        w.write_u16(0); // this disk
        w.write_u16(0); // start disk
        w.write_u16(count);
        w.write_u16(count);
        w.write_u32(dir_size);
        w.write_u32(dir_offset);
        w.write_u16(comment.len() as u16);
        w.write_bytes(comment);
        w.into_bytes()
    }

    #[test]
    fn test_missing_signature() {
        let data = vec![0u8; 4096];
        assert!(matches!(
            read_directory(&data, false),
            Err(Error::DirectoryNotFound)
        ));
    }

    #[test]
    fn test_empty_archive_rejected() {
        let data = eocd_bytes(0, 0, 0, b"");
        assert!(matches!(
            read_directory(&data, false),
            Err(Error::EmptyArchive)
        ));
    }

    #[test]
    fn test_coincidental_magic_in_comment_is_skipped() {
        // A comment containing the EOCD magic followed by garbage fields
        // that place the "directory" past the signature.
        let mut comment = Vec::new();
        comment.extend_from_slice(&EocdRecord::MAGIC);
        comment.extend_from_slice(&[0xFF; 18]);

        let data = eocd_bytes(0, 0, 0, &comment);
        // The outer (real) record is found and rejected as empty, rather
        // than the decoy being trusted.
        assert!(matches!(
            read_directory(&data, false),
            Err(Error::EmptyArchive)
        ));
    }

    #[test]
    fn test_zip64_sentinel_rejected() {
        let data = eocd_bytes(1, zip64_sentinel::U32, 0, b"");
        assert!(matches!(
            read_directory(&data, false),
            Err(Error::UnsupportedVariant)
        ));
    }

    #[test]
    fn test_spanned_rejected_without_permission() {
        let mut w = BinaryWriter::new();
        w.write_u32(EocdRecord::SIGNATURE);
        w.write_u16(1); // this disk
        w.write_u16(1); // start disk
        w.write_u16(1);
        w.write_u16(1);
        w.write_u32(0);
        w.write_u32(0);
        w.write_u16(0);
        let data = w.into_bytes();

        assert!(matches!(
            read_directory(&data, false),
            Err(Error::MultiVolumeUnsupported)
        ));
    }

    #[test]
    fn test_unsupported_method_refused() {
        // One directory entry using method 14 (LZMA).
        let mut w = BinaryWriter::new();
        w.write_u32(CentralDirectoryHeader::SIGNATURE);
        w.write_u16(20); // version made by
        w.write_u16(20); // version needed
        w.write_u16(0); // flags
        w.write_u16(14); // method
        w.write_u32(0); // time/date
        w.write_u32(0); // crc
        w.write_u32(0); // compressed
        w.write_u32(0); // uncompressed
        w.write_u16(1); // name len
        w.write_u16(0); // extra len
        w.write_u16(0); // comment len
        w.write_u16(0); // start disk
        w.write_u16(0); // internal attrs
        w.write_u32(0); // external attrs
        w.write_u32(0); // local offset -- points at itself, fine for test
        w.write_u8(b'x');
        let dir_size = w.position() as u32;
        let tail = eocd_bytes(1, dir_size, 0, b"");
        w.write_bytes(&tail);
        let data = w.into_bytes();

        assert!(matches!(
            read_directory(&data, false),
            Err(Error::UnsupportedMethod(14))
        ));
    }
}
