//! Read-only archive handle.
//!
//! [`ZipArchive`] memory-maps the (final) volume, parses and validates
//! the central directory once at open time, and serves entry reads from
//! the map. Entry decoding composes a byte source, the optional cipher
//! and the decompressor as `Read` adapters, so the same decode path runs
//! over an in-map slice and over a multi-volume stream.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use kovcheg_common::crc::Crc32;
use kovcheg_common::{CancelFlag, ReadExt};
use kovcheg_inflate::inflate;

use crate::crypto::{DecryptReader, ZipCrypto, ENCRYPTION_HEADER_LEN};
use crate::directory::{read_directory, Directory};
use crate::entry::{FileEntry, LocalHeaderView};
use crate::records::{CompressionMethod, LocalFileHeader};
use crate::spanning::{SpanReader, VolumeProvider};
use crate::{Error, Result};

/// Size of the copy buffer for stored entries.
const COPY_CHUNK: usize = 64 * 1024;

/// Outcome of decoding one entry.
#[derive(Debug, Clone, Copy)]
pub struct EntrySummary {
    /// Bytes written to the output.
    pub bytes_written: u64,
    /// CRC-32 of the written bytes.
    pub crc32: u32,
}

/// An open archive backed by a memory map.
pub struct ZipArchive {
    mmap: Mmap,
    path: PathBuf,
    directory: Directory,
}

impl ZipArchive {
    /// Open the archive at `path` and parse its directory.
    ///
    /// Spanned archives are accepted as long as `path` is the final
    /// volume (the one carrying the directory); reading an entry that
    /// starts on an earlier volume then requires
    /// [`read_spanned_to`](Self::read_spanned_to).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let directory = read_directory(&mmap, true)?;

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            directory,
        })
    }

    /// Path the archive was opened from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw bytes of the mapped volume.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    /// The parsed directory.
    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Entries in directory order.
    #[inline]
    pub fn entries(&self) -> &[FileEntry] {
        &self.directory.entries
    }

    /// Number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.directory.entries.len()
    }

    /// Archive comment bytes.
    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.directory.comment
    }

    /// Whether the archive spans multiple volumes.
    #[inline]
    pub fn is_spanned(&self) -> bool {
        self.directory.is_spanned()
    }

    /// Find an entry by name (case-insensitive, separator-tolerant).
    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        self.directory.entries.iter().find(|e| e.matches_name(name))
    }

    /// Whether the entry's data lives entirely in the mapped volume.
    pub fn is_local_entry(&self, entry: &FileEntry) -> bool {
        !self.is_spanned() || u32::from(entry.start_disk()) == u32::from(self.directory.eocd.disk_number)
    }

    /// Read an entry into a fresh buffer.
    pub fn read(
        &self,
        entry: &FileEntry,
        password: Option<&[u8]>,
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve(entry.uncompressed_size() as usize)
            .map_err(|_| Error::LowMemory)?;
        self.read_to(entry, &mut out, password, cancel)?;
        Ok(out)
    }

    /// Decode an entry into `out`, verifying size and checksum.
    ///
    /// Fails with [`Error::MultiVolumeUnsupported`] if the entry starts
    /// on an earlier volume; use [`read_spanned_to`](Self::read_spanned_to)
    /// with a provider in that case.
    pub fn read_to<W: Write>(
        &self,
        entry: &FileEntry,
        out: &mut W,
        password: Option<&[u8]>,
        cancel: &CancelFlag,
    ) -> Result<EntrySummary> {
        if !self.is_local_entry(entry) {
            return Err(Error::MultiVolumeUnsupported);
        }

        let view = LocalHeaderView::parse(&self.mmap, u64::from(entry.local_header_offset()))?;
        let start = view.data_offset as usize;
        let end = start
            .checked_add(entry.compressed_size() as usize)
            .filter(|&e| e <= self.mmap.len())
            .ok_or(Error::Format("entry data out of bounds"))?;

        decode_entry(entry, &self.mmap[start..end], out, password, cancel)
    }

    /// Decode an entry whose data may start on an earlier volume.
    ///
    /// The provider is asked for the entry's start volume first, then for
    /// each following volume as the data crosses a boundary.
    pub fn read_spanned_to<W: Write>(
        &self,
        entry: &FileEntry,
        provider: impl VolumeProvider,
        out: &mut W,
        password: Option<&[u8]>,
        cancel: &CancelFlag,
    ) -> Result<EntrySummary> {
        let mut span = SpanReader::open_at(
            provider,
            u32::from(entry.start_disk()),
            u64::from(entry.local_header_offset()),
        )?;

        // The local header must be parsed from the stream; the mapped
        // volume only holds the directory.
        skip_local_header(&mut span)?;
        let bounded = span.take(u64::from(entry.compressed_size()));

        decode_entry(entry, bounded, out, password, cancel)
    }
}

/// Consume a local file header from a forward-only stream, leaving the
/// reader at the first byte of entry data.
fn skip_local_header<R: Read>(src: &mut R) -> Result<()> {
    let mut signature = [0u8; 4];
    src.read_exact(&mut signature)?;
    let signature = u32::from_le_bytes(signature);
    if signature != LocalFileHeader::SIGNATURE {
        return Err(Error::InvalidSignature {
            expected: LocalFileHeader::SIGNATURE,
            actual: signature,
        });
    }

    let header: LocalFileHeader = src.read_struct()?;
    let tail = header.variable_data_size() as u64;

    let skipped = std::io::copy(&mut src.take(tail), &mut std::io::sink())?;
    if skipped != tail {
        return Err(Error::Format("local header tail truncated"));
    }
    Ok(())
}

/// Decode one entry's data stream into `out`.
///
/// `src` must be positioned at the first data byte and bounded to the
/// entry's compressed size (encryption header included). Verifies the
/// password, the uncompressed size and the checksum.
pub(crate) fn decode_entry<R: Read, W: Write>(
    entry: &FileEntry,
    mut src: R,
    out: &mut W,
    password: Option<&[u8]>,
    cancel: &CancelFlag,
) -> Result<EntrySummary> {
    if entry.is_encrypted() {
        let Some(password) = password else {
            return Err(Error::PasswordMismatch);
        };
        let mut header = [0u8; ENCRYPTION_HEADER_LEN];
        src.read_exact(&mut header)?;
        let Some(cipher) = ZipCrypto::verify_header(password, &header, entry.password_check_byte())
        else {
            return Err(Error::PasswordMismatch);
        };
        decode_body(entry, DecryptReader::new(src, cipher), out, cancel)
    } else {
        decode_body(entry, src, out, cancel)
    }
}

fn decode_body<R: Read, W: Write>(
    entry: &FileEntry,
    mut src: R,
    out: &mut W,
    cancel: &CancelFlag,
) -> Result<EntrySummary> {
    let expected_size = u64::from(entry.uncompressed_size());

    let summary = match entry.method() {
        CompressionMethod::Store => copy_stored(&mut src, out, expected_size, cancel)?,
        CompressionMethod::Deflate => {
            let result = inflate(src, out, Some(expected_size), cancel)?;
            EntrySummary {
                bytes_written: result.bytes_written,
                crc32: result.crc32,
            }
        }
    };

    if summary.bytes_written != expected_size {
        return Err(Error::CorruptData(format!(
            "size mismatch in {}: expected {expected_size} bytes, got {}",
            entry.name(),
            summary.bytes_written
        )));
    }
    if summary.crc32 != entry.crc32() {
        return Err(Error::CrcMismatch {
            name: entry.name().to_string(),
            expected: entry.crc32(),
            actual: summary.crc32,
        });
    }
    Ok(summary)
}

/// Copy a stored entry, hashing as it streams.
fn copy_stored<R: Read, W: Write>(
    src: &mut R,
    out: &mut W,
    expected_size: u64,
    cancel: &CancelFlag,
) -> Result<EntrySummary> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut crc = Crc32::new();
    let mut written = 0u64;

    // Bounded by the compressed-size take upstream; the size check in
    // decode_body catches short streams.
    let mut remaining = expected_size;
    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let want = remaining.min(buf.len() as u64) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        crc.update(&buf[..n]);
        out.write_all(&buf[..n])?;
        written += n as u64;
        remaining -= n as u64;
    }

    Ok(EntrySummary {
        bytes_written: written,
        crc32: crc.finalize(),
    })
}
