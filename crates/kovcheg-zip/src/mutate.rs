//! Archive mutation: entry deletion and directory rewrite.
//!
//! Deletion never re-compresses anything. The retained entries' raw byte
//! ranges are stream-copied into the rewrite target with their offsets
//! corrected, a replacement directory is appended, and the result is
//! committed either by truncating the in-place file or by renaming a
//! temporary file over the original.
//!
//! In-place mode carries real partial-failure risk: the original is
//! being overwritten as the copy proceeds. A failure mid-rewrite runs a
//! best-effort recovery pass that writes a directory covering the
//! entries already copied, so the file stays directory-consistent even
//! though the deleted set may then differ from what was asked for.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use kovcheg_common::{BinaryWriter, CancelFlag};

use crate::directory::{read_directory, Directory};
use crate::entry::{FileEntry, LocalHeaderView};
use crate::records::{
    CentralDirectoryHeader, EocdRecord, LocalFileHeader, DESCRIPTOR_SIGNATURE, DESCRIPTOR_SIZE,
};
use crate::{Error, Result};

/// Copy chunk for raw range transfers.
const COPY_CHUNK: usize = 64 * 1024;

/// Deletion policy knobs.
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Rewrite into a temporary file and rename it over the original.
    /// When false the archive is rewritten in place, which is faster and
    /// needs no extra disk space but risks the recovery path on failure.
    pub use_backup: bool,
    /// When every remaining entry would vanish from the name root,
    /// synthesize a zero-length directory entry so the root stays
    /// visible to listers.
    pub preserve_empty_root: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            use_backup: true,
            preserve_empty_root: false,
        }
    }
}

/// Outcome of a deletion.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Names that matched and were removed.
    pub deleted: Vec<String>,
    /// Requested names that matched no entry. Reportable, not fatal.
    pub unmatched: Vec<String>,
}

/// Delete the named entries from the archive at `path`.
///
/// Name matching is case-insensitive and separator-tolerant. Unmatched
/// names are reported in the result rather than failing the operation;
/// a request where nothing matches leaves the archive untouched.
pub fn delete_entries(
    path: &Path,
    names: &[&str],
    options: &DeleteOptions,
    cancel: &CancelFlag,
) -> Result<DeleteReport> {
    // Hold the whole directory in memory for the duration; in-place mode
    // overwrites the file the directory was read from.
    let directory = {
        let file = File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        read_directory(&mmap, false)?
    };

    let mut report = DeleteReport::default();
    let mut doomed: Vec<usize> = Vec::new();
    for name in names {
        match directory.entries.iter().position(|e| e.matches_name(name)) {
            Some(index) => {
                if !doomed.contains(&index) {
                    doomed.push(index);
                    report.deleted.push(directory.entries[index].name().to_string());
                }
            }
            None => report.unmatched.push((*name).to_string()),
        }
    }

    if doomed.is_empty() {
        return Ok(report);
    }

    // Copy order follows the file layout, not the request order.
    doomed.sort_by_key(|&i| directory.entries[i].local_header_offset());

    let plan = RewritePlan::build(path, &directory, &doomed, options)?;

    if options.use_backup {
        commit_with_backup(path, &plan, cancel)?;
    } else {
        commit_in_place(path, &plan, cancel)?;
    }

    Ok(report)
}

/// One retained entry's raw source range and its offset in the output.
#[derive(Debug, Clone)]
struct RetainedEntry {
    entry: FileEntry,
    /// Start of the local header in the source file.
    src_offset: u64,
    /// Total raw bytes (local header + data + trailing descriptor).
    raw_len: u64,
    /// Local header offset in the rewritten file.
    new_offset: u64,
}

/// Everything needed to produce the new archive.
struct RewritePlan {
    retained: Vec<RetainedEntry>,
    /// Archive comment carried over verbatim.
    comment: Vec<u8>,
    /// Synthesized empty-root entry, when requested and applicable.
    synthetic_root: Option<FileEntry>,
}

impl RewritePlan {
    fn build(
        path: &Path,
        directory: &Directory,
        doomed: &[usize],
        options: &DeleteOptions,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        let mut retained = Vec::new();
        retained
            .try_reserve(directory.entries.len().saturating_sub(doomed.len()))
            .map_err(|_| Error::LowMemory)?;

        let mut new_offset = 0u64;
        for (index, entry) in directory.entries.iter().enumerate() {
            if doomed.contains(&index) {
                continue;
            }
            let src_offset = u64::from(entry.local_header_offset());
            let raw_len = raw_entry_len(&mmap, entry)?;
            retained.push(RetainedEntry {
                entry: entry.clone(),
                src_offset,
                raw_len,
                new_offset,
            });
            new_offset += raw_len;
        }

        let synthetic_root = if options.preserve_empty_root {
            synthesize_root(directory, &retained)
        } else {
            None
        };

        Ok(Self {
            retained,
            comment: directory.comment.clone(),
            synthetic_root,
        })
    }
}

/// Measure an entry's full raw footprint in the source file.
///
/// The directory's compressed size excludes the local header and any
/// trailing descriptor, so both are measured here. Descriptors may or
/// may not carry their optional signature; the variant present in the
/// file is preserved byte-for-byte.
fn raw_entry_len(data: &[u8], entry: &FileEntry) -> Result<u64> {
    let view = LocalHeaderView::parse(data, u64::from(entry.local_header_offset()))?;
    let header_len = view.data_offset - u64::from(entry.local_header_offset());
    let mut len = header_len + u64::from(entry.compressed_size());

    if entry.has_trailing_descriptor() {
        let after = view.data_offset + u64::from(entry.compressed_size());
        let after = after as usize;
        if after + 4 <= data.len() {
            let word = u32::from_le_bytes([
                data[after],
                data[after + 1],
                data[after + 2],
                data[after + 3],
            ]);
            len += if word == DESCRIPTOR_SIGNATURE {
                4 + DESCRIPTOR_SIZE as u64
            } else {
                DESCRIPTOR_SIZE as u64
            };
        }
    }
    Ok(len)
}

/// Build the zero-length root directory entry when the retained set no
/// longer mentions the original root.
fn synthesize_root(directory: &Directory, retained: &[RetainedEntry]) -> Option<FileEntry> {
    // The root is the first path segment shared by the deleted archive's
    // entries. If any retained entry still lives under it, nothing to do.
    let first = directory.entries.first()?;
    let name = first.name().replace('\\', "/");
    let root = name.split('/').next()?.to_string();
    if root.is_empty() {
        return None;
    }

    let still_used = retained.iter().any(|r| {
        r.entry
            .name()
            .replace('\\', "/")
            .split('/')
            .next()
            .is_some_and(|seg| seg.eq_ignore_ascii_case(&root))
    });
    if still_used {
        return None;
    }

    let raw = format!("{root}/").into_bytes();
    Some(FileEntry::new(
        raw,
        first.dos_datetime(),
        0,
        0,
        0,
        crate::records::CompressionMethod::Store,
        0,
        0,
        0x10, // FILE_ATTRIBUTE_DIRECTORY
        0,
        0,
        Vec::new(),
        Vec::new(),
    ))
}

/// Rewrite through a temporary file and rename it over the original.
fn commit_with_backup(path: &Path, plan: &RewritePlan, cancel: &CancelFlag) -> Result<()> {
    let mut src = File::open(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

    let mut completed = 0;
    rewrite(&mut src, tmp.as_file_mut(), plan, cancel, &mut completed)?;
    tmp.as_file_mut().flush()?;

    // Atomic on the platforms this targets; the original survives any
    // failure before this point.
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Rewrite the archive within its own file, truncating at the end.
///
/// The file is opened twice so the read cursor and the write cursor move
/// independently. Copies only move data toward lower offsets, so a read
/// never lands on a region the writer has already replaced.
fn commit_in_place(path: &Path, plan: &RewritePlan, cancel: &CancelFlag) -> Result<()> {
    let mut src = File::open(path)?;
    let mut dst = OpenOptions::new().write(true).open(path)?;

    let mut completed = 0;
    match rewrite(&mut src, &mut dst, plan, cancel, &mut completed) {
        Ok(end) => {
            dst.flush()?;
            dst.set_len(end)?;
            Ok(())
        }
        Err(err) => {
            // No original to fall back to. Recover to a directory that
            // covers whatever was fully copied before the failure, then
            // truncate so the stale end record cannot shadow it.
            if let Ok(end) = recover_in_place(&mut dst, plan, completed) {
                let _ = dst.set_len(end);
            }
            Err(err)
        }
    }
}

/// Stream the retained ranges and the new directory into `dst`.
///
/// Returns the final length of the rewritten archive. `completed` counts
/// fully copied entries so the in-place recovery pass knows exactly how
/// far the rewrite got.
fn rewrite<R, W>(
    src: &mut R,
    dst: &mut W,
    plan: &RewritePlan,
    cancel: &CancelFlag,
    completed: &mut usize,
) -> Result<u64>
where
    R: Read + Seek,
    W: Write + Seek,
{
    dst.seek(SeekFrom::Start(0))?;
    for retained in &plan.retained {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        copy_range(src, dst, retained.src_offset, retained.raw_len)?;
        *completed += 1;
    }

    let dir_offset = plan
        .retained
        .last()
        .map(|r| r.new_offset + r.raw_len)
        .unwrap_or(0);

    let mut end = dir_offset;
    end += write_directory(dst, plan, &plan.retained, dir_offset)?;
    Ok(end)
}

/// Copy `len` bytes from `offset` in `src` to the current position of
/// `dst`.
fn copy_range<R, W>(src: &mut R, dst: &mut W, offset: u64, len: u64) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    src.seek(SeekFrom::Start(offset))?;
    let mut remaining = len;
    let mut buf = [0u8; COPY_CHUNK];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        src.read_exact(&mut buf[..want])?;
        dst.write_all(&buf[..want])?;
        remaining -= want as u64;
    }
    Ok(())
}

/// Serialize the replacement central directory and end record.
///
/// Returns the number of bytes written (directory + end record). Offsets
/// in the written headers come from each retained entry's new position.
fn write_directory<W: Write>(
    dst: &mut W,
    plan: &RewritePlan,
    retained: &[RetainedEntry],
    dir_offset: u64,
) -> Result<u64> {
    let mut w = BinaryWriter::new();

    let mut count = 0u16;
    let mut synthetic_local = Vec::new();

    // A synthesized root still needs a local header; it is appended
    // before the directory, so account for it first.
    let mut dir_offset = dir_offset;
    if let Some(root) = &plan.synthetic_root {
        let mut lw = BinaryWriter::new();
        lw.write_u32(LocalFileHeader::SIGNATURE);
        lw.write_u16(20); // version needed
        lw.write_u16(root.flags());
        lw.write_u16(root.method() as u16);
        lw.write_u32(root.dos_datetime());
        lw.write_u32(root.crc32());
        lw.write_u32(root.compressed_size());
        lw.write_u32(root.uncompressed_size());
        lw.write_u16(root.raw_name().len() as u16);
        lw.write_u16(0);
        lw.write_bytes(root.raw_name());
        synthetic_local = lw.into_bytes();
    }

    let synthetic_offset = dir_offset;
    dir_offset += synthetic_local.len() as u64;

    for retained in retained {
        write_central_header(&mut w, &retained.entry, retained.new_offset as u32);
        count += 1;
    }
    if let Some(root) = &plan.synthetic_root {
        write_central_header(&mut w, root, synthetic_offset as u32);
        count += 1;
    }

    let dir_size = w.position() as u32;

    w.write_u32(EocdRecord::SIGNATURE);
    w.write_u16(0); // this disk
    w.write_u16(0); // directory start disk
    w.write_u16(count);
    w.write_u16(count);
    w.write_u32(dir_size);
    w.write_u32(dir_offset as u32);
    w.write_u16(plan.comment.len() as u16);
    w.write_bytes(&plan.comment);

    dst.write_all(&synthetic_local)?;
    dst.write_all(w.as_bytes())?;
    Ok(synthetic_local.len() as u64 + w.position() as u64)
}

fn write_central_header(w: &mut BinaryWriter, entry: &FileEntry, local_offset: u32) {
    w.write_u32(CentralDirectoryHeader::SIGNATURE);
    w.write_u16(20); // version made by
    w.write_u16(20); // version needed
    w.write_u16(entry.flags());
    w.write_u16(entry.method() as u16);
    w.write_u32(entry.dos_datetime());
    w.write_u32(entry.crc32());
    w.write_u32(entry.compressed_size());
    w.write_u32(entry.uncompressed_size());
    w.write_u16(entry.raw_name().len() as u16);
    w.write_u16(entry.extra().len() as u16);
    w.write_u16(entry.comment().len() as u16);
    w.write_u16(0); // start disk
    w.write_u16(entry.internal_attrs());
    w.write_u32(entry.external_attrs());
    w.write_u32(local_offset);
    w.write_bytes(entry.raw_name());
    w.write_bytes(entry.extra());
    w.write_bytes(entry.comment());
}

/// Best-effort recovery after an in-place rewrite failure.
///
/// The copy runs front to back, so the first `completed` retained
/// entries are intact at their new offsets. Writes a directory covering
/// exactly those entries; the archive ends up structurally valid even
/// though it holds fewer entries than the rewrite intended.
fn recover_in_place<W>(dst: &mut W, plan: &RewritePlan, completed: usize) -> Result<u64>
where
    W: Write + Seek,
{
    let intact = &plan.retained[..completed.min(plan.retained.len())];

    let dir_offset = intact
        .last()
        .map(|r| r.new_offset + r.raw_len)
        .unwrap_or(0);

    dst.seek(SeekFrom::Start(dir_offset))?;
    let recovery_plan = RewritePlan {
        retained: Vec::new(),
        comment: plan.comment.clone(),
        synthetic_root: None,
    };
    let written = write_directory(dst, &recovery_plan, intact, dir_offset)?;
    dst.flush()?;
    Ok(dir_offset + written)
}

/// Convenience wrapper that also reopens and revalidates the result.
pub fn delete_entries_checked(
    path: &Path,
    names: &[&str],
    options: &DeleteOptions,
    cancel: &CancelFlag,
) -> Result<DeleteReport> {
    let report = delete_entries(path, names, options, cancel)?;
    if !report.deleted.is_empty() {
        let file = File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        match read_directory(&mmap, false) {
            Ok(_) | Err(Error::EmptyArchive) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}
