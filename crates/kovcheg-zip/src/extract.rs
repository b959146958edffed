//! Extraction driver.
//!
//! Walks the directory in order and decodes each entry to the target
//! root. All interaction goes through caller-supplied sinks: progress is
//! reported as bytes done out of bytes total, conflicts and recoverable
//! failures are resolved by a decision sink, and passwords come from the
//! same sink so an interactive caller can prompt and a batch caller can
//! answer from a list. The driver itself never retries anything.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use kovcheg_common::CancelFlag;

use crate::archive::ZipArchive;
use crate::entry::FileEntry;
use crate::spanning::{is_volume_abort, VolumeProvider};
use crate::{Error, Result};

/// Receives byte-level progress during extraction.
pub trait ProgressSink {
    /// Called after every chunk written; `bytes_total` is the sum of the
    /// uncompressed sizes of all entries selected for extraction.
    fn report_progress(&mut self, bytes_done: u64, bytes_total: u64);
}

/// A progress sink that discards all reports.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report_progress(&mut self, _bytes_done: u64, _bytes_total: u64) {}
}

/// Caller's answer to an interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Try the same step again.
    Retry,
    /// Skip this entry and continue.
    Skip,
    /// Skip this entry and all later entries that hit the same prompt.
    SkipAll,
    /// Replace the existing file.
    Overwrite,
    /// Replace this and all later existing files without asking again.
    OverwriteAll,
    /// Stop the whole operation.
    Cancel,
}

/// What the driver is asking about.
#[derive(Debug)]
pub enum Prompt<'a> {
    /// The output file already exists.
    FileExists { path: &'a Path },
    /// An I/O step failed and may be retried.
    IoFailed { name: &'a str, error: &'a Error },
}

/// Caller's answer to a password request.
pub enum PasswordReply {
    /// Try this password.
    Password(Vec<u8>),
    /// Skip this entry.
    Skip,
    /// Skip this and every later encrypted entry.
    SkipAllEncrypted,
    /// Stop the whole operation.
    Cancel,
}

/// Resolves conflicts, failures and password requests.
pub trait DecisionSink {
    /// Resolve a non-password prompt.
    fn resolve(&mut self, prompt: Prompt<'_>) -> Decision;

    /// Supply a password for `entry_name`. `first_attempt` is false when
    /// a previous candidate was rejected for this entry.
    fn request_password(&mut self, entry_name: &str, first_attempt: bool) -> PasswordReply;
}

/// A decision sink for non-interactive callers: a fixed password (or
/// none) and a fixed overwrite policy, never retrying.
pub struct FixedDecisions {
    /// Password tried once per encrypted entry.
    pub password: Option<Vec<u8>>,
    /// Whether existing files are replaced.
    pub overwrite: bool,
}

impl DecisionSink for FixedDecisions {
    fn resolve(&mut self, prompt: Prompt<'_>) -> Decision {
        match prompt {
            Prompt::FileExists { .. } => {
                if self.overwrite {
                    Decision::OverwriteAll
                } else {
                    Decision::SkipAll
                }
            }
            Prompt::IoFailed { .. } => Decision::Skip,
        }
    }

    fn request_password(&mut self, _entry_name: &str, first_attempt: bool) -> PasswordReply {
        match (&self.password, first_attempt) {
            (Some(password), true) => PasswordReply::Password(password.clone()),
            _ => PasswordReply::Skip,
        }
    }
}

/// Extraction tuning.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Keep going past per-entry corruption (checksum mismatches).
    pub continue_on_error: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
        }
    }
}

/// What happened, per entry category.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Entries written successfully.
    pub extracted: usize,
    /// Entries skipped by decision or policy.
    pub skipped: usize,
    /// Entries that failed, with the failure text.
    pub failed: Vec<(String, String)>,
}

/// Extract every entry of `archive` under `dest_root`.
///
/// A spanned archive needs `provider` to supply earlier volumes; passing
/// `None` makes entries on other volumes fail with
/// [`Error::MultiVolumeUnsupported`] (subject to the decision sink).
pub fn extract_all(
    archive: &ZipArchive,
    dest_root: &Path,
    decisions: &mut dyn DecisionSink,
    progress: &mut dyn ProgressSink,
    mut provider: Option<&mut (dyn VolumeProvider + '_)>,
    options: &ExtractOptions,
    cancel: &CancelFlag,
) -> Result<ExtractReport> {
    let bytes_total: u64 = archive
        .entries()
        .iter()
        .map(|e| u64::from(e.uncompressed_size()))
        .sum();

    let mut report = ExtractReport::default();
    let mut bytes_done = 0u64;
    let mut overwrite_all = false;
    let mut skip_all_existing = false;
    let mut skip_all_encrypted = false;
    let mut session_password: Option<Vec<u8>> = None;

    for entry in archive.entries() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(relative) = entry.output_path() else {
            // Unsafe name (absolute or escaping); never write it.
            report.skipped += 1;
            continue;
        };
        let target = dest_root.join(relative);

        if entry.is_dir() {
            if !ensure_dir(&target, entry.name(), decisions)? {
                report.skipped += 1;
            }
            continue;
        }

        if entry.is_encrypted() && skip_all_encrypted {
            report.skipped += 1;
            bytes_done += u64::from(entry.uncompressed_size());
            progress.report_progress(bytes_done, bytes_total);
            continue;
        }

        if target.exists() && !overwrite_all {
            if skip_all_existing {
                report.skipped += 1;
                bytes_done += u64::from(entry.uncompressed_size());
                progress.report_progress(bytes_done, bytes_total);
                continue;
            }
            match decisions.resolve(Prompt::FileExists { path: &target }) {
                Decision::Overwrite => {}
                Decision::OverwriteAll => overwrite_all = true,
                Decision::Skip | Decision::Retry => {
                    report.skipped += 1;
                    bytes_done += u64::from(entry.uncompressed_size());
                    progress.report_progress(bytes_done, bytes_total);
                    continue;
                }
                Decision::SkipAll => {
                    skip_all_existing = true;
                    report.skipped += 1;
                    bytes_done += u64::from(entry.uncompressed_size());
                    progress.report_progress(bytes_done, bytes_total);
                    continue;
                }
                Decision::Cancel => return Err(Error::Cancelled),
            }
        }

        let outcome = extract_one(
            archive,
            entry,
            &target,
            decisions,
            progress,
            provider.as_deref_mut(),
            &mut session_password,
            &mut skip_all_encrypted,
            bytes_done,
            bytes_total,
            cancel,
        );

        bytes_done += u64::from(entry.uncompressed_size());
        progress.report_progress(bytes_done, bytes_total);

        match outcome {
            Ok(true) => report.extracted += 1,
            Ok(false) => report.skipped += 1,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err @ (Error::CrcMismatch { .. } | Error::CorruptData(_)))
                if options.continue_on_error =>
            {
                report.failed.push((entry.name().to_string(), err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}

/// Decode one entry to `target`. `Ok(true)` means written, `Ok(false)`
/// means skipped by a decision.
#[allow(clippy::too_many_arguments)]
fn extract_one(
    archive: &ZipArchive,
    entry: &FileEntry,
    target: &Path,
    decisions: &mut dyn DecisionSink,
    progress: &mut dyn ProgressSink,
    mut provider: Option<&mut (dyn VolumeProvider + '_)>,
    session_password: &mut Option<Vec<u8>>,
    skip_all_encrypted: &mut bool,
    bytes_done: u64,
    bytes_total: u64,
    cancel: &CancelFlag,
) -> Result<bool> {
    // The password loop: reuse the session password first, then ask the
    // sink for replacements until one verifies or the user gives up.
    let mut first_attempt = true;
    loop {
        let password = if entry.is_encrypted() {
            match session_password.clone() {
                Some(p) if first_attempt => Some(p),
                _ => match decisions.request_password(entry.name(), first_attempt) {
                    PasswordReply::Password(p) => Some(p),
                    PasswordReply::Skip => return Ok(false),
                    PasswordReply::SkipAllEncrypted => {
                        *skip_all_encrypted = true;
                        return Ok(false);
                    }
                    PasswordReply::Cancel => return Err(Error::Cancelled),
                },
            }
        } else {
            None
        };

        match write_target(
            archive,
            entry,
            target,
            password.as_deref(),
            provider.as_deref_mut(),
            progress,
            bytes_done,
            bytes_total,
            cancel,
        ) {
            Ok(()) => {
                if entry.is_encrypted() {
                    *session_password = password;
                }
                return Ok(true);
            }
            Err(Error::PasswordMismatch) => {
                *session_password = None;
                first_attempt = false;
                continue;
            }
            Err(err @ Error::Io(_)) => {
                match decisions.resolve(Prompt::IoFailed {
                    name: entry.name(),
                    error: &err,
                }) {
                    Decision::Retry => continue,
                    Decision::Skip | Decision::SkipAll => return Ok(false),
                    Decision::Cancel => return Err(Error::Cancelled),
                    Decision::Overwrite | Decision::OverwriteAll => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Create a directory path, resolving failures through the decision
/// sink. `Ok(true)` means the directory exists, `Ok(false)` skipped.
fn ensure_dir(target: &Path, name: &str, decisions: &mut dyn DecisionSink) -> Result<bool> {
    loop {
        match fs::create_dir_all(target) {
            Ok(()) => return Ok(true),
            Err(io_err) => {
                let err = Error::Io(io_err);
                match decisions.resolve(Prompt::IoFailed { name, error: &err }) {
                    Decision::Retry => continue,
                    Decision::Skip | Decision::SkipAll => return Ok(false),
                    Decision::Cancel => return Err(Error::Cancelled),
                    Decision::Overwrite | Decision::OverwriteAll => return Err(err),
                }
            }
        }
    }
}

/// Write one decode attempt to disk, removing the partial file when the
/// decode fails before completion.
#[allow(clippy::too_many_arguments)]
fn write_target(
    archive: &ZipArchive,
    entry: &FileEntry,
    target: &Path,
    password: Option<&[u8]>,
    provider: Option<&mut (dyn VolumeProvider + '_)>,
    progress: &mut dyn ProgressSink,
    bytes_done: u64,
    bytes_total: u64,
    cancel: &CancelFlag,
) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(target)?;
    let mut out = ProgressWriter {
        inner: file,
        progress,
        bytes_done,
        bytes_total,
    };

    let result = if archive.is_local_entry(entry) {
        archive.read_to(entry, &mut out, password, cancel).map(|_| ())
    } else {
        match provider {
            Some(p) => archive
                .read_spanned_to(entry, p, &mut out, password, cancel)
                .map(|_| ()),
            None => Err(Error::MultiVolumeUnsupported),
        }
    };

    match result {
        Ok(()) => {
            out.inner.flush()?;
            Ok(())
        }
        // A checksum mismatch leaves the written bytes in place for
        // inspection; everything else removes the partial file.
        Err(err @ Error::CrcMismatch { .. }) => Err(err),
        Err(err) => {
            drop(out);
            let _ = fs::remove_file(target);
            // An aborted volume request is a user decision, not a fault.
            if let Error::Io(ref io_err) = err {
                if is_volume_abort(io_err) {
                    return Err(Error::Cancelled);
                }
            }
            Err(err)
        }
    }
}

/// Forwards writes while reporting cumulative progress.
struct ProgressWriter<'a> {
    inner: File,
    progress: &'a mut dyn ProgressSink,
    bytes_done: u64,
    bytes_total: u64,
}

impl Write for ProgressWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_done += n as u64;
        self.progress.report_progress(self.bytes_done, self.bytes_total);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Resolve an output path for a single named entry.
///
/// Convenience used by callers extracting one entry at a time.
pub fn single_target(dest_root: &Path, entry: &FileEntry) -> Option<PathBuf> {
    entry.output_path().map(|p| dest_root.join(p))
}
