//! ZIP archive storage engine.
//!
//! Reading, validation, extraction and in-place mutation of ZIP-family
//! archives:
//!
//! - [`ZipArchive`] - memory-mapped read handle over a validated
//!   central directory
//! - [`extract`] - extraction driver with progress, decision and
//!   password sinks
//! - [`mutate`] - entry deletion with atomic swap or in-place rewrite
//!   plus best-effort recovery
//! - [`crypto`] - the legacy per-entry stream cipher
//! - [`spanning`] - multi-volume traversal
//!
//! Stored and DEFLATE entries are supported; the 64-bit directory
//! extension and all other compression methods are rejected explicitly.

pub mod archive;
pub mod crypto;
pub mod directory;
pub mod entry;
mod error;
pub mod extract;
pub mod mutate;
pub mod records;
pub mod spanning;

pub use archive::{EntrySummary, ZipArchive};
pub use directory::{read_directory, Directory};
pub use entry::{FileEntry, LocalHeaderView};
pub use error::{Error, Result};
pub use extract::{
    extract_all, Decision, DecisionSink, ExtractOptions, ExtractReport, FixedDecisions,
    NullProgress, PasswordReply, ProgressSink, Prompt,
};
pub use mutate::{delete_entries, delete_entries_checked, DeleteOptions, DeleteReport};
pub use records::CompressionMethod;
pub use spanning::{
    volume_file_name, FileVolumes, SpanReader, SpanState, VolumeAction, VolumeProvider,
    VolumeSource,
};
