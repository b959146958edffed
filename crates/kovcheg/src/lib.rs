//! Kovcheg - ZIP archive storage engine.
//!
//! This crate provides a unified interface to the Kovcheg library
//! ecosystem for reading, validating, mutating and repackaging ZIP
//! archives.
//!
//! # Crates
//!
//! - [`kovcheg_common`] - Common utilities (binary reading/writing, CRC-32)
//! - [`kovcheg_inflate`] - Hand-written DEFLATE decompressor
//! - [`kovcheg_zip`] - Archive engine (directory, extraction, mutation,
//!   cipher, spanning)
//! - [`kovcheg_sfx`] - Self-extractor header codec and image assembly
//!
//! # Example
//!
//! ```no_run
//! use kovcheg::prelude::*;
//!
//! let archive = ZipArchive::open("bundle.zip")?;
//! for entry in archive.entries() {
//!     println!("{} ({} bytes)", entry.name(), entry.uncompressed_size());
//! }
//!
//! if let Some(entry) = archive.find("readme.txt") {
//!     let data = archive.read(entry, None, &CancelFlag::new())?;
//!     println!("{}", String::from_utf8_lossy(&data));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use kovcheg_common as common;
pub use kovcheg_inflate as inflate;
pub use kovcheg_sfx as sfx;
pub use kovcheg_zip as zip;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use kovcheg_common::{crc, BinaryReader, BinaryWriter, CancelFlag};
    pub use kovcheg_sfx::{SfxBuilder, SfxHeader, TargetDir};
    pub use kovcheg_zip::{
        delete_entries, extract_all, CompressionMethod, DeleteOptions, ExtractOptions, FileEntry,
        ZipArchive,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
