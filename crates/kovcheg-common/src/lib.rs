//! Common utilities for Kovcheg.
//!
//! This crate provides foundational types used across all Kovcheg crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`BinaryWriter`] - Little-endian record building
//! - [`crc`] - CRC-32 (IEEE) hashing utilities

mod cancel;
mod error;
mod reader;
mod writer;

pub mod crc;

pub use cancel::CancelFlag;
pub use error::{Error, Result};
pub use reader::{BinaryReader, ReadExt};
pub use writer::BinaryWriter;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Re-export memchr for accelerated byte searching
pub use memchr;
