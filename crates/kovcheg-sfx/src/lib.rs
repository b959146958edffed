//! Self-extractor support.
//!
//! A self-extractor is a host executable with a metadata block and an
//! archive appended after its last loaded section. This crate provides:
//!
//! - [`pe`] - the minimal PE section walk that finds the appended data
//! - [`SfxHeader`] - the offset-addressed metadata block codec
//! - [`SfxBuilder`] / [`read_image`] - assembly and disassembly of
//!   complete images
//!
//! The block layout is byte-compatible with previously produced
//! archives; see [`header`] for the exact format.

pub mod builder;
mod error;
pub mod header;
pub mod pe;

pub use builder::{locate, read_image, SfxBuilder};
pub use error::{Error, Result};
pub use header::{block_len, flags, SfxHeader, TargetDir, SIGNATURE, VERSION};
