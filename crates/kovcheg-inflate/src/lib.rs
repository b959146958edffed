//! Hand-written DEFLATE decompressor.
//!
//! This crate implements the decompression half of DEFLATE from scratch:
//!
//! - [`BitReader`] - LSB-first bit access over any byte source
//! - [`DecodeTable`] - multi-level canonical Huffman decode tables
//! - [`Inflater`] - the per-block decoder with a 32 KiB sliding window
//!   and a running CRC-32
//!
//! There is deliberately no compressor here; the archive engine copies
//! compressed bytes verbatim and only ever needs to decode.
//!
//! # Example
//!
//! ```no_run
//! use kovcheg_inflate::inflate_to_vec;
//!
//! let compressed: &[u8] = &[0x73, 0x04, 0x00];
//! let data = inflate_to_vec(compressed, Some(1))?;
//! assert_eq!(data, b"A");
//! # Ok::<(), kovcheg_inflate::Error>(())
//! ```

mod bitstream;
mod error;
mod huffman;
mod inflate;

pub use bitstream::BitReader;
pub use error::{Error, Result};
pub use huffman::{Completeness, DecodeTable, MAX_CODE_BITS};
pub use inflate::{inflate, inflate_to_vec, InflateSummary, Inflater};
