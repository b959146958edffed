//! DEFLATE block decoder.
//!
//! Consumes a bit stream block by block (stored / fixed Huffman / dynamic
//! Huffman), producing the decompressed bytes plus a running CRC-32. All
//! length and distance values come from the format's fixed base/extra-bit
//! constant tables; back-references copy out of a 32 KiB sliding window
//! that is flushed to the output sink each time it fills.

use std::io::{Read, Write};

use kovcheg_common::crc::Crc32;
use kovcheg_common::CancelFlag;

use crate::bitstream::BitReader;
use crate::huffman::{Completeness, DecodeTable};
use crate::{Error, Result};

/// Sliding window size mandated by the format.
const WINDOW_SIZE: usize = 32 * 1024;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Number of literal/length codes in the fixed table.
const NUM_LITLEN_SYMS: usize = 288;
/// Number of distance codes in the fixed table.
const NUM_DIST_SYMS: usize = 30;
/// Number of code-length (precode) symbols.
const NUM_PRECODE_SYMS: usize = 19;

/// Root lookup widths, balancing lookup bit-width against build cost.
const LITLEN_ROOT_BITS: u32 = 9;
const DIST_ROOT_BITS: u32 = 6;
const PRECODE_ROOT_BITS: u32 = 7;

/// Length bases for symbols 257..=285.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for symbols 257..=285.
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance bases for symbols 0..=29.
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance symbols 0..=29.
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of the code-length code lengths.
const PRECODE_ORDER: [usize; NUM_PRECODE_SYMS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Result of a completed decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflateSummary {
    /// Total decompressed bytes written to the sink.
    pub bytes_written: u64,
    /// CRC-32 of the decompressed bytes.
    pub crc32: u32,
}

/// A DEFLATE decompression session over an arbitrary byte source.
pub struct Inflater<R> {
    bits: BitReader<R>,
    window: Box<[u8]>,
    wpos: usize,
    total_out: u64,
    crc: Crc32,
    limit: Option<u64>,
    // Built on first fixed-Huffman block, reused for the whole session.
    fixed: Option<(DecodeTable, DecodeTable)>,
}

impl<R: Read> Inflater<R> {
    /// Start a session reading compressed bytes from `input`.
    pub fn new(input: R) -> Self {
        Self {
            bits: BitReader::new(input),
            window: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            wpos: 0,
            total_out: 0,
            crc: Crc32::new(),
            limit: None,
            fixed: None,
        }
    }

    /// Decompress the whole stream into `out`.
    ///
    /// When `expected_size` is given, producing more or fewer bytes is
    /// reported as corruption. Cancellation is polled at each block
    /// boundary.
    pub fn run<W: Write>(
        &mut self,
        out: &mut W,
        expected_size: Option<u64>,
        cancel: &CancelFlag,
    ) -> Result<InflateSummary> {
        self.limit = expected_size;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let is_final = self.bits.bits(1)? == 1;
            let block_type = self.bits.bits(2)?;

            match block_type {
                0 => self.stored_block(out)?,
                1 => {
                    let tables = match self.fixed.take() {
                        Some(t) => t,
                        None => fixed_tables()?,
                    };
                    let result = self.huffman_block(&tables.0, &tables.1, out);
                    self.fixed = Some(tables);
                    result?;
                }
                2 => {
                    let (litlen, dist) = self.dynamic_tables()?;
                    self.huffman_block(&litlen, &dist, out)?;
                }
                _ => return Err(Error::Corrupt("reserved block type")),
            }

            if is_final {
                break;
            }
        }

        // Flush whatever is still sitting in the window.
        out.write_all(&self.window[..self.wpos])?;
        self.crc.update(&self.window[..self.wpos]);
        self.wpos = 0;

        if let Some(expected) = self.limit {
            if self.total_out != expected {
                return Err(Error::Corrupt("decompressed size mismatch"));
            }
        }

        Ok(InflateSummary {
            bytes_written: self.total_out,
            crc32: self.crc.value(),
        })
    }

    /// Consume the session, returning the underlying byte source.
    pub fn into_inner(self) -> R {
        self.bits.into_inner()
    }

    #[inline]
    fn push_byte<W: Write>(&mut self, byte: u8, out: &mut W) -> Result<()> {
        if let Some(limit) = self.limit {
            if self.total_out >= limit {
                return Err(Error::Corrupt("output exceeds declared size"));
            }
        }
        self.window[self.wpos] = byte;
        self.wpos += 1;
        self.total_out += 1;
        if self.wpos == WINDOW_SIZE {
            out.write_all(&self.window)?;
            self.crc.update(&self.window);
            self.wpos = 0;
        }
        Ok(())
    }

    /// Type 0: byte-aligned raw copy with a one's-complement length check.
    fn stored_block<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.bits.align_to_byte();

        let mut header = [0u8; 4];
        self.bits.read_aligned(&mut header)?;
        let len = u16::from_le_bytes([header[0], header[1]]);
        let nlen = u16::from_le_bytes([header[2], header[3]]);
        if len != !nlen {
            return Err(Error::Corrupt("stored block length check failed"));
        }

        let mut remaining = len as usize;
        let mut chunk = [0u8; 512];
        while remaining > 0 {
            let take = remaining.min(chunk.len());
            self.bits.read_aligned(&mut chunk[..take])?;
            for &b in &chunk[..take] {
                self.push_byte(b, out)?;
            }
            remaining -= take;
        }
        Ok(())
    }

    /// Decode literal/length/distance symbols until end-of-block.
    fn huffman_block<W: Write>(
        &mut self,
        litlen: &DecodeTable,
        dist: &DecodeTable,
        out: &mut W,
    ) -> Result<()> {
        loop {
            let sym = litlen.decode(&mut self.bits)?;

            if sym < 256 {
                self.push_byte(sym as u8, out)?;
                continue;
            }
            if sym == 256 {
                return Ok(());
            }
            if sym > 285 {
                return Err(Error::Corrupt("invalid length symbol"));
            }

            let idx = (sym - 257) as usize;
            let length =
                LENGTH_BASE[idx] as usize + self.bits.bits(LENGTH_EXTRA[idx] as u32)? as usize;

            let dsym = dist.decode(&mut self.bits)? as usize;
            if dsym >= NUM_DIST_SYMS {
                return Err(Error::Corrupt("invalid distance symbol"));
            }
            let distance =
                DIST_BASE[dsym] as usize + self.bits.bits(DIST_EXTRA[dsym] as u32)? as usize;

            if distance as u64 > self.total_out {
                return Err(Error::Corrupt("distance too far back"));
            }

            for _ in 0..length {
                let byte = self.window[(self.wpos + WINDOW_SIZE - distance) & WINDOW_MASK];
                self.push_byte(byte, out)?;
            }
        }
    }

    /// Type 2: read the 5+5+4-bit header, decode the code-length alphabet
    /// and build the two working tables.
    fn dynamic_tables(&mut self) -> Result<(DecodeTable, DecodeTable)> {
        let hlit = self.bits.bits(5)? as usize + 257;
        let hdist = self.bits.bits(5)? as usize + 1;
        let hclen = self.bits.bits(4)? as usize + 4;
        if hlit > 286 || hdist > NUM_DIST_SYMS {
            return Err(Error::Corrupt("code count exceeds format maximum"));
        }

        let mut precode_lens = [0u8; NUM_PRECODE_SYMS];
        for &slot in PRECODE_ORDER.iter().take(hclen) {
            precode_lens[slot] = self.bits.bits(3)? as u8;
        }
        let (precode, completeness) = DecodeTable::build(&precode_lens, PRECODE_ROOT_BITS)?;
        if completeness == Completeness::Incomplete {
            return Err(Error::Corrupt("incomplete code-length code"));
        }

        let total = hlit + hdist;
        let mut lens = [0u8; 286 + NUM_DIST_SYMS];
        let mut filled = 0usize;
        while filled < total {
            let sym = precode.decode(&mut self.bits)?;
            match sym {
                0..=15 => {
                    lens[filled] = sym as u8;
                    filled += 1;
                }
                16 => {
                    if filled == 0 {
                        return Err(Error::Corrupt("length repeat with no previous length"));
                    }
                    let prev = lens[filled - 1];
                    let run = 3 + self.bits.bits(2)? as usize;
                    if filled + run > total {
                        return Err(Error::Corrupt("length repeat overruns alphabet"));
                    }
                    lens[filled..filled + run].fill(prev);
                    filled += run;
                }
                17 => {
                    let run = 3 + self.bits.bits(3)? as usize;
                    if filled + run > total {
                        return Err(Error::Corrupt("length repeat overruns alphabet"));
                    }
                    filled += run; // lens already zeroed
                }
                18 => {
                    let run = 11 + self.bits.bits(7)? as usize;
                    if filled + run > total {
                        return Err(Error::Corrupt("length repeat overruns alphabet"));
                    }
                    filled += run;
                }
                _ => return Err(Error::Corrupt("invalid code-length symbol")),
            }
        }

        if lens[256] == 0 {
            return Err(Error::Corrupt("missing end-of-block code"));
        }

        let (litlen, litlen_completeness) = DecodeTable::build(&lens[..hlit], LITLEN_ROOT_BITS)?;
        if litlen_completeness == Completeness::Incomplete {
            return Err(Error::Corrupt("incomplete literal/length code"));
        }
        // Incomplete distance codes are legitimate (single-distance blocks).
        let (dist, _) = DecodeTable::build(&lens[hlit..total], DIST_ROOT_BITS)?;

        Ok((litlen, dist))
    }
}

/// Build the fixed literal/length and distance tables.
///
/// 288 literal/length codes with the compile-time-known lengths, plus 30
/// five-bit distance codes (an intentionally incomplete code).
fn fixed_tables() -> Result<(DecodeTable, DecodeTable)> {
    let mut litlen_lens = [0u8; NUM_LITLEN_SYMS];
    litlen_lens[..144].fill(8);
    litlen_lens[144..256].fill(9);
    litlen_lens[256..280].fill(7);
    litlen_lens[280..].fill(8);
    let (litlen, _) = DecodeTable::build(&litlen_lens, LITLEN_ROOT_BITS)?;

    let dist_lens = [5u8; NUM_DIST_SYMS];
    let (dist, _) = DecodeTable::build(&dist_lens, DIST_ROOT_BITS)?;

    Ok((litlen, dist))
}

/// Decompress a complete DEFLATE stream from `input` into `output`.
pub fn inflate<R: Read, W: Write>(
    input: R,
    output: &mut W,
    expected_size: Option<u64>,
    cancel: &CancelFlag,
) -> Result<InflateSummary> {
    Inflater::new(input).run(output, expected_size, cancel)
}

/// Decompress an in-memory DEFLATE stream to a new buffer.
pub fn inflate_to_vec(data: &[u8], expected_size: Option<u64>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.unwrap_or(0) as usize);
    inflate(data, &mut out, expected_size, &CancelFlag::new())?;
    Ok(out)
}
