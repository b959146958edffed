//! LSB-first bit reader over a byte stream.
//!
//! DEFLATE packs Huffman codes starting at the least significant bit of
//! each byte. [`BitReader`] buffers the underlying source and exposes the
//! small peek/consume interface the decoder needs. Running past the end of
//! the source is reported as a truncated stream, never an out-of-bounds
//! read.

use std::io::Read;

use crate::{Error, Result};

const BUF_SIZE: usize = 4096;

/// An LSB-first bit accumulator over any `Read` source.
///
/// The source may be a plain slice, a decrypting reader, or a volume-span
/// reader; the bit reader does not care where its bytes come from.
pub struct BitReader<R> {
    inner: R,
    buf: Box<[u8; BUF_SIZE]>,
    buf_pos: usize,
    buf_len: usize,
    bitbuf: u32,
    bitcount: u32,
    eof: bool,
}

impl<R: Read> BitReader<R> {
    /// Wrap a byte source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Box::new([0u8; BUF_SIZE]),
            buf_pos: 0,
            buf_len: 0,
            bitbuf: 0,
            bitcount: 0,
            eof: false,
        }
    }

    /// Consume the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.buf_pos == self.buf_len {
            if self.eof {
                return Ok(None);
            }
            let n = self.inner.read(&mut self.buf[..])?;
            if n == 0 {
                self.eof = true;
                return Ok(None);
            }
            self.buf_pos = 0;
            self.buf_len = n;
        }
        let b = self.buf[self.buf_pos];
        self.buf_pos += 1;
        Ok(Some(b))
    }

    /// Make up to `count` bits visible and return `(bits, available)`.
    ///
    /// `available` may be less than `count` near the end of the stream;
    /// bits beyond `available` read as zero. Nothing is consumed.
    pub fn peek_at_most(&mut self, count: u32) -> Result<(u32, u32)> {
        debug_assert!(count <= 24);
        while self.bitcount < count {
            match self.next_byte()? {
                Some(b) => {
                    self.bitbuf |= (b as u32) << self.bitcount;
                    self.bitcount += 8;
                }
                None => break,
            }
        }
        Ok((self.bitbuf, self.bitcount))
    }

    /// Discard `count` bits. Caller must have peeked at least that many.
    #[inline]
    pub fn consume(&mut self, count: u32) {
        debug_assert!(count <= self.bitcount);
        self.bitbuf >>= count;
        self.bitcount -= count;
    }

    /// Read exactly `count` bits, failing on a truncated stream.
    pub fn bits(&mut self, count: u32) -> Result<u32> {
        let (bits, available) = self.peek_at_most(count)?;
        if available < count {
            return Err(Error::Corrupt("bitstream truncated"));
        }
        let value = bits & ((1u32 << count) - 1);
        self.consume(count);
        Ok(value)
    }

    /// Drop any partial byte so the next read is byte-aligned.
    ///
    /// Used at the start of a stored block.
    pub fn align_to_byte(&mut self) {
        let partial = self.bitcount % 8;
        self.consume(partial);
    }

    /// Read whole bytes after alignment, failing on a short source.
    ///
    /// Bytes still sitting in the bit buffer are drained first, then the
    /// remainder comes straight from the buffered source.
    pub fn read_aligned(&mut self, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(self.bitcount % 8, 0);
        let mut filled = 0;

        while filled < out.len() && self.bitcount >= 8 {
            out[filled] = (self.bitbuf & 0xFF) as u8;
            self.consume(8);
            filled += 1;
        }

        while filled < out.len() {
            match self.next_byte()? {
                Some(b) => {
                    out[filled] = b;
                    filled += 1;
                }
                None => return Err(Error::Corrupt("bitstream truncated")),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first_order() {
        // 0b10110100: reading 3 then 5 bits yields 0b100 then 0b10110.
        let data = [0b1011_0100u8];
        let mut reader = BitReader::new(&data[..]);

        assert_eq!(reader.bits(3).unwrap(), 0b100);
        assert_eq!(reader.bits(5).unwrap(), 0b10110);
    }

    #[test]
    fn test_bits_across_byte_boundary() {
        let data = [0xFF, 0x00];
        let mut reader = BitReader::new(&data[..]);

        assert_eq!(reader.bits(12).unwrap(), 0x0FF);
        assert_eq!(reader.bits(4).unwrap(), 0);
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let data = [0xAB];
        let mut reader = BitReader::new(&data[..]);

        assert_eq!(reader.bits(8).unwrap(), 0xAB);
        assert!(matches!(reader.bits(1), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_peek_pads_with_zero() {
        let data = [0x01];
        let mut reader = BitReader::new(&data[..]);

        let (bits, available) = reader.peek_at_most(15).unwrap();
        assert_eq!(available, 8);
        assert_eq!(bits, 0x01);
    }

    #[test]
    fn test_align_and_read_aligned() {
        let data = [0b0000_0001, 0xDE, 0xAD];
        let mut reader = BitReader::new(&data[..]);

        assert_eq!(reader.bits(1).unwrap(), 1);
        reader.align_to_byte();

        let mut out = [0u8; 2];
        reader.read_aligned(&mut out).unwrap();
        assert_eq!(out, [0xDE, 0xAD]);
    }

    #[test]
    fn test_read_aligned_drains_bitbuf_first() {
        let data = [0x11, 0x22, 0x33];
        let mut reader = BitReader::new(&data[..]);

        // Pull two bytes into the bit buffer, consume none of them.
        let (_, available) = reader.peek_at_most(16).unwrap();
        assert_eq!(available, 16);

        let mut out = [0u8; 3];
        reader.read_aligned(&mut out).unwrap();
        assert_eq!(out, [0x11, 0x22, 0x33]);
    }
}
