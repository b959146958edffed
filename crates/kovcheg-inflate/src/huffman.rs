//! Canonical Huffman decode tables.
//!
//! A table is built from an array of per-symbol code lengths. Lookups use
//! a fixed-width root level indexed by the low bits of the stream; codes
//! longer than the root width chain into a second-level sub-table sized to
//! the remaining lengths. This keeps the average lookup at one probe while
//! bounding table-build cost for sparse codes.
//!
//! Building distinguishes two defect classes: an *oversubscribed* length
//! array (more codes demanded than the bit patterns can provide) is fatal,
//! while an *incomplete* one (some patterns unused) still yields a usable
//! table whose unused patterns decode as invalid. The format relies on the
//! latter for intentionally incomplete distance codes.

use std::io::Read;

use crate::bitstream::BitReader;
use crate::{Error, Result};

/// Maximum code length the format allows.
pub const MAX_CODE_BITS: u32 = 15;

/// Whether a code-length array used every available bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// Every bit pattern is claimed by some code.
    Complete,
    /// Some patterns are unused; lookups on them decode as invalid.
    Incomplete,
}

const OP_SYMBOL: u8 = 0;
const OP_LINK: u8 = 1;
const OP_INVALID: u8 = 2;

/// One decode-table slot.
///
/// - `op == OP_SYMBOL`: leaf; `bits` is the code length within this level,
///   `val` the decoded symbol.
/// - `op == OP_LINK`: root slot chaining to a sub-table; `bits` is the
///   sub-table index width, `val` its offset in `entries`.
/// - `op == OP_INVALID`: bit pattern unused by the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    op: u8,
    bits: u8,
    val: u16,
}

const INVALID_ENTRY: Entry = Entry {
    op: OP_INVALID,
    bits: 0,
    val: 0,
};

/// A built Huffman decode table.
pub struct DecodeTable {
    entries: Vec<Entry>,
    root_bits: u32,
}

impl DecodeTable {
    /// Build a decode table from per-symbol code lengths.
    ///
    /// `root_bits` is the requested root lookup width; it is clamped to
    /// the actual minimum and maximum code lengths present. A length of
    /// zero means the symbol is unused.
    pub fn build(lens: &[u8], root_bits: u32) -> Result<(Self, Completeness)> {
        debug_assert!(root_bits >= 1 && root_bits <= MAX_CODE_BITS);

        let mut count = [0u16; (MAX_CODE_BITS + 1) as usize];
        for &len in lens {
            if len as u32 > MAX_CODE_BITS {
                return Err(Error::Corrupt("code length exceeds format maximum"));
            }
            if len != 0 {
                count[len as usize] += 1;
            }
        }

        let Some(max) = (1..=MAX_CODE_BITS).rev().find(|&l| count[l as usize] != 0) else {
            // No codes at all; every lookup is invalid.
            return Ok((
                Self {
                    entries: vec![INVALID_ENTRY; 1usize << root_bits],
                    root_bits,
                },
                Completeness::Incomplete,
            ));
        };
        let min = (1..=max).find(|&l| count[l as usize] != 0).unwrap_or(max);
        let root = root_bits.clamp(min, max);

        // Over-subscription / completeness check over all lengths.
        let mut left: i32 = 1;
        for len in 1..=MAX_CODE_BITS {
            left <<= 1;
            left -= count[len as usize] as i32;
            if left < 0 {
                return Err(Error::OversubscribedCode);
            }
        }
        let completeness = if left > 0 {
            Completeness::Incomplete
        } else {
            Completeness::Complete
        };

        // Sort symbols into canonical order: by code length, then value.
        let mut offs = [0usize; (MAX_CODE_BITS + 2) as usize];
        for len in 1..=(MAX_CODE_BITS as usize) {
            offs[len + 1] = offs[len] + count[len] as usize;
        }
        let mut work = vec![0u16; offs[(MAX_CODE_BITS + 1) as usize]];
        for (sym, &len) in lens.iter().enumerate() {
            if len != 0 {
                work[offs[len as usize]] = sym as u16;
                offs[len as usize] += 1;
            }
        }

        let mut entries = vec![INVALID_ENTRY; 1usize << root];
        let mut count = count;

        let mut huff: u32 = 0; // current code, bit-reversed
        let mut sym: usize = 0; // next symbol in canonical order
        let mut len = min; // current code length
        let mut next: usize = 0; // offset of the table being filled
        let mut curr = root; // index width of that table
        let mut table_size = 1usize << root;
        let mut drop_bits = 0u32; // bits consumed by the root level
        let mut low = u32::MAX; // root index of the open sub-table
        let mask = (1u32 << root) - 1;

        loop {
            // Place the entry at every index whose low bits equal `huff`.
            let entry = Entry {
                op: OP_SYMBOL,
                bits: (len - drop_bits) as u8,
                val: work[sym],
            };
            let incr = 1usize << (len - drop_bits);
            let mut fill = 1usize << curr;
            while fill != 0 {
                fill -= incr;
                entries[next + ((huff >> drop_bits) as usize) + fill] = entry;
            }

            // Backwards-increment the len-bit reversed code.
            let mut inc = 1u32 << (len - 1);
            while huff & inc != 0 {
                inc >>= 1;
            }
            if inc != 0 {
                huff = (huff & (inc - 1)) + inc;
            } else {
                huff = 0;
            }

            sym += 1;
            count[len as usize] -= 1;
            if count[len as usize] == 0 {
                if len == max {
                    break;
                }
                len = lens[work[sym] as usize] as u32;
            }

            // Open a new sub-table once codes outgrow the root width and
            // the low root bits select a fresh slot.
            if len > root && (huff & mask) != low {
                if drop_bits == 0 {
                    drop_bits = root;
                }

                next += table_size;

                // Size the sub-table to cover the remaining lengths.
                curr = len - drop_bits;
                let mut sub_left = 1i32 << curr;
                while curr + drop_bits < max {
                    sub_left -= count[(curr + drop_bits) as usize] as i32;
                    if sub_left <= 0 {
                        break;
                    }
                    curr += 1;
                    sub_left <<= 1;
                }
                table_size = 1usize << curr;
                entries.resize(next + table_size, INVALID_ENTRY);

                low = huff & mask;
                entries[low as usize] = Entry {
                    op: OP_LINK,
                    bits: curr as u8,
                    val: next as u16,
                };
            }
        }

        // Unused patterns of an incomplete code keep their invalid slots.
        Ok((
            Self {
                entries,
                root_bits: root,
            },
            completeness,
        ))
    }

    /// Decode one symbol from the bit stream.
    pub fn decode<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        let (word, available) = reader.peek_at_most(MAX_CODE_BITS)?;

        let entry = self.entries[(word & ((1u32 << self.root_bits) - 1)) as usize];
        let (entry, consumed) = if entry.op == OP_LINK {
            let idx = (word >> self.root_bits) & ((1u32 << entry.bits) - 1);
            let sub = self.entries[entry.val as usize + idx as usize];
            (sub, self.root_bits + sub.bits as u32)
        } else {
            (entry, entry.bits as u32)
        };

        if entry.op != OP_SYMBOL {
            return Err(Error::Corrupt("invalid huffman code"));
        }
        if consumed > available {
            return Err(Error::Corrupt("bitstream truncated"));
        }
        reader.consume(consumed);
        Ok(entry.val)
    }
}

impl std::fmt::Debug for DecodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeTable")
            .field("root_bits", &self.root_bits)
            .field("entries", &self.entries.len())
            .finish()
    }
}
