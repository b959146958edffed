//! Binary writer for building little-endian records in memory.
//!
//! [`BinaryWriter`] is the mirror image of [`crate::BinaryReader`]: an
//! append-only byte builder used for central directory rewrites and
//! self-extractor header encoding.

use zerocopy::IntoBytes;

/// An append-only little-endian byte builder.
///
/// # Example
///
/// ```
/// use kovcheg_common::BinaryWriter;
///
/// let mut writer = BinaryWriter::new();
/// writer.write_u32(0x06054b50);
/// writer.write_u16(0);
/// assert_eq!(writer.position(), 6);
/// assert_eq!(&writer.into_bytes()[..4], &[0x50, 0x4b, 0x05, 0x06]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    data: Vec<u8>,
}

impl BinaryWriter {
    /// Create an empty writer.
    #[inline]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create a writer with pre-allocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.data.len()
    }

    /// Append a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append a little-endian u16.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian u32.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a string followed by a null terminator.
    #[inline]
    pub fn write_cstring(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
    }

    /// Append a packed struct using zerocopy.
    #[inline]
    pub fn write_struct<T: IntoBytes + zerocopy::Immutable>(&mut self, value: &T) {
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Patch a previously written little-endian u32 at an absolute offset.
    ///
    /// Used to back-fill offsets that are only known once the variable
    /// tail has been laid out. Panics if the offset is out of range; the
    /// caller controls the layout and a bad offset is a logic error.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// View the bytes written so far.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer, returning the built buffer.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(0x04034b50);
        writer.write_u16(0x0014);
        writer.write_u8(0xAB);

        assert_eq!(
            writer.as_bytes(),
            &[0x50, 0x4b, 0x03, 0x04, 0x14, 0x00, 0xAB]
        );
    }

    #[test]
    fn test_cstring_terminated() {
        let mut writer = BinaryWriter::new();
        writer.write_cstring("abc");
        assert_eq!(writer.as_bytes(), b"abc\0");
    }

    #[test]
    fn test_patch_u32() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(0);
        writer.write_bytes(b"tail");
        writer.patch_u32(0, 0xDEADBEEF);

        assert_eq!(&writer.as_bytes()[..4], &0xDEADBEEFu32.to_le_bytes());
        assert_eq!(&writer.as_bytes()[4..], b"tail");
    }
}
