//! Self-extractor metadata block codec.
//!
//! The block sits immediately after the host executable's last section
//! and immediately before the archive bytes. Layout: a 4-byte signature,
//! a fixed record, then a string pool. Every string is zero-terminated
//! and addressed by a byte offset **relative to the block's first byte**;
//! offset zero is the absent-field sentinel and decodes to an empty
//! string. Registry-sourced target directories carry a 4-byte root-key
//! identifier ahead of the subkey and value strings. The layout is
//! byte-compatible in both directions: `decode(encode(h)) == h`.

use kovcheg_common::{BinaryReader, BinaryWriter};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, Result};

/// Block signature "SFX1".
pub const SIGNATURE: u32 = 0x3158_4653;

/// Current block format version.
pub const VERSION: u16 = 1;

/// Behavior flags stored in the fixed record.
pub mod flags {
    /// The extractor understands multi-volume archives. A capability
    /// selected when the header is built, not a separate build of the
    /// codec.
    pub const MULTI_VOLUME: u16 = 1 << 0;
    /// The target directory comes from a registry value rather than a
    /// literal path.
    pub const REGISTRY_TARGET: u16 = 1 << 1;
    /// Run the command line after extraction.
    pub const AUTO_RUN: u16 = 1 << 2;
    /// Show the message box before extracting.
    pub const SHOW_MESSAGE: u16 = 1 << 3;
    /// Overwrite existing files without asking.
    pub const OVERWRITE_ALL: u16 = 1 << 4;
    /// Wait for the named process to exit before running the command.
    pub const WAIT_PROCESS: u16 = 1 << 5;
}

/// The fixed portion of the block, after the signature.
///
/// String fields hold block-relative byte offsets; zero means absent.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
struct FixedRecord {
    version: u16,
    flags: u16,
    /// Total block size in bytes (signature through string pool end).
    header_size: u32,
    /// End-of-directory offset within the archive payload.
    eocd_offset: u32,
    /// Raw size of the archive payload.
    archive_size: u32,
    command_line: u32,
    body_text: u32,
    title: u32,
    target_dir: u32,
    vendor: u32,
    url: u32,
    icon_path: u32,
    msgbox_text: u32,
    msgbox_title: u32,
    wait_process: u32,
}

/// Where extracted files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDir {
    /// A literal directory path (empty = ask the user / current dir).
    Path(String),
    /// Resolved at extraction time from a registry value.
    Registry {
        /// Root key identifier (HKLM, HKCU... as the 4-byte constant).
        root: u32,
        /// Subkey path under the root.
        subkey: String,
        /// Value name holding the directory.
        value: String,
    },
}

impl Default for TargetDir {
    fn default() -> Self {
        TargetDir::Path(String::new())
    }
}

/// Decoded self-extractor metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SfxHeader {
    /// Behavior flags; the registry bit is kept in sync with
    /// `target_dir` by the codec.
    pub flags: u16,
    /// End-of-directory offset within the archive payload.
    pub eocd_offset: u32,
    /// Raw archive payload size in bytes.
    pub archive_size: u32,
    /// Command executed after extraction (with `AUTO_RUN`).
    pub command_line: String,
    /// Long descriptive text shown in the extractor window.
    pub body_text: String,
    /// Window title.
    pub title: String,
    /// Extraction target.
    pub target_dir: TargetDir,
    /// Vendor name.
    pub vendor: String,
    /// Vendor URL.
    pub url: String,
    /// Icon resource path used when the extractor was produced.
    pub icon_path: String,
    /// Message box body (with `SHOW_MESSAGE`).
    pub msgbox_text: String,
    /// Message box title.
    pub msgbox_title: String,
    /// Process name to wait for (with `WAIT_PROCESS`).
    pub wait_process: String,
}

impl SfxHeader {
    /// Serialize the block: signature, fixed record, string pool.
    pub fn encode(&self) -> Vec<u8> {
        let mut pool = BinaryWriter::new();
        let pool_base = 4 + std::mem::size_of::<FixedRecord>();

        let mut place = |pool: &mut BinaryWriter, s: &str| -> u32 {
            if s.is_empty() {
                return 0;
            }
            let offset = (pool_base + pool.position()) as u32;
            pool.write_cstring(s);
            offset
        };

        let command_line = place(&mut pool, &self.command_line);
        let body_text = place(&mut pool, &self.body_text);
        let title = place(&mut pool, &self.title);

        let (flags, target_dir) = match &self.target_dir {
            TargetDir::Path(path) => (
                self.flags & !flags::REGISTRY_TARGET,
                place(&mut pool, path),
            ),
            TargetDir::Registry { root, subkey, value } => {
                let offset = (pool_base + pool.position()) as u32;
                pool.write_u32(*root);
                pool.write_cstring(subkey);
                pool.write_cstring(value);
                (self.flags | flags::REGISTRY_TARGET, offset)
            }
        };

        let vendor = place(&mut pool, &self.vendor);
        let url = place(&mut pool, &self.url);
        let icon_path = place(&mut pool, &self.icon_path);
        let msgbox_text = place(&mut pool, &self.msgbox_text);
        let msgbox_title = place(&mut pool, &self.msgbox_title);
        let wait_process = place(&mut pool, &self.wait_process);

        let record = FixedRecord {
            version: VERSION,
            flags,
            header_size: (pool_base + pool.position()) as u32,
            eocd_offset: self.eocd_offset,
            archive_size: self.archive_size,
            command_line,
            body_text,
            title,
            target_dir,
            vendor,
            url,
            icon_path,
            msgbox_text,
            msgbox_title,
            wait_process,
        };

        let mut w = BinaryWriter::with_capacity(pool_base + pool.position());
        w.write_u32(SIGNATURE);
        w.write_struct(&record);
        w.write_bytes(pool.as_bytes());
        w.into_bytes()
    }

    /// Decode a block starting at `buffer[0]`.
    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(buffer);
        let signature = reader.read_u32().map_err(|_| Error::NotASelfExtractor)?;
        if signature != SIGNATURE {
            return Err(Error::NotASelfExtractor);
        }

        let record: FixedRecord = reader
            .read_struct()
            .map_err(|_| Error::Format("fixed record truncated"))?;
        if record.version > VERSION {
            return Err(Error::Format("unknown header version"));
        }
        let header_size = record.header_size as usize;
        if header_size > buffer.len() {
            return Err(Error::Format("declared header size out of bounds"));
        }
        if header_size < 4 + std::mem::size_of::<FixedRecord>() {
            return Err(Error::Format("declared header size too small"));
        }

        // Every offset-addressed field must resolve inside the declared
        // block; bytes past it belong to the archive payload.
        let block = &buffer[..header_size];
        let string_at = |offset: u32| -> Result<String> {
            if offset == 0 {
                return Ok(String::new());
            }
            read_pool_string(block, offset)
        };

        let target_dir = if record.flags & flags::REGISTRY_TARGET != 0 {
            if record.target_dir == 0 {
                return Err(Error::Format("registry target with no payload"));
            }
            let mut r = BinaryReader::new_at(block, record.target_dir as usize);
            let root = r
                .read_u32()
                .map_err(|_| Error::Format("registry root key truncated"))?;
            let subkey = r
                .read_cstring()
                .map_err(|_| Error::Format("registry subkey unterminated"))?
                .to_string();
            let value = r
                .read_cstring()
                .map_err(|_| Error::Format("registry value unterminated"))?
                .to_string();
            TargetDir::Registry { root, subkey, value }
        } else {
            TargetDir::Path(string_at(record.target_dir)?)
        };

        Ok(Self {
            flags: record.flags,
            eocd_offset: record.eocd_offset,
            archive_size: record.archive_size,
            command_line: string_at(record.command_line)?,
            body_text: string_at(record.body_text)?,
            title: string_at(record.title)?,
            target_dir,
            vendor: string_at(record.vendor)?,
            url: string_at(record.url)?,
            icon_path: string_at(record.icon_path)?,
            msgbox_text: string_at(record.msgbox_text)?,
            msgbox_title: string_at(record.msgbox_title)?,
            wait_process: string_at(record.wait_process)?,
        })
    }

    /// Total encoded size of this header, without re-encoding twice.
    pub fn encoded_len(&self) -> usize {
        self.encode().len()
    }

    /// Whether the extractor half understands spanned archives.
    #[inline]
    pub fn supports_multi_volume(&self) -> bool {
        self.flags & flags::MULTI_VOLUME != 0
    }
}

/// Total size of the block starting at `buffer[0]`, from its own fixed
/// record. The archive payload begins this many bytes in.
pub fn block_len(buffer: &[u8]) -> Result<usize> {
    let mut reader = BinaryReader::new(buffer);
    let signature = reader.read_u32().map_err(|_| Error::NotASelfExtractor)?;
    if signature != SIGNATURE {
        return Err(Error::NotASelfExtractor);
    }
    let record: FixedRecord = reader
        .read_struct()
        .map_err(|_| Error::Format("fixed record truncated"))?;
    Ok(record.header_size as usize)
}

/// Read a zero-terminated string at a block-relative offset. `block` is
/// already truncated to the declared header size, so a string whose
/// terminator lies beyond the block fails rather than reading payload
/// bytes.
fn read_pool_string(block: &[u8], offset: u32) -> Result<String> {
    if offset as usize >= block.len() {
        return Err(Error::Format("string offset out of bounds"));
    }
    let mut reader = BinaryReader::new_at(block, offset as usize);
    let s = reader
        .read_cstring()
        .map_err(|_| Error::Format("unterminated string field"))?;
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_header() -> SfxHeader {
        SfxHeader {
            flags: flags::AUTO_RUN | flags::SHOW_MESSAGE | flags::MULTI_VOLUME,
            eocd_offset: 0xBEEF,
            archive_size: 123_456,
            command_line: "setup.exe /quiet".into(),
            body_text: "This package installs the example tools.".into(),
            title: "Example Tools".into(),
            target_dir: TargetDir::Path("C:\\Tools".into()),
            vendor: "Example Corp".into(),
            url: "https://example.invalid".into(),
            icon_path: "app.ico".into(),
            msgbox_text: "Install now?".into(),
            msgbox_title: "Setup".into(),
            wait_process: String::new(),
        }
    }

    #[test]
    fn test_roundtrip_full() {
        let header = full_header();
        let decoded = SfxHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_roundtrip_all_optionals_empty() {
        let header = SfxHeader::default();
        let encoded = header.encode();
        let decoded = SfxHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_roundtrip_registry_target() {
        let mut header = full_header();
        header.target_dir = TargetDir::Registry {
            root: 0x8000_0002,
            subkey: "Software\\Example\\Paths".into(),
            value: "InstallDir".into(),
        };
        let decoded = SfxHeader::decode(&header.encode()).unwrap();

        // The codec owns the registry bit.
        assert_eq!(decoded.target_dir, header.target_dir);
        assert_ne!(decoded.flags & flags::REGISTRY_TARGET, 0);
    }

    #[test]
    fn test_bad_signature_is_not_a_self_extractor() {
        let mut encoded = full_header().encode();
        encoded[0] ^= 0xFF;
        assert!(matches!(
            SfxHeader::decode(&encoded),
            Err(Error::NotASelfExtractor)
        ));
    }

    #[test]
    fn test_unterminated_string_rejected() {
        let mut encoded = full_header().encode();
        // Chop the final terminator off the pool.
        encoded.pop();
        let chopped = encoded.len() as u32;
        // Keep header_size honest about the truncation.
        let size_at = 4 + 4;
        encoded[size_at..size_at + 4].copy_from_slice(&chopped.to_le_bytes());

        assert!(SfxHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_offset_past_declared_size_rejected() {
        let mut encoded = full_header().encode();
        // Point the title field past the end of the block.
        let title_at = 4 + 2 + 2 + 4 + 4 + 4 + 4 + 4;
        encoded[title_at..title_at + 4].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());

        assert!(matches!(
            SfxHeader::decode(&encoded),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_registry_payload_outside_block_rejected() {
        let mut header = full_header();
        header.target_dir = TargetDir::Registry {
            root: 7,
            subkey: "Software\\Example".into(),
            value: "Dir".into(),
        };
        let mut encoded = header.encode();

        // Point the registry payload at the block end, then lay a
        // plausible record where the archive bytes would start.
        let block_end = encoded.len() as u32;
        let target_at = 4 + 2 + 2 + 4 + 4 + 4 + 4 + 4 + 4;
        encoded[target_at..target_at + 4].copy_from_slice(&block_end.to_le_bytes());
        encoded.extend_from_slice(&7u32.to_le_bytes());
        encoded.extend_from_slice(b"ghost-subkey\0ghost-value\0");

        assert!(matches!(
            SfxHeader::decode(&encoded),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_string_terminator_outside_block_rejected() {
        let mut encoded = full_header().encode();

        // Break the final pool terminator and follow the block with
        // payload bytes carrying a terminator of their own.
        let last = encoded.len() - 1;
        encoded[last] = b'!';
        encoded.extend_from_slice(b"payload bytes\0");

        assert!(matches!(
            SfxHeader::decode(&encoded),
            Err(Error::Format(_))
        ));
    }
}
