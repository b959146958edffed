//! Self-extractor assembly.
//!
//! A produced image is `stub ‖ header block ‖ archive`. The archive is
//! validated before assembly and the header's payload fields are patched
//! to the final layout, so a stale `eocd_offset` in the caller's field
//! set can never ship.

use kovcheg_zip::read_directory;

use crate::header::{block_len, flags, SfxHeader};
use crate::pe;
use crate::{Error, Result};

/// Assembles self-extractor images from a stub, metadata and an archive.
///
/// Multi-volume awareness is a capability chosen here, at construction
/// time; there is no separate multi-volume build of the codec.
pub struct SfxBuilder {
    header: SfxHeader,
    multi_volume: bool,
}

impl SfxBuilder {
    /// Start from the caller's metadata fields.
    pub fn new(header: SfxHeader) -> Self {
        Self {
            header,
            multi_volume: false,
        }
    }

    /// Declare the stub capable of reading spanned archives.
    pub fn multi_volume(mut self, capable: bool) -> Self {
        self.multi_volume = capable;
        self
    }

    /// Assemble the final image.
    ///
    /// `stub` must be a valid PE image; bytes past its last section are
    /// dropped so the header lands exactly where `locate` will look.
    /// `archive` must hold a valid directory (spanned only when the
    /// multi-volume capability is set).
    pub fn build(&self, stub: &[u8], archive: &[u8]) -> Result<Vec<u8>> {
        let stub_end = pe::appended_data_offset(stub)? as usize;

        if archive.len() > u32::MAX as usize {
            return Err(Error::Format("archive payload too large for the header"));
        }
        let directory = read_directory(archive, self.multi_volume)?;

        let mut header = self.header.clone();
        if self.multi_volume {
            header.flags |= flags::MULTI_VOLUME;
        } else {
            header.flags &= !flags::MULTI_VOLUME;
        }
        header.eocd_offset = directory.eocd_offset as u32;
        header.archive_size = archive.len() as u32;

        let block = header.encode();
        let mut image = Vec::new();
        image
            .try_reserve(stub_end + block.len() + archive.len())
            .map_err(|_| Error::Zip(kovcheg_zip::Error::LowMemory))?;
        image.extend_from_slice(&stub[..stub_end]);
        image.extend_from_slice(&block);
        image.extend_from_slice(archive);
        Ok(image)
    }
}

/// Locate the header block in a self-extractor image.
///
/// Returns the block's file offset, or `NotASelfExtractor` when the
/// section walk fails or the signature is absent.
pub fn locate(image: &[u8]) -> Result<u64> {
    let offset = pe::appended_data_offset(image)?;
    // Probing the signature here gives callers the contract that a
    // successful locate implies a decodable block start.
    let start = offset as usize;
    if start + 4 > image.len() {
        return Err(Error::NotASelfExtractor);
    }
    let signature = u32::from_le_bytes([
        image[start],
        image[start + 1],
        image[start + 2],
        image[start + 3],
    ]);
    if signature != crate::header::SIGNATURE {
        return Err(Error::NotASelfExtractor);
    }
    Ok(offset)
}

/// Decode a self-extractor image into its header and archive payload.
pub fn read_image(image: &[u8]) -> Result<(SfxHeader, &[u8])> {
    let offset = locate(image)? as usize;
    let block = &image[offset..];
    let header = SfxHeader::decode(block)?;
    let payload_start = offset + block_len(block)?;
    let payload_end = payload_start
        .checked_add(header.archive_size as usize)
        .filter(|&end| end <= image.len())
        .ok_or(Error::Format("archive payload out of bounds"))?;
    Ok((header, &image[payload_start..payload_end]))
}
