//! Minimal PE image walk.
//!
//! The codec only needs one fact about the hosting executable: the file
//! offset just past its last loaded section, which is where the metadata
//! block lives. Everything else about the image is ignored.

use kovcheg_common::BinaryReader;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, Result};

/// DOS header magic "MZ".
const DOS_MAGIC: u16 = 0x5A4D;

/// Offset of the PE header pointer in the DOS header.
const PE_POINTER_OFFSET: usize = 0x3C;

/// PE signature "PE\0\0".
const PE_MAGIC: u32 = 0x0000_4550;

/// COFF file header, directly after the PE signature.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// One section table row.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: u32,
}

/// File offset just past the last section's raw data.
///
/// Sections with no raw data (uninitialized) are skipped. Any structural
/// failure in the walk is `NotASelfExtractor`; a host that cannot be
/// parsed cannot be carrying a header either.
pub fn appended_data_offset(image: &[u8]) -> Result<u64> {
    let mut reader = BinaryReader::new(image);
    let dos_magic = reader.read_u16().map_err(|_| Error::NotASelfExtractor)?;
    if dos_magic != DOS_MAGIC {
        return Err(Error::NotASelfExtractor);
    }

    reader.seek(PE_POINTER_OFFSET);
    let pe_offset = reader.read_u32().map_err(|_| Error::NotASelfExtractor)? as usize;

    let mut reader = BinaryReader::new_at(image, pe_offset);
    let pe_magic = reader.read_u32().map_err(|_| Error::NotASelfExtractor)?;
    if pe_magic != PE_MAGIC {
        return Err(Error::NotASelfExtractor);
    }

    let coff: CoffHeader = reader.read_struct().map_err(|_| Error::NotASelfExtractor)?;
    reader.advance(coff.size_of_optional_header as usize);

    let mut end = 0u64;
    for _ in 0..coff.number_of_sections {
        let section: SectionHeader =
            reader.read_struct().map_err(|_| Error::NotASelfExtractor)?;
        if section.pointer_to_raw_data == 0 {
            continue;
        }
        let section_end =
            u64::from(section.pointer_to_raw_data) + u64::from(section.size_of_raw_data);
        end = end.max(section_end);
    }

    if end == 0 || end > image.len() as u64 {
        return Err(Error::NotASelfExtractor);
    }
    Ok(end)
}

/// Build a tiny but structurally valid PE stub for tests and fixtures.
///
/// One section of `section_len` filler bytes; the returned image ends
/// exactly at the section's raw end.
pub fn synthetic_stub(section_len: u32) -> Vec<u8> {
    use kovcheg_common::BinaryWriter;

    let pe_offset = 0x40u32;
    let coff_len = std::mem::size_of::<CoffHeader>() as u32;
    let section_table = pe_offset + 4 + coff_len;
    let raw_start = section_table + std::mem::size_of::<SectionHeader>() as u32;

    let mut w = BinaryWriter::new();
    w.write_u16(DOS_MAGIC);
    while w.position() < PE_POINTER_OFFSET {
        w.write_u8(0);
    }
    w.write_u32(pe_offset);

    w.write_u32(PE_MAGIC);
    let coff = CoffHeader {
        machine: 0x8664,
        number_of_sections: 1,
        time_date_stamp: 0,
        pointer_to_symbol_table: 0,
        number_of_symbols: 0,
        size_of_optional_header: 0,
        characteristics: 0x0102,
    };
    w.write_struct(&coff);

    let section = SectionHeader {
        name: *b".text\0\0\0",
        virtual_size: section_len,
        virtual_address: 0x1000,
        size_of_raw_data: section_len,
        pointer_to_raw_data: raw_start,
        pointer_to_relocations: 0,
        pointer_to_line_numbers: 0,
        number_of_relocations: 0,
        number_of_line_numbers: 0,
        characteristics: 0x6000_0020,
    };
    w.write_struct(&section);

    let mut image = w.into_bytes();
    image.resize(raw_start as usize + section_len as usize, 0x90);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_stub_round_trips_through_walk() {
        let stub = synthetic_stub(256);
        let end = appended_data_offset(&stub).unwrap();
        assert_eq!(end, stub.len() as u64);
    }

    #[test]
    fn test_non_pe_input_rejected() {
        assert!(matches!(
            appended_data_offset(b"#!/bin/sh\n"),
            Err(Error::NotASelfExtractor)
        ));
        assert!(matches!(
            appended_data_offset(&[]),
            Err(Error::NotASelfExtractor)
        ));
    }

    #[test]
    fn test_truncated_section_table_rejected() {
        let mut stub = synthetic_stub(64);
        // Claim more sections than the table holds.
        let pe_offset = u32::from_le_bytes(stub[0x3C..0x40].try_into().unwrap()) as usize;
        let count_at = pe_offset + 4 + 2;
        stub[count_at..count_at + 2].copy_from_slice(&400u16.to_le_bytes());

        assert!(matches!(
            appended_data_offset(&stub),
            Err(Error::NotASelfExtractor)
        ));
    }
}
