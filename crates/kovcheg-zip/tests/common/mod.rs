//! Shared archive fixture builder for the integration tests.
//!
//! Builds byte-exact archives from scratch with the record writers, so
//! the tests do not depend on any external zip tool. Compression uses
//! `flate2` (raw deflate); the engine under test only ever decompresses.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use kovcheg_common::{crc, BinaryWriter};
use kovcheg_zip::crypto::{ZipCrypto, ENCRYPTION_HEADER_LEN};
use kovcheg_zip::records::{CentralDirectoryHeader, EocdRecord, LocalFileHeader};
use kovcheg_zip::CompressionMethod;

/// One entry to place in a fixture archive.
pub struct Spec {
    pub name: &'static str,
    pub data: Vec<u8>,
    pub method: CompressionMethod,
    pub password: Option<&'static [u8]>,
}

impl Spec {
    pub fn stored(name: &'static str, data: Vec<u8>) -> Self {
        Self {
            name,
            data,
            method: CompressionMethod::Store,
            password: None,
        }
    }

    pub fn deflated(name: &'static str, data: Vec<u8>) -> Self {
        Self {
            name,
            data,
            method: CompressionMethod::Deflate,
            password: None,
        }
    }

    pub fn encrypted(mut self, password: &'static [u8]) -> Self {
        self.password = Some(password);
        self
    }
}

/// Deterministic mildly compressible payload.
pub fn sample_data(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i / 7) as u8).wrapping_mul(31).wrapping_add((i % 13) as u8))
        .collect()
}

const ENCRYPTED_FLAG: u16 = 1 << 0;

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Serialize a complete single-volume archive from the specs.
pub fn build_archive(specs: &[Spec], comment: &[u8]) -> Vec<u8> {
    let mut body = BinaryWriter::new();
    let mut centrals: Vec<(u32, u16, u32, u32, u32, &Spec)> = Vec::new();

    for spec in specs {
        let crc32 = crc::hash_bytes(&spec.data);
        let mut payload = match spec.method {
            CompressionMethod::Store => spec.data.clone(),
            CompressionMethod::Deflate => deflate(&spec.data),
        };

        let mut flags = 0u16;
        if let Some(password) = spec.password {
            flags |= ENCRYPTED_FLAG;
            let mut header = [0u8; ENCRYPTION_HEADER_LEN];
            for (i, byte) in header.iter_mut().enumerate() {
                *byte = (i as u8).wrapping_mul(37).wrapping_add(11);
            }
            header[ENCRYPTION_HEADER_LEN - 1] = (crc32 >> 24) as u8;

            let mut cipher = ZipCrypto::new(password);
            cipher.encrypt_in_place(&mut header);
            cipher.encrypt_in_place(&mut payload);

            let mut combined = header.to_vec();
            combined.extend_from_slice(&payload);
            payload = combined;
        }

        let local_offset = body.position() as u32;
        body.write_u32(LocalFileHeader::SIGNATURE);
        body.write_u16(20);
        body.write_u16(flags);
        body.write_u16(spec.method as u16);
        body.write_u32(0x5A7C_3B21); // fixed DOS datetime
        body.write_u32(crc32);
        body.write_u32(payload.len() as u32);
        body.write_u32(spec.data.len() as u32);
        body.write_u16(spec.name.len() as u16);
        body.write_u16(0);
        body.write_bytes(spec.name.as_bytes());
        body.write_bytes(&payload);

        centrals.push((
            local_offset,
            flags,
            crc32,
            payload.len() as u32,
            spec.data.len() as u32,
            spec,
        ));
    }

    let dir_offset = body.position() as u32;
    for (local_offset, flags, crc32, compressed, uncompressed, spec) in &centrals {
        body.write_u32(CentralDirectoryHeader::SIGNATURE);
        body.write_u16(20);
        body.write_u16(20);
        body.write_u16(*flags);
        body.write_u16(spec.method as u16);
        body.write_u32(0x5A7C_3B21);
        body.write_u32(*crc32);
        body.write_u32(*compressed);
        body.write_u32(*uncompressed);
        body.write_u16(spec.name.len() as u16);
        body.write_u16(0);
        body.write_u16(0);
        body.write_u16(0);
        body.write_u16(0);
        body.write_u32(0);
        body.write_u32(*local_offset);
        body.write_bytes(spec.name.as_bytes());
    }
    let dir_size = body.position() as u32 - dir_offset;

    body.write_u32(EocdRecord::SIGNATURE);
    body.write_u16(0);
    body.write_u16(0);
    body.write_u16(specs.len() as u16);
    body.write_u16(specs.len() as u16);
    body.write_u32(dir_size);
    body.write_u32(dir_offset);
    body.write_u16(comment.len() as u16);
    body.write_bytes(comment);

    body.into_bytes()
}

/// Write an archive to a fresh temporary file and return its guard.
pub fn archive_file(specs: &[Spec], comment: &[u8]) -> tempfile::NamedTempFile {
    let bytes = build_archive(specs, comment);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    file
}
