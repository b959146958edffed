//! Legacy ZipCrypto stream cipher.
//!
//! Three 32-bit key words evolve one byte at a time; key evolution is
//! always driven by *plaintext*, which is why decryption XORs the
//! keystream byte first and folds the recovered plaintext afterwards.
//! The key mixing reuses the CRC-32 table step. This cipher has no
//! resistance to known-plaintext attack; it is reproduced bit-for-bit
//! for compatibility, not strengthened.

use std::io::Read;

/// Length of the encrypted header preceding each encrypted entry's data.
pub const ENCRYPTION_HEADER_LEN: usize = 12;

/// Standard CRC-32 lookup table (polynomial 0xEDB88320).
///
/// The cipher needs the raw table for its key-mixing step, independent of
/// the hardware-accelerated CRC used for data checksums.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// The evolving three-word cipher state.
#[derive(Debug, Clone)]
pub struct ZipCrypto {
    keys: [u32; 3],
}

impl ZipCrypto {
    /// Seed the key words from a candidate password.
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self {
            keys: [0x12345678, 0x23456789, 0x34567890],
        };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    #[inline]
    fn crc32_byte(crc: u32, byte: u8) -> u32 {
        CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
    }

    /// Fold one plaintext byte into all three key words.
    fn update_keys(&mut self, byte: u8) {
        self.keys[0] = Self::crc32_byte(self.keys[0], byte);
        self.keys[1] = self.keys[1].wrapping_add(self.keys[0] & 0xFF);
        self.keys[1] = self.keys[1].wrapping_mul(134775813).wrapping_add(1);
        self.keys[2] = Self::crc32_byte(self.keys[2], (self.keys[1] >> 24) as u8);
    }

    /// Derive the next keystream byte from the low 16 bits of key 2.
    #[inline]
    fn keystream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Decrypt one ciphertext byte, advancing the key state.
    #[inline]
    pub fn decrypt_byte(&mut self, ciphertext: u8) -> u8 {
        let plaintext = ciphertext ^ self.keystream_byte();
        self.update_keys(plaintext);
        plaintext
    }

    /// Encrypt one plaintext byte, advancing the key state.
    #[inline]
    pub fn encrypt_byte(&mut self, plaintext: u8) -> u8 {
        let ciphertext = plaintext ^ self.keystream_byte();
        self.update_keys(plaintext);
        ciphertext
    }

    /// Decrypt a buffer in place.
    pub fn decrypt_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Encrypt a buffer in place.
    pub fn encrypt_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Verify a candidate password against an entry's encrypted header.
    ///
    /// Decrypts the 12-byte header and compares its final byte with the
    /// entry's check byte. On success returns the primed cipher, ready to
    /// decrypt the entry body; on mismatch returns `None` so the caller
    /// can prompt for another attempt or skip the entry.
    pub fn verify_header(
        password: &[u8],
        encrypted_header: &[u8; ENCRYPTION_HEADER_LEN],
        check_byte: u8,
    ) -> Option<Self> {
        let mut cipher = Self::new(password);
        let mut last = 0u8;
        for &byte in encrypted_header {
            last = cipher.decrypt_byte(byte);
        }
        if last == check_byte {
            Some(cipher)
        } else {
            None
        }
    }
}

/// A `Read` adapter that decrypts bytes as they stream through.
///
/// Interposed between the archive byte source and the bit reader when an
/// entry is flagged encrypted.
pub struct DecryptReader<R> {
    inner: R,
    cipher: ZipCrypto,
}

impl<R: Read> DecryptReader<R> {
    /// Wrap `inner` with a primed cipher (past header verification).
    pub fn new(inner: R, cipher: ZipCrypto) -> Self {
        Self { inner, cipher }
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.decrypt_in_place(&mut buf[..n]);
        Ok(n)
    }
}
