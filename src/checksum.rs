//! Checksum trailers: length lookup, digest computation, verification.
//!
//! Supported algorithms and trailer sizes:
//!
//! ```text
//! none                        0 bytes
//! crc8, xor8, checksum        1 byte
//! crc16, fletcher16           2 bytes
//! crc32, fletcher32           4 bytes
//! md5 / sha1 / sha256         16 / 20 / 32 bytes
//! ```
//!
//! Multi-byte integer trailers are Big Endian. Algorithm names are matched
//! case-insensitively with `-`, `_` and spaces ignored, so `"CRC-16"` and
//! `"crc16"` are the same algorithm. Unknown names are kept as
//! [`ChecksumAlgorithm::Unrecognized`] and behave like `none`.
//!
//! # Example
//!
//! ```
//! use streamframe::checksum::{self, ChecksumAlgorithm};
//!
//! let crc = ChecksumAlgorithm::from_name("CRC-16");
//! let trailer = checksum::digest(&crc, b"123456789");
//! assert_eq!(trailer, vec![0x31, 0xC3]);
//! assert!(checksum::verify(&crc, b"123456789", &trailer));
//! ```

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Checksum algorithm appended after a frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChecksumAlgorithm {
    #[default]
    None,
    /// CRC-8, polynomial 0x07, init 0x00.
    Crc8,
    /// CRC-16/XMODEM, polynomial 0x1021, init 0x0000.
    Crc16,
    /// CRC-32 (IEEE 802.3, reflected).
    Crc32,
    /// XOR of all payload bytes.
    Xor8,
    /// Wrapping 8-bit sum of all payload bytes.
    Checksum,
    Fletcher16,
    /// Fletcher-32 over Big Endian 16-bit words, zero-padded to even length.
    Fletcher32,
    Md5,
    Sha1,
    Sha256,
    /// Name that matched no algorithm. Treated as `None`.
    Unrecognized(String),
}

static SUPPORTED: [ChecksumAlgorithm; 10] = [
    ChecksumAlgorithm::Crc8,
    ChecksumAlgorithm::Crc16,
    ChecksumAlgorithm::Crc32,
    ChecksumAlgorithm::Xor8,
    ChecksumAlgorithm::Checksum,
    ChecksumAlgorithm::Fletcher16,
    ChecksumAlgorithm::Fletcher32,
    ChecksumAlgorithm::Md5,
    ChecksumAlgorithm::Sha1,
    ChecksumAlgorithm::Sha256,
];

impl ChecksumAlgorithm {
    /// Resolve an algorithm name. Never fails; unknown names are preserved
    /// as `Unrecognized`.
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "" | "NONE" => Self::None,
            "CRC8" => Self::Crc8,
            "CRC16" => Self::Crc16,
            "CRC32" => Self::Crc32,
            "XOR" | "XOR8" => Self::Xor8,
            "CHECKSUM" | "SUM" | "SUM8" => Self::Checksum,
            "FLETCHER16" => Self::Fletcher16,
            "FLETCHER32" => Self::Fletcher32,
            "MD5" => Self::Md5,
            "SHA1" => Self::Sha1,
            "SHA256" => Self::Sha256,
            _ => Self::Unrecognized(name.to_string()),
        }
    }

    /// Canonical lowercase name (unknown names are returned as given).
    pub fn name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Crc8 => "crc8",
            Self::Crc16 => "crc16",
            Self::Crc32 => "crc32",
            Self::Xor8 => "xor8",
            Self::Checksum => "checksum",
            Self::Fletcher16 => "fletcher16",
            Self::Fletcher32 => "fletcher32",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Unrecognized(name) => name,
        }
    }

    /// Every algorithm that produces a trailer.
    pub fn supported() -> &'static [ChecksumAlgorithm] {
        &SUPPORTED
    }

    /// Whether frames carry no trailer under this algorithm.
    #[inline]
    pub fn is_none(&self) -> bool {
        self.length() == 0
    }

    /// Trailer length in bytes.
    pub fn length(&self) -> usize {
        match self {
            Self::None | Self::Unrecognized(_) => 0,
            Self::Crc8 | Self::Xor8 | Self::Checksum => 1,
            Self::Crc16 | Self::Fletcher16 => 2,
            Self::Crc32 | Self::Fletcher32 => 4,
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Compute the trailer for `payload`.
    pub fn digest(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            Self::None | Self::Unrecognized(_) => Vec::new(),
            Self::Crc8 => vec![crc8(payload)],
            Self::Crc16 => crc16(payload).to_be_bytes().to_vec(),
            Self::Crc32 => crc32(payload).to_be_bytes().to_vec(),
            Self::Xor8 => vec![payload.iter().fold(0u8, |acc, b| acc ^ b)],
            Self::Checksum => vec![payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))],
            Self::Fletcher16 => fletcher16(payload).to_vec(),
            Self::Fletcher32 => fletcher32(payload).to_vec(),
            Self::Md5 => md5::Md5::digest(payload).to_vec(),
            Self::Sha1 => sha1::Sha1::digest(payload).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(payload).to_vec(),
        }
    }

    /// Check `trailer` against `payload`. Always true for `None`.
    pub fn verify(&self, payload: &[u8], trailer: &[u8]) -> bool {
        if self.is_none() {
            return true;
        }
        self.digest(payload) == trailer
    }
}

impl From<String> for ChecksumAlgorithm {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<&str> for ChecksumAlgorithm {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl From<ChecksumAlgorithm> for String {
    fn from(algorithm: ChecksumAlgorithm) -> Self {
        algorithm.name().to_string()
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Trailer length for `algorithm`.
#[inline]
pub fn length_for(algorithm: &ChecksumAlgorithm) -> usize {
    algorithm.length()
}

/// Trailer bytes for `payload`.
#[inline]
pub fn digest(algorithm: &ChecksumAlgorithm, payload: &[u8]) -> Vec<u8> {
    algorithm.digest(payload)
}

/// Whether `trailer` matches `payload`.
#[inline]
pub fn verify(algorithm: &ChecksumAlgorithm, payload: &[u8], trailer: &[u8]) -> bool {
    algorithm.verify(payload, trailer)
}

const CRC8_TABLE: [u8; 256] = crc8_table();
const CRC16_TABLE: [u16; 256] = crc16_table();
const CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (crc << 8) ^ CRC16_TABLE[(((crc >> 8) as u8) ^ b) as usize]
    })
}

fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(0xFFFF_FFFFu32, |crc, &b| {
        (crc >> 8) ^ CRC32_TABLE[((crc as u8) ^ b) as usize]
    })
}

/// `[sum2, sum1]`, both mod 255.
fn fletcher16(data: &[u8]) -> [u8; 2] {
    let (mut sum1, mut sum2) = (0u16, 0u16);
    for &b in data {
        sum1 = (sum1 + u16::from(b)) % 255;
        sum2 = (sum2 + sum1) % 255;
    }
    [sum2 as u8, sum1 as u8]
}

/// `sum2 ‖ sum1` as Big Endian u16s, both mod 65535.
fn fletcher32(data: &[u8]) -> [u8; 4] {
    let (mut sum1, mut sum2) = (0u32, 0u32);
    for word in data.chunks(2) {
        let hi = u32::from(word[0]);
        let lo = word.get(1).copied().map_or(0, u32::from);
        sum1 = (sum1 + ((hi << 8) | lo)) % 65535;
        sum2 = (sum2 + sum1) % 65535;
    }
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&(sum2 as u16).to_be_bytes());
    out[2..].copy_from_slice(&(sum1 as u16).to_be_bytes());
    out
}
