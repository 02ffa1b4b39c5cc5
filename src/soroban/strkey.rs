//! Stellar strkey codec.
//!
//! Checksummed base32 text form for ed25519 account keys (`G...`), contract
//! ids (`C...`), and secret seeds (`S...`). Payloads are 32 bytes; the
//! encoding is `base32(version_byte || payload || crc16_le)` with no padding.

use thiserror::Error;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Version byte for ed25519 public keys (`G...`).
pub const VERSION_ACCOUNT: u8 = 6 << 3;
/// Version byte for contract ids (`C...`).
pub const VERSION_CONTRACT: u8 = 2 << 3;
/// Version byte for ed25519 secret seeds (`S...`).
pub const VERSION_SEED: u8 = 18 << 3;

/// Strkey decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StrkeyError {
    #[error("invalid base32 character")]
    InvalidCharacter,

    #[error("invalid strkey length: {0}")]
    InvalidLength(usize),

    #[error("checksum mismatch")]
    BadChecksum,

    #[error("unexpected version byte: {0:#04x}")]
    WrongVersion(u8),
}

/// Encode a 32-byte ed25519 public key as a `G...` address.
pub fn encode_account(key: &[u8; 32]) -> String {
    encode(VERSION_ACCOUNT, key)
}

/// Encode a 32-byte contract hash as a `C...` id.
pub fn encode_contract(hash: &[u8; 32]) -> String {
    encode(VERSION_CONTRACT, hash)
}

/// Encode a 32-byte ed25519 seed as an `S...` secret.
pub fn encode_seed(seed: &[u8; 32]) -> String {
    encode(VERSION_SEED, seed)
}

/// Decode a `G...` address into the raw public key bytes.
pub fn decode_account(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_ACCOUNT, s)
}

/// Decode a `C...` contract id into the raw hash bytes.
pub fn decode_contract(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_CONTRACT, s)
}

/// Decode an `S...` secret into the raw seed bytes.
pub fn decode_seed(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_SEED, s)
}

fn encode(version: u8, payload: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(35);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = crc16(&data);
    data.extend_from_slice(&checksum.to_le_bytes());
    base32_encode(&data)
}

fn decode(version: u8, s: &str) -> Result<[u8; 32], StrkeyError> {
    let data = base32_decode(s)?;
    if data.len() != 35 {
        return Err(StrkeyError::InvalidLength(s.len()));
    }
    let (body, checksum) = data.split_at(33);
    let expected = crc16(body);
    if checksum != expected.to_le_bytes() {
        return Err(StrkeyError::BadChecksum);
    }
    if body[0] != version {
        return Err(StrkeyError::WrongVersion(body[0]));
    }
    let mut payload = [0u8; 32];
    payload.copy_from_slice(&body[1..]);
    Ok(payload)
}

/// CRC16-XMODEM (poly 0x1021, init 0), as strkey requires.
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(s: &str) -> Result<Vec<u8>, StrkeyError> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for c in s.bytes() {
        let value = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or(StrkeyError::InvalidCharacter)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Ok(out)
}
