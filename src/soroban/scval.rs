//! Soroban contract value (SCVal) codec.
//!
//! Decodes event payloads from either of the two shapes the RPC emits: a
//! base64 XDR blob, or the pre-expanded JSON structure (`{"type": ...,
//! "value": ...}`). Encoding covers every tag the bot submits in contract
//! invocations. Tags the bot has no use for decode to [`ScVal::Unsupported`]
//! so a single odd field never poisons a whole payload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value as Json;
use thiserror::Error;

use super::strkey::{self, StrkeyError};

const TAG_BOOL: u32 = 0;
const TAG_VOID: u32 = 1;
const TAG_ERROR: u32 = 2;
const TAG_U32: u32 = 3;
const TAG_I32: u32 = 4;
const TAG_U64: u32 = 5;
const TAG_I64: u32 = 6;
const TAG_TIMEPOINT: u32 = 7;
const TAG_DURATION: u32 = 8;
const TAG_U128: u32 = 9;
const TAG_I128: u32 = 10;
const TAG_U256: u32 = 11;
const TAG_I256: u32 = 12;
const TAG_BYTES: u32 = 13;
const TAG_STRING: u32 = 14;
const TAG_SYMBOL: u32 = 15;
const TAG_VEC: u32 = 16;
const TAG_MAP: u32 = 17;
const TAG_ADDRESS: u32 = 18;
const TAG_LEDGER_KEY_CONTRACT_INSTANCE: u32 = 20;
const TAG_LEDGER_KEY_NONCE: u32 = 21;

/// Placeholder tag for JSON `type` strings this codec does not model.
const JSON_UNKNOWN_TAG: u32 = u32::MAX;

/// Decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("value truncated at byte {0}")]
    Truncated(usize),

    #[error("invalid utf-8 in text value")]
    Utf8,

    #[error("unknown value tag {0}")]
    UnknownTag(u32),

    #[error("unknown address kind {0}")]
    UnknownAddress(u32),

    #[error("payload is not a map or vector")]
    NotAContainer,
}

/// Encoding errors
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("address is not a valid strkey: {0}")]
    Address(#[from] StrkeyError),

    #[error("cannot encode unsupported value tag {0}")]
    Unsupported(u32),
}

/// A Soroban contract value.
///
/// Addresses are carried in strkey text form; 256-bit integers and host
/// error values are recognized but not modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScVal {
    Bool(bool),
    Void,
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    Timepoint(u64),
    Duration(u64),
    U128(u128),
    I128(i128),
    Bytes(Vec<u8>),
    String(String),
    Symbol(String),
    Vec(Vec<ScVal>),
    Map(Vec<(ScVal, ScVal)>),
    Address(String),
    Unsupported(u32),
}

impl ScVal {
    /// Decode a base64 XDR blob.
    pub fn from_xdr_base64(encoded: &str) -> Result<Self, DecodeError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Self::from_xdr(&bytes)
    }

    /// Decode raw XDR bytes. Trailing bytes after the value are ignored.
    pub fn from_xdr(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = XdrReader::new(bytes);
        Self::read_xdr(&mut reader)
    }

    fn read_xdr(r: &mut XdrReader<'_>) -> Result<Self, DecodeError> {
        let tag = r.read_u32()?;
        let value = match tag {
            TAG_BOOL => ScVal::Bool(r.read_u32()? != 0),
            TAG_VOID => ScVal::Void,
            TAG_ERROR => {
                // SCError is a two-word union in every arm.
                r.read_u32()?;
                r.read_u32()?;
                ScVal::Unsupported(TAG_ERROR)
            }
            TAG_U32 => ScVal::U32(r.read_u32()?),
            TAG_I32 => ScVal::I32(r.read_i32()?),
            TAG_U64 => ScVal::U64(r.read_u64()?),
            TAG_I64 => ScVal::I64(r.read_i64()?),
            TAG_TIMEPOINT => ScVal::Timepoint(r.read_u64()?),
            TAG_DURATION => ScVal::Duration(r.read_u64()?),
            TAG_U128 => {
                let hi = r.read_u64()?;
                let lo = r.read_u64()?;
                ScVal::U128(((hi as u128) << 64) | lo as u128)
            }
            TAG_I128 => {
                let hi = r.read_i64()?;
                let lo = r.read_u64()?;
                ScVal::I128(((hi as i128) << 64) | lo as i128)
            }
            TAG_U256 => {
                r.take(32)?;
                ScVal::Unsupported(TAG_U256)
            }
            TAG_I256 => {
                r.take(32)?;
                ScVal::Unsupported(TAG_I256)
            }
            TAG_BYTES => ScVal::Bytes(r.read_var_bytes()?),
            TAG_STRING => ScVal::String(r.read_utf8()?),
            TAG_SYMBOL => ScVal::Symbol(r.read_utf8()?),
            TAG_VEC => {
                // SCVec is an optional pointer: absent means empty.
                if r.read_u32()? == 0 {
                    ScVal::Vec(vec![])
                } else {
                    let count = r.read_count()?;
                    let mut items = Vec::with_capacity(count);
                    for _ in 0..count {
                        items.push(Self::read_xdr(r)?);
                    }
                    ScVal::Vec(items)
                }
            }
            TAG_MAP => {
                if r.read_u32()? == 0 {
                    ScVal::Map(vec![])
                } else {
                    let count = r.read_count()?;
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        let key = Self::read_xdr(r)?;
                        let val = Self::read_xdr(r)?;
                        entries.push((key, val));
                    }
                    ScVal::Map(entries)
                }
            }
            TAG_ADDRESS => {
                let kind = r.read_u32()?;
                match kind {
                    0 => {
                        // AccountID wraps a PublicKey union; ed25519 is the
                        // only defined arm.
                        let key_type = r.read_u32()?;
                        if key_type != 0 {
                            return Err(DecodeError::UnknownAddress(key_type));
                        }
                        ScVal::Address(strkey::encode_account(&r.take_32()?))
                    }
                    1 => ScVal::Address(strkey::encode_contract(&r.take_32()?)),
                    other => return Err(DecodeError::UnknownAddress(other)),
                }
            }
            TAG_LEDGER_KEY_CONTRACT_INSTANCE => ScVal::Unsupported(tag),
            TAG_LEDGER_KEY_NONCE => {
                r.read_i64()?;
                ScVal::Unsupported(tag)
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };
        Ok(value)
    }

    /// Encode to raw XDR bytes.
    pub fn to_xdr(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        self.write_xdr(&mut out)?;
        Ok(out)
    }

    /// Encode to a base64 XDR blob.
    pub fn to_xdr_base64(&self) -> Result<String, EncodeError> {
        Ok(BASE64.encode(self.to_xdr()?))
    }

    pub(crate) fn write_xdr(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            ScVal::Bool(b) => {
                put_u32(out, TAG_BOOL);
                put_u32(out, *b as u32);
            }
            ScVal::Void => put_u32(out, TAG_VOID),
            ScVal::U32(v) => {
                put_u32(out, TAG_U32);
                put_u32(out, *v);
            }
            ScVal::I32(v) => {
                put_u32(out, TAG_I32);
                put_u32(out, *v as u32);
            }
            ScVal::U64(v) => {
                put_u32(out, TAG_U64);
                put_u64(out, *v);
            }
            ScVal::I64(v) => {
                put_u32(out, TAG_I64);
                put_i64(out, *v);
            }
            ScVal::Timepoint(v) => {
                put_u32(out, TAG_TIMEPOINT);
                put_u64(out, *v);
            }
            ScVal::Duration(v) => {
                put_u32(out, TAG_DURATION);
                put_u64(out, *v);
            }
            ScVal::U128(v) => {
                put_u32(out, TAG_U128);
                put_u64(out, (*v >> 64) as u64);
                put_u64(out, *v as u64);
            }
            ScVal::I128(v) => {
                put_u32(out, TAG_I128);
                // Arithmetic shift keeps the sign in the high word.
                put_i64(out, (*v >> 64) as i64);
                put_u64(out, *v as u64);
            }
            ScVal::Bytes(b) => {
                put_u32(out, TAG_BYTES);
                put_var_bytes(out, b);
            }
            ScVal::String(s) => {
                put_u32(out, TAG_STRING);
                put_var_bytes(out, s.as_bytes());
            }
            ScVal::Symbol(s) => {
                put_u32(out, TAG_SYMBOL);
                put_var_bytes(out, s.as_bytes());
            }
            ScVal::Vec(items) => {
                put_u32(out, TAG_VEC);
                put_u32(out, 1);
                put_u32(out, items.len() as u32);
                for item in items {
                    item.write_xdr(out)?;
                }
            }
            ScVal::Map(entries) => {
                put_u32(out, TAG_MAP);
                put_u32(out, 1);
                put_u32(out, entries.len() as u32);
                for (key, val) in entries {
                    key.write_xdr(out)?;
                    val.write_xdr(out)?;
                }
            }
            ScVal::Address(s) => {
                put_u32(out, TAG_ADDRESS);
                if s.starts_with('C') {
                    put_u32(out, 1);
                    out.extend_from_slice(&strkey::decode_contract(s)?);
                } else {
                    put_u32(out, 0);
                    put_u32(out, 0);
                    out.extend_from_slice(&strkey::decode_account(s)?);
                }
            }
            ScVal::Unsupported(tag) => return Err(EncodeError::Unsupported(*tag)),
        }
        Ok(())
    }

    /// Decode the pre-expanded JSON structure some RPC deployments return
    /// instead of XDR blobs.
    pub fn from_json(value: &Json) -> Result<Self, DecodeError> {
        let kind = value.get("type").and_then(Json::as_str).unwrap_or("");
        let inner = value.get("value").unwrap_or(&Json::Null);
        let decoded = match kind {
            "bool" => ScVal::Bool(inner.as_bool().unwrap_or(false)),
            "void" => ScVal::Void,
            "u32" => ScVal::U32(json_int(inner).unwrap_or(0) as u32),
            "i32" => ScVal::I32(json_int(inner).unwrap_or(0) as i32),
            "u64" => ScVal::U64(json_int(inner).unwrap_or(0) as u64),
            "i64" => ScVal::I64(json_int(inner).unwrap_or(0) as i64),
            "u128" => ScVal::U128(json_u128(inner)),
            "i128" => ScVal::I128(json_i128(inner)),
            "string" => ScVal::String(json_text(inner)),
            "symbol" => ScVal::Symbol(json_text(inner)),
            "address" => ScVal::Address(json_text(inner)),
            "bytes" => {
                let raw = json_text(inner);
                match hex::decode(&raw) {
                    Ok(bytes) => ScVal::Bytes(bytes),
                    Err(_) => ScVal::String(raw),
                }
            }
            "vec" => {
                let items = inner
                    .as_array()
                    .map(|a| a.iter().map(Self::from_json).collect::<Result<_, _>>())
                    .transpose()?
                    .unwrap_or_default();
                ScVal::Vec(items)
            }
            "map" => {
                let mut entries = Vec::new();
                if let Some(array) = inner.as_array() {
                    for entry in array {
                        let key = entry.get("key").map(Self::from_json).transpose()?;
                        let val = entry.get("val").map(Self::from_json).transpose()?;
                        if let (Some(key), Some(val)) = (key, val) {
                            entries.push((key, val));
                        }
                    }
                }
                ScVal::Map(entries)
            }
            _ => ScVal::Unsupported(JSON_UNKNOWN_TAG),
        };
        Ok(decoded)
    }

    /// Text view: symbols, strings, addresses, and hex-rendered bytes.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ScVal::Symbol(s) | ScVal::String(s) | ScVal::Address(s) => Some(s.clone()),
            ScVal::Bytes(b) => Some(hex::encode(b)),
            _ => None,
        }
    }

    /// Unsigned 128-bit view of any integer value. Negative values are
    /// out of range.
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            ScVal::U32(v) => Some(*v as u128),
            ScVal::I32(v) => u128::try_from(*v).ok(),
            ScVal::U64(v) | ScVal::Timepoint(v) | ScVal::Duration(v) => Some(*v as u128),
            ScVal::I64(v) => u128::try_from(*v).ok(),
            ScVal::U128(v) => Some(*v),
            ScVal::I128(v) => u128::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Unsigned 64-bit view of any integer value that fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_u128().and_then(|v| u64::try_from(v).ok())
    }

    /// Unsigned 32-bit view of any integer value that fits.
    pub fn as_u32(&self) -> Option<u32> {
        self.as_u128().and_then(|v| u32::try_from(v).ok())
    }

    /// Map entries, if this value is a map.
    pub fn entries(&self) -> Option<&[(ScVal, ScVal)]> {
        match self {
            ScVal::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Element slice, if this value is a vector.
    pub fn items(&self) -> Option<&[ScVal]> {
        match self {
            ScVal::Vec(items) => Some(items),
            _ => None,
        }
    }
}

/// Signed 128-bit from JSON: either a `{"hi", "lo"}` pair of 64-bit words,
/// or a plain number/decimal string.
fn json_i128(value: &Json) -> i128 {
    if value.is_object() {
        let (hi, lo) = json_words(value);
        ((hi as i64 as i128) << 64) | lo as i128
    } else {
        json_int(value).unwrap_or(0)
    }
}

fn json_u128(value: &Json) -> u128 {
    if value.is_object() {
        let (hi, lo) = json_words(value);
        ((hi as u128) << 64) | lo as u128
    } else {
        match value {
            Json::String(s) => s.trim().parse().unwrap_or(0),
            other => other.as_u64().map(u128::from).unwrap_or(0),
        }
    }
}

/// Extract the raw 64-bit words of a `{"hi", "lo"}` pair. Either word may be
/// written as a signed value or as its unsigned bit pattern.
fn json_words(value: &Json) -> (u64, u64) {
    let hi = value.get("hi").and_then(json_int).unwrap_or(0);
    let lo = value.get("lo").and_then(json_int).unwrap_or(0);
    (hi as u64, lo as u64)
}

fn json_int(value: &Json) -> Option<i128> {
    match value {
        Json::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_text(value: &Json) -> String {
    value.as_str().unwrap_or_default().to_string()
}

// ===== XDR primitives =====

struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() - self.pos < n {
            return Err(DecodeError::Truncated(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_32(&mut self) -> Result<[u8; 32], DecodeError> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.take(32)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64()? as i64)
    }

    /// Element count with a sanity bound against the remaining buffer, so a
    /// corrupt length cannot trigger a huge allocation.
    fn read_count(&mut self) -> Result<usize, DecodeError> {
        let count = self.read_u32()? as usize;
        if count > (self.buf.len() - self.pos) / 4 {
            return Err(DecodeError::Truncated(self.pos));
        }
        Ok(count)
    }

    fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        let data = self.take(len)?.to_vec();
        let pad = (4 - len % 4) % 4;
        self.take(pad)?;
        Ok(data)
    }

    fn read_utf8(&mut self) -> Result<String, DecodeError> {
        String::from_utf8(self.read_var_bytes()?).map_err(|_| DecodeError::Utf8)
    }
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    put_u32(out, data.len() as u32);
    out.extend_from_slice(data);
    let pad = (4 - data.len() % 4) % 4;
    out.extend_from_slice(&[0u8; 3][..pad]);
}
