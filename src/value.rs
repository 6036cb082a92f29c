//! `TagValue`: the tagged-union value type shared by the cache, the driver
//! trait, and the wire encoding.
//!
//! The original source stores `{ type: neu_type_e, precision: uint8_t, value:
//! union {...} }`. Rust has no need for the union: each variant simply owns
//! its payload, and the "which union arm is active" question the C switch
//! statements answer is instead answered by the compiler.

use serde::{Deserialize, Serialize};

/// Maximum length, in bytes, of an encoded STRING/BYTES payload on the wire.
pub const WIRE_STRING_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    Int8 = 0,
    UInt8 = 1,
    Int16 = 2,
    UInt16 = 3,
    Int32 = 4,
    UInt32 = 5,
    Int64 = 6,
    UInt64 = 7,
    Bit = 8,
    Bool = 9,
    Float = 10,
    Double = 11,
    String = 12,
    Bytes = 13,
    Word = 14,
    DWord = 15,
    LWord = 16,
    Error = 17,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    /// A single addressable bit, stored widened to a byte.
    Bit(u8),
    Bool(bool),
    /// IEEE-754 single precision, with `precision` decimal digits used for
    /// change detection (0 = exact compare).
    Float { value: f32, precision: u8 },
    /// IEEE-754 double precision, same precision semantics as `Float`.
    Double { value: f64, precision: u8 },
    String(String),
    Bytes(Vec<u8>),
    Word(u16),
    DWord(u32),
    LWord(u64),
    /// A protocol/driver error code. Every `update` carrying this variant is
    /// always reported as changed, and `get_changed` latches it (see
    /// `TagCache::get_changed`).
    Error(i32),
}

impl TagValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            TagValue::Int8(_) => TypeTag::Int8,
            TagValue::UInt8(_) => TypeTag::UInt8,
            TagValue::Int16(_) => TypeTag::Int16,
            TagValue::UInt16(_) => TypeTag::UInt16,
            TagValue::Int32(_) => TypeTag::Int32,
            TagValue::UInt32(_) => TypeTag::UInt32,
            TagValue::Int64(_) => TypeTag::Int64,
            TagValue::UInt64(_) => TypeTag::UInt64,
            TagValue::Bit(_) => TypeTag::Bit,
            TagValue::Bool(_) => TypeTag::Bool,
            TagValue::Float { .. } => TypeTag::Float,
            TagValue::Double { .. } => TypeTag::Double,
            TagValue::String(_) => TypeTag::String,
            TagValue::Bytes(_) => TypeTag::Bytes,
            TagValue::Word(_) => TypeTag::Word,
            TagValue::DWord(_) => TypeTag::DWord,
            TagValue::LWord(_) => TypeTag::LWord,
            TagValue::Error(_) => TypeTag::Error,
        }
    }

    /// Decimal precision carried by the floating-point variants; `0` for
    /// every other variant (exact comparison is the only option for them).
    pub fn precision(&self) -> u8 {
        match self {
            TagValue::Float { precision, .. } => *precision,
            TagValue::Double { precision, .. } => *precision,
            _ => 0,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TagValue::Error(_))
    }

    /// Encode as `(type_tag, precision, payload)` per the spec's wire form.
    /// Strings/bytes are truncated and zero-padded to `WIRE_STRING_LEN`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + WIRE_STRING_LEN);
        out.push(self.type_tag() as u8);
        out.push(self.precision());
        match self {
            TagValue::Int8(v) => out.push(*v as u8),
            TagValue::UInt8(v) => out.push(*v),
            TagValue::Bit(v) => out.push(*v),
            TagValue::Bool(v) => out.push(*v as u8),
            TagValue::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Word(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::DWord(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Error(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Float { value, .. } => out.extend_from_slice(&value.to_le_bytes()),
            TagValue::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::LWord(v) => out.extend_from_slice(&v.to_le_bytes()),
            TagValue::Double { value, .. } => out.extend_from_slice(&value.to_le_bytes()),
            TagValue::String(s) => {
                let mut buf = [0u8; WIRE_STRING_LEN];
                let bytes = s.as_bytes();
                let n = bytes.len().min(WIRE_STRING_LEN - 1);
                buf[..n].copy_from_slice(&bytes[..n]);
                out.extend_from_slice(&buf);
            }
            TagValue::Bytes(b) => {
                let mut buf = [0u8; WIRE_STRING_LEN];
                let n = b.len().min(WIRE_STRING_LEN);
                buf[..n].copy_from_slice(&b[..n]);
                out.extend_from_slice(&buf);
            }
        }
        out
    }
}

/// Byte-wise change comparison for the integer/bool/bit/word family and for
/// string/bytes payloads: any difference in the encoded payload counts as a
/// change. Used by `TagCache::update` for every non-floating, non-error
/// variant (see the spec's `memcmp` branch in the original source).
pub(crate) fn payload_bytes_equal(a: &TagValue, b: &TagValue) -> bool {
    a.encode()[2..] == b.encode()[2..]
}
