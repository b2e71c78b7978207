//! Value Codec: conversions between evaluated expressions and store values.
//!
//! Bitsets are packed most-significant-bit first: position `p` lives in
//! byte `p / 8`, bit `7 - p % 8`. Composite blocks store each field
//! least-significant byte first at its declared offset. Both layouts are
//! decided here and nowhere else.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::script::types::{Field, Kind, Layout, VarType, MAX_BLOCK_SIZE};
use crate::value::{Scalar, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{value} is out of range for {kind}")]
    OutOfRange { kind: Kind, value: i64 },
    #[error("malformed {kind} value {text:?}")]
    Malformed { kind: Kind, text: String },
    #[error("expected {expected} byte(s), got {got}")]
    WrongSize { expected: usize, got: usize },
    #[error("field `{field}` is {size} byte(s) wide; {value} does not fit")]
    FieldWidth { field: String, size: usize, value: u64 },
    #[error("{kind} cannot hold a {found} value")]
    KindMismatch { kind: Kind, found: &'static str },
}

// ── Bitsets ───────────────────────────────────────────────────────────────────

/// Highest bit position whose packed form still fits an OCTET STRING.
pub const MAX_BIT_POSITION: u32 = (MAX_BLOCK_SIZE * 8 - 1) as u32;

/// A script integer as a bit position, if it is one.
pub fn bit_position(n: i64) -> Option<u32> {
    u32::try_from(n).ok().filter(|&p| p <= MAX_BIT_POSITION)
}

/// Pack bit positions into `⌈(max+1)/8⌉` bytes. The empty set packs to no
/// bytes at all.
pub fn encode_bits(bits: &BTreeSet<u32>) -> Vec<u8> {
    let Some(&max) = bits.last() else {
        return Vec::new();
    };
    let mut out = vec![0u8; max as usize / 8 + 1];
    for &pos in bits {
        out[pos as usize / 8] |= 0x80 >> (pos % 8);
    }
    out
}

pub fn decode_bits(bytes: &[u8]) -> BTreeSet<u32> {
    let mut bits = BTreeSet::new();
    for (i, &byte) in bytes.iter().enumerate() {
        for j in 0..8u32 {
            if byte & (0x80 >> j) != 0 {
                bits.insert(i as u32 * 8 + j);
            }
        }
    }
    bits
}

/// `{1,2,5}`
pub fn format_bits(bits: &BTreeSet<u32>) -> String {
    let inner: Vec<String> = bits.iter().map(u32::to_string).collect();
    format!("{{{}}}", inner.join(","))
}

// ── Composite blocks ──────────────────────────────────────────────────────────

/// Write one field into a packed block.
pub fn pack_field(block: &mut [u8], field: &Field, value: u64) -> Result<(), CodecError> {
    if field.size < 8 && value >> (8 * field.size) != 0 {
        return Err(CodecError::FieldWidth {
            field: field.name.clone(),
            size: field.size,
            value,
        });
    }
    let end = field.offset + field.size;
    if block.len() < end {
        return Err(CodecError::WrongSize {
            expected: end,
            got: block.len(),
        });
    }
    block[field.offset..end].copy_from_slice(&value.to_le_bytes()[..field.size]);
    Ok(())
}

/// Read one field out of a packed block.
pub fn unpack_field(block: &[u8], field: &Field) -> Result<u64, CodecError> {
    let end = field.offset + field.size;
    let bytes = block.get(field.offset..end).ok_or(CodecError::WrongSize {
        expected: end,
        got: block.len(),
    })?;
    let mut buf = [0u8; 8];
    buf[..field.size].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Pack named field values into a fresh block. Fields missing from `values`
/// are zero.
pub fn pack_fields(layout: &Layout, values: &BTreeMap<String, u64>) -> Result<Vec<u8>, CodecError> {
    let mut block = vec![0u8; layout.size()];
    for field in layout.fields() {
        if let Some(&v) = values.get(&field.name) {
            pack_field(&mut block, field, v)?;
        }
    }
    Ok(block)
}

pub fn unpack_fields(layout: &Layout, block: &[u8]) -> Result<BTreeMap<String, u64>, CodecError> {
    if block.len() != layout.size() {
        return Err(CodecError::WrongSize {
            expected: layout.size(),
            got: block.len(),
        });
    }
    layout
        .fields()
        .iter()
        .map(|f| Ok((f.name.clone(), unpack_field(block, f)?)))
        .collect()
}

// ── Object identifiers and addresses ─────────────────────────────────────────

/// Parse a dotted OID; the leading `.` is optional. At least two arcs are
/// required and the first must be 0, 1 or 2.
pub fn parse_oid(text: &str) -> Result<Vec<u32>, CodecError> {
    let malformed = || CodecError::Malformed {
        kind: Kind::Oid,
        text: text.to_owned(),
    };
    let body = text.strip_prefix('.').unwrap_or(text);
    let arcs = body
        .split('.')
        .map(|arc| arc.parse::<u32>().map_err(|_| malformed()))
        .collect::<Result<Vec<_>, _>>()?;
    if arcs.len() < 2 || arcs[0] > 2 {
        return Err(malformed());
    }
    Ok(arcs)
}

pub fn format_oid(arcs: &[u32]) -> String {
    arcs.iter().map(|a| format!(".{a}")).collect()
}

pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr, CodecError> {
    text.trim().parse().map_err(|_| CodecError::Malformed {
        kind: Kind::IpAddress,
        text: text.to_owned(),
    })
}

// ── Kind re-tagging ───────────────────────────────────────────────────────────

const TRUTH_TRUE: i64 = 1;
const TRUTH_FALSE: i64 = 2;

fn unsigned(kind: Kind, n: i64) -> Result<u32, CodecError> {
    u32::try_from(n).map_err(|_| CodecError::OutOfRange { kind, value: n })
}

/// Initial store value for a freshly declared variable.
pub fn zero(ty: &VarType) -> Value {
    match ty.kind {
        Kind::Integer => Value::Integer(0),
        Kind::Boolean => Value::Integer(TRUTH_FALSE),
        Kind::String => Value::Str(String::new()),
        Kind::Counter => Value::Counter(0),
        Kind::Gauge => Value::Gauge(0),
        Kind::TimeTicks => Value::TimeTicks(0),
        Kind::Oid => Value::Oid(".0.0".to_owned()),
        Kind::IpAddress => Value::IpAddress(Ipv4Addr::UNSPECIFIED),
        Kind::Bitset => Value::Bits(BTreeSet::new()),
        Kind::Bytes => Value::Composite(vec![0; ty.layout.as_ref().map_or(0, Layout::size)]),
    }
}

/// Convert an evaluated expression to the store representation of `kind`.
pub fn to_store(kind: Kind, scalar: Scalar) -> Result<Value, CodecError> {
    let mismatch = |found: &Scalar| CodecError::KindMismatch {
        kind,
        found: found.type_name(),
    };
    match (kind, scalar) {
        (Kind::Integer, Scalar::Int(n)) => {
            if i32::try_from(n).is_err() {
                return Err(CodecError::OutOfRange { kind, value: n });
            }
            Ok(Value::Integer(n))
        }
        (Kind::Counter, Scalar::Int(n)) => Ok(Value::Counter(unsigned(kind, n)?)),
        (Kind::Gauge, Scalar::Int(n)) => Ok(Value::Gauge(unsigned(kind, n)?)),
        (Kind::TimeTicks, Scalar::Int(n)) => Ok(Value::TimeTicks(unsigned(kind, n)?)),
        (Kind::Boolean, Scalar::Bool(b)) => {
            Ok(Value::Integer(if b { TRUTH_TRUE } else { TRUTH_FALSE }))
        }
        (Kind::String, Scalar::Str(s)) => Ok(Value::Str(s)),
        (Kind::Oid, Scalar::Str(s)) => Ok(Value::Oid(format_oid(&parse_oid(&s)?))),
        (Kind::IpAddress, Scalar::Str(s)) => Ok(Value::IpAddress(parse_ipv4(&s)?)),
        (Kind::Bitset, Scalar::Bits(bits)) => Ok(Value::Bits(bits)),
        (_, other) => Err(mismatch(&other)),
    }
}

/// Convert a store value back to an expression value of `kind`.
pub fn from_store(kind: Kind, value: &Value) -> Result<Scalar, CodecError> {
    match (kind, value) {
        (Kind::Boolean, Value::Integer(n)) => match *n {
            TRUTH_TRUE => Ok(Scalar::Bool(true)),
            TRUTH_FALSE => Ok(Scalar::Bool(false)),
            other => Err(CodecError::OutOfRange { kind, value: other }),
        },
        (Kind::Integer, Value::Integer(n)) => Ok(Scalar::Int(*n)),
        (Kind::Counter, Value::Counter(n))
        | (Kind::Gauge, Value::Gauge(n))
        | (Kind::TimeTicks, Value::TimeTicks(n)) => Ok(Scalar::Int(i64::from(*n))),
        (Kind::String, Value::Str(s)) | (Kind::Oid, Value::Oid(s)) => Ok(Scalar::Str(s.clone())),
        (Kind::IpAddress, Value::IpAddress(a)) => Ok(Scalar::Str(a.to_string())),
        (Kind::Bitset, Value::Bits(bits)) => Ok(Scalar::Bits(bits.clone())),
        (_, other) => Err(CodecError::KindMismatch {
            kind,
            found: other.type_name(),
        }),
    }
}

/// Check that an externally supplied value is a legal value of `ty`.
pub fn check_kind(ty: &VarType, value: &Value) -> Result<(), CodecError> {
    match (ty.kind, value) {
        (Kind::Integer, Value::Integer(n)) => i32::try_from(*n)
            .map(drop)
            .map_err(|_| CodecError::OutOfRange { kind: ty.kind, value: *n }),
        (Kind::Boolean, Value::Integer(n)) => match *n {
            TRUTH_TRUE | TRUTH_FALSE => Ok(()),
            other => Err(CodecError::OutOfRange { kind: ty.kind, value: other }),
        },
        (Kind::String, Value::Str(_))
        | (Kind::Counter, Value::Counter(_))
        | (Kind::Gauge, Value::Gauge(_))
        | (Kind::TimeTicks, Value::TimeTicks(_))
        | (Kind::IpAddress, Value::IpAddress(_))
        | (Kind::Bitset, Value::Bits(_)) => Ok(()),
        (Kind::Oid, Value::Oid(s)) => parse_oid(s).map(drop),
        (Kind::Bytes, Value::Composite(block)) => {
            let expected = ty.layout.as_ref().map_or(0, Layout::size);
            if block.len() == expected {
                Ok(())
            } else {
                Err(CodecError::WrongSize {
                    expected,
                    got: block.len(),
                })
            }
        }
        (_, other) => Err(CodecError::KindMismatch {
            kind: ty.kind,
            found: other.type_name(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
