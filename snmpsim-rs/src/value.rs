//! Store-level and expression-level values.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

// ── Value ─────────────────────────────────────────────────────────────────────

/// A value held in the [`ValueStore`](crate::store::ValueStore), tagged with
/// its protocol representation.
///
/// Booleans have no variant of their own; they are stored as a TruthValue
/// integer (1 = true, 2 = false).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Str(String),
    Counter(u32),
    Gauge(u32),
    TimeTicks(u32),
    /// Dotted form with a leading `.`.
    Oid(String),
    IpAddress(Ipv4Addr),
    Bits(BTreeSet<u32>),
    /// Packed composite block, exactly the layout's size.
    Composite(Vec<u8>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Str(_) => "string",
            Value::Counter(_) => "counter",
            Value::Gauge(_) => "gauge",
            Value::TimeTicks(_) => "timeticks",
            Value::Oid(_) => "oid",
            Value::IpAddress(_) => "ipaddress",
            Value::Bits(_) => "bitset",
            Value::Composite(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Counter(n) | Value::Gauge(n) | Value::TimeTicks(n) => write!(f, "{n}"),
            Value::Oid(s) => f.write_str(s),
            Value::IpAddress(a) => write!(f, "{a}"),
            Value::Bits(bits) => f.write_str(&crate::codec::format_bits(bits)),
            Value::Composite(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Counter(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<Ipv4Addr> for Value {
    fn from(a: Ipv4Addr) -> Self {
        Value::IpAddress(a)
    }
}

// ── Scalar ────────────────────────────────────────────────────────────────────

/// The result of evaluating one expression, before it is re-tagged for the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Int(i64),
    Bool(bool),
    Str(String),
    Bits(BTreeSet<u32>),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Int(_) => "integer",
            Scalar::Bool(_) => "boolean",
            Scalar::Str(_) => "string",
            Scalar::Bits(_) => "bitset",
        }
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(Value::IpAddress(Ipv4Addr::new(10, 0, 0, 1)).to_string(), "10.0.0.1");
        assert_eq!(Value::Bits([5, 1].into_iter().collect()).to_string(), "{1,5}");
        assert_eq!(Value::Composite(vec![0x01, 0xab]).to_string(), "01 ab");
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Gauge(1).type_name(), "gauge");
        assert_eq!(Scalar::from(true).type_name(), "boolean");
    }
}
