//! The subset of ASN.1 BER that SNMP v1/v2c messages use.
//!
//! [`Reader`] walks definite-length TLVs over a borrowed buffer; the
//! `write_*` functions append encodings to a `Vec<u8>`.

use thiserror::Error;

// ── Tags ──────────────────────────────────────────────────────────────────

pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;

    // Application types (RFC 2578).
    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIMETICKS: u8 = 0x43;

    // v2c varbind exceptions (RFC 3416).
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;

    // PDU types.
    pub const GET_REQUEST: u8 = 0xa0;
    pub const GET_NEXT_REQUEST: u8 = 0xa1;
    pub const GET_RESPONSE: u8 = 0xa2;
    pub const SET_REQUEST: u8 = 0xa3;
    pub const GET_BULK_REQUEST: u8 = 0xa5;
}

/// A datagram that is not a well-formed message we understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message truncated")]
    Truncated,
    #[error("unsupported length encoding")]
    BadLength,
    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("integer does not fit in 64 bits")]
    IntegerTooLong,
    #[error("malformed object identifier")]
    BadOid,
    #[error("trailing bytes after message")]
    Trailing,
    #[error("unsupported {0}")]
    Unsupported(String),
}

// ── Reader ────────────────────────────────────────────────────────────────

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, DecodeError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let count = (first & 0x7f) as usize;
        if count == 0 || count > 4 {
            return Err(DecodeError::BadLength);
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.byte()? as usize;
        }
        Ok(len)
    }

    /// Next TLV as `(tag, contents)`.
    pub fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), DecodeError> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self.pos.checked_add(len).ok_or(DecodeError::BadLength)?;
        let contents = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok((tag, contents))
    }

    /// Next TLV, which must carry `expected`.
    pub fn expect(&mut self, expected: u8) -> Result<&'a [u8], DecodeError> {
        let (found, contents) = self.read_tlv()?;
        if found != expected {
            return Err(DecodeError::UnexpectedTag { expected, found });
        }
        Ok(contents)
    }

    pub fn read_integer(&mut self) -> Result<i64, DecodeError> {
        decode_integer(self.expect(tag::INTEGER)?)
    }

    pub fn read_octets(&mut self) -> Result<&'a [u8], DecodeError> {
        self.expect(tag::OCTET_STRING)
    }

    pub fn read_oid(&mut self) -> Result<Vec<u32>, DecodeError> {
        decode_oid(self.expect(tag::OID)?)
    }
}

// ── Content decoders ──────────────────────────────────────────────────────

/// Two's-complement big-endian integer.
pub fn decode_integer(bytes: &[u8]) -> Result<i64, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Truncated);
    }
    if bytes.len() > 8 {
        return Err(DecodeError::IntegerTooLong);
    }
    let mut n: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        n = (n << 8) | i64::from(b);
    }
    Ok(n)
}

/// Unsigned 32-bit application value (Counter32, Gauge32, TimeTicks).
pub fn decode_unsigned(bytes: &[u8]) -> Result<u32, DecodeError> {
    let n = decode_integer(bytes)?;
    u32::try_from(n).map_err(|_| DecodeError::IntegerTooLong)
}

pub fn decode_oid(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    let mut raw = Vec::new();
    let mut acc: u32 = 0;
    let mut pending = false;
    for &b in bytes {
        if acc > (u32::MAX >> 7) {
            return Err(DecodeError::BadOid);
        }
        acc = (acc << 7) | u32::from(b & 0x7f);
        pending = b & 0x80 != 0;
        if !pending {
            raw.push(acc);
            acc = 0;
        }
    }
    if pending || raw.is_empty() {
        return Err(DecodeError::BadOid);
    }
    let first = raw[0];
    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = vec![a, b];
    arcs.extend_from_slice(&raw[1..]);
    Ok(arcs)
}

// ── Writers ───────────────────────────────────────────────────────────────

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

pub fn write_tlv(out: &mut Vec<u8>, tag: u8, contents: &[u8]) {
    out.push(tag);
    write_length(out, contents.len());
    out.extend_from_slice(contents);
}

/// Constructed TLV whose contents are produced by `body`.
pub fn write_nested(out: &mut Vec<u8>, tag: u8, body: impl FnOnce(&mut Vec<u8>)) {
    let mut inner = Vec::new();
    body(&mut inner);
    write_tlv(out, tag, &inner);
}

/// Minimal two's-complement encoding under `tag`.
pub fn write_integer(out: &mut Vec<u8>, tag: u8, n: i64) {
    let bytes = n.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xff && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    write_tlv(out, tag, &bytes[start..]);
}

pub fn write_oid(out: &mut Vec<u8>, arcs: &[u32]) {
    let mut contents = Vec::new();
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (a.saturating_mul(40).saturating_add(*b), rest),
        [a] => (a.saturating_mul(40), &[][..]),
        [] => (0, &[][..]),
    };
    for arc in std::iter::once(first).chain(rest.iter().copied()) {
        push_base128(&mut contents, arc);
    }
    write_tlv(out, tag::OID, &contents);
}

fn push_base128(out: &mut Vec<u8>, mut arc: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    loop {
        groups[n] = (arc & 0x7f) as u8;
        n += 1;
        arc >>= 7;
        if arc == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        out.push(groups[i] | if i > 0 { 0x80 } else { 0 });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn int_bytes(n: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_integer(&mut out, tag::INTEGER, n);
        out
    }

    #[test]
    fn integer_minimal_encoding() {
        assert_eq!(int_bytes(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(int_bytes(127), vec![0x02, 0x01, 0x7f]);
        assert_eq!(int_bytes(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(int_bytes(-1), vec![0x02, 0x01, 0xff]);
        assert_eq!(int_bytes(-129), vec![0x02, 0x02, 0xff, 0x7f]);
        assert_eq!(
            int_bytes(u32::MAX as i64),
            vec![0x02, 0x05, 0x00, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn integer_decode_sign() {
        assert_eq!(decode_integer(&[0xff]).unwrap(), -1);
        assert_eq!(decode_integer(&[0x00, 0x80]).unwrap(), 128);
        assert_eq!(decode_integer(&[0xff, 0x7f]).unwrap(), -129);
        assert!(decode_integer(&[]).is_err());
        assert!(decode_unsigned(&[0xff]).is_err());
    }

    #[test]
    fn oid_encoding() {
        let mut out = Vec::new();
        write_oid(&mut out, &[1, 3, 6, 1, 2, 1, 1, 5, 0]);
        assert_eq!(out, vec![0x06, 0x08, 0x2b, 6, 1, 2, 1, 1, 5, 0]);

        let mut out = Vec::new();
        write_oid(&mut out, &[1, 3, 6, 1, 4, 1, 2680]);
        assert_eq!(&out[2..], &[0x2b, 6, 1, 4, 1, 0x94, 0x78]);
        assert_eq!(decode_oid(&out[2..]).unwrap(), vec![1, 3, 6, 1, 4, 1, 2680]);
    }

    #[test]
    fn oid_rejects_dangling_continuation() {
        assert_eq!(decode_oid(&[0x2b, 0x86]), Err(DecodeError::BadOid));
        assert_eq!(decode_oid(&[]), Err(DecodeError::BadOid));
    }

    #[test]
    fn long_form_length() {
        let mut out = Vec::new();
        write_tlv(&mut out, tag::OCTET_STRING, &[7u8; 300]);
        assert_eq!(&out[..4], &[0x04, 0x82, 0x01, 0x2c]);
        let mut r = Reader::new(&out);
        assert_eq!(r.read_octets().unwrap().len(), 300);
        assert!(r.is_empty());
    }

    #[test]
    fn truncated_input() {
        let mut r = Reader::new(&[0x04, 0x05, 1, 2]);
        assert_eq!(r.read_octets(), Err(DecodeError::Truncated));
        let mut r = Reader::new(&[0x02, 0x01, 5]);
        assert!(matches!(r.read_oid(), Err(DecodeError::UnexpectedTag { .. })));
    }
}
