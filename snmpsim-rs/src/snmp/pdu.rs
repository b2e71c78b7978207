//! SNMP v1/v2c message structure.

use super::ber::{self, tag, DecodeError, Reader};

// ── Error status ──────────────────────────────────────────────────────────

pub mod status {
    pub const NO_ERROR: i64 = 0;
    pub const NO_SUCH_NAME: i64 = 2;
    pub const BAD_VALUE: i64 = 3;
    pub const READ_ONLY: i64 = 4;
    pub const GEN_ERR: i64 = 5;
    pub const WRONG_TYPE: i64 = 7;
    pub const NOT_WRITABLE: i64 = 17;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2c,
}

impl Version {
    fn from_wire(n: i64) -> Result<Self, DecodeError> {
        match n {
            0 => Ok(Version::V1),
            1 => Ok(Version::V2c),
            other => Err(DecodeError::Unsupported(format!("SNMP version {other}"))),
        }
    }

    fn to_wire(self) -> i64 {
        match self {
            Version::V1 => 0,
            Version::V2c => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    Get,
    GetNext,
    Set,
    Response,
}

impl PduKind {
    fn from_tag(t: u8) -> Result<Self, DecodeError> {
        match t {
            tag::GET_REQUEST => Ok(PduKind::Get),
            tag::GET_NEXT_REQUEST => Ok(PduKind::GetNext),
            tag::SET_REQUEST => Ok(PduKind::Set),
            tag::GET_RESPONSE => Ok(PduKind::Response),
            tag::GET_BULK_REQUEST => Err(DecodeError::Unsupported("GetBulkRequest".into())),
            other => Err(DecodeError::Unsupported(format!("PDU type {other:#04x}"))),
        }
    }

    fn tag(self) -> u8 {
        match self {
            PduKind::Get => tag::GET_REQUEST,
            PduKind::GetNext => tag::GET_NEXT_REQUEST,
            PduKind::Set => tag::SET_REQUEST,
            PduKind::Response => tag::GET_RESPONSE,
        }
    }
}

/// The value half of a variable binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Null,
    Integer(i64),
    OctetString(Vec<u8>),
    Oid(Vec<u32>),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl VarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            VarValue::Null => "null",
            VarValue::Integer(_) => "integer",
            VarValue::OctetString(_) => "octet string",
            VarValue::Oid(_) => "oid",
            VarValue::IpAddress(_) => "ipaddress",
            VarValue::Counter32(_) => "counter",
            VarValue::Gauge32(_) => "gauge",
            VarValue::TimeTicks(_) => "timeticks",
            VarValue::NoSuchObject => "noSuchObject",
            VarValue::NoSuchInstance => "noSuchInstance",
            VarValue::EndOfMibView => "endOfMibView",
        }
    }

    fn decode(t: u8, contents: &[u8]) -> Result<Self, DecodeError> {
        Ok(match t {
            tag::NULL => VarValue::Null,
            tag::INTEGER => VarValue::Integer(ber::decode_integer(contents)?),
            tag::OCTET_STRING => VarValue::OctetString(contents.to_vec()),
            tag::OID => VarValue::Oid(ber::decode_oid(contents)?),
            tag::IP_ADDRESS => {
                let octets: [u8; 4] = contents.try_into().map_err(|_| DecodeError::BadLength)?;
                VarValue::IpAddress(octets)
            }
            tag::COUNTER32 => VarValue::Counter32(ber::decode_unsigned(contents)?),
            tag::GAUGE32 => VarValue::Gauge32(ber::decode_unsigned(contents)?),
            tag::TIMETICKS => VarValue::TimeTicks(ber::decode_unsigned(contents)?),
            tag::NO_SUCH_OBJECT => VarValue::NoSuchObject,
            tag::NO_SUCH_INSTANCE => VarValue::NoSuchInstance,
            tag::END_OF_MIB_VIEW => VarValue::EndOfMibView,
            other => return Err(DecodeError::Unsupported(format!("value type {other:#04x}"))),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            VarValue::Null => ber::write_tlv(out, tag::NULL, &[]),
            VarValue::Integer(n) => ber::write_integer(out, tag::INTEGER, *n),
            VarValue::OctetString(bytes) => ber::write_tlv(out, tag::OCTET_STRING, bytes),
            VarValue::Oid(arcs) => ber::write_oid(out, arcs),
            VarValue::IpAddress(octets) => ber::write_tlv(out, tag::IP_ADDRESS, octets),
            VarValue::Counter32(n) => ber::write_integer(out, tag::COUNTER32, i64::from(*n)),
            VarValue::Gauge32(n) => ber::write_integer(out, tag::GAUGE32, i64::from(*n)),
            VarValue::TimeTicks(n) => ber::write_integer(out, tag::TIMETICKS, i64::from(*n)),
            VarValue::NoSuchObject => ber::write_tlv(out, tag::NO_SUCH_OBJECT, &[]),
            VarValue::NoSuchInstance => ber::write_tlv(out, tag::NO_SUCH_INSTANCE, &[]),
            VarValue::EndOfMibView => ber::write_tlv(out, tag::END_OF_MIB_VIEW, &[]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Vec<u32>,
    pub value: VarValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i64,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: Version,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let mut outer = Reader::new(datagram);
        let body = outer.expect(tag::SEQUENCE)?;
        if !outer.is_empty() {
            return Err(DecodeError::Trailing);
        }

        let mut r = Reader::new(body);
        let version = Version::from_wire(r.read_integer()?)?;
        let community = r.read_octets()?.to_vec();
        let (pdu_tag, pdu_body) = r.read_tlv()?;
        let kind = PduKind::from_tag(pdu_tag)?;

        let mut p = Reader::new(pdu_body);
        let request_id = p.read_integer()?;
        let error_status = p.read_integer()?;
        let error_index = p.read_integer()?;
        let mut list = Reader::new(p.expect(tag::SEQUENCE)?);
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut vb = Reader::new(list.expect(tag::SEQUENCE)?);
            let oid = vb.read_oid()?;
            let (t, contents) = vb.read_tlv()?;
            varbinds.push(VarBind {
                oid,
                value: VarValue::decode(t, contents)?,
            });
        }

        Ok(Message {
            version,
            community,
            pdu: Pdu {
                kind,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        ber::write_nested(&mut out, tag::SEQUENCE, |msg| {
            ber::write_integer(msg, tag::INTEGER, self.version.to_wire());
            ber::write_tlv(msg, tag::OCTET_STRING, &self.community);
            ber::write_nested(msg, self.pdu.kind.tag(), |pdu| {
                ber::write_integer(pdu, tag::INTEGER, self.pdu.request_id);
                ber::write_integer(pdu, tag::INTEGER, self.pdu.error_status);
                ber::write_integer(pdu, tag::INTEGER, self.pdu.error_index);
                ber::write_nested(pdu, tag::SEQUENCE, |list| {
                    for vb in &self.pdu.varbinds {
                        ber::write_nested(list, tag::SEQUENCE, |item| {
                            ber::write_oid(item, &vb.oid);
                            vb.value.encode(item);
                        });
                    }
                });
            });
        });
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// `snmpget -v1 -c public host .1.3.6.1.2.1.1.1.0`, captured.
    const V1_GET: &[u8] = &[
        0x30, 0x26, 0x02, 0x01, 0x00, 0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', 0xa0,
        0x19, 0x02, 0x01, 0x2a, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30, 0x0c,
        0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
    ];

    #[test]
    fn decode_v1_get() {
        let msg = Message::decode(V1_GET).unwrap();
        assert_eq!(msg.version, Version::V1);
        assert_eq!(msg.community, b"public");
        assert_eq!(msg.pdu.kind, PduKind::Get);
        assert_eq!(msg.pdu.request_id, 42);
        assert_eq!(
            msg.pdu.varbinds,
            vec![VarBind {
                oid: vec![1, 3, 6, 1, 2, 1, 1, 1, 0],
                value: VarValue::Null,
            }]
        );
    }

    #[test]
    fn encode_reproduces_capture() {
        let msg = Message::decode(V1_GET).unwrap();
        assert_eq!(msg.encode(), V1_GET);
    }

    #[test]
    fn response_values_survive_decoding() {
        let msg = Message {
            version: Version::V2c,
            community: b"private".to_vec(),
            pdu: Pdu {
                kind: PduKind::Response,
                request_id: -7,
                error_status: status::NO_ERROR,
                error_index: 0,
                varbinds: vec![
                    VarBind { oid: vec![1, 3, 1], value: VarValue::Counter32(u32::MAX) },
                    VarBind { oid: vec![1, 3, 2], value: VarValue::IpAddress([10, 0, 0, 1]) },
                    VarBind { oid: vec![1, 3, 3], value: VarValue::EndOfMibView },
                    VarBind { oid: vec![1, 3, 4], value: VarValue::OctetString(vec![0; 200]) },
                ],
            },
        };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn rejects_v3_and_getbulk() {
        let mut v3 = V1_GET.to_vec();
        v3[4] = 3;
        assert!(matches!(Message::decode(&v3), Err(DecodeError::Unsupported(_))));

        let mut bulk = V1_GET.to_vec();
        bulk[4] = 1;
        bulk[13] = tag::GET_BULK_REQUEST;
        assert!(matches!(Message::decode(&bulk), Err(DecodeError::Unsupported(_))));
    }

    #[test]
    fn rejects_trailing_and_truncated() {
        let mut long = V1_GET.to_vec();
        long.push(0);
        assert_eq!(Message::decode(&long), Err(DecodeError::Trailing));
        assert!(Message::decode(&V1_GET[..20]).is_err());
    }
}
