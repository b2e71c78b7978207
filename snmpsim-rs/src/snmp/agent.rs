//! Request handling against the [`ValueStore`].
//!
//! [`Agent::process`] is pure apart from the store: one datagram in, at most
//! one datagram out. A set on a blocking variable does not return until the
//! interpreter has taken the value, so callers run it off the async
//! executor.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::pdu::{status, Message, Pdu, PduKind, VarBind, VarValue, Version};
use crate::codec::{self, CodecError};
use crate::script::types::{Kind, VarType};
use crate::store::{StoreError, ValueStore};
use crate::value::Value;

pub struct Agent {
    store: Arc<ValueStore>,
    read_community: Vec<u8>,
    write_community: Vec<u8>,
}

impl Agent {
    pub fn new(store: Arc<ValueStore>, read_community: &str, write_community: &str) -> Self {
        Agent {
            store,
            read_community: read_community.as_bytes().to_vec(),
            write_community: write_community.as_bytes().to_vec(),
        }
    }

    /// Handle one datagram. `None` means drop it without answering.
    pub fn process(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        let request = match Message::decode(datagram) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, len = datagram.len(), "dropping undecodable datagram");
                return None;
            }
        };
        self.handle(request).map(|response| response.encode())
    }

    pub fn handle(&self, request: Message) -> Option<Message> {
        let writer = request.community == self.write_community;
        let reader = writer || request.community == self.read_community;
        let allowed = match request.pdu.kind {
            PduKind::Get | PduKind::GetNext => reader,
            PduKind::Set => writer,
            PduKind::Response => {
                debug!("ignoring unsolicited response");
                return None;
            }
        };
        if !allowed {
            warn!(
                community = %String::from_utf8_lossy(&request.community),
                kind = ?request.pdu.kind,
                "community rejected"
            );
            return None;
        }

        debug!(
            kind = ?request.pdu.kind,
            id = request.pdu.request_id,
            varbinds = request.pdu.varbinds.len(),
            "request"
        );
        let version = request.version;
        let pdu = match request.pdu.kind {
            PduKind::Get => self.get(version, request.pdu),
            PduKind::GetNext => self.get_next(version, request.pdu),
            _ => self.set(version, request.pdu),
        };
        Some(Message {
            version,
            community: request.community,
            pdu,
        })
    }

    fn get(&self, version: Version, request: Pdu) -> Pdu {
        let mut varbinds = Vec::with_capacity(request.varbinds.len());
        for (i, vb) in request.varbinds.iter().enumerate() {
            let oid = codec::format_oid(&vb.oid);
            let value = match self.store.get(&oid) {
                Some(v) => to_wire(&v),
                None if version == Version::V1 => {
                    return error(&request, status::NO_SUCH_NAME, i);
                }
                None => VarValue::NoSuchObject,
            };
            varbinds.push(VarBind { oid: vb.oid.clone(), value });
        }
        response(request.request_id, varbinds)
    }

    fn get_next(&self, version: Version, request: Pdu) -> Pdu {
        let mut varbinds = Vec::with_capacity(request.varbinds.len());
        for (i, vb) in request.varbinds.iter().enumerate() {
            match self.store.next(&vb.oid) {
                Some((oid, v)) => varbinds.push(VarBind { oid, value: to_wire(&v) }),
                None if version == Version::V1 => {
                    return error(&request, status::NO_SUCH_NAME, i);
                }
                None => varbinds.push(VarBind {
                    oid: vb.oid.clone(),
                    value: VarValue::EndOfMibView,
                }),
            }
        }
        response(request.request_id, varbinds)
    }

    /// Every binding is checked before any is applied.
    fn set(&self, version: Version, request: Pdu) -> Pdu {
        let mut staged = Vec::with_capacity(request.varbinds.len());
        for (i, vb) in request.varbinds.iter().enumerate() {
            let oid = codec::format_oid(&vb.oid);
            let converted = match self.store.var_type(&oid) {
                None => Err(StoreError::UnknownOid(oid.clone())),
                Some(ty) => from_wire(ty, &vb.value).map_err(|source| StoreError::TypeMismatch {
                    target: oid.clone(),
                    source,
                }),
            };
            match converted {
                Ok(value) => staged.push((oid, value)),
                Err(e) => {
                    warn!(%oid, error = %e, "set rejected");
                    return error(&request, set_status(version, &e), i);
                }
            }
        }

        for (i, (oid, value)) in staged.into_iter().enumerate() {
            if let Err(e) = self.store.set(&oid, value) {
                warn!(%oid, error = %e, "set rejected");
                return error(&request, set_status(version, &e), i);
            }
        }
        response(request.request_id, request.varbinds)
    }
}

fn response(request_id: i64, varbinds: Vec<VarBind>) -> Pdu {
    Pdu {
        kind: PduKind::Response,
        request_id,
        error_status: status::NO_ERROR,
        error_index: 0,
        varbinds,
    }
}

/// Error response echoing the request's bindings; `index` is zero-based.
fn error(request: &Pdu, error_status: i64, index: usize) -> Pdu {
    Pdu {
        kind: PduKind::Response,
        request_id: request.request_id,
        error_status,
        error_index: index as i64 + 1,
        varbinds: request.varbinds.clone(),
    }
}

fn set_status(version: Version, err: &StoreError) -> i64 {
    match (version, err) {
        (Version::V1, StoreError::UnknownOid(_)) => status::NO_SUCH_NAME,
        (Version::V1, StoreError::TypeMismatch { .. }) => status::BAD_VALUE,
        (Version::V1, StoreError::NotWritable(_) | StoreError::Unsupported(_)) => status::READ_ONLY,
        (Version::V2c, StoreError::TypeMismatch { .. }) => status::WRONG_TYPE,
        (
            Version::V2c,
            StoreError::UnknownOid(_) | StoreError::NotWritable(_) | StoreError::Unsupported(_),
        ) => status::NOT_WRITABLE,
        (_, StoreError::Closed(_)) => status::GEN_ERR,
    }
}

// ── Value mapping ─────────────────────────────────────────────────────────

pub fn to_wire(value: &Value) -> VarValue {
    match value {
        Value::Integer(n) => VarValue::Integer(*n),
        Value::Str(s) => VarValue::OctetString(s.as_bytes().to_vec()),
        Value::Counter(n) => VarValue::Counter32(*n),
        Value::Gauge(n) => VarValue::Gauge32(*n),
        Value::TimeTicks(n) => VarValue::TimeTicks(*n),
        Value::Oid(s) => VarValue::Oid(codec::parse_oid(s).unwrap_or_else(|_| vec![0, 0])),
        Value::IpAddress(a) => VarValue::IpAddress(a.octets()),
        Value::Bits(bits) => VarValue::OctetString(codec::encode_bits(bits)),
        Value::Composite(block) => VarValue::OctetString(block.clone()),
    }
}

/// Interpret a wire value as a value of the variable's declared kind.
pub fn from_wire(ty: &VarType, value: &VarValue) -> Result<Value, CodecError> {
    let converted = match (ty.kind, value) {
        (Kind::Integer | Kind::Boolean, VarValue::Integer(n)) => Value::Integer(*n),
        (Kind::Counter, VarValue::Counter32(n)) => Value::Counter(*n),
        (Kind::Gauge, VarValue::Gauge32(n)) => Value::Gauge(*n),
        (Kind::TimeTicks, VarValue::TimeTicks(n)) => Value::TimeTicks(*n),
        (Kind::String, VarValue::OctetString(bytes)) => {
            Value::Str(String::from_utf8(bytes.clone()).map_err(|_| CodecError::Malformed {
                kind: Kind::String,
                text: String::from_utf8_lossy(bytes).into_owned(),
            })?)
        }
        (Kind::Oid, VarValue::Oid(arcs)) => Value::Oid(codec::format_oid(arcs)),
        (Kind::IpAddress, VarValue::IpAddress(octets)) => Value::IpAddress(Ipv4Addr::from(*octets)),
        (Kind::Bitset, VarValue::OctetString(bytes)) => Value::Bits(codec::decode_bits(bytes)),
        (Kind::Bytes, VarValue::OctetString(bytes)) => Value::Composite(bytes.clone()),
        (kind, other) => {
            return Err(CodecError::KindMismatch {
                kind,
                found: other.type_name(),
            })
        }
    };
    codec::check_kind(ty, &converted)?;
    Ok(converted)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn agent(decls: &str) -> Agent {
        let program = parse_program(&format!("var\n{decls}\nendvar\nrun\nendrun\n")).unwrap();
        let (store, _inbox) = ValueStore::load(&program.types);
        Agent::new(Arc::new(store), "public", "private")
    }

    fn request(version: Version, community: &str, kind: PduKind, varbinds: Vec<VarBind>) -> Message {
        Message {
            version,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                kind,
                request_id: 9,
                error_status: 0,
                error_index: 0,
                varbinds,
            },
        }
    }

    fn null(oid: &[u32]) -> VarBind {
        VarBind { oid: oid.to_vec(), value: VarValue::Null }
    }

    const X: [u32; 7] = [1, 3, 6, 1, 2, 1, 1];
    const Y: [u32; 7] = [1, 3, 6, 1, 2, 1, 2];

    #[test]
    fn get_known_value() {
        let a = agent("x: 1 counter\n y: 2 string");
        let resp = a.handle(request(Version::V2c, "public", PduKind::Get, vec![null(&X), null(&Y)])).unwrap();
        assert_eq!(resp.pdu.error_status, status::NO_ERROR);
        assert_eq!(resp.pdu.varbinds[0].value, VarValue::Counter32(0));
        assert_eq!(resp.pdu.varbinds[1].value, VarValue::OctetString(vec![]));
    }

    #[test]
    fn get_unknown_by_version() {
        let a = agent("x: 1 integer");
        let v1 = a.handle(request(Version::V1, "public", PduKind::Get, vec![null(&X), null(&Y)])).unwrap();
        assert_eq!(v1.pdu.error_status, status::NO_SUCH_NAME);
        assert_eq!(v1.pdu.error_index, 2);

        let v2 = a.handle(request(Version::V2c, "public", PduKind::Get, vec![null(&Y)])).unwrap();
        assert_eq!(v2.pdu.error_status, status::NO_ERROR);
        assert_eq!(v2.pdu.varbinds[0].value, VarValue::NoSuchObject);
    }

    #[test]
    fn get_next_walks_then_ends() {
        let a = agent("x: 1 integer\n y: 2 integer");
        let resp = a.handle(request(Version::V2c, "public", PduKind::GetNext, vec![null(&[1, 3])])).unwrap();
        assert_eq!(resp.pdu.varbinds[0].oid, X.to_vec());
        let resp = a.handle(request(Version::V2c, "public", PduKind::GetNext, vec![null(&X)])).unwrap();
        assert_eq!(resp.pdu.varbinds[0].oid, Y.to_vec());
        let resp = a.handle(request(Version::V2c, "public", PduKind::GetNext, vec![null(&Y)])).unwrap();
        assert_eq!(resp.pdu.varbinds[0].value, VarValue::EndOfMibView);
        let resp = a.handle(request(Version::V1, "public", PduKind::GetNext, vec![null(&Y)])).unwrap();
        assert_eq!(resp.pdu.error_status, status::NO_SUCH_NAME);
    }

    #[test]
    fn community_checks() {
        let a = agent("x: 1 integer readwrite");
        assert!(a.handle(request(Version::V2c, "wrong", PduKind::Get, vec![null(&X)])).is_none());
        assert!(a.handle(request(Version::V2c, "private", PduKind::Get, vec![null(&X)])).is_some());
        let set = vec![VarBind { oid: X.to_vec(), value: VarValue::Integer(4) }];
        assert!(a.handle(request(Version::V2c, "public", PduKind::Set, set.clone())).is_none());
        assert!(a.handle(request(Version::V2c, "private", PduKind::Set, set)).is_some());
    }

    #[test]
    fn set_updates_store() {
        let a = agent("x: 1 integer readwrite\n bits: 2 bitset readwrite");
        let set = vec![
            VarBind { oid: X.to_vec(), value: VarValue::Integer(-4) },
            VarBind { oid: Y.to_vec(), value: VarValue::OctetString(vec![0x60]) },
        ];
        let resp = a.handle(request(Version::V2c, "private", PduKind::Set, set.clone())).unwrap();
        assert_eq!(resp.pdu.error_status, status::NO_ERROR);
        assert_eq!(resp.pdu.varbinds, set);
        assert_eq!(a.store.read("x"), Some(Value::Integer(-4)));
        assert_eq!(a.store.read("bits"), Some(Value::Bits([1, 2].into_iter().collect())));
    }

    #[test]
    fn set_errors_by_version() {
        let a = agent("x: 1 integer\n y: 2 integer readwrite");
        let ro = vec![VarBind { oid: X.to_vec(), value: VarValue::Integer(1) }];
        let wrong = vec![VarBind { oid: Y.to_vec(), value: VarValue::OctetString(b"no".to_vec()) }];

        let r = a.handle(request(Version::V1, "private", PduKind::Set, ro.clone())).unwrap();
        assert_eq!((r.pdu.error_status, r.pdu.error_index), (status::READ_ONLY, 1));
        let r = a.handle(request(Version::V2c, "private", PduKind::Set, ro)).unwrap();
        assert_eq!(r.pdu.error_status, status::NOT_WRITABLE);
        let r = a.handle(request(Version::V1, "private", PduKind::Set, wrong.clone())).unwrap();
        assert_eq!(r.pdu.error_status, status::BAD_VALUE);
        let r = a.handle(request(Version::V2c, "private", PduKind::Set, wrong)).unwrap();
        assert_eq!(r.pdu.error_status, status::WRONG_TYPE);
    }

    #[test]
    fn set_is_all_or_nothing_on_type_errors() {
        let a = agent("x: 1 integer readwrite\n y: 2 integer readwrite");
        let set = vec![
            VarBind { oid: X.to_vec(), value: VarValue::Integer(5) },
            VarBind { oid: Y.to_vec(), value: VarValue::Gauge32(5) },
        ];
        let r = a.handle(request(Version::V2c, "private", PduKind::Set, set)).unwrap();
        assert_eq!((r.pdu.error_status, r.pdu.error_index), (status::WRONG_TYPE, 2));
        assert_eq!(a.store.read("x"), Some(Value::Integer(0)));
    }

    #[test]
    fn boolean_set_must_be_truth_value() {
        let a = agent("b: 1 boolean readwrite");
        let set = |n| vec![VarBind { oid: X.to_vec(), value: VarValue::Integer(n) }];
        let r = a.handle(request(Version::V2c, "private", PduKind::Set, set(3))).unwrap();
        assert_eq!(r.pdu.error_status, status::WRONG_TYPE);
        let r = a.handle(request(Version::V2c, "private", PduKind::Set, set(1))).unwrap();
        assert_eq!(r.pdu.error_status, status::NO_ERROR);
    }

    #[test]
    fn garbage_is_dropped() {
        let a = agent("x: 1 integer");
        assert!(a.process(&[0x30, 0x03, 0x02, 0x01]).is_none());
        assert!(a.process(&[]).is_none());
    }

    #[test]
    fn datagram_round_trip() {
        let a = agent("x: 1 gauge");
        let req = request(Version::V1, "public", PduKind::Get, vec![null(&X)]).encode();
        let resp = Message::decode(&a.process(&req).unwrap()).unwrap();
        assert_eq!(resp.pdu.kind, PduKind::Response);
        assert_eq!(resp.pdu.request_id, 9);
        assert_eq!(resp.pdu.varbinds[0].value, VarValue::Gauge32(0));
    }
}
