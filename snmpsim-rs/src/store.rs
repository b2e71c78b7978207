//! Value Store shared by the interpreter and the SNMP responder.
//!
//! Each variable owns one [`DashMap`] slot; a get or set locks only that
//! slot's shard, so operations on one OID are atomic and operations on
//! different OIDs are unordered. Variables declared `blocking` also get a
//! zero-capacity channel: the responder's set is handed to the interpreter
//! and does not touch the slot until the interpreter consumes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvError, SendTimeoutError, Sender};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, CodecError};
use crate::script::types::{Access, Field, Kind, TypeTable, VarType};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no object at {0}")]
    UnknownOid(String),
    #[error("wrong value for {target}: {source}")]
    TypeMismatch {
        target: String,
        #[source]
        source: CodecError,
    },
    #[error("{0} cannot be set")]
    Unsupported(String),
    #[error("{0} is read-only")]
    NotWritable(String),
    #[error("nothing is waiting for a value at {0}")]
    Closed(String),
}

/// How often a parked blocking set checks whether the store was closed.
const HANDOFF_POLL: Duration = Duration::from_millis(50);

// ── Inbox ─────────────────────────────────────────────────────────────────────

/// Interpreter-side ends of the rendezvous channels, one per blocking
/// variable. Dropping the inbox makes every pending and future blocking set
/// fail with [`StoreError::Closed`].
#[derive(Debug, Default)]
pub struct Inbox {
    slots: HashMap<String, Receiver<Value>>,
}

impl Inbox {
    pub fn is_blocking(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Wait for the next externally set value of `name`. `None` if the
    /// variable is not blocking.
    pub fn recv(&self, name: &str) -> Option<Result<Value, RecvError>> {
        self.slots.get(name).map(Receiver::recv)
    }
}

// ── ValueStore ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ValueStore {
    slots: DashMap<String, Value>,
    types: TypeTable,
    /// Exported variables in numeric OID order, for get-next.
    exported: Vec<(Vec<u32>, String)>,
    handoff: HashMap<String, Sender<Value>>,
    closed: AtomicBool,
}

impl ValueStore {
    /// Create a slot for every declared variable, holding that kind's zero
    /// value.
    pub fn load(types: &TypeTable) -> (ValueStore, Inbox) {
        let slots = DashMap::new();
        let mut exported = Vec::new();
        let mut handoff = HashMap::new();
        let mut inbox = Inbox::default();

        for (name, ty) in types.iter() {
            slots.insert(name.to_owned(), codec::zero(ty));
            if let Some(oid) = &ty.oid {
                // Declared OIDs were normalised by the parser.
                if let Ok(arcs) = codec::parse_oid(oid) {
                    exported.push((arcs, name.to_owned()));
                }
            }
            if ty.access == Access::Blocking {
                let (tx, rx) = channel::bounded(0);
                handoff.insert(name.to_owned(), tx);
                inbox.slots.insert(name.to_owned(), rx);
            }
        }
        exported.sort();

        let store = ValueStore {
            slots,
            types: types.clone(),
            exported,
            handoff,
            closed: AtomicBool::new(false),
        };
        (store, inbox)
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    // ── Interpreter side ──────────────────────────────────────────────────────

    /// Current value of a variable, by name.
    pub fn read(&self, name: &str) -> Option<Value> {
        self.slots.get(name).map(|v| v.clone())
    }

    /// Replace a variable's value. The value must match the declared kind.
    pub fn write(&self, name: &str, value: Value) -> Result<(), StoreError> {
        let ty = self
            .types
            .get(name)
            .ok_or_else(|| StoreError::UnknownOid(name.to_owned()))?;
        codec::check_kind(ty, &value).map_err(|source| StoreError::TypeMismatch {
            target: name.to_owned(),
            source,
        })?;
        debug!(var = name, %value, "store write");
        self.slots.insert(name.to_owned(), value);
        Ok(())
    }

    /// Read one field of a composite variable.
    pub fn read_field(&self, name: &str, field: &Field) -> Result<u64, StoreError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| StoreError::UnknownOid(name.to_owned()))?;
        match &*slot {
            Value::Composite(block) => {
                codec::unpack_field(block, field).map_err(|source| StoreError::TypeMismatch {
                    target: name.to_owned(),
                    source,
                })
            }
            other => Err(StoreError::TypeMismatch {
                target: name.to_owned(),
                source: CodecError::KindMismatch {
                    kind: Kind::Bytes,
                    found: other.type_name(),
                },
            }),
        }
    }

    /// Rewrite one field of a composite variable in place, holding the slot
    /// lock for the whole read-modify-write.
    pub fn write_field(&self, name: &str, field: &Field, value: u64) -> Result<(), StoreError> {
        let mut slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownOid(name.to_owned()))?;
        let mismatch = |source| StoreError::TypeMismatch {
            target: name.to_owned(),
            source,
        };
        match &mut *slot {
            Value::Composite(block) => codec::pack_field(block, field, value).map_err(mismatch)?,
            other => {
                return Err(mismatch(CodecError::KindMismatch {
                    kind: Kind::Bytes,
                    found: other.type_name(),
                }))
            }
        }
        debug!(var = name, field = %field.name, value, "store field write");
        Ok(())
    }

    // ── Responder side ────────────────────────────────────────────────────────

    pub fn var_type(&self, oid: &str) -> Option<&VarType> {
        self.types
            .name_for_oid(oid)
            .and_then(|name| self.types.get(name))
    }

    /// Value exported at `oid`, if any.
    pub fn get(&self, oid: &str) -> Option<Value> {
        self.types.name_for_oid(oid).and_then(|name| self.read(name))
    }

    /// First exported OID strictly after `oid` in numeric order, with its
    /// value. `oid` need not exist.
    pub fn next(&self, oid: &[u32]) -> Option<(Vec<u32>, Value)> {
        let start = self.exported.partition_point(|(arcs, _)| arcs.as_slice() <= oid);
        self.exported[start..]
            .iter()
            .find_map(|(arcs, name)| self.read(name).map(|v| (arcs.clone(), v)))
    }

    /// Exported OIDs in numeric order.
    pub fn oids(&self) -> impl Iterator<Item = &[u32]> {
        self.exported.iter().map(|(arcs, _)| arcs.as_slice())
    }

    /// Fail every pending and future blocking set with [`StoreError::Closed`].
    /// Called on shutdown so no responder worker stays parked on a handoff.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Apply an external set.
    ///
    /// Blocking variables hand the value to the interpreter and return only
    /// once it has been received, or once the store is closed.
    pub fn set(&self, oid: &str, value: Value) -> Result<(), StoreError> {
        let name = self
            .types
            .name_for_oid(oid)
            .ok_or_else(|| StoreError::UnknownOid(oid.to_owned()))?;
        let ty = self
            .types
            .get(name)
            .ok_or_else(|| StoreError::UnknownOid(oid.to_owned()))?;

        if ty.access == Access::ReadOnly {
            return Err(StoreError::NotWritable(oid.to_owned()));
        }
        if ty.kind == Kind::Counter {
            return Err(StoreError::Unsupported(oid.to_owned()));
        }
        codec::check_kind(ty, &value).map_err(|source| StoreError::TypeMismatch {
            target: oid.to_owned(),
            source,
        })?;

        match self.handoff.get(name) {
            Some(tx) => {
                debug!(%oid, var = name, %value, "handing set to interpreter");
                let mut value = value;
                while !self.closed.load(Ordering::Acquire) {
                    match tx.send_timeout(value, HANDOFF_POLL) {
                        Ok(()) => return Ok(()),
                        Err(SendTimeoutError::Timeout(v)) => value = v,
                        Err(SendTimeoutError::Disconnected(_)) => break,
                    }
                }
                Err(StoreError::Closed(oid.to_owned()))
            }
            None => {
                debug!(%oid, var = name, %value, "external set");
                self.slots.insert(name.to_owned(), value);
                Ok(())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
