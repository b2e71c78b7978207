//! Minimal SNMP v1/v2c agent: Get, GetNext and Set over the value store.
//!
//! Traps, GetBulk and v3 are not implemented; such requests are dropped.

pub mod agent;
pub mod ber;
pub mod pdu;

pub use agent::Agent;
pub use ber::DecodeError;
pub use pdu::{Message, Pdu, PduKind, VarBind, VarValue, Version};
