//! Scriptable SNMP device simulator.
//!
//! A small domain-specific script models device state; the resulting values
//! live in a [`store::ValueStore`] that a minimal SNMP responder serves to a
//! remote manager while the script keeps running.
//!
//! ```rust
//! use snmpsim::script::{parse_program, Interpreter};
//! use snmpsim::store::ValueStore;
//! use std::sync::Arc;
//!
//! let program = parse_program("var\n n: 1.1 counter\nendvar\nrun\n n = 41 + 1\nendrun\n").unwrap();
//! let (store, inbox) = ValueStore::load(&program.types);
//! let store = Arc::new(store);
//! let mut interp = Interpreter::new(&program, Arc::clone(&store), inbox, Vec::new());
//! interp.run().unwrap();
//! assert_eq!(store.get(".1.3.6.1.2.1.1.1"), Some(snmpsim::value::Value::Counter(42)));
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod logging;
pub mod script;
pub mod server;
pub mod snmp;
pub mod store;
pub mod value;
