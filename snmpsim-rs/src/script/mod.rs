//! Device scripting language.
//!
//! A script is a `var … endvar` declaration block followed by a
//! `run … endrun` body:
//!
//! - Declarations name each variable's kind, optional OID, aliases,
//!   composite layout and access mode.
//! - Statements: assignment, `if`/`elseif`/`else`, `loop` (forever,
//!   `times n`, or while a condition holds), `print`, `sleep`, `exit`.
//! - Four expression grammars (integer, boolean, string, bitset), chosen by
//!   the declared kind of the assignment target.
//!
//! # Quick start
//!
//! ```rust
//! use snmpsim::script::{parse_program, Interpreter};
//! use snmpsim::store::ValueStore;
//! use std::sync::Arc;
//!
//! let src = "var\n s: string\nendvar\nrun\n s = \"x=\" + strInt(6 * 7)\n print s\nendrun\n";
//! let program = parse_program(src).unwrap();
//! let (store, inbox) = ValueStore::load(&program.types);
//! let mut interp = Interpreter::new(&program, Arc::new(store), inbox, Vec::new());
//! interp.run().unwrap();
//! assert_eq!(interp.console(), &vec!["x=42".to_owned()]);
//! ```

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod types;

// Re-exports for convenience.
pub use ast::Program;
pub use error::{RuntimeError, ScriptError};
pub use interp::{Console, Interpreter, Stdout};
pub use parser::{parse_program, Parser, DEFAULT_BASE_OID};
pub use types::{Access, Kind, TypeTable, VarType};
