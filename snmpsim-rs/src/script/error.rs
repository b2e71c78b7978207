//! Load-time and run-time errors raised by the script engine.

use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

/// A failure while turning script text into a [`Program`](super::ast::Program).
///
/// Type errors are reported through [`ScriptError::Parse`] as well: the
/// parser consults the type table while choosing productions, so a
/// mistyped identifier is simply a production that does not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("lexical error at line {line}: {message}")]
    Lex { line: usize, message: String },
    #[error("parse failed at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl ScriptError {
    /// Source line the error was reported at.
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Lex { line, .. } | ScriptError::Parse { line, .. } => *line,
        }
    }
}

/// A fatal error raised while interpreting a program. Any of these aborts
/// the whole run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("sleep duration must not be negative (got {0})")]
    NegativeSleep(i64),
    #[error("bit position {0} is out of range")]
    BitPosition(i64),
    #[error("field `{field}` of `{name}`: value {value} does not fit in {size} byte(s)")]
    FieldOverflow {
        name: String,
        field: String,
        value: i64,
        size: usize,
    },
    #[error("cannot convert value of `{name}`: {source}")]
    Codec {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error("store rejected write to `{name}`: {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("variable `{0}` has no value in the store")]
    Missing(String),
    #[error("rendezvous for `{0}` closed")]
    RendezvousClosed(String),
}
