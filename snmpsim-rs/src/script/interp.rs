//! Tree-walking interpreter.
//!
//! The [`Interpreter`] walks a parsed [`Program`] on the calling thread.
//! Every variable read goes to the [`ValueStore`] and every assignment is
//! converted by the codec and written back, so the responder always sees
//! the latest value. Any [`RuntimeError`] aborts the whole run.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::ast::{
    AddOp, BitsExpr, BitsTerm, BoolExpr, BoolFactor, CmpOp, Expr, IntExpr, IntFactor, IntTerm,
    LoopKind, MulOp, Program, Stmt, StrExpr, StrTerm, Target, TimeUnit,
};
use super::error::RuntimeError;
use super::types::{Field, Kind};
use crate::codec::{self, CodecError};
use crate::store::{Inbox, StoreError, ValueStore};
use crate::value::{Scalar, Value};

// ── Console ───────────────────────────────────────────────────────────────────

/// Sink for `print` output.
pub trait Console {
    fn print(&mut self, line: &str);
}

/// Collects lines; used by tests and embedders.
impl Console for Vec<String> {
    fn print(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// Writes each line to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Console for Stdout {
    fn print(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not stop the simulation.
        let _ = writeln!(out, "{line}");
    }
}

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-local exits out of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Exit,
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter<'p, C: Console> {
    program: &'p Program,
    store: Arc<ValueStore>,
    inbox: Inbox,
    console: C,
}

impl<'p, C: Console> Interpreter<'p, C> {
    pub fn new(program: &'p Program, store: Arc<ValueStore>, inbox: Inbox, console: C) -> Self {
        Interpreter {
            program,
            store,
            inbox,
            console,
        }
    }

    /// Run the program to completion, to `exit`, or to the first runtime
    /// error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let program = self.program;
        info!(statements = program.body.len(), "interpreter started");
        match self.exec_block(&program.body)? {
            Some(ControlFlow::Exit) => info!("interpreter exited"),
            None => info!("interpreter finished"),
        }
        Ok(())
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    // ── Statements ────────────────────────────────────────────────────────────

    pub fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Option<ControlFlow>, RuntimeError> {
        for stmt in stmts {
            if let Some(cf) = self.exec_stmt(stmt)? {
                return Ok(Some(cf));
            }
        }
        Ok(None)
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Option<ControlFlow>, RuntimeError> {
        match stmt {
            Stmt::Loop { kind, body } => self.exec_loop(kind, body),
            Stmt::If { arms, otherwise } => {
                for (cond, body) in arms {
                    if self.eval_bool(cond)? {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(otherwise)
            }
            Stmt::Assign { target, value } => {
                self.assign(target, value)?;
                Ok(None)
            }
            Stmt::Print(text) => {
                let line = self.eval_str(text)?;
                self.console.print(&line);
                Ok(None)
            }
            Stmt::Sleep { duration, unit } => {
                let n = self.eval_int(duration)?;
                let n = u64::try_from(n).map_err(|_| RuntimeError::NegativeSleep(n))?;
                let pause = match unit {
                    TimeUnit::Secs => Duration::from_secs(n),
                    TimeUnit::Msecs => Duration::from_millis(n),
                };
                debug!(?pause, "sleep");
                thread::sleep(pause);
                Ok(None)
            }
            Stmt::Exit => Ok(Some(ControlFlow::Exit)),
        }
    }

    fn exec_loop(&mut self, kind: &LoopKind, body: &[Stmt]) -> Result<Option<ControlFlow>, RuntimeError> {
        match kind {
            LoopKind::Forever => loop {
                if let Some(cf) = self.exec_block(body)? {
                    return Ok(Some(cf));
                }
            },
            LoopKind::Times(count) => {
                let n = self.eval_int(count)?;
                for _ in 0..n.max(0) {
                    if let Some(cf) = self.exec_block(body)? {
                        return Ok(Some(cf));
                    }
                }
                Ok(None)
            }
            LoopKind::While(cond) => {
                while self.eval_bool(cond)? {
                    if let Some(cf) = self.exec_block(body)? {
                        return Ok(Some(cf));
                    }
                }
                Ok(None)
            }
        }
    }

    fn assign(&mut self, target: &Target, value: &Expr) -> Result<(), RuntimeError> {
        let name = target.var();
        let kind = self.kind_of(name)?;

        if let Target::Field { field, .. } = target {
            let Expr::Int(expr) = value else {
                return Err(wrong_kind(name, Kind::Bytes, "non-integer"));
            };
            let n = self.eval_int(expr)?;
            let field = self.field_def(name, field)?;
            return self.write_field(name, field, n);
        }

        let scalar = match value {
            Expr::Int(e) => Scalar::Int(self.eval_int(e)?),
            Expr::Bool(e) => Scalar::Bool(self.eval_bool(e)?),
            Expr::Str(e) => Scalar::Str(self.eval_str(e)?),
            Expr::Bits(e) => Scalar::Bits(self.eval_bits(e)?),
        };
        let value = codec::to_store(kind, scalar).map_err(|source| RuntimeError::Codec {
            name: name.to_owned(),
            source,
        })?;
        self.store.write(name, value).map_err(|source| RuntimeError::Store {
            name: name.to_owned(),
            source,
        })
    }

    fn write_field(&mut self, name: &str, field: &Field, n: i64) -> Result<(), RuntimeError> {
        let overflow = || RuntimeError::FieldOverflow {
            name: name.to_owned(),
            field: field.name.clone(),
            value: n,
            size: field.size,
        };
        let raw = u64::try_from(n).map_err(|_| overflow())?;
        self.store
            .write_field(name, field, raw)
            .map_err(|source| match source {
                StoreError::TypeMismatch {
                    source: CodecError::FieldWidth { .. },
                    ..
                } => overflow(),
                source => RuntimeError::Store {
                    name: name.to_owned(),
                    source,
                },
            })
    }

    // ── Variable access ───────────────────────────────────────────────────────

    fn kind_of(&self, name: &str) -> Result<Kind, RuntimeError> {
        self.program
            .types
            .kind_of(name)
            .ok_or_else(|| RuntimeError::Missing(name.to_owned()))
    }

    fn field_def(&self, var: &str, field: &str) -> Result<&'p Field, RuntimeError> {
        let program: &'p Program = self.program;
        program
            .types
            .get(var)
            .and_then(|ty| ty.layout.as_ref())
            .and_then(|layout| layout.field(field))
            .ok_or_else(|| RuntimeError::Missing(format!("{var}:{field}")))
    }

    /// For a blocking variable, wait for the next external set and store it.
    fn take_handoff(&mut self, name: &str) -> Result<Option<Value>, RuntimeError> {
        match self.inbox.recv(name) {
            None => Ok(None),
            Some(Err(_)) => Err(RuntimeError::RendezvousClosed(name.to_owned())),
            Some(Ok(value)) => {
                debug!(var = name, %value, "received blocking set");
                self.store
                    .write(name, value.clone())
                    .map_err(|source| RuntimeError::Store {
                        name: name.to_owned(),
                        source,
                    })?;
                Ok(Some(value))
            }
        }
    }

    fn load(&mut self, name: &str) -> Result<Scalar, RuntimeError> {
        let kind = self.kind_of(name)?;
        let value = match self.take_handoff(name)? {
            Some(value) => value,
            None => self
                .store
                .read(name)
                .ok_or_else(|| RuntimeError::Missing(name.to_owned()))?,
        };
        codec::from_store(kind, &value).map_err(|source| RuntimeError::Codec {
            name: name.to_owned(),
            source,
        })
    }

    fn load_field(&mut self, var: &str, field: &str) -> Result<i64, RuntimeError> {
        self.take_handoff(var)?;
        let field = self.field_def(var, field)?;
        let raw = self
            .store
            .read_field(var, field)
            .map_err(|source| RuntimeError::Store {
                name: var.to_owned(),
                source,
            })?;
        i64::try_from(raw).map_err(|_| RuntimeError::Overflow)
    }

    // ── Integer expressions ───────────────────────────────────────────────────

    pub fn eval_int(&mut self, expr: &IntExpr) -> Result<i64, RuntimeError> {
        let mut acc: i64 = 0;
        for (op, term) in &expr.terms {
            let v = self.eval_term(term)?;
            acc = match op {
                AddOp::Plus => acc.checked_add(v),
                AddOp::Minus => acc.checked_sub(v),
            }
            .ok_or(RuntimeError::Overflow)?;
        }
        Ok(acc)
    }

    fn eval_term(&mut self, term: &IntTerm) -> Result<i64, RuntimeError> {
        let mut acc: i64 = 1;
        for (op, factor) in &term.factors {
            let v = self.eval_factor(factor)?;
            acc = match op {
                MulOp::Times => acc.checked_mul(v).ok_or(RuntimeError::Overflow)?,
                MulOp::Divide if v == 0 => return Err(RuntimeError::DivisionByZero),
                MulOp::Divide => acc.checked_div(v).ok_or(RuntimeError::Overflow)?,
            };
        }
        Ok(acc)
    }

    fn eval_factor(&mut self, factor: &IntFactor) -> Result<i64, RuntimeError> {
        match factor {
            IntFactor::Const(n) => Ok(*n),
            IntFactor::Var(name) => match self.load(name)? {
                Scalar::Int(n) => Ok(n),
                other => Err(wrong_kind(name, Kind::Integer, other.type_name())),
            },
            IntFactor::Field { var, field } => self.load_field(var, field),
            IntFactor::Neg(inner) => self
                .eval_factor(inner)?
                .checked_neg()
                .ok_or(RuntimeError::Overflow),
            IntFactor::Group(inner) => self.eval_int(inner),
        }
    }

    // ── Boolean expressions ───────────────────────────────────────────────────

    /// `|` and `&` short-circuit left to right.
    pub fn eval_bool(&mut self, expr: &BoolExpr) -> Result<bool, RuntimeError> {
        'terms: for term in &expr.terms {
            for factor in &term.factors {
                if !self.eval_bool_factor(factor)? {
                    continue 'terms;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn eval_bool_factor(&mut self, factor: &BoolFactor) -> Result<bool, RuntimeError> {
        match factor {
            BoolFactor::Const(b) => Ok(*b),
            BoolFactor::Var(name) => match self.load(name)? {
                Scalar::Bool(b) => Ok(b),
                other => Err(wrong_kind(name, Kind::Boolean, other.type_name())),
            },
            BoolFactor::Not(inner) => Ok(!self.eval_bool_factor(inner)?),
            BoolFactor::Group(inner) => self.eval_bool(inner),
            BoolFactor::Compare(cmp) => {
                let lhs = self.eval_int(&cmp.lhs)?;
                let rhs = self.eval_int(&cmp.rhs)?;
                Ok(match cmp.op {
                    CmpOp::Lt => lhs < rhs,
                    CmpOp::Gt => lhs > rhs,
                    CmpOp::Le => lhs <= rhs,
                    CmpOp::Ge => lhs >= rhs,
                    CmpOp::Eq => lhs == rhs,
                })
            }
        }
    }

    // ── String expressions ────────────────────────────────────────────────────

    pub fn eval_str(&mut self, expr: &StrExpr) -> Result<String, RuntimeError> {
        let mut out = String::new();
        for term in &expr.terms {
            match term {
                StrTerm::Literal(s) => out.push_str(s),
                StrTerm::Var(name) => match self.load(name)? {
                    Scalar::Str(s) => out.push_str(&s),
                    other => return Err(wrong_kind(name, Kind::String, other.type_name())),
                },
                StrTerm::Group(inner) => out.push_str(&self.eval_str(inner)?),
                StrTerm::FromInt(e) => out.push_str(&self.eval_int(e)?.to_string()),
                StrTerm::FromBool(e) => out.push_str(if self.eval_bool(e)? { "true" } else { "false" }),
                StrTerm::FromBits(e) => out.push_str(&codec::format_bits(&self.eval_bits(e)?)),
            }
        }
        Ok(out)
    }

    // ── Bitset expressions ────────────────────────────────────────────────────

    pub fn eval_bits(&mut self, expr: &BitsExpr) -> Result<BTreeSet<u32>, RuntimeError> {
        let mut out = BTreeSet::new();
        for term in &expr.terms {
            match term {
                BitsTerm::Set(positions) => {
                    for pos in positions {
                        let n = self.eval_int(pos)?;
                        out.insert(codec::bit_position(n).ok_or(RuntimeError::BitPosition(n))?);
                    }
                }
                BitsTerm::Var(name) => match self.load(name)? {
                    Scalar::Bits(bits) => out.extend(bits),
                    other => return Err(wrong_kind(name, Kind::Bitset, other.type_name())),
                },
                BitsTerm::Group(inner) => out.extend(self.eval_bits(inner)?),
            }
        }
        Ok(out)
    }
}

fn wrong_kind(name: &str, kind: Kind, found: &'static str) -> RuntimeError {
    RuntimeError::Codec {
        name: name.to_owned(),
        source: CodecError::KindMismatch { kind, found },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
