//! Statement and expression tree.
//!
//! Every node is owned by exactly one parent and nothing is mutated after
//! parsing, so the interpreter can re-walk loop bodies freely.

use super::types::TypeTable;

/// A parsed script: its declarations and the `run … endrun` body.
#[derive(Debug, Clone)]
pub struct Program {
    pub types: TypeTable,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Loop { kind: LoopKind, body: Vec<Stmt> },
    /// `if` plus any `elseif` arms, in source order, and the `else` block
    /// (empty when absent).
    If {
        arms: Vec<(BoolExpr, Vec<Stmt>)>,
        otherwise: Vec<Stmt>,
    },
    Assign { target: Target, value: Expr },
    Print(StrExpr),
    Sleep { duration: IntExpr, unit: TimeUnit },
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    /// Runs until `exit`.
    Forever,
    /// Count evaluated once, on entry.
    Times(IntExpr),
    /// Condition re-evaluated before every iteration.
    While(BoolExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Secs,
    Msecs,
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Var(String),
    /// `block:field` on a composite variable.
    Field { var: String, field: String },
}

impl Target {
    pub fn var(&self) -> &str {
        match self {
            Target::Var(v) | Target::Field { var: v, .. } => v,
        }
    }
}

/// Right-hand side of an assignment; the variant is chosen by the declared
/// kind of the target.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(IntExpr),
    Bool(BoolExpr),
    Str(StrExpr),
    Bits(BitsExpr),
}

// ── Integer grammar ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
    Times,
    Divide,
}

/// `term { (+|-) term }`. The first term always carries [`AddOp::Plus`].
#[derive(Debug, Clone, PartialEq)]
pub struct IntExpr {
    pub terms: Vec<(AddOp, IntTerm)>,
}

/// `factor { (*|/) factor }`. The first factor always carries [`MulOp::Times`].
#[derive(Debug, Clone, PartialEq)]
pub struct IntTerm {
    pub factors: Vec<(MulOp, IntFactor)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntFactor {
    /// Literal, or an alias resolved while parsing.
    Const(i64),
    Var(String),
    Field { var: String, field: String },
    Neg(Box<IntFactor>),
    Group(Box<IntExpr>),
}

impl IntExpr {
    /// Single-literal expression.
    pub fn constant(n: i64) -> Self {
        IntExpr {
            terms: vec![(
                AddOp::Plus,
                IntTerm {
                    factors: vec![(MulOp::Times, IntFactor::Const(n))],
                },
            )],
        }
    }
}

// ── Boolean grammar ───────────────────────────────────────────────────────────

/// `term { | term }`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolExpr {
    pub terms: Vec<BoolTerm>,
}

/// `factor { & factor }`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolTerm {
    pub factors: Vec<BoolFactor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoolFactor {
    Const(bool),
    Var(String),
    Not(Box<BoolFactor>),
    Group(Box<BoolExpr>),
    Compare(Box<Comparison>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: IntExpr,
    pub op: CmpOp,
    pub rhs: IntExpr,
}

// ── String grammar ────────────────────────────────────────────────────────────

/// `term { + term }`, concatenated left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct StrExpr {
    pub terms: Vec<StrTerm>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrTerm {
    Literal(String),
    Var(String),
    Group(Box<StrExpr>),
    FromInt(IntExpr),
    FromBool(BoolExpr),
    FromBits(BitsExpr),
}

// ── Bitset grammar ────────────────────────────────────────────────────────────

/// `term { + term }`, where `+` is set union.
#[derive(Debug, Clone, PartialEq)]
pub struct BitsExpr {
    pub terms: Vec<BitsTerm>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BitsTerm {
    /// `[pos, pos, …]`
    Set(Vec<IntExpr>),
    Var(String),
    Group(Box<BitsExpr>),
}
