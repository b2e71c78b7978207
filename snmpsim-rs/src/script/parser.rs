//! Recursive-descent parser with one token of lookahead.
//!
//! Parsing runs in two phases. The `var … endvar` block is read first and
//! fills the [`TypeTable`]; the statement body is then parsed against that
//! table. The declared kind of an assignment target picks the expression
//! grammar, and an identifier inside an expression must have the kind the
//! surrounding grammar expects, so type errors surface as parse errors at
//! the offending line.
//!
//! Grammar (informal):
//!
//! ```text
//! program     := [ 'var' NL { decl NL } 'endvar' NL ] 'run' NL block 'endrun' [NL] EOF
//! decl        := ident ':' [ oid | int ] kind [ aliases ] [ layout ] [ access ]
//! aliases     := '[' { ['-'] int '=' alias [','] } ']'
//! layout      := '{' ident ':' int int { ',' ident ':' int int } '}'
//! block       := { stmt }            ; ends at endrun|endloop|endif|else|elseif
//! stmt        := assign | if | loop | print | sleep | exit
//! if          := 'if' bool NL block { 'elseif' bool NL block } [ 'else' NL block ] 'endif' NL
//! loop        := 'loop' ( NL | 'times' int NL | bool NL ) block 'endloop' NL
//! assign      := ident [ ':' field ] '=' <expr of declared kind> NL
//! print       := 'print' str NL
//! sleep       := 'sleep' int ( 'secs' | 'msecs' ) NL
//! int         := int-term { ('+'|'-') int-term }
//! int-term    := int-factor { ('*'|'/') int-factor }
//! int-factor  := int | alias | ident [ ':' field ] | '-' int-factor | '(' int ')'
//! bool        := bool-term { '|' bool-term }
//! bool-term   := bool-factor { '&' bool-factor }
//! bool-factor := 'true' | 'false' | ident | '!' bool-factor | '(' bool ')' | int cmp int
//! str         := str-term { '+' str-term }
//! str-term    := string | ident | 'strInt' '(' int ')' | 'strBool' '(' bool ')'
//!              | 'strBits' '(' bits ')' | '(' str ')'
//! bits        := bits-term { '+' bits-term }
//! bits-term   := '[' [ int { ',' int } ] ']' | ident | '(' bits ')'
//! ```

use super::ast::{
    AddOp, BitsExpr, BitsTerm, BoolExpr, BoolFactor, BoolTerm, CmpOp, Comparison, Expr,
    IntExpr, IntFactor, IntTerm, LoopKind, MulOp, Program, Stmt, StrExpr, StrTerm, Target,
    TimeUnit,
};
use super::error::ScriptError;
use super::lexer::{Lexer, Tok, Token};
use super::types::{Field, Grammar, Kind, Layout, TypeTable, VarType};

/// Prefix for OIDs written without a leading `.` (mib-2).
pub const DEFAULT_BASE_OID: &str = ".1.3.6.1.2.1";

// ── Token stream ──────────────────────────────────────────────────────────────

/// Lexer plus a single buffered token.
struct TokenStream<'a> {
    lexer: Lexer<'a>,
    held: Option<Token>,
    /// Line of the most recently consumed token. Peeking does not move it.
    line: usize,
    /// Line of the token consumed before that one.
    prev_line: usize,
}

impl<'a> TokenStream<'a> {
    fn new(src: &'a str) -> Self {
        TokenStream {
            lexer: Lexer::new(src),
            held: None,
            line: 1,
            prev_line: 1,
        }
    }

    fn peek(&mut self) -> Result<&Tok, ScriptError> {
        let token = match self.held.take() {
            Some(t) => t,
            None => self.lexer.next_token()?,
        };
        Ok(&self.held.insert(token).tok)
    }

    fn next(&mut self) -> Result<Token, ScriptError> {
        let token = match self.held.take() {
            Some(t) => t,
            None => self.lexer.next_token()?,
        };
        self.prev_line = self.line;
        self.line = token.line;
        Ok(token)
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

pub struct Parser<'a> {
    tokens: TokenStream<'a>,
    types: TypeTable,
    base_oid: String,
}

/// Parse a complete script using [`DEFAULT_BASE_OID`] for relative OIDs.
pub fn parse_program(src: &str) -> Result<Program, ScriptError> {
    Parser::new(src).parse_program()
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Parser {
            tokens: TokenStream::new(src),
            types: TypeTable::new(),
            base_oid: DEFAULT_BASE_OID.to_owned(),
        }
    }

    /// Override the prefix that relative OIDs are appended to.
    pub fn with_base_oid(mut self, base: &str) -> Self {
        self.base_oid = base.trim_end_matches('.').to_owned();
        if !self.base_oid.starts_with('.') {
            self.base_oid.insert(0, '.');
        }
        self
    }

    pub fn parse_program(mut self) -> Result<Program, ScriptError> {
        self.parse_declarations()?;
        self.expect(Tok::Run, "program")?;
        self.expect(Tok::Newline, "program")?;
        let body = self.parse_block()?;
        self.expect(Tok::EndRun, "program")?;
        if self.peek()? == &Tok::Newline {
            self.next()?;
        }
        self.expect(Tok::Eof, "program")?;
        Ok(Program {
            types: self.types,
            body,
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn peek(&mut self) -> Result<&Tok, ScriptError> {
        self.tokens.peek()
    }

    fn next(&mut self) -> Result<Token, ScriptError> {
        self.tokens.next()
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.tokens.line,
            message: message.into(),
        }
    }

    /// Error for a missing operand. The operand was due on the line of the
    /// token before the one just consumed, which may sit on a later line.
    fn missing_operand(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.tokens.prev_line,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Tok, context: &str) -> Result<(), ScriptError> {
        let token = self.next()?;
        if token.tok == expected {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {} in {context}, found {}",
                expected.describe(),
                token.tok.describe()
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ScriptError> {
        match self.next()?.tok {
            Tok::Ident(name) => Ok(name),
            other => Err(self.error(format!(
                "expected {context}, found {}",
                other.describe()
            ))),
        }
    }

    fn expect_size(&mut self, context: &str) -> Result<usize, ScriptError> {
        match self.next()?.tok {
            Tok::Int(n) => usize::try_from(n).map_err(|_| self.error(format!("{context} is too large"))),
            other => Err(self.error(format!(
                "expected {context}, found {}",
                other.describe()
            ))),
        }
    }

    fn absolute_oid(&self, written: &str) -> String {
        if written.starts_with('.') {
            written.to_owned()
        } else {
            format!("{}.{written}", self.base_oid)
        }
    }

    fn undeclared(&self, name: &str) -> ScriptError {
        self.error(format!("undeclared variable `{name}`"))
    }

    /// `name` must be a composite variable with a field called `field`.
    fn check_field(&self, name: &str, field: &str) -> Result<(), ScriptError> {
        let ty = self.types.get(name).ok_or_else(|| self.undeclared(name))?;
        match &ty.layout {
            Some(layout) if layout.field(field).is_some() => Ok(()),
            Some(_) => Err(self.error(format!("`{name}` has no field `{field}`"))),
            None => Err(self.error(format!("`{name}` is {}, not a composite block", ty.kind))),
        }
    }

    // ── Declarations ──────────────────────────────────────────────────────────

    fn parse_declarations(&mut self) -> Result<(), ScriptError> {
        if self.peek()? != &Tok::Var {
            return Ok(());
        }
        self.next()?;
        self.expect(Tok::Newline, "var block")?;
        loop {
            match self.next()?.tok {
                Tok::EndVar => return self.expect(Tok::Newline, "var block"),
                Tok::Ident(name) => {
                    self.expect(Tok::Colon, "declaration")?;
                    let ty = self.parse_type()?;
                    self.types.declare(&name, ty).map_err(|m| self.error(m))?;
                    self.expect(Tok::Newline, "declaration")?;
                }
                Tok::Eof => return Err(self.error("missing `endvar`")),
                other => {
                    return Err(self.error(format!(
                        "unexpected {} in var block",
                        other.describe()
                    )))
                }
            }
        }
    }

    fn parse_type(&mut self) -> Result<VarType, ScriptError> {
        let mut token = self.next()?;
        let oid = match &token.tok {
            Tok::Oid(s) => Some(self.absolute_oid(s)),
            Tok::Int(n) => Some(self.absolute_oid(&n.to_string())),
            _ => None,
        };
        if oid.is_some() {
            token = self.next()?;
        }

        let Tok::Kind(kind) = token.tok else {
            return Err(self.error(format!(
                "expected a variable type, found {}",
                token.tok.describe()
            )));
        };
        let mut ty = VarType::new(kind);
        ty.oid = oid;

        if kind.takes_aliases() && self.peek()? == &Tok::LBracket {
            self.parse_aliases()?;
        }
        if kind == Kind::Bytes {
            ty.layout = Some(self.parse_layout()?);
        }
        if let Tok::Access(access) = self.peek()? {
            ty.access = *access;
            self.next()?;
        }
        Ok(ty)
    }

    /// `[ 1 = 'idle', 2 = 'busy', ]`. The trailing comma is optional.
    fn parse_aliases(&mut self) -> Result<(), ScriptError> {
        self.expect(Tok::LBracket, "alias list")?;
        loop {
            if self.peek()? == &Tok::RBracket {
                self.next()?;
                return Ok(());
            }
            let negative = self.peek()? == &Tok::Minus;
            if negative {
                self.next()?;
            }
            let value = match self.next()?.tok {
                Tok::Int(n) if negative => -n,
                Tok::Int(n) => n,
                other => {
                    return Err(self.error(format!(
                        "expected integer in alias list, found {}",
                        other.describe()
                    )))
                }
            };
            self.expect(Tok::Assign, "alias list")?;
            let alias = match self.next()?.tok {
                Tok::Alias(a) => a,
                other => {
                    return Err(self.error(format!(
                        "expected quoted alias name, found {}",
                        other.describe()
                    )))
                }
            };
            self.types
                .bind_alias(&alias, value)
                .map_err(|m| self.error(m))?;
            if self.peek()? == &Tok::Comma {
                self.next()?;
            }
        }
    }

    /// `{ flags: 0 1, count: 1 2 }`: field name, byte offset, byte width.
    fn parse_layout(&mut self) -> Result<Layout, ScriptError> {
        self.expect(Tok::LBrace, "composite layout")?;
        let mut fields = Vec::new();
        while self.peek()? != &Tok::RBrace {
            let name = self.expect_ident("field name")?;
            self.expect(Tok::Colon, "composite layout")?;
            let offset = self.expect_size("field offset")?;
            let size = self.expect_size("field size")?;
            fields.push(Field { name, offset, size });
            if self.peek()? == &Tok::Comma {
                self.next()?;
            } else {
                break;
            }
        }
        self.expect(Tok::RBrace, "composite layout")?;
        Layout::new(fields).map_err(|m| self.error(m))
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek()? {
                Tok::EndRun | Tok::EndLoop | Tok::EndIf | Tok::Else | Tok::ElseIf => {
                    return Ok(stmts)
                }
                Tok::Eof => return Err(self.error("unexpected end of input inside a block")),
                _ => stmts.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ScriptError> {
        let tok = self.peek()?.clone();
        match tok {
            Tok::Ident(_) => self.parse_assignment(),
            Tok::If => {
                self.next()?;
                self.parse_if()
            }
            Tok::Loop => {
                self.next()?;
                self.parse_loop()
            }
            Tok::Print => {
                self.next()?;
                let text = self.parse_str_expr()?;
                self.expect(Tok::Newline, "print statement")?;
                Ok(Stmt::Print(text))
            }
            Tok::Sleep => {
                self.next()?;
                self.parse_sleep()
            }
            Tok::Exit => {
                self.next()?;
                self.expect(Tok::Newline, "exit statement")?;
                Ok(Stmt::Exit)
            }
            other => {
                self.next()?;
                Err(self.error(format!(
                    "expected a statement, found {}",
                    other.describe()
                )))
            }
        }
    }

    fn parse_assignment(&mut self) -> Result<Stmt, ScriptError> {
        let name = self.expect_ident("assignment target")?;
        let kind = self
            .types
            .kind_of(&name)
            .ok_or_else(|| self.error(format!("assignment to undeclared variable `{name}`")))?;

        let target = if self.peek()? == &Tok::Colon {
            self.next()?;
            let field = self.expect_ident("field name")?;
            self.check_field(&name, &field)?;
            Target::Field { var: name, field }
        } else {
            Target::Var(name)
        };
        self.expect(Tok::Assign, "assignment")?;

        let value = match (&target, kind.grammar()) {
            (Target::Field { .. }, _) => Expr::Int(self.parse_int_expr()?),
            (Target::Var(name), Grammar::Fields) => {
                return Err(self.error(format!(
                    "composite variable `{name}` is assigned one field at a time (`{name}:field = …`)"
                )))
            }
            (_, Grammar::Int) => Expr::Int(self.parse_int_expr()?),
            (_, Grammar::Bool) => Expr::Bool(self.parse_bool_expr()?),
            (_, Grammar::Str) => Expr::Str(self.parse_str_expr()?),
            (_, Grammar::Bits) => Expr::Bits(self.parse_bits_expr()?),
        };
        self.expect(Tok::Newline, "assignment")?;
        Ok(Stmt::Assign { target, value })
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptError> {
        let mut arms = Vec::new();
        let cond = self.parse_bool_expr()?;
        self.expect(Tok::Newline, "if statement")?;
        arms.push((cond, self.parse_block()?));

        let mut otherwise = Vec::new();
        loop {
            match self.next()?.tok {
                Tok::ElseIf => {
                    let cond = self.parse_bool_expr()?;
                    self.expect(Tok::Newline, "elseif")?;
                    arms.push((cond, self.parse_block()?));
                }
                Tok::Else => {
                    self.expect(Tok::Newline, "else")?;
                    otherwise = self.parse_block()?;
                    self.expect(Tok::EndIf, "if statement")?;
                    break;
                }
                Tok::EndIf => break,
                other => {
                    return Err(self.error(format!(
                        "expected `elseif`, `else` or `endif`, found {}",
                        other.describe()
                    )))
                }
            }
        }
        self.expect(Tok::Newline, "if statement")?;
        Ok(Stmt::If { arms, otherwise })
    }

    fn parse_loop(&mut self) -> Result<Stmt, ScriptError> {
        let kind = match self.peek()? {
            Tok::Newline => LoopKind::Forever,
            Tok::Times => {
                self.next()?;
                LoopKind::Times(self.parse_int_expr()?)
            }
            _ => LoopKind::While(self.parse_bool_expr()?),
        };
        self.expect(Tok::Newline, "loop")?;
        let body = self.parse_block()?;
        self.expect(Tok::EndLoop, "loop")?;
        self.expect(Tok::Newline, "loop")?;
        Ok(Stmt::Loop { kind, body })
    }

    fn parse_sleep(&mut self) -> Result<Stmt, ScriptError> {
        let duration = self.parse_int_expr()?;
        let unit = match self.next()?.tok {
            Tok::Secs => TimeUnit::Secs,
            Tok::Msecs => TimeUnit::Msecs,
            other => {
                return Err(self.error(format!(
                    "expected `secs` or `msecs` in sleep statement, found {}",
                    other.describe()
                )))
            }
        };
        self.expect(Tok::Newline, "sleep statement")?;
        Ok(Stmt::Sleep { duration, unit })
    }

    // ── Integer expressions ───────────────────────────────────────────────────

    fn parse_int_expr(&mut self) -> Result<IntExpr, ScriptError> {
        let mut terms = vec![(AddOp::Plus, self.parse_int_term()?)];
        loop {
            let op = match self.peek()? {
                Tok::Plus => AddOp::Plus,
                Tok::Minus => AddOp::Minus,
                _ => break,
            };
            self.next()?;
            terms.push((op, self.parse_int_term()?));
        }
        Ok(IntExpr { terms })
    }

    fn parse_int_term(&mut self) -> Result<IntTerm, ScriptError> {
        let mut factors = vec![(MulOp::Times, self.parse_int_factor()?)];
        loop {
            let op = match self.peek()? {
                Tok::Star => MulOp::Times,
                Tok::Slash => MulOp::Divide,
                _ => break,
            };
            self.next()?;
            factors.push((op, self.parse_int_factor()?));
        }
        Ok(IntTerm { factors })
    }

    fn parse_int_factor(&mut self) -> Result<IntFactor, ScriptError> {
        match self.next()?.tok {
            Tok::Int(n) => Ok(IntFactor::Const(n)),
            Tok::Alias(alias) => self
                .types
                .alias(&alias)
                .map(IntFactor::Const)
                .ok_or_else(|| self.error(format!("unknown alias '{alias}'"))),
            Tok::Ident(name) => self.int_identifier(name),
            Tok::Minus => Ok(IntFactor::Neg(Box::new(self.parse_int_factor()?))),
            Tok::LParen => {
                let inner = self.parse_int_expr()?;
                self.expect(Tok::RParen, "bracketed expression")?;
                Ok(IntFactor::Group(Box::new(inner)))
            }
            other => Err(self.missing_operand(format!(
                "expected an integer factor, found {}",
                other.describe()
            ))),
        }
    }

    fn int_identifier(&mut self, name: String) -> Result<IntFactor, ScriptError> {
        match self.types.kind_of(&name) {
            None => Err(self.undeclared(&name)),
            Some(Kind::Bytes) => {
                self.expect(Tok::Colon, "composite field reference")?;
                let field = self.expect_ident("field name")?;
                self.check_field(&name, &field)?;
                Ok(IntFactor::Field { var: name, field })
            }
            Some(kind) if kind.grammar() == Grammar::Int => Ok(IntFactor::Var(name)),
            Some(kind) => Err(self.error(format!(
                "`{name}` is {kind}, not an integer variable"
            ))),
        }
    }

    // ── Boolean expressions ───────────────────────────────────────────────────

    fn parse_bool_expr(&mut self) -> Result<BoolExpr, ScriptError> {
        let mut terms = vec![self.parse_bool_term()?];
        while self.peek()? == &Tok::Pipe {
            self.next()?;
            terms.push(self.parse_bool_term()?);
        }
        Ok(BoolExpr { terms })
    }

    fn parse_bool_term(&mut self) -> Result<BoolTerm, ScriptError> {
        let mut factors = vec![self.parse_bool_factor()?];
        while self.peek()? == &Tok::Amp {
            self.next()?;
            factors.push(self.parse_bool_factor()?);
        }
        Ok(BoolTerm { factors })
    }

    fn parse_bool_factor(&mut self) -> Result<BoolFactor, ScriptError> {
        let tok = self.peek()?.clone();
        match tok {
            Tok::True => {
                self.next()?;
                Ok(BoolFactor::Const(true))
            }
            Tok::False => {
                self.next()?;
                Ok(BoolFactor::Const(false))
            }
            Tok::Bang => {
                self.next()?;
                Ok(BoolFactor::Not(Box::new(self.parse_bool_factor()?)))
            }
            Tok::LParen => {
                self.next()?;
                let inner = self.parse_bool_expr()?;
                self.expect(Tok::RParen, "bracketed expression")?;
                Ok(BoolFactor::Group(Box::new(inner)))
            }
            Tok::Ident(name) if self.types.kind_of(&name) == Some(Kind::Boolean) => {
                self.next()?;
                Ok(BoolFactor::Var(name))
            }
            _ => Ok(BoolFactor::Compare(Box::new(self.parse_comparison()?))),
        }
    }

    fn parse_comparison(&mut self) -> Result<Comparison, ScriptError> {
        let lhs = self.parse_int_expr()?;
        let op = match self.next()?.tok {
            Tok::Lt => CmpOp::Lt,
            Tok::Gt => CmpOp::Gt,
            Tok::Le => CmpOp::Le,
            Tok::Ge => CmpOp::Ge,
            Tok::Assign => CmpOp::Eq,
            other => {
                return Err(self.missing_operand(format!(
                    "expected a comparison operator, found {}",
                    other.describe()
                )))
            }
        };
        let rhs = self.parse_int_expr()?;
        Ok(Comparison { lhs, op, rhs })
    }

    // ── String expressions ────────────────────────────────────────────────────

    fn parse_str_expr(&mut self) -> Result<StrExpr, ScriptError> {
        let mut terms = vec![self.parse_str_term()?];
        while self.peek()? == &Tok::Plus {
            self.next()?;
            terms.push(self.parse_str_term()?);
        }
        Ok(StrExpr { terms })
    }

    fn parse_str_term(&mut self) -> Result<StrTerm, ScriptError> {
        match self.next()?.tok {
            Tok::Str(s) => Ok(StrTerm::Literal(s)),
            Tok::Ident(name) => match self.types.kind_of(&name) {
                None => Err(self.undeclared(&name)),
                Some(kind) if kind.grammar() == Grammar::Str => Ok(StrTerm::Var(name)),
                Some(kind) => Err(self.error(format!(
                    "`{name}` is {kind}, not a string variable"
                ))),
            },
            Tok::LParen => {
                let inner = self.parse_str_expr()?;
                self.expect(Tok::RParen, "bracketed expression")?;
                Ok(StrTerm::Group(Box::new(inner)))
            }
            Tok::StrInt => {
                self.expect(Tok::LParen, "strInt")?;
                let inner = self.parse_int_expr()?;
                self.expect(Tok::RParen, "strInt")?;
                Ok(StrTerm::FromInt(inner))
            }
            Tok::StrBool => {
                self.expect(Tok::LParen, "strBool")?;
                let inner = self.parse_bool_expr()?;
                self.expect(Tok::RParen, "strBool")?;
                Ok(StrTerm::FromBool(inner))
            }
            Tok::StrBits => {
                self.expect(Tok::LParen, "strBits")?;
                let inner = self.parse_bits_expr()?;
                self.expect(Tok::RParen, "strBits")?;
                Ok(StrTerm::FromBits(inner))
            }
            other => Err(self.missing_operand(format!(
                "expected a string term, found {}",
                other.describe()
            ))),
        }
    }

    // ── Bitset expressions ────────────────────────────────────────────────────

    fn parse_bits_expr(&mut self) -> Result<BitsExpr, ScriptError> {
        let mut terms = vec![self.parse_bits_term()?];
        while self.peek()? == &Tok::Plus {
            self.next()?;
            terms.push(self.parse_bits_term()?);
        }
        Ok(BitsExpr { terms })
    }

    fn parse_bits_term(&mut self) -> Result<BitsTerm, ScriptError> {
        match self.next()?.tok {
            Tok::LBracket => {
                let mut positions = Vec::new();
                while self.peek()? != &Tok::RBracket {
                    positions.push(self.parse_int_expr()?);
                    if self.peek()? == &Tok::Comma {
                        self.next()?;
                    } else {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "bitset literal")?;
                Ok(BitsTerm::Set(positions))
            }
            Tok::Ident(name) => match self.types.kind_of(&name) {
                None => Err(self.undeclared(&name)),
                Some(Kind::Bitset) => Ok(BitsTerm::Var(name)),
                Some(kind) => Err(self.error(format!(
                    "`{name}` is {kind}, not a bitset variable"
                ))),
            },
            Tok::LParen => {
                let inner = self.parse_bits_expr()?;
                self.expect(Tok::RParen, "bracketed expression")?;
                Ok(BitsTerm::Group(Box::new(inner)))
            }
            other => Err(self.missing_operand(format!(
                "expected a bitset term, found {}",
                other.describe()
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::types::Access;
    use pretty_assertions::assert_eq;

    fn program(decls: &str, body: &str) -> Result<Program, ScriptError> {
        parse_program(&format!("var\n{decls}\nendvar\nrun\n{body}\nendrun\n"))
    }

    fn body(decls: &str, body: &str) -> Vec<Stmt> {
        program(decls, body).expect("parse failed").body
    }

    fn assigned(stmt: &Stmt) -> &Expr {
        match stmt {
            Stmt::Assign { value, .. } => value,
            other => panic!("not an assignment: {other:?}"),
        }
    }

    fn lit(n: i64) -> IntTerm {
        IntTerm {
            factors: vec![(MulOp::Times, IntFactor::Const(n))],
        }
    }

    #[test]
    fn same_level_plus_terms() {
        let stmts = body("x: integer", "x = 3 + 1000000 + 2 +\n    4 + 6");
        let Expr::Int(expr) = assigned(&stmts[0]) else {
            panic!("expected integer expression");
        };
        assert_eq!(
            expr.terms,
            vec![
                (AddOp::Plus, lit(3)),
                (AddOp::Plus, lit(1_000_000)),
                (AddOp::Plus, lit(2)),
                (AddOp::Plus, lit(4)),
                (AddOp::Plus, lit(6)),
            ]
        );
    }

    #[test]
    fn signs_tracked_per_term() {
        let stmts = body("x: integer", "x = 1 - 2 * 3 + 4");
        let Expr::Int(expr) = assigned(&stmts[0]) else {
            panic!("expected integer expression");
        };
        let ops: Vec<AddOp> = expr.terms.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![AddOp::Plus, AddOp::Minus, AddOp::Plus]);
        assert_eq!(expr.terms[1].1.factors.len(), 2);
    }

    #[test]
    fn grammar_follows_declared_kind() {
        let stmts = body(
            "b: boolean\n s: string\n n: integer\n bits: bitset",
            "b = true\n s = \"x\"\n n = 1\n bits = [1, 2]",
        );
        assert!(matches!(assigned(&stmts[0]), Expr::Bool(_)));
        assert!(matches!(assigned(&stmts[1]), Expr::Str(_)));
        assert!(matches!(assigned(&stmts[2]), Expr::Int(_)));
        assert!(matches!(assigned(&stmts[3]), Expr::Bits(_)));
    }

    #[test]
    fn boolean_into_integer_rejected() {
        let err = program("x: integer", "x = true").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 5, .. }), "{err}");
    }

    #[test]
    fn undeclared_identifier_rejected() {
        assert!(program("x: integer", "y = 1").is_err());
        assert!(program("x: integer", "x = y + 1").is_err());
        assert!(program("s: string", "s = t").is_err());
        let err = program("b: boolean", "b = q > 1").unwrap_err();
        assert!(err.to_string().contains("undeclared variable `q`"), "{err}");
    }

    #[test]
    fn wrong_kind_identifier_rejected() {
        let err = program("x: integer\n s: string", "x = s + 1").unwrap_err();
        assert!(err.to_string().contains("not an integer variable"), "{err}");
        assert!(program("x: integer\n s: string", "s = x").is_err());
    }

    #[test]
    fn aliases_resolve_to_constants() {
        let prog = program(
            "state: .1.3.3.2.1.1.1 integer [1 = 'printing', 2 = 'idle', 3 = 'error', ]",
            "state = 'idle'",
        )
        .unwrap();
        let Expr::Int(expr) = assigned(&prog.body[0]) else {
            panic!("expected integer expression");
        };
        assert_eq!(expr, &IntExpr::constant(2));
        assert_eq!(prog.types.alias("error"), Some(3));
        assert_eq!(
            prog.types.get("state").unwrap().oid.as_deref(),
            Some(".1.3.3.2.1.1.1")
        );
    }

    #[test]
    fn unknown_alias_rejected() {
        let err = program("x: integer [1 = 'on']", "x = 'off'").unwrap_err();
        assert!(err.to_string().contains("unknown alias 'off'"), "{err}");
    }

    #[test]
    fn aliases_are_global() {
        let prog = program(
            "a: integer [1 = 'happy', 2 = 'sad']\n b: integer",
            "b = 'sad'",
        );
        assert!(prog.is_ok());
    }

    #[test]
    fn relative_oid_gets_base_prefix() {
        let prog = program("x: 2.1 integer\n y: 7 gauge", "x = 1").unwrap();
        assert_eq!(prog.types.get("x").unwrap().oid.as_deref(), Some(".1.3.6.1.2.1.2.1"));
        assert_eq!(prog.types.get("y").unwrap().oid.as_deref(), Some(".1.3.6.1.2.1.7"));

        let prog = Parser::new("var\n x: 5 integer\nendvar\nrun\nendrun\n")
            .with_base_oid("1.3.6.1.4.1.9999")
            .parse_program()
            .unwrap();
        assert_eq!(
            prog.types.get("x").unwrap().oid.as_deref(),
            Some(".1.3.6.1.4.1.9999.5")
        );
    }

    #[test]
    fn access_modes() {
        let prog = program(
            "a: 1 integer\n b: 2 integer readwrite\n c: 3 string blocking",
            "a = 1",
        )
        .unwrap();
        assert_eq!(prog.types.get("a").unwrap().access, Access::ReadOnly);
        assert_eq!(prog.types.get("b").unwrap().access, Access::ReadWrite);
        assert_eq!(prog.types.get("c").unwrap().access, Access::Blocking);
    }

    #[test]
    fn if_elseif_else_chain() {
        let stmts = body(
            "y: integer\n a: string",
            "if y > 3\n a = \"super\"\nelseif y < 3\n a = \"wonder\"\nelse\n a = \"duper\"\nendif",
        );
        let Stmt::If { arms, otherwise } = &stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn elseif_after_else_rejected() {
        let src = "if true\nexit\nelse\nexit\nelseif false\nexit\nendif";
        assert!(program("x: integer", src).is_err());
    }

    #[test]
    fn loop_forms() {
        let stmts = body(
            "i: integer\n go: boolean",
            "loop\n exit\nendloop\nloop times 10\n i = i + 1\nendloop\nloop go & i < 3\n i = i + 1\nendloop",
        );
        assert!(matches!(&stmts[0], Stmt::Loop { kind: LoopKind::Forever, .. }));
        assert!(matches!(&stmts[1], Stmt::Loop { kind: LoopKind::Times(_), .. }));
        assert!(matches!(&stmts[2], Stmt::Loop { kind: LoopKind::While(_), .. }));
    }

    #[test]
    fn sleep_needs_unit() {
        assert!(program("x: integer", "sleep 5 secs\nsleep x * 10 msecs").is_ok());
        assert!(program("x: integer", "sleep 5").is_err());
    }

    #[test]
    fn boolean_factor_forms() {
        let stmts = body(
            "b: boolean\n c: boolean\n n: integer",
            "b = !c | (b & false) & n >= 2 * 3",
        );
        let Expr::Bool(expr) = assigned(&stmts[0]) else {
            panic!("expected boolean expression");
        };
        assert_eq!(expr.terms.len(), 2);
        assert!(matches!(expr.terms[0].factors[0], BoolFactor::Not(_)));
        assert!(matches!(expr.terms[1].factors[1], BoolFactor::Compare(_)));
    }

    #[test]
    fn string_terms() {
        let stmts = body(
            "s: string\n n: integer\n b: boolean\n bits: bitset",
            "s = \"n=\" + strInt(n * 2) + (s) + strBool(b) + strBits(bits + [3])",
        );
        let Expr::Str(expr) = assigned(&stmts[0]) else {
            panic!("expected string expression");
        };
        assert_eq!(expr.terms.len(), 5);
        assert!(matches!(expr.terms[1], StrTerm::FromInt(_)));
        assert!(matches!(expr.terms[2], StrTerm::Group(_)));
        assert!(matches!(expr.terms[4], StrTerm::FromBits(_)));
    }

    #[test]
    fn bitset_literal_with_aliases() {
        let stmts = body(
            "err: .1.3.2 bitset [1 = 'nopaper', 2 = 'notoner',]",
            "err = [ 'notoner', 'nopaper' ]\nerr = []",
        );
        let Expr::Bits(expr) = assigned(&stmts[0]) else {
            panic!("expected bitset expression");
        };
        assert_eq!(
            expr.terms,
            vec![BitsTerm::Set(vec![IntExpr::constant(2), IntExpr::constant(1)])]
        );
        assert!(matches!(assigned(&stmts[1]), Expr::Bits(b) if b.terms == vec![BitsTerm::Set(vec![])]));
    }

    #[test]
    fn composite_fields() {
        let prog = program(
            "st: 9 bytes { flags: 0 1, count: 1 2 } readwrite\n n: integer",
            "st:count = st:count + 1\nn = st:flags",
        )
        .unwrap();
        let layout = prog.types.get("st").unwrap().layout.clone().unwrap();
        assert_eq!(layout.size(), 3);
        assert!(matches!(
            &prog.body[0],
            Stmt::Assign { target: Target::Field { field, .. }, .. } if field == "count"
        ));
    }

    #[test]
    fn composite_needs_field() {
        assert!(program("st: bytes { a: 0 1 }", "st = 1").is_err());
        assert!(program("st: bytes { a: 0 1 }\n n: integer", "n = st").is_err());
        assert!(program("st: bytes { a: 0 1 }", "st:b = 1").is_err());
        assert!(program("st: bytes { a: 0 2, b: 1 1 }", "st:a = 1").is_err());
    }

    #[test]
    fn block_past_octet_string_limit() {
        assert!(program("st: bytes { a: 65534 1 }", "").is_ok());
        let err = program("st: 1 bytes { a: 65534 2 }", "").unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(program("st: 1 bytes { a: 9000000000000000000 1 }", "").is_err());
    }

    #[test]
    fn dangling_operator_reports_its_own_line() {
        let err = program("s: string", " s = 'a' +\n").unwrap_err();
        assert_eq!(err.line(), 5);
        let err = program("n: integer", " loop\n  n = n *\n endloop").unwrap_err();
        assert_eq!(err.line(), 6);
        let err = program("", " 7\n").unwrap_err();
        assert_eq!(err.line(), 5);
    }

    #[test]
    fn error_reports_line() {
        let src = "var\n x: integer\nendvar\nrun\n x = 1\n x = x +\nendrun\n";
        let err = parse_program(src).unwrap_err();
        assert_eq!(err.line(), 6);
        assert!(err.to_string().starts_with("parse failed at line 6"), "{err}");
    }

    #[test]
    fn missing_endrun() {
        assert!(parse_program("run\nexit\n").is_err());
    }

    #[test]
    fn trailing_garbage_rejected() {
        assert!(parse_program("run\nendrun\nexit\n").is_err());
    }

    #[test]
    fn var_block_is_optional() {
        let prog = parse_program("\n\trun\n  print \"hi\"\nendrun").unwrap();
        assert!(prog.types.is_empty());
        assert_eq!(prog.body.len(), 1);
    }

    #[test]
    fn duplicate_declaration_rejected() {
        let err = program("x: integer\n x: string", "exit").unwrap_err();
        assert!(err.to_string().contains("declared twice"), "{err}");
    }
}
