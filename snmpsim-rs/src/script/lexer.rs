//! Script lexer.
//!
//! Produces one [`Token`] per call to [`Lexer::next_token`]. Line breaks are
//! statement terminators and come out as [`Tok::Newline`], except where a
//! statement obviously continues: after an operator or comma, and anywhere
//! inside an open `(`, `[` or `{`. Runs of blank lines collapse into one
//! newline token.

use super::error::ScriptError;
use super::types::{Access, Kind};

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    // Literals
    Ident(String),
    Int(i64),
    Str(String),
    /// Single-quoted alias name: `'idle'`.
    Alias(String),
    /// Dotted numeric OID as written, e.g. `.1.3.6.1` or `2.1`.
    Oid(String),

    // Keywords
    Var,
    EndVar,
    Run,
    EndRun,
    If,
    ElseIf,
    Else,
    EndIf,
    Loop,
    Times,
    EndLoop,
    Print,
    Sleep,
    Secs,
    Msecs,
    Exit,
    True,
    False,
    StrInt,
    StrBool,
    StrBits,
    Kind(Kind),
    Access(Access),

    // Operators
    Assign, // `=`, also equality inside comparisons
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Le,
    Ge,
    Bang,
    Amp,
    Pipe,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,

    Newline,
    Eof,
}

impl Tok {
    /// Tokens after which a line break does not end the statement.
    fn continues_line(&self) -> bool {
        matches!(
            self,
            Tok::Assign
                | Tok::Plus
                | Tok::Minus
                | Tok::Star
                | Tok::Slash
                | Tok::Lt
                | Tok::Gt
                | Tok::Le
                | Tok::Ge
                | Tok::Bang
                | Tok::Amp
                | Tok::Pipe
                | Tok::Comma
        )
    }

    /// Short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier `{s}`"),
            Tok::Int(n) => format!("integer {n}"),
            Tok::Str(s) => format!("string \"{s}\""),
            Tok::Alias(s) => format!("alias '{s}'"),
            Tok::Oid(s) => format!("OID {s}"),
            Tok::Kind(k) => format!("type `{k}`"),
            Tok::Access(_) => "access mode".into(),
            Tok::Newline => "end of line".into(),
            Tok::Eof => "end of input".into(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Tok::Var => "var",
            Tok::EndVar => "endvar",
            Tok::Run => "run",
            Tok::EndRun => "endrun",
            Tok::If => "if",
            Tok::ElseIf => "elseif",
            Tok::Else => "else",
            Tok::EndIf => "endif",
            Tok::Loop => "loop",
            Tok::Times => "times",
            Tok::EndLoop => "endloop",
            Tok::Print => "print",
            Tok::Sleep => "sleep",
            Tok::Secs => "secs",
            Tok::Msecs => "msecs",
            Tok::Exit => "exit",
            Tok::True => "true",
            Tok::False => "false",
            Tok::StrInt => "strInt",
            Tok::StrBool => "strBool",
            Tok::StrBits => "strBits",
            Tok::Assign => "=",
            Tok::Plus => "+",
            Tok::Minus => "-",
            Tok::Star => "*",
            Tok::Slash => "/",
            Tok::Lt => "<",
            Tok::Gt => ">",
            Tok::Le => "<=",
            Tok::Ge => ">=",
            Tok::Bang => "!",
            Tok::Amp => "&",
            Tok::Pipe => "|",
            Tok::LParen => "(",
            Tok::RParen => ")",
            Tok::LBracket => "[",
            Tok::RBracket => "]",
            Tok::LBrace => "{",
            Tok::RBrace => "}",
            Tok::Colon => ":",
            Tok::Comma => ",",
            _ => "?",
        }
    }
}

fn keyword(word: &str) -> Option<Tok> {
    let tok = match word {
        "var" => Tok::Var,
        "endvar" => Tok::EndVar,
        "run" => Tok::Run,
        "endrun" => Tok::EndRun,
        "if" => Tok::If,
        "elseif" => Tok::ElseIf,
        "else" => Tok::Else,
        "endif" => Tok::EndIf,
        "loop" => Tok::Loop,
        "times" => Tok::Times,
        "endloop" => Tok::EndLoop,
        "print" => Tok::Print,
        "sleep" => Tok::Sleep,
        "secs" => Tok::Secs,
        "msecs" => Tok::Msecs,
        "exit" => Tok::Exit,
        "true" => Tok::True,
        "false" => Tok::False,
        "strInt" => Tok::StrInt,
        "strBool" => Tok::StrBool,
        "strBits" => Tok::StrBits,
        _ => {
            if let Some(kind) = Kind::from_keyword(word) {
                Tok::Kind(kind)
            } else if let Some(access) = Access::from_keyword(word) {
                Tok::Access(access)
            } else {
                return None;
            }
        }
    };
    Some(tok)
}

/// A token and the source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    /// Open `(`, `[` and `{` count.
    depth: usize,
    /// True at the start of input, after a newline and after an operator.
    swallow_newline: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            depth: 0,
            swallow_newline: true,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Lex {
            line: self.line,
            message: message.into(),
        }
    }

    /// Skip spaces, tabs, carriage returns and `#` comments (not the newline).
    fn skip_blank(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(b'#') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_digits(&mut self, out: &mut String) {
        while let Some(c @ b'0'..=b'9') = self.peek() {
            out.push(c as char);
            self.pos += 1;
        }
    }

    /// Integer literal, or a relative OID if a `.digit` follows.
    fn read_number(&mut self, first: u8) -> Result<Tok, ScriptError> {
        let mut s = String::new();
        s.push(first as char);
        self.read_digits(&mut s);
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b'0'..=b'9')) {
            return Ok(Tok::Oid(self.read_oid_tail(s)));
        }
        s.parse()
            .map(Tok::Int)
            .map_err(|_| self.error(format!("integer literal {s} is out of range")))
    }

    fn read_oid_tail(&mut self, mut s: String) -> String {
        while self.peek() == Some(b'.') && matches!(self.peek2(), Some(b'0'..=b'9')) {
            self.pos += 1;
            s.push('.');
            self.read_digits(&mut s);
        }
        s
    }

    fn read_string(&mut self) -> Result<Tok, ScriptError> {
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None | Some(b'\n') => return Err(self.error("unterminated string literal")),
                Some(b'\\') => match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(c @ (b'"' | b'\\')) => bytes.push(c),
                    Some(c) => {
                        return Err(self.error(format!("unknown escape `\\{}`", c as char)))
                    }
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(b'"') => break,
                Some(c) => bytes.push(c),
            }
        }
        Ok(Tok::Str(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_alias(&mut self) -> Result<Tok, ScriptError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-')) {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        if !self.eat(b'\'') {
            return Err(self.error("unterminated alias; expected closing `'`"));
        }
        if name.is_empty() {
            return Err(self.error("empty alias name"));
        }
        Ok(Tok::Alias(name))
    }

    /// Identifiers may contain hyphens as long as a letter follows, so
    /// `printer-state` is one name while `x-1` is `x`, `-`, `1`.
    fn read_word(&mut self, first: u8) -> Tok {
        let mut s = String::new();
        s.push(first as char);
        loop {
            match self.peek() {
                Some(c @ (b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) => {
                    s.push(c as char);
                    self.pos += 1;
                }
                Some(b'-') if matches!(self.peek2(), Some(b'a'..=b'z' | b'A'..=b'Z')) => {
                    s.push('-');
                    self.pos += 1;
                }
                _ => break,
            }
        }
        keyword(&s).unwrap_or(Tok::Ident(s))
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Result<Token, ScriptError> {
        loop {
            self.skip_blank();
            let line = self.line;
            let Some(ch) = self.advance() else {
                return Ok(Token { tok: Tok::Eof, line });
            };

            if ch == b'\n' {
                self.line += 1;
                if self.depth > 0 || self.swallow_newline {
                    continue;
                }
                self.swallow_newline = true;
                return Ok(Token { tok: Tok::Newline, line });
            }

            let tok = match ch {
                b'0'..=b'9' => self.read_number(ch)?,
                b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => {
                    let mut s = String::from(".");
                    self.read_digits(&mut s);
                    Tok::Oid(self.read_oid_tail(s))
                }
                b'"' => self.read_string()?,
                b'\'' => self.read_alias()?,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_word(ch),
                b'=' => Tok::Assign,
                b'+' => Tok::Plus,
                b'-' => Tok::Minus,
                b'*' => Tok::Star,
                b'/' => Tok::Slash,
                b'<' => {
                    if self.eat(b'=') {
                        Tok::Le
                    } else {
                        Tok::Lt
                    }
                }
                b'>' => {
                    if self.eat(b'=') {
                        Tok::Ge
                    } else {
                        Tok::Gt
                    }
                }
                b'!' => Tok::Bang,
                b'&' => Tok::Amp,
                b'|' => Tok::Pipe,
                b'(' | b'[' | b'{' => {
                    self.depth += 1;
                    match ch {
                        b'(' => Tok::LParen,
                        b'[' => Tok::LBracket,
                        _ => Tok::LBrace,
                    }
                }
                b')' | b']' | b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    match ch {
                        b')' => Tok::RParen,
                        b']' => Tok::RBracket,
                        _ => Tok::RBrace,
                    }
                }
                b':' => Tok::Colon,
                b',' => Tok::Comma,
                c => {
                    let shown = if c.is_ascii_graphic() {
                        format!("`{}`", c as char)
                    } else {
                        format!("byte 0x{c:02x}")
                    };
                    return Err(self.error(format!("unrecognised character {shown}")));
                }
            };
            self.swallow_newline = tok.continues_line();
            return Ok(Token { tok, line });
        }
    }

    /// Lex the whole input. Convenience for tests and diagnostics; the parser
    /// pulls tokens one at a time.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t.tok == Tok::Eof;
            tokens.push(t);
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
