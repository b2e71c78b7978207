//! Declared variable types and the global alias table.
//!
//! Built once from the `var … endvar` block, then handed to the statement
//! parser, the store and the interpreter. Nothing here changes after the
//! declaration block has been parsed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Value kind named in a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Integer,
    Boolean,
    String,
    Counter,
    Gauge,
    TimeTicks,
    Oid,
    IpAddress,
    Bitset,
    Bytes,
}

/// Which expression grammar an assignment to a kind is parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Int,
    Bool,
    Str,
    Bits,
    /// Composite blocks are only assigned field by field.
    Fields,
}

impl Kind {
    pub fn from_keyword(word: &str) -> Option<Kind> {
        Some(match word {
            "integer" => Kind::Integer,
            "boolean" => Kind::Boolean,
            "string" => Kind::String,
            "counter" => Kind::Counter,
            "gauge" => Kind::Gauge,
            "timeticks" => Kind::TimeTicks,
            "oid" => Kind::Oid,
            "ipaddress" => Kind::IpAddress,
            "bitset" => Kind::Bitset,
            "bytes" => Kind::Bytes,
            _ => return None,
        })
    }

    pub fn grammar(self) -> Grammar {
        match self {
            Kind::Integer | Kind::Counter | Kind::Gauge | Kind::TimeTicks => Grammar::Int,
            Kind::Boolean => Grammar::Bool,
            Kind::String | Kind::Oid | Kind::IpAddress => Grammar::Str,
            Kind::Bitset => Grammar::Bits,
            Kind::Bytes => Grammar::Fields,
        }
    }

    /// Kinds that may carry an `[n = 'alias', …]` list.
    pub fn takes_aliases(self) -> bool {
        matches!(
            self,
            Kind::Integer | Kind::Counter | Kind::Gauge | Kind::Bitset
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Integer => "integer",
            Kind::Boolean => "boolean",
            Kind::String => "string",
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::TimeTicks => "timeticks",
            Kind::Oid => "oid",
            Kind::IpAddress => "ipaddress",
            Kind::Bitset => "bitset",
            Kind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// How the responder may touch a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    ReadOnly,
    ReadWrite,
    /// External sets are handed to the interpreter through a rendezvous
    /// instead of updating the store directly.
    Blocking,
}

impl Access {
    pub fn from_keyword(word: &str) -> Option<Access> {
        Some(match word {
            "readonly" => Access::ReadOnly,
            "readwrite" => Access::ReadWrite,
            "blocking" => Access::Blocking,
            _ => return None,
        })
    }
}

/// Largest composite block, in bytes (the OCTET STRING size limit).
pub const MAX_BLOCK_SIZE: usize = 65_535;

/// One sub-field of a composite byte block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// Field layout of a `bytes` variable, sorted by ascending offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    fields: Vec<Field>,
}

impl Layout {
    /// Build a layout, rejecting empty blocks, bad widths, duplicate names,
    /// overlapping fields and blocks too large for an OCTET STRING.
    pub fn new(mut fields: Vec<Field>) -> Result<Self, String> {
        if fields.is_empty() {
            return Err("composite block needs at least one field".into());
        }
        fields.sort_by_key(|f| f.offset);
        for (i, field) in fields.iter().enumerate() {
            if !(1..=8).contains(&field.size) {
                return Err(format!(
                    "field `{}` has size {}; sizes must be 1 to 8 bytes",
                    field.name, field.size
                ));
            }
            if field.offset > MAX_BLOCK_SIZE - field.size {
                return Err(format!(
                    "field `{}` ends past byte {MAX_BLOCK_SIZE}, the largest block an OCTET STRING can carry",
                    field.name
                ));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(format!("duplicate field `{}`", field.name));
            }
            if let Some(prev) = i.checked_sub(1).map(|j| &fields[j]) {
                if prev.offset + prev.size > field.offset {
                    return Err(format!(
                        "field `{}` overlaps field `{}`",
                        field.name, prev.name
                    ));
                }
            }
        }
        Ok(Layout { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Total block size in bytes.
    pub fn size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.offset + f.size)
            .max()
            .unwrap_or(0)
    }
}

/// Declared type of one script variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarType {
    pub kind: Kind,
    /// Absolute dotted OID (leading `.`), if the variable is exported.
    pub oid: Option<String>,
    pub layout: Option<Layout>,
    pub access: Access,
}

impl VarType {
    pub fn new(kind: Kind) -> Self {
        VarType {
            kind,
            oid: None,
            layout: None,
            access: Access::default(),
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(oid) = &self.oid {
            write!(f, " oid: {oid}")?;
        }
        Ok(())
    }
}

/// Variable types plus the alias table shared by every declaration.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    vars: BTreeMap<String, VarType>,
    aliases: BTreeMap<String, i64>,
    by_oid: HashMap<String, String>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Names and OIDs must both be unique.
    pub fn declare(&mut self, name: &str, ty: VarType) -> Result<(), String> {
        if self.vars.contains_key(name) {
            return Err(format!("variable `{name}` declared twice"));
        }
        if let Some(oid) = &ty.oid {
            if let Some(other) = self.by_oid.get(oid) {
                return Err(format!("OID {oid} already bound to `{other}`"));
            }
            self.by_oid.insert(oid.clone(), name.to_owned());
        }
        self.vars.insert(name.to_owned(), ty);
        Ok(())
    }

    /// Bind an alias. Rebinding to the same value is allowed; rebinding to a
    /// different one is an error.
    pub fn bind_alias(&mut self, alias: &str, value: i64) -> Result<(), String> {
        match self.aliases.get(alias) {
            Some(&old) if old != value => Err(format!(
                "alias '{alias}' already bound to {old}"
            )),
            _ => {
                self.aliases.insert(alias.to_owned(), value);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&VarType> {
        self.vars.get(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<Kind> {
        self.vars.get(name).map(|t| t.kind)
    }

    pub fn alias(&self, alias: &str) -> Option<i64> {
        self.aliases.get(alias).copied()
    }

    /// Name of the variable exported under `oid`.
    pub fn name_for_oid(&self, oid: &str) -> Option<&str> {
        self.by_oid.get(oid).map(String::as_str)
    }

    /// Variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VarType)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Aliases in name order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, i64)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
