//! Resolved runtime configuration and `name=value` initializers.
//!
//! [`SimConfig::from_args`] turns the command line into the settings the
//! process runs with. Initializers are parsed here but applied later,
//! once the script's declarations are known:
//!
//! | Kind | Accepted text |
//! |------|---------------|
//! | integer, counter, gauge, timeticks | `42`, `-3`, `'alias'` |
//! | boolean | `true`, `false` |
//! | string | anything; surrounding `"` are stripped |
//! | oid, ipaddress | dotted form |
//! | bitset | `1,2,5` (positions or `'alias'`), empty for none |
//! | bytes | `field:value,field:value` |

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::CliArgs;
use crate::codec;
use crate::script::types::{Kind, TypeTable};
use crate::store::ValueStore;
use crate::value::{Scalar, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("initializer {0:?} is not of the form name=value")]
    Syntax(String),
    #[error("initializer names unknown variable `{0}`")]
    UnknownVar(String),
    #[error("bad initial value {value:?} for `{name}`: {reason}")]
    BadValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("bad base OID {0:?}")]
    BaseOid(String),
}

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Appended to.
    File(PathBuf),
}

/// One `-V name=value` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInit {
    pub name: String,
    pub value: String,
}

impl VarInit {
    pub fn parse(arg: &str) -> Result<Self, ConfigError> {
        let (name, value) = arg
            .split_once('=')
            .ok_or_else(|| ConfigError::Syntax(arg.to_owned()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Syntax(arg.to_owned()));
        }
        Ok(VarInit {
            name: name.to_owned(),
            value: value.trim().to_owned(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub script: PathBuf,
    pub listen: SocketAddr,
    pub read_community: String,
    pub write_community: String,
    pub inits: Vec<VarInit>,
    pub poll_timeout: Duration,
    pub base_oid: String,
    pub log: LogTarget,
}

impl SimConfig {
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let inits = args
            .vars
            .iter()
            .map(|v| VarInit::parse(v))
            .collect::<Result<Vec<_>, _>>()?;
        codec::parse_oid(&args.base_oid).map_err(|_| ConfigError::BaseOid(args.base_oid.clone()))?;

        let log = if args.log_stderr {
            LogTarget::Stderr
        } else {
            let mut path = args.script.clone().into_os_string();
            path.push(".log");
            LogTarget::File(PathBuf::from(path))
        };

        Ok(SimConfig {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port)),
            read_community: args.read_community,
            write_community: args.write_community,
            inits,
            poll_timeout: Duration::from_secs(args.poll_timeout.max(1)),
            base_oid: args.base_oid,
            log,
            script: args.script,
        })
    }
}

// ── Initializers ──────────────────────────────────────────────────────────────

/// Write every initializer into the store. Stops at the first bad one.
pub fn apply_initializers(inits: &[VarInit], store: &ValueStore) -> Result<(), ConfigError> {
    for init in inits {
        let value = initial_value(store.types(), init)?;
        store
            .write(&init.name, value)
            .map_err(|e| bad(init, e.to_string()))?;
    }
    Ok(())
}

fn bad(init: &VarInit, reason: impl Into<String>) -> ConfigError {
    ConfigError::BadValue {
        name: init.name.clone(),
        value: init.value.clone(),
        reason: reason.into(),
    }
}

/// Parse an initializer's text according to the variable's declared kind.
pub fn initial_value(types: &TypeTable, init: &VarInit) -> Result<Value, ConfigError> {
    let ty = types
        .get(&init.name)
        .ok_or_else(|| ConfigError::UnknownVar(init.name.clone()))?;
    let text = init.value.as_str();

    let scalar = match ty.kind {
        Kind::Integer | Kind::Counter | Kind::Gauge | Kind::TimeTicks => {
            Scalar::Int(parse_int(types, text).map_err(|r| bad(init, r))?)
        }
        Kind::Boolean => match text {
            "true" => Scalar::Bool(true),
            "false" => Scalar::Bool(false),
            _ => return Err(bad(init, "expected `true` or `false`")),
        },
        Kind::String => {
            let unquoted = text
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(text);
            Scalar::Str(unquoted.to_owned())
        }
        Kind::Oid | Kind::IpAddress => Scalar::Str(text.to_owned()),
        Kind::Bitset => {
            let mut bits = BTreeSet::new();
            for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let n = parse_int(types, item).map_err(|r| bad(init, r))?;
                let pos = codec::bit_position(n).ok_or_else(|| bad(init, format!("bad bit position {n}")))?;
                bits.insert(pos);
            }
            Scalar::Bits(bits)
        }
        Kind::Bytes => {
            let layout = ty
                .layout
                .as_ref()
                .ok_or_else(|| bad(init, "composite has no layout"))?;
            let mut block = vec![0u8; layout.size()];
            for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (field, n) = item
                    .split_once(':')
                    .ok_or_else(|| bad(init, "expected field:value pairs"))?;
                let field = layout
                    .field(field.trim())
                    .ok_or_else(|| bad(init, format!("no field `{}`", field.trim())))?;
                let n = n
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| bad(init, format!("bad value for field `{}`", field.name)))?;
                codec::pack_field(&mut block, field, n).map_err(|e| bad(init, e.to_string()))?;
            }
            return Ok(Value::Composite(block));
        }
    };
    codec::to_store(ty.kind, scalar).map_err(|e| bad(init, e.to_string()))
}

fn parse_int(types: &TypeTable, text: &str) -> Result<i64, String> {
    if let Some(alias) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return types
            .alias(alias)
            .ok_or_else(|| format!("unknown alias '{alias}'"));
    }
    text.parse::<i64>()
        .map_err(|_| format!("{text:?} is not an integer"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
