//! Command-line arguments.
//!
//! Usage:
//!   snmpsim [-v] [-p PORT] [-c READ] [-C WRITE] [-V name=value]... [--log-stderr] <SCRIPT>

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::script::DEFAULT_BASE_OID;

/// Parsed command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "snmpsim",
    version,
    about = "Scriptable SNMP device simulator",
    disable_version_flag = true
)]
pub struct CliArgs {
    /// Device script to load and run.
    pub script: PathBuf,

    /// UDP port to answer SNMP requests on.
    #[arg(short = 'p', long, default_value_t = 161)]
    pub port: u16,

    /// Community granting read access.
    #[arg(short = 'c', long = "community", default_value = "public")]
    pub read_community: String,

    /// Community granting read-write access.
    #[arg(short = 'C', long = "write-community", default_value = "private")]
    pub write_community: String,

    /// Initial value for a script variable, applied before the run starts.
    #[arg(short = 'V', long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Seconds the responder waits for a datagram before rechecking for
    /// shutdown.
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    pub poll_timeout: u64,

    /// Prefix for OIDs the script writes without a leading dot.
    #[arg(long, default_value = DEFAULT_BASE_OID)]
    pub base_oid: String,

    /// Log to stderr instead of `<SCRIPT>.log`.
    #[arg(long)]
    pub log_stderr: bool,

    /// Print version and exit. `-V` is taken by `--var`.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
