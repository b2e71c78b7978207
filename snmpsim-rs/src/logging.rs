//! Tracing subscriber setup.
//!
//! The filter comes from `RUST_LOG` and defaults to `info`. Output goes to
//! stderr or is appended to a log file next to the script.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::LogTarget;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot install logger: {0}")]
    Install(String),
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(target: &LogTarget) -> Result<(), LogError> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter());
    let installed = match target {
        LogTarget::Stderr => builder.with_writer(io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LogError::Open {
                    path: path.clone(),
                    source,
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    installed.map_err(|e| LogError::Install(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
