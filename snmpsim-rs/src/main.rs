use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::Parser as _;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{error, info, warn};

use snmpsim::cli::CliArgs;
use snmpsim::config::{apply_initializers, ConfigError, SimConfig};
use snmpsim::logging;
use snmpsim::script::{Interpreter, Parser, ScriptError, Stdout};
use snmpsim::server;
use snmpsim::snmp::Agent;
use snmpsim::store::ValueStore;

/// Anything that stops the simulator from starting.
#[derive(Debug, Error)]
enum StartError {
    #[error("unable to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("{path}: {source}")]
    Script { path: PathBuf, source: ScriptError },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("failed to start interpreter thread: {0}")]
    Thread(io::Error),
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config = match SimConfig::from_args(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("snmpsim: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("snmpsim: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("snmpsim: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let poll = config.poll_timeout;
    let outcome = runtime.block_on(run(config));
    // Responder workers can still be inside a store call; don't wait on them
    // past one poll interval.
    runtime.shutdown_timeout(poll);

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("snmpsim: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Load, serve and run the script. `Ok(false)` if the script aborted with a
/// runtime error.
async fn run(config: SimConfig) -> Result<bool, StartError> {
    // ── Load (fail fast) ──────────────────────────────────────────────────────
    let src = std::fs::read_to_string(&config.script).map_err(|source| StartError::Read {
        path: config.script.clone(),
        source,
    })?;
    let program = Parser::new(&src)
        .with_base_oid(&config.base_oid)
        .parse_program()
        .map_err(|source| StartError::Script {
            path: config.script.clone(),
            source,
        })?;
    info!(
        script = %config.script.display(),
        variables = program.types.len(),
        "script loaded"
    );

    let (store, inbox) = ValueStore::load(&program.types);
    apply_initializers(&config.inits, &store)?;
    let store = Arc::new(store);

    // ── Responder ─────────────────────────────────────────────────────────────
    let socket = UdpSocket::bind(config.listen)
        .await
        .map_err(|source| StartError::Bind {
            addr: config.listen.to_string(),
            source,
        })?;
    let agent = Arc::new(Agent::new(
        Arc::clone(&store),
        &config.read_community,
        &config.write_community,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let responder = tokio::spawn(server::serve(socket, agent, shutdown_rx, config.poll_timeout));

    // ── Interpreter ───────────────────────────────────────────────────────────
    // Runs on its own OS thread: `sleep` and blocking reads park it.
    let (done_tx, done_rx) = oneshot::channel();
    let interp_store = Arc::clone(&store);
    thread::Builder::new()
        .name("interpreter".into())
        .spawn(move || {
            let result = Interpreter::new(&program, interp_store, inbox, Stdout).run();
            let _ = done_tx.send(result);
        })
        .map_err(StartError::Thread)?;

    let completed = tokio::select! {
        result = done_rx => match result {
            Ok(Ok(())) => {
                info!("script completed");
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, "script aborted");
                eprintln!("snmpsim: {e}");
                false
            }
            Err(_) => {
                error!("interpreter thread panicked");
                false
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            true
        }
    };

    // ── Shutdown ──────────────────────────────────────────────────────────────
    store.close();
    let _ = shutdown_tx.send(true);
    match timeout(config.poll_timeout * 2, responder).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "responder failed"),
        Ok(Err(e)) => warn!(error = %e, "responder task failed"),
        Err(_) => warn!("responder did not stop in time"),
    }
    Ok(completed)
}
