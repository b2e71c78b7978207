//! UDP serve loop for the [`Agent`].
//!
//! The loop waits for a datagram for at most one poll interval, then checks
//! the shutdown flag, so a shutdown request is noticed within one interval.
//! Each datagram is handled on the blocking pool: a set on a blocking
//! variable parks its worker until the interpreter takes the value.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::snmp::Agent;

/// Largest datagram we accept (the UDP payload limit).
const MAX_DATAGRAM: usize = 65_507;

/// Serve until `shutdown` becomes `true` or its sender is dropped.
pub async fn serve(
    socket: UdpSocket,
    agent: Arc<Agent>,
    mut shutdown: watch::Receiver<bool>,
    poll: Duration,
) -> io::Result<()> {
    let socket = Arc::new(socket);
    info!(addr = ?socket.local_addr()?, "responder listening");
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        if *shutdown.borrow() {
            break;
        }
        let (len, peer) = match timeout(poll, socket.recv_from(&mut buf)).await {
            Err(_elapsed) => {
                if shutdown.has_changed().is_err() {
                    break;
                }
                continue;
            }
            Ok(Err(e)) => {
                // ICMP port-unreachable from an earlier reply surfaces here
                // on some platforms; it does not affect the socket.
                warn!(error = %e, "receive failed");
                continue;
            }
            Ok(Ok(received)) => received,
        };

        let datagram = buf[..len].to_vec();
        let agent = Arc::clone(&agent);
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || agent.process(&datagram)).await {
                Ok(Some(reply)) => send_reply(&socket, &reply, peer).await,
                Ok(None) => {}
                Err(e) => warn!(error = %e, %peer, "request handler failed"),
            }
        });
    }

    info!("responder stopped");
    Ok(())
}

async fn send_reply(socket: &UdpSocket, reply: &[u8], peer: SocketAddr) {
    match socket.send_to(reply, peer).await {
        Ok(_) => debug!(%peer, len = reply.len(), "reply sent"),
        Err(e) => warn!(error = %e, %peer, "reply failed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
