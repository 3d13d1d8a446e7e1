//! Lifecycle Supervisor (§4.5): the disconnect cascade and the
//! unconnected-transport reaper. Both act purely through the registries, so
//! they are safe to run concurrently with request handlers (§5).

use std::sync::Arc;
use std::time::Duration;

use crate::protocol::ServerEvent;
use crate::server::RelayServer;
use crate::session::Session;

/// Disconnect cascade (§4.5.1): tear down every resource the client owned,
/// notify the room, and remove the client from both indexes. Idempotent —
/// safe to call on a session that never finished joining.
pub async fn disconnect(server: &Arc<RelayServer>, session: &Session) {
    let Some((client_id, _room_id)) = session.close() else {
        return;
    };
    let Some(room) = server.rooms.leave(&client_id) else {
        log::debug!("client {client_id} disconnected before completing room membership");
        return;
    };

    let closed = server.registry.close_client(&client_id);
    log::debug!(
        "client {client_id} disconnected: closed {} transports, {} producers, {} consumers",
        closed.transports,
        closed.producers.len(),
        closed.consumers
    );
    // Each closed producer's own close handler (registered in
    // `signaling::produce`) broadcasts `producerClosed`.

    room.broadcast(
        ServerEvent::ClientDisconnected {
            client_id: client_id.clone(),
        },
        None,
    );
}

/// Reaper for transports a client allocated but never connected (§4.5.2,
/// scenario 6). Runs for the life of the process; `interval` controls how
/// often it sweeps, independent of the per-transport timeout.
pub async fn run_unconnected_transport_reaper(server: Arc<RelayServer>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        reap_once(&server);
    }
}

fn reap_once(server: &RelayServer) {
    let timeout = server.config.unconnected_transport_timeout;
    let reaped = server.registry.reap_unconnected_transports(timeout);
    if reaped > 0 {
        log::info!("reaped {reaped} unconnected transports past {timeout:?}");
    }
}
