//! Top-level process state: the MediaRouter worker, the room and resource
//! registries, and the client-id uniqueness/supersession policy (§4.1,
//! SPEC_FULL.md §11 open question #3).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mediasoup::consumer::Consumer;
use mediasoup::producer::Producer;
use mediasoup::router::RouterOptions;
use mediasoup::rtp_parameters::RtpCapabilitiesFinalized;
use mediasoup::transport::Transport;
use mediasoup::webrtc_transport::WebRtcTransport;
use mediasoup::worker::{Worker, WorkerManager};

use crate::config::Config;
use crate::protocol::ServerEvent;
use crate::registry::{ClientId, Registry};
use crate::room::{Emitter, RoomRegistry, WeakRoom};

/// A live client connection: can be told to shut down (used to force-close
/// a superseded connection on `client-id` collision). Kept separate from
/// [`Emitter`] rather than a supertrait of it so callers can hand out each
/// capability as its own trait object without relying on trait-object
/// upcasting.
pub trait ClientConnection: Send + Sync {
    fn force_close(&self);
}

pub struct RelayServer {
    pub config: Config,
    pub worker_manager: WorkerManager,
    pub worker: Worker,
    pub local_pool: tokio_local::LocalPoolHandle,
    pub rooms: RoomRegistry,
    pub registry: Registry,
    /// The codec/feature set every room's router ends up advertising, since
    /// every room is built from the same fixed codec list (§4.1: "stable for
    /// the process lifetime"). Computed once from a throwaway router so
    /// `getRtpCapabilities` (precondition: none, §6) doesn't need a joined
    /// room to answer.
    pub rtp_capabilities: RtpCapabilitiesFinalized,
    connections: Mutex<HashMap<ClientId, Arc<dyn ClientConnection>>>,
}

impl RelayServer {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let worker_manager = WorkerManager::new();
        let worker = worker_manager
            .create_worker(config.worker_settings())
            .await
            .map_err(|err| anyhow::anyhow!("failed to create mediasoup worker: {err}"))?;
        worker.on_dead(|reason| {
            log::error!("mediasoup worker died: {reason}; exiting process");
            std::process::exit(1);
        });

        let capabilities_router = worker
            .create_router(RouterOptions::new(crate::config::supported_codecs()))
            .await
            .map_err(|err| anyhow::anyhow!("failed to create capabilities router: {err}"))?;
        let rtp_capabilities = capabilities_router.rtp_capabilities().clone();

        Ok(Self {
            config,
            worker_manager,
            worker,
            local_pool: tokio_local::new_local_pool(4),
            rooms: RoomRegistry::new(),
            registry: Registry::new(),
            rtp_capabilities,
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Attach a close handler so a transport's registry entry is removed the
    /// moment `mediasoup` reports it closed, whatever the cause — an
    /// explicit [`Registry::close_transport`] call, its DTLS state reaching
    /// `Closed` (§4.4), or the worker tearing it down. Grounded on the
    /// teacher's `room.rs` weak-self + `.detach()` pattern for `on_closed`.
    pub fn watch_transport_close(self: &Arc<Self>, transport: &WebRtcTransport) {
        let server = Arc::downgrade(self);
        let transport_id = transport.id();
        transport
            .on_close(move || {
                if let Some(server) = server.upgrade() {
                    server.registry.close_transport(transport_id);
                }
            })
            .detach();
    }

    /// Same as [`Self::watch_transport_close`] for producers, plus the
    /// `producerClosed` broadcast (§4.2) — the single place that event is
    /// emitted from, regardless of why the producer closed.
    pub fn watch_producer_close(self: &Arc<Self>, producer: &Producer, room: WeakRoom) {
        let server = Arc::downgrade(self);
        let producer_id = producer.id();
        producer
            .on_close(move || {
                if let Some(server) = server.upgrade() {
                    server.registry.close_producer(producer_id);
                }
                if let Some(room) = room.upgrade() {
                    room.broadcast(ServerEvent::ProducerClosed { producer_id }, None);
                }
            })
            .detach();
    }

    /// Same as [`Self::watch_transport_close`] for consumers; no wire event
    /// is associated with a closed consumer.
    pub fn watch_consumer_close(self: &Arc<Self>, consumer: &Consumer) {
        let server = Arc::downgrade(self);
        let consumer_id = consumer.id();
        consumer
            .on_close(move || {
                if let Some(server) = server.upgrade() {
                    server.registry.close_consumer(consumer_id);
                }
            })
            .detach();
    }

    /// Register `client_id` as belonging to `connection`. If a connection
    /// with the same `client_id` already exists, it is force-closed before
    /// the new one is admitted (collision is resolved by supersession, not
    /// rejection).
    pub fn register_connection(&self, client_id: ClientId, connection: Arc<dyn ClientConnection>) {
        let previous = {
            let mut connections = self.connections.lock().unwrap();
            connections.insert(client_id.clone(), connection)
        };
        if let Some(previous) = previous {
            log::warn!("client id {client_id} reconnected; closing previous connection");
            previous.force_close();
        }
    }

    /// Remove `client_id` from the connection table, but only if it still
    /// points at `connection` — a superseded connection's own cleanup must
    /// not clobber the table entry the newer connection just installed.
    pub fn unregister_connection(&self, client_id: &str, connection: &Arc<dyn ClientConnection>) {
        let mut connections = self.connections.lock().unwrap();
        if let Some(current) = connections.get(client_id) {
            if Arc::ptr_eq(current, connection) {
                connections.remove(client_id);
            }
        }
    }

    pub fn broadcast(&self, room: &crate::room::Room, event: ServerEvent, exclude: Option<&str>) {
        room.broadcast(event, exclude);
    }
}
