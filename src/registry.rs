//! Process-wide resource tables: transports, producers, consumers, indexed
//! both by id and by owning client (§4.2). A single mutex over the whole
//! registry is used throughout, per §5's "a whole-registry lock is
//! acceptable given the modest entry counts in a single-SFU deployment".

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mediasoup::consumer::{Consumer, ConsumerId};
use mediasoup::producer::{Producer, ProducerId};
use mediasoup::rtp_parameters::MediaKind;
use mediasoup::transport::{Transport, TransportId};
use mediasoup::webrtc_transport::WebRtcTransport;

use crate::media_router::Direction;
use crate::media_source::MediaSource;

pub type ClientId = String;

struct TransportEntry {
    owner: ClientId,
    direction: Direction,
    connected: bool,
    created_at: Instant,
    transport: WebRtcTransport,
}

struct ProducerEntry {
    owner: ClientId,
    kind: MediaKind,
    source: MediaSource,
    producer: Producer,
}

struct ConsumerEntry {
    owner: ClientId,
    producer_id: ProducerId,
    consumer: Consumer,
}

/// A producer as seen by a peer that did not create it: the shape returned
/// by `joinRoom`'s `existingProducers` and by `newProducer` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerView {
    pub producer_id: ProducerId,
    pub client_id: ClientId,
    pub kind: MediaKind,
    pub source: MediaSource,
}

#[derive(Default)]
struct State {
    transports: HashMap<TransportId, TransportEntry>,
    producers: HashMap<ProducerId, ProducerEntry>,
    consumers: HashMap<ConsumerId, ConsumerEntry>,

    client_transports: HashMap<ClientId, HashSet<TransportId>>,
    client_producers: HashMap<ClientId, HashSet<ProducerId>>,
    client_consumers: HashMap<ClientId, HashSet<ConsumerId>>,
}

#[derive(Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- transports ---------------------------------------------------

    pub fn put_transport(&self, owner: ClientId, direction: Direction, transport: WebRtcTransport) {
        let mut state = self.state.lock().unwrap();
        let id = transport.id();
        state.transports.insert(
            id,
            TransportEntry {
                owner: owner.clone(),
                direction,
                connected: false,
                created_at: Instant::now(),
                transport,
            },
        );
        state.client_transports.entry(owner).or_default().insert(id);
    }

    pub fn get_transport(&self, id: TransportId) -> Option<WebRtcTransport> {
        self.state.lock().unwrap().transports.get(&id).map(|e| e.transport.clone())
    }

    /// Transport owned by `client`, in the given `direction`, that is
    /// connected and not closed. Used to validate `produce`/`consume`
    /// preconditions (I3) in one call.
    pub fn get_ready_transport(
        &self,
        client: &str,
        id: TransportId,
        direction: Direction,
    ) -> Result<WebRtcTransport, ReadyTransportError> {
        let state = self.state.lock().unwrap();
        let entry = state
            .transports
            .get(&id)
            .ok_or(ReadyTransportError::NotFound)?;
        if entry.owner != client {
            return Err(ReadyTransportError::NotOwned);
        }
        if entry.direction != direction {
            return Err(ReadyTransportError::WrongDirection);
        }
        if !entry.connected {
            return Err(ReadyTransportError::NotConnected);
        }
        Ok(entry.transport.clone())
    }

    pub fn get_owned_transport(&self, client: &str, id: TransportId) -> Option<WebRtcTransport> {
        let state = self.state.lock().unwrap();
        let entry = state.transports.get(&id)?;
        (entry.owner == client).then(|| entry.transport.clone())
    }

    pub fn mark_transport_connected(&self, id: TransportId) {
        if let Some(entry) = self.state.lock().unwrap().transports.get_mut(&id) {
            entry.connected = true;
        }
    }

    pub fn is_transport_connected(&self, id: TransportId) -> bool {
        self.state
            .lock()
            .unwrap()
            .transports
            .get(&id)
            .is_some_and(|e| e.connected)
    }

    pub fn has_transport_direction(&self, client: &str, direction: Direction) -> bool {
        let state = self.state.lock().unwrap();
        state
            .client_transports
            .get(client)
            .into_iter()
            .flatten()
            .any(|id| {
                state
                    .transports
                    .get(id)
                    .is_some_and(|e| e.direction == direction)
            })
    }

    pub fn list_client_transports(&self, client: &str) -> Vec<TransportId> {
        let state = self.state.lock().unwrap();
        state
            .client_transports
            .get(client)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a transport from the registry. `mediasoup` has no public
    /// `close()` — the registry holds the only strong reference, so removing
    /// it here drops the handle, which is what actually closes the
    /// transport. MediaRouter cascade events are responsible for removing
    /// the producers/consumers that depended on it (§4.2); this call is
    /// idempotent.
    ///
    /// The entry is dropped *after* the lock is released: dropping a
    /// transport can synchronously run its close handler, which calls back
    /// into the registry, and re-locking `state` from inside that callback
    /// would deadlock.
    pub fn close_transport(&self, id: TransportId) {
        let entry = {
            let mut state = self.state.lock().unwrap();
            let entry = state.transports.remove(&id);
            if let Some(entry) = &entry {
                if let Some(set) = state.client_transports.get_mut(&entry.owner) {
                    set.remove(&id);
                }
            }
            entry
        };
        drop(entry);
    }

    // -- producers ------------------------------------------------------

    pub fn put_producer(
        &self,
        owner: ClientId,
        kind: MediaKind,
        source: MediaSource,
        producer: Producer,
    ) {
        let mut state = self.state.lock().unwrap();
        let id = producer.id();
        state.producers.insert(
            id,
            ProducerEntry {
                owner: owner.clone(),
                kind,
                source,
                producer,
            },
        );
        state.client_producers.entry(owner).or_default().insert(id);
    }

    pub fn get_producer(&self, id: ProducerId) -> Option<Producer> {
        self.state.lock().unwrap().producers.get(&id).map(|e| e.producer.clone())
    }

    pub fn producer_owner(&self, id: ProducerId) -> Option<ClientId> {
        self.state.lock().unwrap().producers.get(&id).map(|e| e.owner.clone())
    }

    /// The view published to a newly-joined client (§4.2): every non-closed
    /// producer whose owner != `exclude`.
    pub fn list_producers(&self, exclude: &str) -> Vec<ProducerView> {
        let state = self.state.lock().unwrap();
        state
            .producers
            .values()
            .filter(|e| e.owner != exclude)
            .map(|e| ProducerView {
                producer_id: e.producer.id(),
                client_id: e.owner.clone(),
                kind: e.kind,
                source: e.source,
            })
            .collect()
    }

    /// Screen producers in the registry owned by anyone other than
    /// `exclude` — used by `closeAllScreenShares` (I5).
    pub fn list_foreign_screen_producers(&self, exclude: &str) -> Vec<(ProducerId, ClientId)> {
        let state = self.state.lock().unwrap();
        state
            .producers
            .values()
            .filter(|e| e.source.is_screen() && e.owner != exclude)
            .map(|e| (e.producer.id(), e.owner.clone()))
            .collect()
    }

    /// Remove a producer from the registry, dropping the registry's handle
    /// (see [`Registry::close_transport`] for why that's what actually
    /// closes it, and why the drop happens after the lock is released).
    /// Idempotent.
    pub fn close_producer(&self, id: ProducerId) {
        let entry = {
            let mut state = self.state.lock().unwrap();
            let entry = state.producers.remove(&id);
            if let Some(entry) = &entry {
                if let Some(set) = state.client_producers.get_mut(&entry.owner) {
                    set.remove(&id);
                }
            }
            entry
        };
        drop(entry);
    }

    // -- consumers --------------------------------------------------------

    pub fn put_consumer(&self, owner: ClientId, producer_id: ProducerId, consumer: Consumer) {
        let mut state = self.state.lock().unwrap();
        let id = consumer.id();
        state.consumers.insert(
            id,
            ConsumerEntry {
                owner: owner.clone(),
                producer_id,
                consumer,
            },
        );
        state.client_consumers.entry(owner).or_default().insert(id);
    }

    pub fn get_consumer(&self, id: ConsumerId) -> Option<Consumer> {
        self.state.lock().unwrap().consumers.get(&id).map(|e| e.consumer.clone())
    }

    pub fn get_owned_consumer(&self, client: &str, id: ConsumerId) -> Option<Consumer> {
        let state = self.state.lock().unwrap();
        let entry = state.consumers.get(&id)?;
        (entry.owner == client).then(|| entry.consumer.clone())
    }

    /// Remove a consumer from the registry, dropping the registry's handle
    /// after the lock is released (see [`Registry::close_transport`]).
    /// Idempotent.
    pub fn close_consumer(&self, id: ConsumerId) {
        let entry = {
            let mut state = self.state.lock().unwrap();
            let entry = state.consumers.remove(&id);
            if let Some(entry) = &entry {
                if let Some(set) = state.client_consumers.get_mut(&entry.owner) {
                    set.remove(&id);
                }
            }
            entry
        };
        drop(entry);
    }

    // -- whole-client cascade --------------------------------------------

    /// Close every resource owned by `client`. Idempotent and safe to call
    /// concurrently with MediaRouter cascade events that are independently
    /// tearing down the same ids (§4.2, §5).
    pub fn close_client(&self, client: &str) -> ClosedResources {
        let (transports, producers) = {
            let state = self.state.lock().unwrap();
            (
                state.client_transports.get(client).cloned().unwrap_or_default(),
                state.client_producers.get(client).cloned().unwrap_or_default(),
            )
        };
        for id in &transports {
            self.close_transport(*id);
        }
        for id in &producers {
            self.close_producer(*id);
        }
        // Any consumers that survived (their producer/transport belonged to
        // someone else) are closed explicitly here.
        let consumers = {
            let state = self.state.lock().unwrap();
            state.client_consumers.get(client).cloned().unwrap_or_default()
        };
        for id in &consumers {
            self.close_consumer(*id);
        }
        let mut state = self.state.lock().unwrap();
        state.client_transports.remove(client);
        state.client_producers.remove(client);
        state.client_consumers.remove(client);
        ClosedResources {
            transports: transports.len(),
            producers: producers.into_iter().collect(),
            consumers: consumers.len(),
        }
    }

    /// Close and remove any transport still unconnected `timeout` after
    /// creation (§4.5.2, scenario 6).
    pub fn reap_unconnected_transports(&self, timeout: Duration) -> usize {
        let expired: Vec<TransportId> = {
            let state = self.state.lock().unwrap();
            state
                .transports
                .iter()
                .filter(|(_, e)| !e.connected && e.created_at.elapsed() >= timeout)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in &expired {
            self.close_transport(*id);
        }
        expired.len()
    }

    /// Producers/consumers/transports owned by `client`, for `getStats`.
    pub fn client_resources(&self, client: &str) -> ClientResources {
        let state = self.state.lock().unwrap();
        ClientResources {
            transports: state
                .client_transports
                .get(client)
                .into_iter()
                .flatten()
                .filter_map(|id| state.transports.get(id).map(|e| e.transport.clone()))
                .collect(),
            producers: state
                .client_producers
                .get(client)
                .into_iter()
                .flatten()
                .filter_map(|id| state.producers.get(id).map(|e| e.producer.clone()))
                .collect(),
            consumers: state
                .client_consumers
                .get(client)
                .into_iter()
                .flatten()
                .filter_map(|id| state.consumers.get(id).map(|e| e.consumer.clone()))
                .collect(),
        }
    }

    pub fn is_client_empty(&self, client: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.client_transports.get(client).is_none_or(HashSet::is_empty)
            && state.client_producers.get(client).is_none_or(HashSet::is_empty)
            && state.client_consumers.get(client).is_none_or(HashSet::is_empty)
    }
}

/// Summary of what `close_client` tore down, used by the Lifecycle
/// Supervisor to know which `producerClosed` events to broadcast (scenario 4).
pub struct ClosedResources {
    pub transports: usize,
    pub producers: Vec<ProducerId>,
    pub consumers: usize,
}

pub struct ClientResources {
    pub transports: Vec<WebRtcTransport>,
    pub producers: Vec<Producer>,
    pub consumers: Vec<Consumer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyTransportError {
    NotFound,
    NotOwned,
    WrongDirection,
    NotConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Registry correctness is exercised end-to-end in tests/registry.rs,
    // which needs a real mediasoup worker to construct transports/producers.
    // Pure bookkeeping that doesn't require a worker is covered here.

    #[test]
    fn empty_registry_has_no_producers_for_anyone() {
        let registry = Registry::new();
        assert!(registry.list_producers("alice").is_empty());
        assert!(registry.list_client_transports("alice").is_empty());
        assert!(registry.is_client_empty("alice"));
    }

    #[test]
    fn unknown_client_has_no_ready_transport() {
        let registry = Registry::new();
        assert!(registry.get_owned_transport("alice", unsafe_test_transport_id()).is_none());
    }

    // `TransportId` is only ever minted by a real mediasoup worker; to probe
    // "not found" without one we round-trip a random UUID through the same
    // `Deserialize` impl the wire protocol uses.
    fn unsafe_test_transport_id() -> TransportId {
        serde_json::from_value(serde_json::json!(uuid::Uuid::new_v4().to_string())).unwrap()
    }
}
