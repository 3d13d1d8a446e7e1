//! Room membership and broadcast fan-out (§4.3), plus the single router
//! each room owns (one MediaRouter per room, created lazily on first join).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use mediasoup::rtp_parameters::RtpCodecCapability;
use mediasoup::webrtc_transport::TransportListenIp;
use mediasoup::worker::Worker;

use crate::media_router::MediaRouter;
use crate::protocol::ServerEvent;
use crate::registry::ClientId;

pub type RoomId = String;

/// One outbound event sink per connected client; `send` is best-effort
/// (§4.3/§9's "make per-peer delivery failure observable") — it returns
/// whether the event was actually handed off, so callers can count drops
/// instead of silently discarding the outcome.
pub trait Emitter: Send + Sync {
    fn send(&self, event: ServerEvent) -> bool;
}

#[derive(Clone)]
pub struct Room {
    shared: Arc<Shared>,
}

#[derive(Clone)]
pub struct WeakRoom {
    shared: Weak<Shared>,
}

struct Shared {
    id: RoomId,
    router: MediaRouter,
    state: Mutex<State>,
    /// Held across a `closeAllScreenShares` scan+close+broadcast sequence so
    /// concurrent screen arbitrations from different clients serialize
    /// instead of both observing the old screen producer as "still there"
    /// (§5, I5).
    screen_arbitration: tokio::sync::Mutex<()>,
}

struct State {
    members: HashMap<ClientId, Arc<dyn Emitter>>,
    dropped_deliveries: u64,
}

impl Room {
    pub async fn new(
        id: RoomId,
        worker: &Worker,
        codecs: Vec<RtpCodecCapability>,
        listen_ip: TransportListenIp,
    ) -> anyhow::Result<Self> {
        let router = MediaRouter::new(worker, codecs, listen_ip).await?;
        Ok(Self {
            shared: Arc::new(Shared {
                id,
                router,
                state: Mutex::new(State {
                    members: HashMap::new(),
                    dropped_deliveries: 0,
                }),
                screen_arbitration: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn id(&self) -> &RoomId {
        &self.shared.id
    }

    pub fn router(&self) -> &MediaRouter {
        &self.shared.router
    }

    pub fn downgrade(&self) -> WeakRoom {
        WeakRoom {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Lock held across a screen-share arbitration sequence (§5). The guard
    /// must be held from the snapshot of existing screen producers through
    /// the broadcast of their `producerClosed` events.
    pub async fn screen_arbitration_lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.shared.screen_arbitration.lock().await
    }

    pub fn join(&self, client_id: ClientId, emitter: Arc<dyn Emitter>) {
        let mut state = self.shared.state.lock().unwrap();
        state.members.insert(client_id, emitter);
    }

    /// Returns `true` if the room is now empty (caller should drop its
    /// `Room` handle so the `Shared`, and the router within it, are freed).
    pub fn leave(&self, client_id: &str) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        state.members.remove(client_id);
        state.members.is_empty()
    }

    pub fn members(&self) -> Vec<ClientId> {
        self.shared.state.lock().unwrap().members.keys().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.shared.state.lock().unwrap().members.len()
    }

    /// Deliver `event` to every member except `exclude`. Delivery is
    /// best-effort: an emitter that can no longer accept events (its
    /// connection already closed) is counted as a drop rather than
    /// propagated as an error, per §4.3/§9.
    pub fn broadcast(&self, event: ServerEvent, exclude: Option<&str>) {
        let targets: Vec<Arc<dyn Emitter>> = {
            let state = self.shared.state.lock().unwrap();
            state
                .members
                .iter()
                .filter(|(client_id, _)| Some(client_id.as_str()) != exclude)
                .map(|(_, emitter)| emitter.clone())
                .collect()
        };
        let dropped = targets
            .iter()
            .filter(|emitter| !emitter.send(event.clone()))
            .count();
        if dropped > 0 {
            self.shared.state.lock().unwrap().dropped_deliveries += dropped as u64;
        }
    }

    pub fn dropped_deliveries(&self) -> u64 {
        self.shared.state.lock().unwrap().dropped_deliveries
    }
}

impl WeakRoom {
    pub fn upgrade(&self) -> Option<Room> {
        self.shared.upgrade().map(|shared| Room { shared })
    }
}

/// Top-level room-id -> Room map, the reverse client-id -> room-id index,
/// and the policies of §4.3: joining creates, leaving the last member
/// destroys.
#[derive(Default)]
pub struct RoomRegistry {
    state: Mutex<RoomState>,
}

#[derive(Default)]
struct RoomState {
    rooms: HashMap<RoomId, Room>,
    client_room: HashMap<ClientId, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<Room> {
        self.state.lock().unwrap().rooms.get(room_id).cloned()
    }

    pub fn insert_if_absent(&self, room: Room) -> Room {
        let mut state = self.state.lock().unwrap();
        state.rooms.entry(room.id().clone()).or_insert(room).clone()
    }

    pub fn room_of(&self, client_id: &str) -> Option<RoomId> {
        self.state.lock().unwrap().client_room.get(client_id).cloned()
    }

    pub fn record_membership(&self, client_id: ClientId, room_id: RoomId) {
        self.state.lock().unwrap().client_room.insert(client_id, room_id);
    }

    /// Remove `client_id` from the room it belongs to, destroying the room
    /// entry if it was the last member. Returns the room, if any, for the
    /// caller to emit `clientDisconnected` on before it is possibly dropped.
    pub fn leave(&self, client_id: &str) -> Option<Room> {
        let mut state = self.state.lock().unwrap();
        let room_id = state.client_room.remove(client_id)?;
        let room = state.rooms.get(&room_id)?.clone();
        if room.leave(client_id) {
            state.rooms.remove(&room_id);
            log::debug!("room {room_id} destroyed (last member left)");
        }
        Some(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_tracks_client_room_membership() {
        let registry = RoomRegistry::new();
        registry.record_membership("alice".into(), "main".into());
        assert_eq!(registry.room_of("alice"), Some("main".into()));
        assert_eq!(registry.room_of("bob"), None);
    }
}
