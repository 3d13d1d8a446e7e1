//! Per-connection client session state machine (§4.4):
//! `NEW -> JOINED -> HAS_SEND/HAS_RECV -> READY`, terminal `CLOSED`.

use std::sync::Mutex;

use mediasoup::transport::TransportId;

use crate::errors::SignalError;
use crate::media_router::Direction;
use crate::registry::ClientId;
use crate::room::RoomId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Joined,
    HasSend,
    HasRecv,
    Ready,
    Closed,
}

/// Per-connection bookkeeping; the Signaling Protocol Handler consults this
/// before every verb to validate preconditions (§4.4/§5).
pub struct Session {
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    client_id: Option<ClientId>,
    room_id: Option<RoomId>,
    send_transport_id: Option<TransportId>,
    recv_transport_id: Option<TransportId>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::New,
                client_id: None,
                room_id: None,
                send_transport_id: None,
                recv_transport_id: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.inner.lock().unwrap().client_id.clone()
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.inner.lock().unwrap().room_id.clone()
    }

    pub fn send_transport_id(&self) -> Option<TransportId> {
        self.inner.lock().unwrap().send_transport_id
    }

    pub fn recv_transport_id(&self) -> Option<TransportId> {
        self.inner.lock().unwrap().recv_transport_id
    }

    pub fn transport_id(&self, direction: Direction) -> Option<TransportId> {
        match direction {
            Direction::Send => self.send_transport_id(),
            Direction::Recv => self.recv_transport_id(),
        }
    }

    /// `joinRoom`: legal only from `NEW` (I1: a session joins at most one
    /// room, for its whole lifetime).
    pub fn mark_joined(&self, client_id: ClientId, room_id: RoomId) -> Result<(), SignalError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            SessionState::New => {
                inner.state = SessionState::Joined;
                inner.client_id = Some(client_id);
                inner.room_id = Some(room_id);
                Ok(())
            }
            SessionState::Closed => Err(SignalError::TransportClosed),
            _ => Err(SignalError::AlreadyJoined),
        }
    }

    /// `createTransport`: legal only once joined, and only once per
    /// direction (§4.1).
    pub fn record_transport(
        &self,
        direction: Direction,
        id: TransportId,
    ) -> Result<(), SignalError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::New {
            return Err(SignalError::NotJoined);
        }
        if inner.state == SessionState::Closed {
            return Err(SignalError::TransportClosed);
        }
        let slot = match direction {
            Direction::Send => &mut inner.send_transport_id,
            Direction::Recv => &mut inner.recv_transport_id,
        };
        if slot.is_some() {
            return Err(SignalError::TransportAlreadyExists(direction.as_str()));
        }
        *slot = Some(id);
        inner.state = match (inner.send_transport_id, inner.recv_transport_id) {
            (Some(_), Some(_)) => SessionState::Ready,
            _ => match direction {
                Direction::Send => SessionState::HasSend,
                Direction::Recv => SessionState::HasRecv,
            },
        };
        Ok(())
    }

    /// Any verb past `joinRoom` requires the session to have joined a room.
    pub fn require_joined(&self) -> Result<(), SignalError> {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            SessionState::New => Err(SignalError::NotJoined),
            SessionState::Closed => Err(SignalError::TransportClosed),
            _ => Ok(()),
        }
    }

    /// Mark the session closed and return the `client_id`/`room_id` it held,
    /// for the Lifecycle Supervisor's disconnect cascade. Idempotent.
    pub fn close(&self) -> Option<(ClientId, RoomId)> {
        let mut inner = self.inner.lock().unwrap();
        let was_closed = inner.state == SessionState::Closed;
        inner.state = SessionState::Closed;
        if was_closed {
            return None;
        }
        match (inner.client_id.clone(), inner.room_id.clone()) {
            (Some(client_id), Some(room_id)) => Some((client_id, room_id)),
            _ => None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
