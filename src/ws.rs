//! Per-connection plumbing: a warp websocket upgraded into a task that reads
//! [`ClientEnvelope`]s, dispatches them through [`signaling`], and forwards
//! [`ServerEvent`]s pushed from elsewhere in the process (room broadcasts,
//! the Lifecycle Supervisor).

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use warp::ws::{Message, WebSocket};

use crate::lifecycle;
use crate::protocol::{
    AckEnvelope, AckPayload, AckResult, ClientEnvelope, ClientMessage, ServerEvent, ServerMessage,
};
use crate::room::Emitter;
use crate::server::{ClientConnection, RelayServer};
use crate::session::Session;

/// Handle installed in the server's connection table so a `client-id`
/// collision can force-close the older connection (§11 open question #3).
pub struct Connection {
    outbox: mpsc::UnboundedSender<ServerMessage>,
    shutdown: Notify,
}

impl Emitter for Connection {
    fn send(&self, event: ServerEvent) -> bool {
        self.outbox.send(ServerMessage::Event(event)).is_ok()
    }
}

impl ClientConnection for Connection {
    fn force_close(&self) {
        self.shutdown.notify_one();
    }
}

pub async fn handle_connection(server: Arc<RelayServer>, ws: WebSocket) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection: Arc<Connection> = Arc::new(Connection {
        outbox: outbox_tx,
        shutdown: Notify::new(),
    });
    let session = Session::new();

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if ws_tx.send(Message::text(json)).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            _ = connection.shutdown.notified() => {
                log::debug!("connection force-closed (client id superseded)");
                break;
            }
        };
        let Some(next) = next else { break };
        let message = match next {
            Ok(message) => message,
            Err(err) => {
                log::debug!("websocket read error: {err}");
                break;
            }
        };
        if message.is_close() {
            break;
        }
        if !message.is_text() {
            continue;
        }
        let text = message.to_str().unwrap_or_default();
        let envelope: ClientEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("discarding malformed request: {err}");
                continue;
            }
        };

        let ack = tokio::time::timeout(
            server.config.request_timeout,
            dispatch(&server, &session, connection.clone(), envelope.message),
        )
        .await
        .unwrap_or(Err(crate::errors::SignalError::Timeout));
        let frame = ServerMessage::Ack(AckEnvelope {
            id: envelope.id,
            result: match ack {
                Ok(payload) => AckResult::Ok(payload),
                Err(err) => AckResult::Err {
                    error: err.message(),
                },
            },
        });
        if connection.outbox.send(frame).is_err() {
            break;
        }
    }

    if let Some(client_id) = session.client_id() {
        let handle: Arc<dyn ClientConnection> = connection.clone();
        server.unregister_connection(&client_id, &handle);
    }
    lifecycle::disconnect(&server, &session).await;
    send_task.abort();
}

async fn dispatch(
    server: &Arc<RelayServer>,
    session: &Session,
    connection: Arc<Connection>,
    message: ClientMessage,
) -> Result<AckPayload, crate::errors::SignalError> {
    use crate::signaling;

    match message {
        ClientMessage::GetRtpCapabilities => signaling::get_rtp_capabilities(server).await,
        ClientMessage::JoinRoom { room_id, client_id } => {
            let handle: Arc<dyn ClientConnection> = connection.clone();
            let emitter: Arc<dyn Emitter> = connection;
            signaling::join_room(server, session, handle, emitter, room_id, client_id).await
        }
        ClientMessage::CreateTransport { direction } => {
            let client_id = client_id_of(session)?;
            signaling::create_transport(server, session, &client_id, direction).await
        }
        ClientMessage::ConnectTransport {
            transport_id,
            dtls_parameters,
        } => {
            let client_id = client_id_of(session)?;
            signaling::connect_transport(server, session, &client_id, transport_id, dtls_parameters)
                .await
        }
        ClientMessage::Produce {
            transport_id,
            kind,
            rtp_parameters,
            app_data,
        } => {
            let client_id = client_id_of(session)?;
            signaling::produce(
                server,
                session,
                &client_id,
                transport_id,
                kind,
                rtp_parameters,
                app_data,
            )
            .await
        }
        ClientMessage::Consume {
            transport_id,
            producer_id,
            rtp_capabilities,
        } => {
            let client_id = client_id_of(session)?;
            signaling::consume(
                server,
                session,
                &client_id,
                transport_id,
                producer_id,
                rtp_capabilities,
            )
            .await
        }
        ClientMessage::CloseAllScreenShares => {
            let client_id = client_id_of(session)?;
            let room_id = session.room_id().ok_or(crate::errors::SignalError::NotJoined)?;
            let room = server
                .rooms
                .get(&room_id)
                .ok_or(crate::errors::SignalError::NotJoined)?;
            signaling::close_all_screen_shares(server, session, &room, &client_id).await
        }
        ClientMessage::GetStats => {
            let client_id = client_id_of(session)?;
            signaling::get_stats(session, server, &client_id).await
        }
        ClientMessage::RestartIce { transport_id } => {
            let client_id = client_id_of(session)?;
            signaling::restart_ice(server, session, &client_id, transport_id).await
        }
        ClientMessage::ConsumerResume { consumer_id } => {
            let client_id = client_id_of(session)?;
            signaling::consumer_resume(server, session, &client_id, consumer_id).await
        }
        ClientMessage::ConsumerPause { consumer_id } => {
            let client_id = client_id_of(session)?;
            signaling::consumer_pause(server, session, &client_id, consumer_id).await
        }
    }
}

fn client_id_of(session: &Session) -> Result<String, crate::errors::SignalError> {
    session.client_id().ok_or(crate::errors::SignalError::NotJoined)
}
