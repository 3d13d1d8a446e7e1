//! Signaling Protocol Handler (§4.4/§6): validates preconditions against
//! [`Session`] state, orchestrates MediaRouter calls, updates the
//! registries, and fans out broadcasts.

use std::sync::Arc;

use mediasoup::consumer::{ConsumerId, ConsumerOptions};
use mediasoup::data_structures::DtlsParameters;
use mediasoup::producer::{ProducerId, ProducerOptions};
use mediasoup::rtp_parameters::{MediaKind, RtpCapabilities, RtpParameters};
use mediasoup::transport::{Transport, TransportId};
use mediasoup::webrtc_transport::WebRtcTransportRemoteParameters;

use crate::errors::SignalError;
use crate::media_router::Direction;
use crate::media_source::AppData;
use crate::protocol::{AckPayload, ProducerInfo, ServerEvent, TransportOptions};
use crate::registry::ClientId;
use crate::room::{Emitter, Room};
use crate::server::{ClientConnection, RelayServer};
use crate::session::Session;

/// `getRtpCapabilities` (§6): precondition *none* — the codec set is
/// stable for the process lifetime (§4.1), so this is served straight off
/// [`RelayServer`] without requiring the caller to have joined a room.
pub async fn get_rtp_capabilities(server: &RelayServer) -> Result<AckPayload, SignalError> {
    Ok(AckPayload::GetRtpCapabilities {
        rtp_capabilities: server.rtp_capabilities.clone().into(),
    })
}

pub async fn join_room(
    server: &RelayServer,
    session: &Session,
    connection: Arc<dyn ClientConnection>,
    emitter: Arc<dyn Emitter>,
    room_id: String,
    client_id: ClientId,
) -> Result<AckPayload, SignalError> {
    session.mark_joined(client_id.clone(), room_id.clone())?;

    let room = match server.rooms.get(&room_id) {
        Some(room) => room,
        None => {
            let room = Room::new(
                room_id.clone(),
                &server.worker,
                crate::config::supported_codecs(),
                server.config.rtc_listen_ip.clone(),
            )
            .await
            .map_err(SignalError::from)?;
            server.rooms.insert_if_absent(room)
        }
    };

    server.register_connection(client_id.clone(), connection);
    room.join(client_id.clone(), emitter);
    server.rooms.record_membership(client_id.clone(), room_id);

    let producers = server
        .registry
        .list_producers(&client_id)
        .into_iter()
        .map(|p| ProducerInfo {
            producer_id: p.producer_id,
            client_id: p.client_id,
            kind: p.kind,
            app_data: AppData { source: p.source },
        })
        .collect();

    room.broadcast(
        ServerEvent::ClientJoined {
            client_id: client_id.clone(),
        },
        Some(&client_id),
    );

    Ok(AckPayload::JoinRoom { producers })
}

pub async fn create_transport(
    server: &Arc<RelayServer>,
    session: &Session,
    client_id: &str,
    direction: Direction,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    if session.transport_id(direction).is_some() {
        return Err(SignalError::TransportAlreadyExists(direction.as_str()));
    }
    let room = current_room(session, server)?;
    let transport = room
        .router()
        .create_transport(direction)
        .await
        .map_err(SignalError::from)?;

    let transport_options = TransportOptions {
        id: transport.id(),
        ice_parameters: transport.ice_parameters().clone(),
        ice_candidates: transport.ice_candidates().clone(),
        dtls_parameters: transport.dtls_parameters(),
    };

    server.watch_transport_close(&transport);
    server
        .registry
        .put_transport(client_id.to_string(), direction, transport);
    session.record_transport(direction, transport_options.id)?;

    Ok(AckPayload::CreateTransport { transport_options })
}

pub async fn connect_transport(
    server: &RelayServer,
    session: &Session,
    client_id: &str,
    transport_id: TransportId,
    dtls_parameters: DtlsParameters,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let transport = server
        .registry
        .get_owned_transport(client_id, transport_id)
        .ok_or(SignalError::TransportNotFound)?;
    if transport.closed() {
        return Err(SignalError::TransportClosed);
    }
    if server.registry.is_transport_connected(transport_id) {
        return Err(SignalError::TransportAlreadyExists("connected"));
    }
    transport
        .connect(WebRtcTransportRemoteParameters { dtls_parameters })
        .await
        .map_err(SignalError::from)?;
    server.registry.mark_transport_connected(transport_id);
    Ok(AckPayload::ConnectTransport {})
}

pub async fn produce(
    server: &Arc<RelayServer>,
    session: &Session,
    client_id: &str,
    transport_id: TransportId,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    app_data: AppData,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let transport = server
        .registry
        .get_ready_transport(client_id, transport_id, Direction::Send)?;

    let producer = server
        .local_pool
        .spawn_pinned(move || async move {
            transport
                .produce(ProducerOptions::new(kind, rtp_parameters))
                .await
        })
        .await
        .map_err(|err| anyhow::anyhow!("producer task panicked: {err}"))?
        .map_err(SignalError::from)?;

    let room = current_room(session, server)?;
    server.watch_producer_close(&producer, room.downgrade());
    server.registry.put_producer(
        client_id.to_string(),
        kind,
        app_data.source,
        producer.clone(),
    );

    room.broadcast(
        ServerEvent::NewProducer {
            producer_id: producer.id(),
            client_id: client_id.to_string(),
            kind,
            app_data,
        },
        Some(client_id),
    );

    Ok(AckPayload::Produce {
        producer_id: producer.id(),
    })
}

pub async fn consume(
    server: &Arc<RelayServer>,
    session: &Session,
    client_id: &str,
    transport_id: TransportId,
    producer_id: ProducerId,
    rtp_capabilities: RtpCapabilities,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let transport = server
        .registry
        .get_ready_transport(client_id, transport_id, Direction::Recv)?;

    let producer = server
        .registry
        .get_producer(producer_id)
        .ok_or(SignalError::ProducerNotFound)?;
    if producer.closed() {
        return Err(SignalError::ProducerNotFound);
    }

    let room = current_room(session, server)?;
    if !room.router().can_consume(&producer_id, &rtp_capabilities) {
        return Err(SignalError::CannotConsume);
    }

    let consumer = server
        .local_pool
        .spawn_pinned(move || async move {
            let mut options = ConsumerOptions::new(producer_id, rtp_capabilities);
            options.paused = true;
            transport.consume(options).await
        })
        .await
        .map_err(|err| anyhow::anyhow!("consumer task panicked: {err}"))?
        .map_err(SignalError::from)?;

    let kind = consumer.kind();
    let rtp_parameters = consumer.rtp_parameters().clone();
    let consumer_id = consumer.id();
    server.watch_consumer_close(&consumer);
    server
        .registry
        .put_consumer(client_id.to_string(), producer_id, consumer);

    Ok(AckPayload::Consume {
        consumer_id,
        producer_id,
        kind,
        rtp_parameters,
    })
}

/// `closeAllScreenShares` (§5): closes every screen producer owned by
/// someone other than the caller, under the room's arbitration lock.
pub async fn close_all_screen_shares(
    server: &RelayServer,
    session: &Session,
    room: &Room,
    client_id: &str,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let _guard = room.screen_arbitration_lock().await;

    let foreign = server.registry.list_foreign_screen_producers(client_id);
    for (producer_id, _owner) in &foreign {
        // The producer's own close handler (registered in `produce`) removes
        // it from the registry and broadcasts `producerClosed`.
        server.registry.close_producer(*producer_id);
    }

    Ok(AckPayload::CloseAllScreenShares {
        closed_count: foreign.len(),
    })
}

pub async fn restart_ice(
    server: &RelayServer,
    session: &Session,
    client_id: &str,
    transport_id: TransportId,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let transport = server
        .registry
        .get_owned_transport(client_id, transport_id)
        .ok_or(SignalError::TransportNotFound)?;
    let ice_parameters = transport.restart_ice().await.map_err(SignalError::from)?;
    Ok(AckPayload::RestartIce { ice_parameters })
}

pub async fn consumer_resume(
    server: &RelayServer,
    session: &Session,
    client_id: &str,
    consumer_id: ConsumerId,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let consumer = server
        .registry
        .get_owned_consumer(client_id, consumer_id)
        .ok_or(SignalError::ConsumerNotFound)?;
    consumer.resume().await.map_err(SignalError::from)?;
    Ok(AckPayload::Empty {})
}

pub async fn consumer_pause(
    server: &RelayServer,
    session: &Session,
    client_id: &str,
    consumer_id: ConsumerId,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let consumer = server
        .registry
        .get_owned_consumer(client_id, consumer_id)
        .ok_or(SignalError::ConsumerNotFound)?;
    consumer.pause().await.map_err(SignalError::from)?;
    Ok(AckPayload::Empty {})
}

pub async fn get_stats(
    session: &Session,
    server: &RelayServer,
    client_id: &str,
) -> Result<AckPayload, SignalError> {
    session.require_joined()?;
    let resources = server.registry.client_resources(client_id);
    let dropped_deliveries = current_room(session, server)?.dropped_deliveries();

    let mut transport_stats = Vec::new();
    for transport in resources.transports {
        if let Ok(stats) = transport.get_stats().await {
            transport_stats.push(serde_json::to_value(stats).unwrap_or_default());
        }
    }
    let mut producer_stats = Vec::new();
    for producer in resources.producers {
        if let Ok(stats) = producer.get_stats().await {
            producer_stats.push(serde_json::to_value(stats).unwrap_or_default());
        }
    }
    let mut consumer_stats = Vec::new();
    for consumer in resources.consumers {
        if let Ok(stats) = consumer.get_stats().await {
            consumer_stats.push(serde_json::to_value(stats).unwrap_or_default());
        }
    }

    Ok(AckPayload::GetStats {
        stats: serde_json::json!({
            "transports": transport_stats,
            "producers": producer_stats,
            "consumers": consumer_stats,
            "droppedDeliveries": dropped_deliveries,
        }),
    })
}

fn current_room(session: &Session, server: &RelayServer) -> Result<Room, SignalError> {
    let room_id = session.room_id().ok_or(SignalError::NotJoined)?;
    server.rooms.get(&room_id).ok_or(SignalError::NotJoined)
}
