//! Wire types for the signaling protocol (§6). A plain JSON-over-WebSocket
//! request/ack/event scheme: every request carries a client-chosen `id`
//! that its ack echoes back, and server-pushed events are untagged by
//! request.

use mediasoup::consumer::ConsumerId;
use mediasoup::data_structures::{DtlsParameters, IceCandidate, IceParameters};
use mediasoup::producer::ProducerId;
use mediasoup::rtp_parameters::{MediaKind, RtpCapabilities, RtpParameters};
use mediasoup::transport::TransportId;
use serde::{Deserialize, Serialize};

use crate::media_router::Direction;
use crate::media_source::AppData;
use crate::registry::ClientId;

/// Envelope wrapping every client->server request with a correlation id the
/// matching ack echoes back.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub message: ClientMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientMessage {
    GetRtpCapabilities,
    JoinRoom {
        room_id: String,
        client_id: ClientId,
    },
    CreateTransport {
        #[serde(rename = "type")]
        direction: Direction,
    },
    ConnectTransport {
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    },
    Produce {
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        app_data: AppData,
    },
    Consume {
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    },
    CloseAllScreenShares,
    /// Supplemented verb (SPEC_FULL.md §10): aggregate resource stats for
    /// the caller's session.
    GetStats,
    /// Supplemented verb: restart ICE on an owned transport, grounded in
    /// `WebRtcTransport::restart_ice`.
    RestartIce {
        transport_id: TransportId,
    },
    /// Supplemented verb: resume a paused consumer. Consumers are created
    /// paused (§4.2); without this verb they would never produce media.
    ConsumerResume {
        consumer_id: ConsumerId,
    },
    ConsumerPause {
        consumer_id: ConsumerId,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// One entry of `joinRoom`'s `producers` ack field, and the shape forwarded
/// verbatim in `newProducer` events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    pub client_id: ClientId,
    pub kind: MediaKind,
    pub app_data: AppData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AckPayload {
    JoinRoom { producers: Vec<ProducerInfo> },
    CreateTransport { transport_options: TransportOptions },
    ConnectTransport {},
    Produce { producer_id: ProducerId },
    Consume {
        consumer_id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },
    CloseAllScreenShares { closed_count: usize },
    GetRtpCapabilities { rtp_capabilities: RtpCapabilities },
    GetStats { stats: serde_json::Value },
    RestartIce { ice_parameters: IceParameters },
    Empty {},
}

/// The ack envelope: exactly one request's result, correlated by `id`.
#[derive(Debug, Clone, Serialize)]
pub struct AckEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub result: AckResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AckResult {
    Ok(AckPayload),
    Err { error: String },
}

/// Server-pushed, not correlated to any request id (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    NewProducer {
        producer_id: ProducerId,
        client_id: ClientId,
        kind: MediaKind,
        app_data: AppData,
    },
    ProducerClosed {
        producer_id: ProducerId,
    },
    ClientJoined {
        client_id: ClientId,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// Outer frame: every message sent to a client is either an ack or an
/// event, so a single `serde_json::to_string` call at the send site covers
/// both.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Ack(AckEnvelope),
    Event(ServerEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_request_parses_by_action_tag() {
        let json = r#"{"id":1,"action":"joinRoom","roomId":"main","clientId":"alice"}"#;
        let envelope: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.id, 1);
        match envelope.message {
            ClientMessage::JoinRoom { room_id, client_id } => {
                assert_eq!(room_id, "main");
                assert_eq!(client_id, "alice");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn create_transport_uses_type_field_for_direction() {
        let json = r#"{"id":2,"action":"createTransport","type":"send"}"#;
        let envelope: ClientEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(
            envelope.message,
            ClientMessage::CreateTransport {
                direction: Direction::Send
            }
        ));
    }

    #[test]
    fn error_ack_serializes_error_field_only() {
        let envelope = AckEnvelope {
            id: 7,
            result: AckResult::Err {
                error: "transport not found".into(),
            },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"{"id":7,"error":"transport not found"}"#);
    }
}
