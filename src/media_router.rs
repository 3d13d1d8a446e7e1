//! Thin wrapper around the `mediasoup` crate, playing the role of the
//! spec's "opaque MediaRouter library": every RTP/RTCP/ICE/DTLS packet
//! forwarding detail lives inside `mediasoup::Worker`/`Router` and is never
//! touched directly by the rest of this crate.

use mediasoup::producer::ProducerId;
use mediasoup::router::{Router, RouterOptions};
use mediasoup::rtp_parameters::{RtpCapabilities, RtpCapabilitiesFinalized, RtpCodecCapability};
use mediasoup::webrtc_transport::{
    TransportListenIps, WebRtcTransport, WebRtcTransportOptions,
};
use mediasoup::worker::Worker;
use serde::{Deserialize, Serialize};

/// Direction of a transport, from the client's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Recv => "recv",
        }
    }
}

/// One router per room; created lazily on first join (§4.3) and dropped
/// along with the room.
pub struct MediaRouter {
    router: Router,
    listen_ip: mediasoup::data_structures::TransportListenIp,
}

impl MediaRouter {
    pub async fn new(
        worker: &Worker,
        codecs: Vec<RtpCodecCapability>,
        listen_ip: mediasoup::data_structures::TransportListenIp,
    ) -> anyhow::Result<Self> {
        let router = worker
            .create_router(RouterOptions::new(codecs))
            .await
            .map_err(|err| anyhow::anyhow!("failed to create router: {err}"))?;
        Ok(Self { router, listen_ip })
    }

    /// Codec/feature set this router advertises; stable for its lifetime.
    pub fn rtp_capabilities(&self) -> &RtpCapabilitiesFinalized {
        self.router.rtp_capabilities()
    }

    /// Whether a consumer could be created for `producer_id` given
    /// `rtp_capabilities` — checked before `consume()` is attempted so a
    /// capability mismatch is a synchronous validation error, not a panic
    /// deep inside the media engine.
    pub fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool {
        self.router.can_consume(producer_id, rtp_capabilities)
    }

    /// Allocate a new WebRTC transport listening on the configured IP with
    /// UDP preferred, TCP fallback (mediasoup's default transport
    /// preference order already satisfies this).
    pub async fn create_transport(&self, direction: Direction) -> anyhow::Result<WebRtcTransport> {
        let mut options = WebRtcTransportOptions::new(TransportListenIps::new(self.listen_ip));
        // Data channels are out of scope for this spec's verb set, but
        // leaving SCTP enabled costs nothing and keeps the transport usable
        // for a future data-producer verb without renegotiating it.
        options.enable_sctp = true;
        let _ = direction; // direction only affects which verbs are legal on the resulting id, enforced by Session
        self.router
            .create_webrtc_transport(options)
            .await
            .map_err(|err| anyhow::anyhow!("failed to create {} transport: {err}", direction.as_str()))
    }
}
