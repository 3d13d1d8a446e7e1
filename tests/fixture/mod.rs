use std::num::{NonZeroU32, NonZeroU8};

use mediasoup::{
    data_structures::{DtlsFingerprint, DtlsParameters, DtlsRole},
    rtp_parameters::{
        MediaKind, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtcpParameters, RtpCapabilities,
        RtpCodecCapability, RtpCodecParameters, RtpCodecParametersParameters,
        RtpEncodingParameters, RtpEncodingParametersRtx, RtpHeaderExtension,
        RtpHeaderExtensionDirection, RtpHeaderExtensionParameters, RtpHeaderExtensionUri,
        RtpParameters,
    },
    sctp_parameters::SctpStreamParameters,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sfu_relay::cmdline::Run;
use sfu_relay::config::Config;
use sfu_relay::protocol::ServerEvent;
use sfu_relay::room::Emitter;
use sfu_relay::server::{ClientConnection, RelayServer};

pub fn test_config() -> Config {
    Config::from_run(&Run {
        cert_path: None,
        key_path: None,
        listen_addr: "127.0.0.1:0".to_string(),
        rtc_ip: "127.0.0.1".to_string(),
        rtc_announce_ip: None,
        rtc_port_min: 40000,
        rtc_port_max: 49999,
        transport_timeout_secs: 1800,
        request_timeout_secs: 20,
    })
    .unwrap()
}

pub async fn relay_server() -> Arc<RelayServer> {
    Arc::new(RelayServer::new(test_config()).await.unwrap())
}

/// A test double standing in for a real websocket connection: records every
/// event pushed to it and whether it was ever force-closed.
#[derive(Default)]
pub struct RecordingConnection {
    pub events: Mutex<Vec<ServerEvent>>,
    pub closed: AtomicBool,
}

impl Emitter for RecordingConnection {
    fn send(&self, event: ServerEvent) -> bool {
        self.events.lock().unwrap().push(event);
        true
    }
}

impl ClientConnection for RecordingConnection {
    fn force_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emitter(self: &Arc<Self>) -> Arc<dyn Emitter> {
        self.clone()
    }

    pub fn handle(self: &Arc<Self>) -> Arc<dyn ClientConnection> {
        self.clone()
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub fn dtls_parameters() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint::Sha256 {
            value: [
                0x82, 0x5A, 0x68, 0x3D, 0x36, 0xC3, 0x0A, 0xDE, 0xAF, 0xE7, 0x32, 0x43, 0xD2, 0x88,
                0x83, 0x57, 0xAC, 0x2D, 0x65, 0xE5, 0x80, 0xC4, 0xB6, 0xFB, 0xAF, 0x1A, 0xA0, 0x21,
                0x9F, 0x6D, 0x0C, 0xAD,
            ],
        }],
    }
}

pub fn sctp_stream_parameters() -> SctpStreamParameters {
    SctpStreamParameters::new_unordered_with_life_time(12345, 5000)
}

pub fn audio_producer_device_parameters() -> RtpParameters {
    RtpParameters {
        mid: Some("AUDIO".to_string()),
        codecs: vec![RtpCodecParameters::Audio {
            mime_type: MimeTypeAudio::Opus,
            payload_type: 111,
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: NonZeroU8::new(2).unwrap(),
            parameters: RtpCodecParametersParameters::from([("useinbandfec", 1u32.into())]),
            rtcp_feedback: vec![],
        }],
        header_extensions: vec![RtpHeaderExtensionParameters {
            uri: RtpHeaderExtensionUri::Mid,
            id: 10,
            encrypt: false,
        }],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(11111111),
            ..RtpEncodingParameters::default()
        }],
        rtcp: RtcpParameters {
            cname: Some("FOOBAR".to_string()),
            ..RtcpParameters::default()
        },
    }
}

pub fn video_producer_device_parameters() -> RtpParameters {
    RtpParameters {
        mid: Some("VIDEO".to_string()),
        codecs: vec![
            RtpCodecParameters::Video {
                mime_type: MimeTypeVideo::Vp8,
                payload_type: 112,
                clock_rate: NonZeroU32::new(90000).unwrap(),
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![
                    RtcpFeedback::Nack,
                    RtcpFeedback::NackPli,
                    RtcpFeedback::GoogRemb,
                ],
            },
            RtpCodecParameters::Video {
                mime_type: MimeTypeVideo::Rtx,
                payload_type: 113,
                clock_rate: NonZeroU32::new(90000).unwrap(),
                parameters: RtpCodecParametersParameters::from([("apt", 112u32.into())]),
                rtcp_feedback: vec![],
            },
        ],
        header_extensions: vec![RtpHeaderExtensionParameters {
            uri: RtpHeaderExtensionUri::Mid,
            id: 10,
            encrypt: false,
        }],
        encodings: vec![
            RtpEncodingParameters {
                ssrc: Some(22222222),
                rtx: Some(RtpEncodingParametersRtx { ssrc: 22222223 }),
                ..RtpEncodingParameters::default()
            },
            RtpEncodingParameters {
                ssrc: Some(22222224),
                rtx: Some(RtpEncodingParametersRtx { ssrc: 22222225 }),
                ..RtpEncodingParameters::default()
            },
        ],
        rtcp: RtcpParameters {
            cname: Some("FOOBAR".to_string()),
            ..RtcpParameters::default()
        },
    }
}

pub fn consumer_device_capabilities() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![
            RtpCodecCapability::Audio {
                mime_type: MimeTypeAudio::Opus,
                preferred_payload_type: Some(100),
                clock_rate: NonZeroU32::new(48000).unwrap(),
                channels: NonZeroU8::new(2).unwrap(),
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![],
            },
            RtpCodecCapability::Video {
                mime_type: MimeTypeVideo::Vp8,
                preferred_payload_type: Some(101),
                clock_rate: NonZeroU32::new(90000).unwrap(),
                parameters: RtpCodecParametersParameters::default(),
                rtcp_feedback: vec![
                    RtcpFeedback::Nack,
                    RtcpFeedback::NackPli,
                    RtcpFeedback::CcmFir,
                    RtcpFeedback::GoogRemb,
                ],
            },
            RtpCodecCapability::Video {
                mime_type: MimeTypeVideo::Rtx,
                preferred_payload_type: Some(102),
                clock_rate: NonZeroU32::new(90000).unwrap(),
                parameters: RtpCodecParametersParameters::from([("apt", 101u32.into())]),
                rtcp_feedback: vec![],
            },
        ],
        header_extensions: vec![
            RtpHeaderExtension {
                kind: Some(MediaKind::Audio),
                uri: RtpHeaderExtensionUri::Mid,
                preferred_id: 1,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::default(),
            },
            RtpHeaderExtension {
                kind: Some(MediaKind::Video),
                uri: RtpHeaderExtensionUri::Mid,
                preferred_id: 1,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::default(),
            },
            RtpHeaderExtension {
                kind: Some(MediaKind::Audio),
                uri: RtpHeaderExtensionUri::AbsSendTime,
                preferred_id: 4,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::default(),
            },
            RtpHeaderExtension {
                kind: Some(MediaKind::Video),
                uri: RtpHeaderExtensionUri::AbsSendTime,
                preferred_id: 4,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::default(),
            },
        ],
        fec_mechanisms: vec![],
    }
}
