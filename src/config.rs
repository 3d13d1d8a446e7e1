use std::net::IpAddr;
use std::num::{NonZeroU32, NonZeroU8};
use std::time::Duration;

use mediasoup::rtp_parameters::{
    MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtpCodecCapability, RtpCodecParametersParameters,
};
use mediasoup::webrtc_transport::TransportListenIp;
use mediasoup::worker::{WorkerLogLevel, WorkerSettings};

use crate::cmdline::Run;

/// Resolved runtime configuration, derived from [`Run`] CLI/env options.
///
/// Kept separate from `Run` so defaulting logic (e.g. "announced IP falls
/// back to the listen IP") lives in one place instead of being repeated at
/// every call site.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,

    pub rtc_listen_ip: TransportListenIp,
    pub rtc_port_min: u16,
    pub rtc_port_max: u16,

    pub unconnected_transport_timeout: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_run(run: &Run) -> anyhow::Result<Self> {
        let listen_ip: IpAddr = run.rtc_ip.parse()?;
        let announced_ip = match &run.rtc_announce_ip {
            Some(ip) => Some(ip.parse()?),
            None => None,
        };
        if run.rtc_port_min > run.rtc_port_max {
            anyhow::bail!(
                "rtc_port_min ({}) must not exceed rtc_port_max ({})",
                run.rtc_port_min,
                run.rtc_port_max
            );
        }
        Ok(Self {
            listen_addr: run.listen_addr.clone(),
            cert_path: run.cert_path.clone(),
            key_path: run.key_path.clone(),
            rtc_listen_ip: TransportListenIp {
                ip: listen_ip,
                announced_ip,
            },
            rtc_port_min: run.rtc_port_min,
            rtc_port_max: run.rtc_port_max,
            unconnected_transport_timeout: Duration::from_secs(run.transport_timeout_secs),
            request_timeout: Duration::from_secs(run.request_timeout_secs),
        })
    }

    /// Worker settings shared by every MediaRouter worker the process spawns.
    pub fn worker_settings(&self) -> WorkerSettings {
        let mut settings = WorkerSettings::default();
        settings.log_level = WorkerLogLevel::Warn;
        settings.rtc_ports_range = self.rtc_port_min..=self.rtc_port_max;
        settings
    }
}

/// The fixed codec list of §6: Opus for audio, VP8/VP9/H264 for video with
/// standard parameters. Not user-configurable (see SPEC_FULL.md §9.3).
pub fn supported_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability::Audio {
            mime_type: MimeTypeAudio::Opus,
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: NonZeroU8::new(2).unwrap(),
            parameters: RtpCodecParametersParameters::from([("useinbandfec", 1u32.into())]),
            rtcp_feedback: vec![RtcpFeedback::TransportCc],
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp8,
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![
                RtcpFeedback::Nack,
                RtcpFeedback::NackPli,
                RtcpFeedback::CcmFir,
                RtcpFeedback::GoogRemb,
                RtcpFeedback::TransportCc,
            ],
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp9,
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![
                RtcpFeedback::Nack,
                RtcpFeedback::NackPli,
                RtcpFeedback::CcmFir,
                RtcpFeedback::GoogRemb,
                RtcpFeedback::TransportCc,
            ],
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::H264,
            preferred_payload_type: None,
            clock_rate: NonZeroU32::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::from([
                ("level-asymmetry-allowed", 1u32.into()),
                ("packetization-mode", 1u32.into()),
                ("profile-level-id", "42e01f".into()),
            ]),
            rtcp_feedback: vec![
                RtcpFeedback::Nack,
                RtcpFeedback::NackPli,
                RtcpFeedback::CcmFir,
                RtcpFeedback::GoogRemb,
                RtcpFeedback::TransportCc,
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rtc_ip: &str, port_min: u16, port_max: u16) -> Run {
        Run {
            cert_path: None,
            key_path: None,
            listen_addr: "127.0.0.1:8443".into(),
            rtc_ip: rtc_ip.into(),
            rtc_announce_ip: None,
            rtc_port_min: port_min,
            rtc_port_max: port_max,
            transport_timeout_secs: 1800,
            request_timeout_secs: 20,
        }
    }

    #[test]
    fn announced_ip_defaults_to_none_when_unset() {
        let cfg = Config::from_run(&run("127.0.0.1", 40000, 49999)).unwrap();
        assert_eq!(cfg.rtc_listen_ip.announced_ip, None);
    }

    #[test]
    fn rejects_inverted_port_range() {
        assert!(Config::from_run(&run("127.0.0.1", 50000, 40000)).is_err());
    }

    #[test]
    fn supported_codecs_cover_all_four_mime_types() {
        let codecs = supported_codecs();
        assert_eq!(codecs.len(), 4);
    }
}
