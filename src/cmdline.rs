use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "WebRTC SFU signaling relay")]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand)]
pub enum SubCommand {
    /// Run the signaling server.
    Run(Run),
}

#[derive(Parser, Clone)]
pub struct Run {
    /// TLS certificate path for the message channel.
    #[arg(long, env = "SIGNAL_CERT_PATH")]
    pub cert_path: Option<String>,
    /// TLS key path for the message channel.
    #[arg(long, env = "SIGNAL_KEY_PATH")]
    pub key_path: Option<String>,

    /// Bind address for the message channel.
    #[arg(long, env = "SIGNAL_LISTEN_ADDR", default_value = "127.0.0.1:8443")]
    pub listen_addr: String,

    /// Local IP the MediaRouter binds its WebRTC transports to.
    #[arg(long, env = "RTC_LISTEN_IP", default_value = "127.0.0.1")]
    pub rtc_ip: String,
    /// IP announced in ICE candidates; defaults to `rtc-ip` (loopback) when unset.
    #[arg(long, env = "RTC_ANNOUNCE_IP")]
    pub rtc_announce_ip: Option<String>,

    /// Lower bound of the UDP/TCP port range used for RTC transports.
    #[arg(long, env = "RTC_PORT_MIN", default_value_t = 40000)]
    pub rtc_port_min: u16,
    /// Upper bound of the UDP/TCP port range used for RTC transports.
    #[arg(long, env = "RTC_PORT_MAX", default_value_t = 49999)]
    pub rtc_port_max: u16,

    /// Seconds an allocated transport may remain unconnected before the
    /// Lifecycle Supervisor reclaims it.
    #[arg(long, env = "TRANSPORT_TIMEOUT_SECS", default_value_t = 1800)]
    pub transport_timeout_secs: u64,

    /// Per-request timeout applied to verb dispatch.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 20)]
    pub request_timeout_secs: u64,
}
