use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use warp::Filter;

use sfu_relay::cmdline::{Opts, SubCommand};
use sfu_relay::config::Config;
use sfu_relay::lifecycle;
use sfu_relay::server::RelayServer;
use sfu_relay::ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    let run = match opts.subcmd {
        SubCommand::Run(run) => run,
    };
    let config = Config::from_run(&run)?;
    let listen_addr: std::net::SocketAddr = config.listen_addr.parse()?;
    let cert_path = config.cert_path.clone();
    let key_path = config.key_path.clone();

    let server = Arc::new(RelayServer::new(config).await?);

    tokio::spawn(lifecycle::run_unconnected_transport_reaper(
        server.clone(),
        Duration::from_secs(60),
    ));

    let routes = {
        let server = server.clone();
        warp::path("ws").and(warp::ws()).map(move |ws: warp::ws::Ws| {
            let server = server.clone();
            ws.on_upgrade(move |socket| ws::handle_connection(server, socket))
        })
    };
    let routes = routes.with(warp::log("sfu-relay"));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("received shutdown signal");
    };

    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => {
            let (_, serving) = warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(listen_addr, shutdown);
            serving.await;
        }
        _ => {
            let (_, serving) =
                warp::serve(routes).bind_with_graceful_shutdown(listen_addr, shutdown);
            serving.await;
        }
    }

    Ok(())
}
