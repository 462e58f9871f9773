use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use snet::{IpVersion, Priority, Server, ServerConfig, ServerEvent};

#[derive(Parser)]
#[command(name = "snet-server")]
#[command(about = "snet reliable datagram server")]
struct Args {
    #[arg(short, long, help = "Address to bind (defaults to loopback)")]
    bind: Option<IpAddr>,

    #[arg(short, long, default_value_t = snet::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = snet::DEFAULT_MAX_TRANSFER_BYTES)]
    max_transfer_bytes: usize,

    #[arg(long, default_value_t = 60_000, help = "Idle peer timeout in ms")]
    client_timeout: u64,

    #[arg(long, default_value_t = 60_000, help = "Blacklist notice interval in ms")]
    block_packet_timeout: u64,

    #[arg(long, help = "Bind over IPv6")]
    ipv6: bool,

    #[arg(long, help = "Echo received payloads back at low priority")]
    echo: bool,

    #[arg(long, help = "Address to blacklist at startup")]
    block: Vec<IpAddr>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ip_version = if args.ipv6 { IpVersion::V6 } else { IpVersion::V4 };

    let mut config = ServerConfig::new(ip_version);
    if let Some(bind) = args.bind {
        config.address = bind;
    }
    config.port = args.port;
    config.max_transfer_bytes = args.max_transfer_bytes;
    config.client_timeout = Duration::from_millis(args.client_timeout);
    config.block_packet_timeout = Duration::from_millis(args.block_packet_timeout);

    let mut server = Server::new(config);
    for addr in &args.block {
        server.block_address(*addr);
        log::info!("blacklisted {}", addr);
    }
    server.listen()?;

    loop {
        server.tick_once();

        let events: Vec<ServerEvent> = server.drain_events().collect();
        for event in events {
            match event {
                ServerEvent::Ready => log::info!("server ready"),
                ServerEvent::Closed => {
                    log::info!("server closed");
                    return Ok(());
                }
                ServerEvent::Payload {
                    packet_id,
                    payload,
                    addr,
                } => {
                    log::info!("packet {} from {} ({} bytes)", packet_id, addr, payload.len());
                    if args.echo && packet_id < snet::BLOCK_PACKET_ID {
                        server.send(packet_id, payload.as_bytes(), Priority::Low, addr);
                    }
                }
                ServerEvent::PeerConnected { addr } => log::info!("peer {} connected", addr),
                ServerEvent::PeerTimedOut { addr } => log::info!("peer {} timed out", addr),
                ServerEvent::TransportError { message } => log::error!("{}", message),
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }
}
