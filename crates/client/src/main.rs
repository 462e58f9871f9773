use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use snet::{Client, ClientConfig, ClientEvent, IpVersion, Priority};

#[derive(Parser)]
#[command(name = "snet-client")]
#[command(about = "snet reliable datagram client")]
struct Args {
    #[arg(short, long, help = "Server address (defaults to loopback)")]
    address: Option<IpAddr>,

    #[arg(short, long, default_value_t = snet::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "hello")]
    message: String,

    #[arg(long, default_value_t = 1)]
    packet_id: u32,

    #[arg(short, long, default_value_t = 3, help = "Number of messages to send")]
    count: u32,

    #[arg(long, default_value_t = 250, help = "Delay between sends in ms")]
    interval: u64,

    #[arg(long, value_parser = parse_priority, default_value = "high")]
    priority: Priority,

    #[arg(long, help = "Connect over IPv6")]
    ipv6: bool,
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    match value.to_ascii_lowercase().as_str() {
        "bypass" => Ok(Priority::Bypass),
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "system" => Ok(Priority::System),
        other => Err(format!("unknown priority {:?}", other)),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ip_version = if args.ipv6 { IpVersion::V6 } else { IpVersion::V4 };

    let mut config = ClientConfig::new(ip_version);
    if let Some(address) = args.address {
        config.address = address;
    }
    config.port = args.port;

    let mut client = Client::new(config);
    client.connect()?;

    let mut sent = 0u32;
    let mut next_send = Instant::now();

    // Pump until every message is out and every tracked send has been
    // confirmed or given up on.
    while sent < args.count || client.pending_count() > 0 {
        if sent < args.count && Instant::now() >= next_send {
            client.send(args.packet_id, args.message.as_bytes(), args.priority);
            sent += 1;
            next_send = Instant::now() + Duration::from_millis(args.interval);
            log::info!("sent message {}/{}", sent, args.count);
        }

        client.tick_once();
        for event in client.drain_events() {
            match event {
                ClientEvent::Ready => log::info!("client ready"),
                ClientEvent::Closed => log::info!("client closed"),
                ClientEvent::Payload { packet_id, payload } => {
                    log::info!(
                        "packet {} ({} bytes): {}",
                        packet_id,
                        payload.len(),
                        String::from_utf8_lossy(payload.as_bytes())
                    );
                }
                ClientEvent::TransportError { message } => log::error!("{}", message),
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!("all messages settled, disconnecting");
    client.disconnect();

    Ok(())
}
