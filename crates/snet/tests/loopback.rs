use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use snet::{
    BLOCK_PACKET_ID, ByteStream, CONFIRM_PACKET_ID, Client, ClientConfig, ClientEvent,
    ConnectionStatus, Frame, Priority, Server, ServerConfig, ServerEvent,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(46000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(3, Ordering::SeqCst)
}

fn server_on(port: u16) -> Server {
    let mut config = ServerConfig::default();
    config.port = port;
    config.tick_interval = Duration::from_millis(10);
    let mut server = Server::new(config);
    server.listen().unwrap();
    server
}

fn client_for(port: u16) -> Client {
    let mut config = ClientConfig::default();
    config.port = port;
    config.tick_interval = Duration::from_millis(10);
    let mut client = Client::new(config);
    client.connect().unwrap();
    client
}

fn pump_pair(server: &mut Server, client: &mut Client, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        server.tick_once();
        client.tick_once();
        thread::sleep(Duration::from_millis(1));
    }
}

fn pump_server(server: &mut Server, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        server.tick_once();
        thread::sleep(Duration::from_millis(1));
    }
}

fn pump_client(client: &mut Client, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        client.tick_once();
        thread::sleep(Duration::from_millis(1));
    }
}

fn payloads(events: &[ServerEvent]) -> Vec<(u32, Vec<u8>, SocketAddr)> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Payload {
                packet_id,
                payload,
                addr,
            } => Some((*packet_id, payload.as_bytes().to_vec(), *addr)),
            _ => None,
        })
        .collect()
}

fn raw_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();
    socket
}

fn drain_raw(socket: &UdpSocket) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut buf = [0u8; 2048];
    while let Ok((size, _)) = socket.recv_from(&mut buf) {
        frames.push(Frame::decode(&buf[..size]).unwrap());
    }
    frames
}

#[test]
fn hello_round_trip_with_confirm() {
    let port = next_port();
    let mut server = server_on(port);
    let mut client = client_for(port);

    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    client.send(1, b"hello", Priority::High);
    assert_eq!(client.pending_count(), 1);

    pump_pair(&mut server, &mut client, Duration::from_millis(300));

    let server_events: Vec<ServerEvent> = server.drain_events().collect();
    let delivered = payloads(&server_events);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, 1);
    assert_eq!(delivered[0].1, b"hello");
    assert_eq!(delivered[0].2.port(), client.local_addr().unwrap().port());

    assert!(
        server_events
            .iter()
            .any(|e| matches!(e, ServerEvent::PeerConnected { .. }))
    );

    // The server's confirm cleared the pending entry and flipped the
    // client to connected.
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.status(), ConnectionStatus::Connected);

    // The confirm frame itself surfaces as an ordinary payload carrying
    // the confirmed uniqueId (the client's first allocated id is 0).
    let client_events: Vec<ClientEvent> = client.drain_events().collect();
    let confirm = client_events
        .iter()
        .find_map(|e| match e {
            ClientEvent::Payload { packet_id, payload } if *packet_id == CONFIRM_PACKET_ID => {
                Some(payload.clone())
            }
            _ => None,
        })
        .expect("no confirm payload seen");
    let mut bs = confirm;
    assert_eq!(bs.read_u32().unwrap(), 0);
}

#[test]
fn duplicate_frame_delivered_once_but_confirmed_twice() {
    let port = next_port();
    let mut server = server_on(port);
    let server_addr = server.local_addr().unwrap();

    let socket = raw_socket();
    let frame = Frame::new(7, 42, Priority::High, b"dup".to_vec());
    socket.send_to(&frame.encode(), server_addr).unwrap();
    socket.send_to(&frame.encode(), server_addr).unwrap();

    pump_server(&mut server, Duration::from_millis(100));

    let server_events: Vec<ServerEvent> = server.drain_events().collect();
    let delivered = payloads(&server_events);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, 42);

    // Both copies were acknowledged, each with a fresh uniqueId, so a
    // sender whose first confirm got lost can still settle.
    let confirms = drain_raw(&socket);
    assert_eq!(confirms.len(), 2);
    for confirm in &confirms {
        assert_eq!(confirm.packet_id, CONFIRM_PACKET_ID);
        assert_eq!(confirm.priority, Priority::Bypass);
        let mut bs = ByteStream::from_bytes(&confirm.payload);
        assert_eq!(bs.read_u32().unwrap(), 7);
    }
    assert_ne!(confirms[0].unique_id, confirms[1].unique_id);
}

#[test]
fn low_priority_gives_up_silently() {
    // Nothing is listening on this port; every transmission vanishes.
    let port = next_port();
    let mut config = ClientConfig::default();
    config.port = port;
    config.tick_interval = Duration::from_millis(5);
    config.resend_interval = Duration::from_millis(10);
    let mut client = Client::new(config);
    client.connect().unwrap();

    client.send(2, b"nobody home", Priority::Low);
    assert_eq!(client.pending_count(), 1);

    pump_client(&mut client, Duration::from_millis(300));

    assert_eq!(client.pending_count(), 0);
    assert!(
        !client
            .drain_events()
            .any(|e| matches!(e, ClientEvent::Payload { .. }))
    );
}

#[test]
fn blacklisted_sender_gets_one_notice_then_silence() {
    let port = next_port();
    let mut server = server_on(port);
    let server_addr = server.local_addr().unwrap();
    server.block_address("127.0.0.1".parse().unwrap());

    let socket = raw_socket();
    for i in 0..5u32 {
        let frame = Frame::new(i, 1, Priority::High, b"blocked".to_vec());
        socket.send_to(&frame.encode(), server_addr).unwrap();
        thread::sleep(Duration::from_millis(5));
        server.tick_once();
    }
    pump_server(&mut server, Duration::from_millis(50));

    let server_events: Vec<ServerEvent> = server.drain_events().collect();
    assert!(payloads(&server_events).is_empty());
    assert!(
        !server_events
            .iter()
            .any(|e| matches!(e, ServerEvent::PeerConnected { .. }))
    );
    assert_eq!(server.peer_count(), 0);

    let replies = drain_raw(&socket);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].packet_id, BLOCK_PACKET_ID);
    assert_eq!(replies[0].priority, Priority::Bypass);
    assert!(replies[0].payload.is_empty());

    assert!(server.is_blacklisted("127.0.0.1".parse().unwrap()));
    assert!(server.unblock_address("127.0.0.1".parse().unwrap()));
    assert!(!server.unblock_address("127.0.0.1".parse().unwrap()));
}

#[test]
fn idle_peer_times_out() {
    let port = next_port();
    let mut config = ServerConfig::default();
    config.port = port;
    config.tick_interval = Duration::from_millis(10);
    config.client_timeout = Duration::from_millis(100);
    let mut server = Server::new(config);
    server.listen().unwrap();

    let mut client = client_for(port);
    client.send(3, b"here", Priority::Bypass);

    pump_pair(&mut server, &mut client, Duration::from_millis(50));
    assert_eq!(server.peer_count(), 1);

    // Go quiet and let the timeout scan reap the peer.
    pump_server(&mut server, Duration::from_millis(300));
    assert_eq!(server.peer_count(), 0);
    assert!(
        server
            .drain_events()
            .any(|e| matches!(e, ServerEvent::PeerTimedOut { .. }))
    );
}

#[test]
fn send_all_reaches_every_peer() {
    let port = next_port();
    let mut server = server_on(port);
    let mut first = client_for(port);
    let mut second = client_for(port);

    first.send(1, b"hi", Priority::Bypass);
    second.send(1, b"hi", Priority::Bypass);

    let deadline = Instant::now() + Duration::from_millis(300);
    while server.peer_count() < 2 && Instant::now() < deadline {
        server.tick_once();
        first.tick_once();
        second.tick_once();
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(server.peer_count(), 2);

    server.send_all(9, b"ping", Priority::Bypass);

    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        server.tick_once();
        first.tick_once();
        second.tick_once();
        thread::sleep(Duration::from_millis(1));
    }

    for client in [&mut first, &mut second] {
        let got: Vec<ClientEvent> = client.drain_events().collect();
        assert!(got.iter().any(|e| matches!(
            e,
            ClientEvent::Payload { packet_id: 9, payload } if payload.as_bytes() == b"ping"
        )));
    }
}

#[test]
fn oversized_payloads_are_dropped_both_ways() {
    let port = next_port();
    let mut server = server_on(port);
    let server_addr = server.local_addr().unwrap();

    // Outbound: never transmitted, never tracked.
    let mut config = ClientConfig::default();
    config.port = port;
    config.max_transfer_bytes = 16;
    let mut client = Client::new(config);
    client.connect().unwrap();
    client.send(1, &[0u8; 17], Priority::High);
    assert_eq!(client.pending_count(), 0);

    // Inbound: over the server's ceiling, dropped before delivery and
    // before peer registration; no confirm comes back either.
    let socket = raw_socket();
    let frame = Frame::new(1, 2, Priority::High, vec![0u8; 600]);
    socket.send_to(&frame.encode(), server_addr).unwrap();

    pump_server(&mut server, Duration::from_millis(100));

    let server_events: Vec<ServerEvent> = server.drain_events().collect();
    assert!(payloads(&server_events).is_empty());
    assert_eq!(server.peer_count(), 0);
    assert!(drain_raw(&socket).is_empty());
}
