use std::net::SocketAddr;

use crate::bitstream::ByteStream;

/// Notifications surfaced by the client role, drained via
/// `Client::drain_events`.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Ready,
    Closed,
    Payload { packet_id: u32, payload: ByteStream },
    TransportError { message: String },
}

/// Notifications surfaced by the server role, drained via
/// `Server::drain_events`.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Ready,
    Closed,
    Payload {
        packet_id: u32,
        payload: ByteStream,
        addr: SocketAddr,
    },
    PeerConnected {
        addr: SocketAddr,
    },
    PeerTimedOut {
        addr: SocketAddr,
    },
    TransportError {
        message: String,
    },
}
