use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::protocol::Frame;

const RECV_BUFFER_LEN: usize = 2048;

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub malformed_dropped: u64,
}

/// Non-blocking UDP socket speaking the frame wire format.
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    recv_buffer: [u8; RECV_BUFFER_LEN],
    stats: NetworkStats,
}

impl UdpEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr: None,
            recv_buffer: [0u8; RECV_BUFFER_LEN],
            stats: NetworkStats::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn send_frame(&mut self, frame: &Frame, addr: SocketAddr) -> io::Result<usize> {
        let data = frame.encode();
        let bytes = self.socket.send_to(&data, addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    pub fn send(&mut self, frame: &Frame) -> io::Result<usize> {
        let addr = self
            .remote_addr
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no remote address set"))?;
        self.send_frame(frame, addr)
    }

    /// Drains every waiting datagram, decoding frames. Undecodable
    /// datagrams are dropped here; UDP may carry anything.
    pub fn receive(&mut self) -> io::Result<Vec<(Frame, SocketAddr)>> {
        let mut frames = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;

                    match Frame::decode(&self.recv_buffer[..size]) {
                        Ok(frame) => frames.push((frame, addr)),
                        Err(err) => {
                            self.stats.malformed_dropped += 1;
                            log::debug!("dropping datagram from {}: {}", addr, err);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(frames)
    }

    /// Raw variant for callers that must inspect the origin before
    /// decoding; the server consults its blacklist first.
    pub fn receive_raw(&mut self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        let mut datagrams = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;
                    datagrams.push((self.recv_buffer[..size].to_vec(), addr));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(datagrams)
    }
}
