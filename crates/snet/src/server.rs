use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::bitstream::ByteStream;
use crate::config::ServerConfig;
use crate::endpoint::{NetworkStats, UdpEndpoint};
use crate::events::ServerEvent;
use crate::peers::{Blacklist, PeerTable};
use crate::protocol::{BLOCK_PACKET_ID, CONFIRM_PACKET_ID, Frame, Priority};
use crate::tracking::{FrameIdAllocator, RetryQueue};

/// Server role: many remote peers, tracked by endpoint. Drive with
/// `tick_once` (or `run`) and drain notifications with `drain_events`.
pub struct Server {
    endpoint: Option<UdpEndpoint>,
    config: ServerConfig,
    ids: FrameIdAllocator,
    retry: RetryQueue,
    peers: PeerTable,
    blacklist: Blacklist,
    last_tick: Instant,
    running: Arc<AtomicBool>,
    events: VecDeque<ServerEvent>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            endpoint: None,
            ids: FrameIdAllocator::new(),
            retry: RetryQueue::new(config.resend_interval),
            peers: PeerTable::new(config.client_timeout),
            blacklist: Blacklist::new(config.block_packet_timeout),
            last_tick: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            events: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(|e| e.local_addr())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn pending_count(&self) -> usize {
        self.retry.len()
    }

    pub fn stats(&self) -> Option<&NetworkStats> {
        self.endpoint.as_ref().map(|e| e.stats())
    }

    pub fn listen(&mut self) -> io::Result<()> {
        let endpoint = UdpEndpoint::bind(self.config.bind_addr())?;
        log::info!("listening on {}", endpoint.local_addr());

        self.endpoint = Some(endpoint);
        self.last_tick = Instant::now();
        self.events.push_back(ServerEvent::Ready);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.endpoint.take().is_some() {
            // Pending sends are discarded, not flushed. The blacklist
            // survives; it is managed explicitly by the application.
            self.retry.clear();
            self.peers.clear();
            self.events.push_back(ServerEvent::Closed);
        }
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Blocks the calling thread, ticking until the running flag is
    /// cleared, then stops the transport.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.stop();
    }

    /// Transmits a payload to one peer. Payloads over the transfer
    /// ceiling are dropped without an error, as are sends before `listen`.
    pub fn send(&mut self, packet_id: u32, payload: &[u8], priority: Priority, addr: SocketAddr) {
        if payload.len() > self.config.max_transfer_bytes {
            log::debug!(
                "dropping outbound packet {} to {}: {} bytes over the {} byte limit",
                packet_id,
                addr,
                payload.len(),
                self.config.max_transfer_bytes
            );
            return;
        }
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };

        let frame = Frame::new(self.ids.next_id(), packet_id, priority, payload.to_vec());
        if let Err(e) = endpoint.send_frame(&frame, addr) {
            self.events.push_back(ServerEvent::TransportError {
                message: format!("send to {} failed: {}", addr, e),
            });
        }
        if priority.is_tracked() {
            self.retry.track(frame, Some(addr), Instant::now());
        }
    }

    /// Sends to every known peer, each with its own uniqueId.
    pub fn send_all(&mut self, packet_id: u32, payload: &[u8], priority: Priority) {
        for addr in self.peers.addrs() {
            self.send(packet_id, payload, priority, addr);
        }
    }

    /// False when the address is already blocked.
    pub fn block_address(&mut self, addr: IpAddr) -> bool {
        self.blacklist.block(addr)
    }

    /// False when the address was not blocked.
    pub fn unblock_address(&mut self, addr: IpAddr) -> bool {
        self.blacklist.unblock(addr)
    }

    pub fn is_blacklisted(&self, addr: IpAddr) -> bool {
        self.blacklist.contains(addr)
    }

    /// Drains the socket, then runs the fixed-interval maintenance tick
    /// when it is due.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.process_network();
        if now.duration_since(self.last_tick) >= self.config.tick_interval {
            self.last_tick = now;
            self.tick(now);
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    fn tick(&mut self, now: Instant) {
        for addr in self.peers.cleanup_timed_out(now) {
            self.events.push_back(ServerEvent::PeerTimedOut { addr });
        }

        let peers = &self.peers;
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };

        let mut failures = Vec::new();
        self.retry.tick(
            now,
            |dest| matches!(dest, Some(addr) if peers.contains(&addr)),
            |frame, dest| {
                let Some(addr) = dest else { return };
                if let Err(e) = endpoint.send_frame(frame, addr) {
                    failures.push(format!("resend to {} failed: {}", addr, e));
                }
            },
        );
        for message in failures {
            self.events.push_back(ServerEvent::TransportError { message });
        }
    }

    fn process_network(&mut self) {
        let datagrams = {
            let Some(endpoint) = self.endpoint.as_mut() else {
                return;
            };
            match endpoint.receive_raw() {
                Ok(datagrams) => datagrams,
                Err(e) => {
                    self.events.push_back(ServerEvent::TransportError {
                        message: format!("receive failed: {}", e),
                    });
                    return;
                }
            }
        };

        let now = Instant::now();
        for (data, addr) in datagrams {
            self.handle_datagram(&data, addr, now);
        }
    }

    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr, now: Instant) {
        // Blacklisted senders are rejected before any decoding happens,
        // with at most one notice per block_packet_timeout.
        if self.blacklist.contains(addr.ip()) {
            if self.blacklist.should_notify(addr.ip(), now) {
                self.send(BLOCK_PACKET_ID, &[], Priority::Bypass, addr);
            }
            return;
        }

        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("dropping datagram from {}: {}", addr, err);
                return;
            }
        };

        if frame.payload.len() > self.config.max_transfer_bytes {
            return;
        }

        // Confirm before the duplicate check: a resent original whose
        // earlier confirm was lost must still be acknowledged.
        if frame.priority.is_tracked() {
            let mut confirm = ByteStream::new();
            confirm.write_u32(frame.unique_id);
            self.send(CONFIRM_PACKET_ID, confirm.as_bytes(), Priority::Bypass, addr);
        }

        let (record, is_new) = self.peers.get_or_insert(addr, now);
        if !record.dedup.observe(frame.unique_id) {
            // Duplicate: confirmed again above, never re-delivered. The
            // peer's last_seen is deliberately not refreshed.
            return;
        }
        record.last_seen = now;

        if is_new {
            self.events.push_back(ServerEvent::PeerConnected { addr });
        }

        self.events.push_back(ServerEvent::Payload {
            packet_id: frame.packet_id,
            payload: ByteStream::from_bytes(&frame.payload),
            addr,
        });

        if frame.packet_id == CONFIRM_PACKET_ID {
            let mut bs = ByteStream::from_bytes(&frame.payload);
            if let Ok(confirmed) = bs.read_u32() {
                self.retry.confirm(confirmed);
            }
        }
    }
}
