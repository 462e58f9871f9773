use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use crate::bitstream::ByteStream;
use crate::config::ClientConfig;
use crate::endpoint::{NetworkStats, UdpEndpoint};
use crate::events::ClientEvent;
use crate::protocol::{CONFIRM_PACKET_ID, Frame, Priority};
use crate::tracking::{DedupWindow, FrameIdAllocator, RetryQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

/// Client role: one implicit remote endpoint. Drive with `tick_once` and
/// drain notifications with `drain_events`.
pub struct Client {
    endpoint: Option<UdpEndpoint>,
    config: ClientConfig,
    status: ConnectionStatus,
    ids: FrameIdAllocator,
    retry: RetryQueue,
    dedup: DedupWindow,
    last_tick: Instant,
    events: VecDeque<ClientEvent>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            endpoint: None,
            status: ConnectionStatus::Disconnected,
            ids: FrameIdAllocator::new(),
            retry: RetryQueue::new(config.resend_interval),
            dedup: DedupWindow::new(),
            last_tick: Instant::now(),
            events: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn pending_count(&self) -> usize {
        self.retry.len()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(|e| e.local_addr())
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.config.remote()
    }

    pub fn stats(&self) -> Option<&NetworkStats> {
        self.endpoint.as_ref().map(|e| e.stats())
    }

    pub fn connect(&mut self) -> io::Result<()> {
        let remote = self.remote_addr();
        log::info!("connecting to {}", remote);

        let bind_addr = SocketAddr::new(self.config.ip_version.unspecified(), 0);
        let mut endpoint = UdpEndpoint::bind(bind_addr)?;
        endpoint.set_remote(remote);

        self.endpoint = Some(endpoint);
        self.status = ConnectionStatus::Disconnected;
        self.dedup = DedupWindow::new();
        self.last_tick = Instant::now();
        self.events.push_back(ClientEvent::Ready);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.endpoint.take().is_some() {
            // Pending sends are discarded, not flushed.
            self.retry.clear();
            self.status = ConnectionStatus::Disconnected;
            self.events.push_back(ClientEvent::Closed);
        }
    }

    /// Transmits a payload at the given priority. Payloads over the
    /// transfer ceiling are dropped without an error, as are sends on an
    /// unbound client.
    pub fn send(&mut self, packet_id: u32, payload: &[u8], priority: Priority) {
        if payload.len() > self.config.max_transfer_bytes {
            log::debug!(
                "dropping outbound packet {}: {} bytes over the {} byte limit",
                packet_id,
                payload.len(),
                self.config.max_transfer_bytes
            );
            return;
        }
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };

        let frame = Frame::new(self.ids.next_id(), packet_id, priority, payload.to_vec());
        if let Err(e) = endpoint.send(&frame) {
            self.events.push_back(ClientEvent::TransportError {
                message: format!("send to {} failed: {}", self.config.remote(), e),
            });
        }
        if priority.is_tracked() {
            self.retry.track(frame, None, Instant::now());
        }
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

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.events.drain(..)
    }

    fn tick(&mut self, now: Instant) {
        let connected = self.status == ConnectionStatus::Connected;
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };

        let mut failures = Vec::new();
        self.retry.tick(
            now,
            |_| connected,
            |frame, _| {
                if let Err(e) = endpoint.send(frame) {
                    failures.push(format!("resend of frame {} failed: {}", frame.unique_id, e));
                }
            },
        );
        for message in failures {
            self.events.push_back(ClientEvent::TransportError { message });
        }
    }

    fn process_network(&mut self) {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };
        let frames = match endpoint.receive() {
            Ok(frames) => frames,
            Err(e) => {
                self.events.push_back(ClientEvent::TransportError {
                    message: format!("receive failed: {}", e),
                });
                return;
            }
        };

        let remote = self.config.remote();
        for (frame, from) in frames {
            if from != remote {
                continue;
            }
            self.handle_frame(frame);
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        if frame.payload.len() > self.config.max_transfer_bytes {
            return;
        }

        // Confirm before the duplicate check: a resent original whose
        // earlier confirm was lost must still be acknowledged.
        if frame.priority.is_tracked() {
            let mut confirm = ByteStream::new();
            confirm.write_u32(frame.unique_id);
            self.send(CONFIRM_PACKET_ID, confirm.as_bytes(), Priority::Bypass);
        }

        if !self.dedup.observe(frame.unique_id) {
            return;
        }

        self.status = ConnectionStatus::Connected;
        self.events.push_back(ClientEvent::Payload {
            packet_id: frame.packet_id,
            payload: ByteStream::from_bytes(&frame.payload),
        });

        if frame.packet_id == CONFIRM_PACKET_ID {
            let mut bs = ByteStream::from_bytes(&frame.payload);
            if let Ok(confirmed) = bs.read_u32() {
                self.retry.confirm(confirmed);
            }
        }
    }
}
