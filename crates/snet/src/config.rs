use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::{
    DEFAULT_BLOCK_PACKET_TIMEOUT_MS, DEFAULT_CLIENT_TIMEOUT_MS, DEFAULT_MAX_TRANSFER_BYTES,
    DEFAULT_PORT, DEFAULT_RESEND_INTERVAL_MS, DEFAULT_TICK_INTERVAL_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

impl IpVersion {
    pub fn loopback(self) -> IpAddr {
        match self {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
        }
    }

    pub fn unspecified(self) -> IpAddr {
        match self {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote address to exchange frames with.
    pub address: IpAddr,
    pub port: u16,
    pub max_transfer_bytes: usize,
    pub tick_interval: Duration,
    pub resend_interval: Duration,
    pub ip_version: IpVersion,
}

impl ClientConfig {
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            address: ip_version.loopback(),
            port: DEFAULT_PORT,
            max_transfer_bytes: DEFAULT_MAX_TRANSFER_BYTES,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            resend_interval: Duration::from_millis(DEFAULT_RESEND_INTERVAL_MS),
            ip_version,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpVersion::V4)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to bind.
    pub address: IpAddr,
    pub port: u16,
    pub max_transfer_bytes: usize,
    pub client_timeout: Duration,
    pub block_packet_timeout: Duration,
    pub tick_interval: Duration,
    pub resend_interval: Duration,
    pub ip_version: IpVersion,
}

impl ServerConfig {
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            address: ip_version.loopback(),
            port: DEFAULT_PORT,
            max_transfer_bytes: DEFAULT_MAX_TRANSFER_BYTES,
            client_timeout: Duration::from_millis(DEFAULT_CLIENT_TIMEOUT_MS),
            block_packet_timeout: Duration::from_millis(DEFAULT_BLOCK_PACKET_TIMEOUT_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            resend_interval: Duration::from_millis(DEFAULT_RESEND_INTERVAL_MS),
            ip_version,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(IpVersion::V4)
    }
}
