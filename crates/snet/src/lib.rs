pub mod bitstream;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod events;
pub mod peers;
pub mod protocol;
pub mod server;
pub mod tracking;

pub use bitstream::{ByteStream, StreamError};
pub use client::{Client, ConnectionStatus};
pub use config::{ClientConfig, IpVersion, ServerConfig};
pub use endpoint::{NetworkStats, UdpEndpoint};
pub use events::{ClientEvent, ServerEvent};
pub use peers::{Blacklist, PeerRecord, PeerTable};
pub use server::Server;
pub use protocol::{
    BLOCK_PACKET_ID, CONFIRM_PACKET_ID, DEFAULT_MAX_TRANSFER_BYTES, DEFAULT_PORT, Frame,
    FrameError, MAX_UNIQUE_ID, Priority,
};
pub use tracking::{DEDUP_WINDOW, DedupWindow, FrameIdAllocator, PendingFrame, RetryQueue};
