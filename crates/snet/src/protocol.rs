use thiserror::Error;

use crate::bitstream::ByteStream;

pub const DEFAULT_PORT: u16 = 13322;
pub const DEFAULT_MAX_TRANSFER_BYTES: usize = 512;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;
pub const DEFAULT_RESEND_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_BLOCK_PACKET_TIMEOUT_MS: u64 = 60_000;

pub const FRAME_SENTINEL: u8 = 0x00;
pub const HEADER_LEN: usize = 9;
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 2;

/// packetId reserved for acknowledgment frames; the payload carries the
/// uniqueId being confirmed.
pub const CONFIRM_PACKET_ID: u32 = 0xFFFF_FFFF;
/// packetId reserved for the rejection notice sent to blacklisted senders.
pub const BLOCK_PACKET_ID: u32 = 0xFFFF_FFFE;
/// Highest uniqueId the allocator hands out before wrapping to 0. The
/// reserved packetIds live in a separate namespace but the counter stays
/// clear of the top value regardless.
pub const MAX_UNIQUE_ID: u32 = 0xFFFF_FFFE;

/// Reliability tier of a frame. Everything above `Bypass` is tracked for
/// retransmission until confirmed or given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    Bypass = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    System = 4,
}

impl Priority {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Priority::Bypass),
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            4 => Some(Priority::System),
            _ => None,
        }
    }

    pub fn is_tracked(self) -> bool {
        self > Priority::Bypass
    }

    /// Resend attempts after which a pending send is dropped. `None` for
    /// tiers without a fixed cap: System retries while the link is up,
    /// Bypass is never tracked at all.
    pub fn max_attempts(self) -> Option<u32> {
        match self {
            Priority::Low => Some(5),
            Priority::Medium => Some(10),
            Priority::High => Some(20),
            Priority::Bypass | Priority::System => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("datagram does not start with the frame sentinel")]
    MissingSentinel,
    #[error("datagram too short for a frame ({0} bytes)")]
    Truncated(usize),
    #[error("unknown priority value {0}")]
    UnknownPriority(u8),
}

/// One wire-format datagram: sentinel, 9-byte header, payload, sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub unique_id: u32,
    pub packet_id: u32,
    pub priority: Priority,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(unique_id: u32, packet_id: u32, priority: Priority, payload: Vec<u8>) -> Self {
        Self {
            unique_id,
            packet_id,
            priority,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bs = ByteStream::new();
        bs.write_u8(FRAME_SENTINEL)
            .write_u32(self.unique_id)
            .write_u32(self.packet_id)
            .write_u8(self.priority as u8)
            .write_bytes(&self.payload)
            .write_u8(FRAME_SENTINEL);
        bs.into_vec()
    }

    /// Total decode: any datagram that does not carry a well-formed frame
    /// yields an error, never a panic. The trailing sentinel byte is
    /// stripped without being validated.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.first() != Some(&FRAME_SENTINEL) {
            return Err(FrameError::MissingSentinel);
        }
        if data.len() < MIN_FRAME_LEN {
            return Err(FrameError::Truncated(data.len()));
        }

        let mut header = ByteStream::from_bytes(&data[1..1 + HEADER_LEN]);
        let unique_id = header
            .read_u32()
            .map_err(|_| FrameError::Truncated(data.len()))?;
        let packet_id = header
            .read_u32()
            .map_err(|_| FrameError::Truncated(data.len()))?;
        let raw_priority = header
            .read_u8()
            .map_err(|_| FrameError::Truncated(data.len()))?;
        let priority =
            Priority::from_u8(raw_priority).ok_or(FrameError::UnknownPriority(raw_priority))?;

        let payload = data[1 + HEADER_LEN..data.len() - 1].to_vec();

        Ok(Self {
            unique_id,
            packet_id,
            priority,
            payload,
        })
    }
}
