use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::{Frame, MAX_UNIQUE_ID, Priority};

/// Most-recent uniqueIds remembered per remote endpoint.
pub const DEDUP_WINDOW: usize = 10;

/// Hands out uniqueIds 0..=MAX_UNIQUE_ID, wrapping back to 0 past the top.
/// 0xFFFF_FFFF is never allocated.
#[derive(Debug, Default)]
pub struct FrameIdAllocator {
    next: u32,
}

impl FrameIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = if id >= MAX_UNIQUE_ID { 0 } else { id + 1 };
        id
    }
}

#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub frame: Frame,
    /// `None` for the client role, which has a single implicit remote.
    pub destination: Option<SocketAddr>,
    pub first_sent: Instant,
    pub last_sent: Instant,
    pub attempts: u32,
}

/// Outstanding reliable sends, in insertion order. Entries leave the queue
/// on a matching confirm or when the per-tier give-up policy fires.
#[derive(Debug)]
pub struct RetryQueue {
    pending: Vec<PendingFrame>,
    resend_after: Duration,
}

impl RetryQueue {
    pub fn new(resend_after: Duration) -> Self {
        Self {
            pending: Vec::new(),
            resend_after,
        }
    }

    pub fn track(&mut self, frame: Frame, destination: Option<SocketAddr>, now: Instant) {
        self.pending.push(PendingFrame {
            frame,
            destination,
            first_sent: now,
            last_sent: now,
            attempts: 0,
        });
    }

    /// Consumes an acknowledgment: removes the first pending entry with
    /// this uniqueId. Confirms for unknown ids are no-ops.
    pub fn confirm(&mut self, unique_id: u32) -> bool {
        match self
            .pending
            .iter()
            .position(|p| p.frame.unique_id == unique_id)
        {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingFrame> {
        self.pending.iter()
    }

    /// One retransmission pass. Entries due for a resend are replayed
    /// through `resend` with the original frame unchanged, then the give-up
    /// policy decides whether they stay pending: System entries survive
    /// only while `link_up` holds for their destination, the capped tiers
    /// drop once `attempts` reaches their limit. Entries not yet due are
    /// always retained. The walk rebuilds the queue in insertion order.
    pub fn tick(
        &mut self,
        now: Instant,
        mut link_up: impl FnMut(Option<SocketAddr>) -> bool,
        mut resend: impl FnMut(&Frame, Option<SocketAddr>),
    ) {
        let snapshot = std::mem::take(&mut self.pending);
        for mut entry in snapshot {
            if now.duration_since(entry.last_sent) >= self.resend_after {
                resend(&entry.frame, entry.destination);
                entry.attempts += 1;
                entry.last_sent = now;

                let give_up = match entry.frame.priority {
                    Priority::System => !link_up(entry.destination),
                    other => other.max_attempts().is_some_and(|cap| entry.attempts >= cap),
                };
                if give_up {
                    continue;
                }
            }
            self.pending.push(entry);
        }
    }
}

/// FIFO window of recently seen uniqueIds for one remote endpoint.
#[derive(Debug, Default)]
pub struct DedupWindow {
    recent: VecDeque<u32>,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an id, reporting whether it was new. Duplicates leave the
    /// window untouched; at capacity the oldest id is evicted first.
    pub fn observe(&mut self, unique_id: u32) -> bool {
        if self.recent.contains(&unique_id) {
            return false;
        }
        if self.recent.len() >= DEDUP_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(unique_id);
        true
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }
}
