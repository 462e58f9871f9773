use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use crate::tracking::DedupWindow;

/// One known remote endpoint. Each peer owns its dedup window; both are
/// discarded together when the peer idles out.
#[derive(Debug)]
pub struct PeerRecord {
    pub addr: SocketAddr,
    pub last_seen: Instant,
    pub dedup: DedupWindow,
}

impl PeerRecord {
    fn new(addr: SocketAddr, now: Instant) -> Self {
        Self {
            addr,
            last_seen: now,
            dedup: DedupWindow::new(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_seen) >= timeout
    }
}

/// Known peers keyed by their full endpoint (address and port).
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, PeerRecord>,
    timeout: Duration,
}

impl PeerTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            timeout,
        }
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&PeerRecord> {
        self.peers.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut PeerRecord> {
        self.peers.get_mut(addr)
    }

    /// Returns the record for this endpoint, inserting a fresh one for a
    /// previously unseen endpoint. The flag is true for new insertions.
    pub fn get_or_insert(&mut self, addr: SocketAddr, now: Instant) -> (&mut PeerRecord, bool) {
        let is_new = !self.peers.contains_key(&addr);
        let record = self
            .peers
            .entry(addr)
            .or_insert_with(|| PeerRecord::new(addr, now));
        (record, is_new)
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Removes every peer idle past the timeout, returning their
    /// addresses so the caller can surface the transitions.
    pub fn cleanup_timed_out(&mut self, now: Instant) -> Vec<SocketAddr> {
        let timed_out: Vec<SocketAddr> = self
            .peers
            .values()
            .filter(|p| p.is_timed_out(self.timeout, now))
            .map(|p| p.addr)
            .collect();

        for addr in &timed_out {
            self.peers.remove(addr);
        }

        timed_out
    }
}

/// Blocked source addresses with a rate limiter on rejection notices.
/// Keyed by address alone; every port of a blocked host is rejected.
#[derive(Debug)]
pub struct Blacklist {
    entries: HashMap<IpAddr, Option<Instant>>,
    notice_interval: Duration,
}

impl Blacklist {
    pub fn new(notice_interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            notice_interval,
        }
    }

    /// False when the address is already blocked.
    pub fn block(&mut self, addr: IpAddr) -> bool {
        if self.entries.contains_key(&addr) {
            return false;
        }
        self.entries.insert(addr, None);
        true
    }

    /// False when the address was not blocked.
    pub fn unblock(&mut self, addr: IpAddr) -> bool {
        self.entries.remove(&addr).is_some()
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.entries.contains_key(&addr)
    }

    /// True at most once per notice interval for a blocked address;
    /// firing re-arms the timer.
    pub fn should_notify(&mut self, addr: IpAddr, now: Instant) -> bool {
        match self.entries.get_mut(&addr) {
            Some(next_at) => {
                let due = match next_at {
                    None => true,
                    Some(at) => now >= *at,
                };
                if due {
                    *next_at = Some(now + self.notice_interval);
                }
                due
            }
            None => false,
        }
    }
}
