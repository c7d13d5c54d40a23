//! Bounded history of completed connections.
//!
//! The ring buffer is the source of truth. Every entry gets a monotonically
//! increasing sequence number; the per-host index stores sequence numbers and
//! is pruned from the front as the ring evicts, so it never points at a slot
//! that has been reused.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use super::flow::{Protocol, TcpFlags};
use super::tracker::CompletedFlow;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Summary of one completed connection as kept in history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub time: u64,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub service: &'static str,
    pub flags: TcpFlags,
}

impl From<&CompletedFlow> for HistoryEntry {
    fn from(flow: &CompletedFlow) -> Self {
        Self {
            time: flow.completed_at,
            src_ip: flow.key.src_ip,
            dst_ip: flow.key.dst_ip,
            src_port: flow.key.src_port,
            dst_port: flow.key.dst_port,
            protocol: flow.key.protocol,
            service: flow.state.service,
            flags: flow.state.flags,
        }
    }
}

/// Result of a time-window query.
#[derive(Debug, Default)]
pub struct WindowMatches<'a> {
    pub same_host: Vec<&'a HistoryEntry>,
    pub same_service: Vec<&'a HistoryEntry>,
}

#[derive(Debug)]
pub struct HistoryIndex {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
    // Sequence number of entries[0]
    base_seq: u64,
    by_host: HashMap<IpAddr, VecDeque<u64>>,
}

impl Default for HistoryIndex {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryIndex {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            base_seq: 0,
            by_host: HashMap::new(),
        }
    }

    /// Appends an entry, evicting the oldest one when full.
    pub fn record(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.evict_oldest();
        }
        let seq = self.base_seq + self.entries.len() as u64;
        self.by_host.entry(entry.dst_ip).or_default().push_back(seq);
        self.entries.push_back(entry);
    }

    /// Entries completed in the `window_us` microseconds up to `now`.
    /// An entry of age `a` is inside the window iff `0 <= a <= window_us`.
    pub fn query_window(&self, dst_ip: IpAddr, service: &str, now: u64, window_us: u64) -> WindowMatches<'_> {
        let mut matches = WindowMatches::default();

        for entry in &self.entries {
            if entry.time > now || now - entry.time > window_us {
                continue;
            }
            if entry.dst_ip == dst_ip {
                matches.same_host.push(entry);
            }
            if entry.service == service {
                matches.same_service.push(entry);
            }
        }
        matches
    }

    /// Every retained entry for `dst_ip`, oldest first, regardless of age.
    pub fn query_host(&self, dst_ip: IpAddr) -> Vec<&HistoryEntry> {
        self.by_host
            .get(&dst_ip)
            .map(|seqs| seqs.iter().filter_map(|seq| self.get(*seq)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hosts(&self) -> usize {
        self.by_host.len()
    }

    fn get(&self, seq: u64) -> Option<&HistoryEntry> {
        let offset = seq.checked_sub(self.base_seq)?;
        self.entries.get(offset as usize)
    }

    fn evict_oldest(&mut self) {
        let Some(old) = self.entries.pop_front() else { return };
        let old_seq = self.base_seq;
        self.base_seq += 1;

        // The evicted entry is the oldest for its host, so it sits at the front
        if let Some(seqs) = self.by_host.get_mut(&old.dst_ip) {
            while seqs.front().is_some_and(|s| *s <= old_seq) {
                seqs.pop_front();
            }
            if seqs.is_empty() {
                self.by_host.remove(&old.dst_ip);
            }
        }
    }
}
