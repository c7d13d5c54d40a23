//! Active connection table and the completion state machine.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use super::flow::{ConnectionKey, ConnectionState};
use crate::capture::ParsedPacket;
use crate::error::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// FIN or RST observed on a TCP connection
    Flags,
    /// Open longer than the stale threshold
    Stale,
    /// Flushed at shutdown
    Shutdown,
}

/// A connection detached from the active table, ready for feature extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFlow {
    pub key: ConnectionKey,
    pub state: ConnectionState,
    pub completed_at: u64,
    pub reason: CompletionReason,
}

impl CompletedFlow {
    pub fn duration_secs(&self) -> f64 {
        self.completed_at.saturating_sub(self.state.start_time) as f64 / 1_000_000.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    pub packets_ingested: u64,
    pub packets_ignored: u64,
    pub flows_created: u64,
    pub flows_completed: u64,
    pub flows_reaped: u64,
}

#[derive(Debug, Default)]
pub struct FlowTracker {
    flows: HashMap<ConnectionKey, ConnectionState>,
    stats: TrackerStats,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a packet into its connection. Returns the connection if this
    /// packet completed it.
    pub fn ingest(&mut self, pkt: &ParsedPacket) -> Option<CompletedFlow> {
        let Some(net) = pkt.net.as_ref() else {
            self.stats.packets_ignored += 1;
            return None;
        };
        let Some(protocol) = net.transport.protocol() else {
            self.stats.packets_ignored += 1;
            return None;
        };

        let (src_port, dst_port) = net.transport.ports();
        let key = ConnectionKey::new(net.src_ip, net.dst_ip, src_port, dst_port, protocol);

        let state = match self.flows.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                self.stats.flows_created += 1;
                e.insert(ConnectionState::new(&key, pkt.timestamp))
            }
        };

        state.update(pkt.timestamp, pkt.packet_len, net.transport.tcp_flags(), net.is_fragmented());
        self.stats.packets_ingested += 1;

        if state.should_terminate(protocol) {
            // The key was just touched, so removal cannot miss
            return self.complete(&key, pkt.timestamp, CompletionReason::Flags).ok();
        }
        None
    }

    /// Removes `key` from the active table and hands it out. A key completes at
    /// most once; a second attempt reports `UnknownConnection`.
    pub fn complete(
        &mut self,
        key: &ConnectionKey,
        at: u64,
        reason: CompletionReason,
    ) -> Result<CompletedFlow, FlowError> {
        let state = self
            .flows
            .remove(key)
            .ok_or(FlowError::UnknownConnection(*key))?;

        self.stats.flows_completed += 1;
        if reason != CompletionReason::Flags {
            self.stats.flows_reaped += 1;
        }
        debug!(%key, ?reason, "Connection completed");

        Ok(CompletedFlow {
            key: *key,
            completed_at: at.max(state.start_time),
            state,
            reason,
        })
    }

    /// Force-completes every connection older than `stale_us`, oldest first.
    pub fn reap(&mut self, now: u64, stale_us: u64) -> Vec<CompletedFlow> {
        let stale = self.keys_where(|state| state.is_stale(now, stale_us));
        self.complete_all(stale, now, CompletionReason::Stale)
    }

    /// Completes everything still active, oldest first.
    pub fn drain(&mut self, now: u64) -> Vec<CompletedFlow> {
        let all = self.keys_where(|_| true);
        self.complete_all(all, now, CompletionReason::Shutdown)
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&ConnectionState> {
        self.flows.get(key)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    fn keys_where(&self, pred: impl Fn(&ConnectionState) -> bool) -> Vec<ConnectionKey> {
        let mut keys: Vec<(u64, ConnectionKey)> = self
            .flows
            .iter()
            .filter(|(_, state)| pred(state))
            .map(|(key, state)| (state.start_time, *key))
            .collect();
        keys.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.src_ip.cmp(&b.1.src_ip))
                .then_with(|| a.1.dst_ip.cmp(&b.1.dst_ip))
                .then_with(|| a.1.src_port.cmp(&b.1.src_port))
                .then_with(|| a.1.dst_port.cmp(&b.1.dst_port))
        });
        keys.into_iter().map(|(_, key)| key).collect()
    }

    fn complete_all(&mut self, keys: Vec<ConnectionKey>, now: u64, reason: CompletionReason) -> Vec<CompletedFlow> {
        keys.iter()
            .filter_map(|key| self.complete(key, now, reason).ok())
            .collect()
    }
}
