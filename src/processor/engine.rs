use crossbeam_channel::{select, tick, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use super::features::{FeatureComputer, DEFAULT_WINDOW};
use super::flow::{REAP_INTERVAL_US, STALE_FLOW_US};
use super::history::{HistoryEntry, HistoryIndex, DEFAULT_HISTORY_CAPACITY};
use super::tracker::{CompletedFlow, FlowTracker};
use crate::capture::ParsedPacket;
use crate::dashboard::DashboardEvent;
use crate::error::{ErrorCounter, FlowError};
use crate::types::{ConnectionRecord, PipelineStats};

// How often the loop looks at the stop flag while idle
const STOP_POLL: Duration = Duration::from_millis(100);

#[inline]
pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub window: Duration,
    pub history_capacity: usize,
    pub stale_after: Duration,
    pub reap_interval: Duration,
    /// Push stats to the dashboard every this many packets.
    pub stats_every: u64,
    /// Log a progress line every this many packets.
    pub progress_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            stale_after: Duration::from_micros(STALE_FLOW_US),
            reap_interval: Duration::from_micros(REAP_INTERVAL_US),
            stats_every: 500,
            progress_every: 100,
        }
    }
}

/// Tracker, history and feature computer behind one owner. Every completed
/// flow is measured against history first and recorded into it second.
///
/// Packet timestamps and the reaper's wall clock are merged into one
/// monotonic clock, so history entries are recorded in time order.
#[derive(Debug)]
pub struct FlowEngine {
    tracker: FlowTracker,
    history: HistoryIndex,
    computer: FeatureComputer,
    stale_us: u64,
    clock: u64,
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl FlowEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tracker: FlowTracker::new(),
            history: HistoryIndex::new(config.history_capacity),
            computer: FeatureComputer::new(config.window),
            stale_us: config.stale_after.as_micros() as u64,
            clock: 0,
        }
    }

    pub fn ingest(&mut self, pkt: &ParsedPacket) -> Option<ConnectionRecord> {
        let flow = self.tracker.ingest(pkt)?;
        Some(self.finish(flow))
    }

    /// Completes every connection that has gone stale by `now`.
    pub fn reap(&mut self, now: u64) -> Vec<ConnectionRecord> {
        let now = self.advance(now);
        let flows = self.tracker.reap(now, self.stale_us);
        flows.into_iter().map(|flow| self.finish(flow)).collect()
    }

    /// Completes everything still open.
    pub fn drain(&mut self, now: u64) -> Vec<ConnectionRecord> {
        let now = self.advance(now);
        let flows = self.tracker.drain(now);
        flows.into_iter().map(|flow| self.finish(flow)).collect()
    }

    /// Latest time the engine has seen, in µs.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }

    pub fn history(&self) -> &HistoryIndex {
        &self.history
    }

    fn advance(&mut self, t: u64) -> u64 {
        self.clock = self.clock.max(t);
        self.clock
    }

    fn finish(&mut self, mut flow: CompletedFlow) -> ConnectionRecord {
        // A packet queued behind a reap sweep may predate the sweep
        flow.completed_at = self.advance(flow.completed_at);
        let record = self.computer.build(&flow, &self.history);
        self.history.record(HistoryEntry::from(&flow));
        ConnectionRecord { key: flow.key, record }
    }
}

struct Outputs {
    record_tx: Sender<ConnectionRecord>,
    events_tx: Option<Sender<DashboardEvent>>,
    stats: Arc<PipelineStats>,
    errors: Arc<ErrorCounter>,
}

impl Outputs {
    fn emit(&self, conn: ConnectionRecord) {
        let key = conn.key;
        if self.record_tx.send(conn).is_err() {
            self.errors.record("Error completing connection", FlowError::PipelineClosed(key));
        }
    }

    fn emit_all(&self, conns: Vec<ConnectionRecord>) {
        for conn in conns {
            self.emit(conn);
        }
    }

    fn set_active(&self, engine: &FlowEngine) {
        self.stats.active_connections.store(engine.active() as u64, Ordering::Relaxed);
    }

    fn count_packet(&self, config: &EngineConfig) {
        let n = self.stats.total_packets.fetch_add(1, Ordering::Relaxed) + 1;
        if is_due(n, config.progress_every) {
            info!(
                packets = n,
                active = self.stats.active_connections.load(Ordering::Relaxed),
                completed = self.stats.completed_connections.load(Ordering::Relaxed),
                errors = self.errors.count(),
                "Capture progress"
            );
        }
        if is_due(n, config.stats_every) {
            if let Some(tx) = &self.events_tx {
                // Dashboard backlog never slows capture down
                let _ = tx.try_send(DashboardEvent::Stats);
            }
        }
    }
}

/// Every `cadence`-th count; a cadence of 0 never fires.
fn is_due(n: u64, cadence: u64) -> bool {
    cadence > 0 && n % cadence == 0
}

fn handle_packet(engine: &mut FlowEngine, out: &Outputs, pkt: &ParsedPacket, config: &EngineConfig) {
    if let Some(conn) = engine.ingest(pkt) {
        out.emit(conn);
    }
    out.set_active(engine);
    out.count_packet(config);
}

/// Engine thread body. Owns the flow table and history; ends when `running`
/// drops or the packet channel closes, then flushes everything still open.
pub fn processing_loop(
    running: Arc<AtomicBool>,
    packet_rx: Receiver<ParsedPacket>,
    record_tx: Sender<ConnectionRecord>,
    events_tx: Option<Sender<DashboardEvent>>,
    stats: Arc<PipelineStats>,
    errors: Arc<ErrorCounter>,
    config: EngineConfig,
) {
    let mut engine = FlowEngine::new(&config);
    let out = Outputs { record_tx, events_tx, stats, errors };

    let reap_tick = tick(config.reap_interval);
    let stop_tick = tick(STOP_POLL);

    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }

        select! {
            recv(packet_rx) -> msg => match msg {
                Ok(pkt) => handle_packet(&mut engine, &out, &pkt, &config),
                Err(_) => {
                    info!("Packet channel closed");
                    break;
                }
            },

            recv(reap_tick) -> _ => {
                let reaped = engine.reap(now_micros());
                if !reaped.is_empty() {
                    debug!(count = reaped.len(), active = engine.active(), "Reaped stale connections");
                }
                out.emit_all(reaped);
                out.set_active(&engine);
            },

            recv(stop_tick) -> _ => {},
        }
    }

    // Whatever the sniffer queued before stopping still counts
    while let Ok(pkt) = packet_rx.try_recv() {
        handle_packet(&mut engine, &out, &pkt, &config);
    }

    let remaining = engine.drain(now_micros());
    info!(connections = remaining.len(), "Cleaning up connections");
    out.emit_all(remaining);
    out.set_active(&engine);
}
