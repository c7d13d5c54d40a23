use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::classifier::ModelIdentity;
use crate::processor::{ConnectionKey, FeatureRecord, Label, Protocol, TrafficSource};

/// A finished connection: its key and the KDD record built for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub key: ConnectionKey,
    pub record: FeatureRecord,
}

/// Counters shared across the pipeline threads.
#[derive(Debug)]
pub struct PipelineStats {
    pub started_at: DateTime<Utc>,
    pub total_packets: AtomicU64,
    pub active_connections: AtomicU64,
    pub completed_connections: AtomicU64,
    pub normal: AtomicU64,
    pub anomaly: AtomicU64,
    pub human: AtomicU64,
    pub bot: AtomicU64,
    pub ai: AtomicU64,
    pub unknown: AtomicU64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_packets: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            completed_connections: AtomicU64::new(0),
            normal: AtomicU64::new(0),
            anomaly: AtomicU64::new(0),
            human: AtomicU64::new(0),
            bot: AtomicU64::new(0),
            ai: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
        }
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tallies a record once it has been classified.
    pub fn count_record(&self, record: &FeatureRecord) {
        self.completed_connections.fetch_add(1, Ordering::Relaxed);
        match record.class {
            Label::Normal => self.normal.fetch_add(1, Ordering::Relaxed),
            Label::Anomaly => self.anomaly.fetch_add(1, Ordering::Relaxed),
        };
        let source = match record.traffic_source {
            TrafficSource::Human => &self.human,
            TrafficSource::Bot => &self.bot,
            TrafficSource::Ai => &self.ai,
            TrafficSource::Unknown => &self.unknown,
        };
        source.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, errors: u64, model: Option<&ModelIdentity>) -> StatsSnapshot {
        StatsSnapshot {
            total_packets: self.total_packets.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            completed_connections: self.completed_connections.load(Ordering::Relaxed),
            errors,
            start_time: self.started_at,
            model_name: model.map(|m| m.name.clone()),
            model_type: model.map(|m| m.kind.as_str().to_string()),
            model_accuracy: model.map_or(0.0, |m| m.accuracy),
        }
    }
}

/// Stats as pushed to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub active_connections: u64,
    pub completed_connections: u64,
    pub errors: u64,
    pub start_time: DateTime<Utc>,
    pub model_name: Option<String>,
    pub model_type: Option<String>,
    pub model_accuracy: f64,
}

/// Per-connection payload: the record flattened together with its key.
#[derive(Debug, Serialize)]
pub struct ConnectionPayload<'a> {
    #[serde(flatten)]
    pub record: &'a FeatureRecord,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub protocol: Protocol,
}

impl<'a> From<&'a ConnectionRecord> for ConnectionPayload<'a> {
    fn from(conn: &'a ConnectionRecord) -> Self {
        Self {
            record: &conn.record,
            src_ip: conn.key.src_ip,
            dst_ip: conn.key.dst_ip,
            protocol: conn.key.protocol,
        }
    }
}
