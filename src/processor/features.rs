//! KDD-99 connection record and the code that derives it from a completed
//! flow plus the recent-connection history.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::flow::{ConnFlag, Protocol};
use super::history::{HistoryEntry, HistoryIndex};
use super::service::service_for_port;
use super::tracker::CompletedFlow;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// Output column order, shared by the CSV sink and the predictor input.
pub const CSV_COLUMNS: [&str; 42] = [
    "duration",
    "protocol_type",
    "service",
    "flag",
    "src_bytes",
    "dst_bytes",
    "land",
    "wrong_fragment",
    "urgent",
    "hot",
    "num_failed_logins",
    "logged_in",
    "num_compromised",
    "root_shell",
    "su_attempted",
    "num_root",
    "num_file_creations",
    "num_shells",
    "num_access_files",
    "num_outbound_cmds",
    "is_host_login",
    "is_guest_login",
    "count",
    "srv_count",
    "serror_rate",
    "srv_serror_rate",
    "rerror_rate",
    "srv_rerror_rate",
    "same_srv_rate",
    "diff_srv_rate",
    "srv_diff_host_rate",
    "dst_host_count",
    "dst_host_srv_count",
    "dst_host_same_srv_rate",
    "dst_host_diff_srv_rate",
    "dst_host_same_src_port_rate",
    "dst_host_srv_diff_host_rate",
    "dst_host_serror_rate",
    "dst_host_srv_serror_rate",
    "dst_host_rerror_rate",
    "dst_host_srv_rerror_rate",
    "class",
];

pub const FEATURE_COUNT: usize = 41;

/// The 41 model features, i.e. every column but `class`.
pub fn feature_columns() -> &'static [&'static str] {
    &CSV_COLUMNS[..FEATURE_COUNT]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    pub fn from_prediction(label: u8) -> Self {
        if label == 1 { Label::Anomaly } else { Label::Normal }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "normal",
            Label::Anomaly => "anomaly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficSource {
    Bot,
    Ai,
    Human,
    Unknown,
}

impl TrafficSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficSource::Bot => "bot",
            TrafficSource::Ai => "ai",
            TrafficSource::Human => "human",
            TrafficSource::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column value, typed the way it is written out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Int(u64),
    Float(f64),
    Text(&'a str),
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            // Debug keeps the trailing ".0" on whole floats
            FieldValue::Float(v) => write!(f, "{v:?}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub duration: f64,
    pub protocol_type: Protocol,
    pub service: &'static str,
    pub flag: ConnFlag,
    pub src_bytes: u64,
    pub dst_bytes: u64,
    pub land: u8,
    pub wrong_fragment: u32,
    pub urgent: u32,

    // Content features, no payload inspection is done
    pub hot: u32,
    pub num_failed_logins: u32,
    pub logged_in: u32,
    pub num_compromised: u32,
    pub root_shell: u32,
    pub su_attempted: u32,
    pub num_root: u32,
    pub num_file_creations: u32,
    pub num_shells: u32,
    pub num_access_files: u32,
    pub num_outbound_cmds: u32,
    pub is_host_login: u32,
    pub is_guest_login: u32,

    // Time window features
    pub count: u32,
    pub srv_count: u32,
    pub serror_rate: f64,
    pub srv_serror_rate: f64,
    pub rerror_rate: f64,
    pub srv_rerror_rate: f64,
    pub same_srv_rate: f64,
    pub diff_srv_rate: f64,
    pub srv_diff_host_rate: f64,

    // Host features
    pub dst_host_count: u32,
    pub dst_host_srv_count: u32,
    pub dst_host_same_srv_rate: f64,
    pub dst_host_diff_srv_rate: f64,
    pub dst_host_same_src_port_rate: f64,
    pub dst_host_srv_diff_host_rate: f64,
    pub dst_host_serror_rate: f64,
    pub dst_host_srv_serror_rate: f64,
    pub dst_host_rerror_rate: f64,
    pub dst_host_srv_rerror_rate: f64,

    pub class: Label,

    // Collector-local extensions
    pub confidence: f64,
    pub traffic_source: TrafficSource,
    pub traffic_source_confidence: f64,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FeatureRecord {
    /// Looks a column up by its CSV name.
    pub fn value(&self, column: &str) -> Option<FieldValue<'_>> {
        use FieldValue::{Float, Int, Text};

        let v = match column {
            "duration" => Float(self.duration),
            "protocol_type" => Text(self.protocol_type.as_str()),
            "service" => Text(self.service),
            "flag" => Text(self.flag.as_str()),
            "src_bytes" => Int(self.src_bytes),
            "dst_bytes" => Int(self.dst_bytes),
            "land" => Int(self.land as u64),
            "wrong_fragment" => Int(self.wrong_fragment as u64),
            "urgent" => Int(self.urgent as u64),
            "hot" => Int(self.hot as u64),
            "num_failed_logins" => Int(self.num_failed_logins as u64),
            "logged_in" => Int(self.logged_in as u64),
            "num_compromised" => Int(self.num_compromised as u64),
            "root_shell" => Int(self.root_shell as u64),
            "su_attempted" => Int(self.su_attempted as u64),
            "num_root" => Int(self.num_root as u64),
            "num_file_creations" => Int(self.num_file_creations as u64),
            "num_shells" => Int(self.num_shells as u64),
            "num_access_files" => Int(self.num_access_files as u64),
            "num_outbound_cmds" => Int(self.num_outbound_cmds as u64),
            "is_host_login" => Int(self.is_host_login as u64),
            "is_guest_login" => Int(self.is_guest_login as u64),
            "count" => Int(self.count as u64),
            "srv_count" => Int(self.srv_count as u64),
            "serror_rate" => Float(self.serror_rate),
            "srv_serror_rate" => Float(self.srv_serror_rate),
            "rerror_rate" => Float(self.rerror_rate),
            "srv_rerror_rate" => Float(self.srv_rerror_rate),
            "same_srv_rate" => Float(self.same_srv_rate),
            "diff_srv_rate" => Float(self.diff_srv_rate),
            "srv_diff_host_rate" => Float(self.srv_diff_host_rate),
            "dst_host_count" => Int(self.dst_host_count as u64),
            "dst_host_srv_count" => Int(self.dst_host_srv_count as u64),
            "dst_host_same_srv_rate" => Float(self.dst_host_same_srv_rate),
            "dst_host_diff_srv_rate" => Float(self.dst_host_diff_srv_rate),
            "dst_host_same_src_port_rate" => Float(self.dst_host_same_src_port_rate),
            "dst_host_srv_diff_host_rate" => Float(self.dst_host_srv_diff_host_rate),
            "dst_host_serror_rate" => Float(self.dst_host_serror_rate),
            "dst_host_srv_serror_rate" => Float(self.dst_host_srv_serror_rate),
            "dst_host_rerror_rate" => Float(self.dst_host_rerror_rate),
            "dst_host_srv_rerror_rate" => Float(self.dst_host_srv_rerror_rate),
            "class" => Text(self.class.as_str()),
            "confidence" => Float(self.confidence),
            "traffic_source" => Text(self.traffic_source.as_str()),
            "traffic_source_confidence" => Float(self.traffic_source_confidence),
            "src_port" => Int(self.src_port as u64),
            "dst_port" => Int(self.dst_port as u64),
            _ => return None,
        };
        Some(v)
    }

    /// The record as one CSV row in `CSV_COLUMNS` order.
    pub fn csv_row(&self) -> Vec<String> {
        CSV_COLUMNS
            .iter()
            .map(|c| self.value(c).map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    pub fn with_prediction(mut self, class: Label, confidence: f64) -> Self {
        self.class = class;
        self.confidence = confidence;
        self
    }

    pub fn with_traffic_source(mut self, source: TrafficSource, confidence: f64) -> Self {
        self.traffic_source = source;
        self.traffic_source_confidence = confidence;
        self
    }
}

#[inline]
fn fraction(hits: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}

#[inline]
fn rate_where(entries: &[&HistoryEntry], pred: impl Fn(&HistoryEntry) -> bool) -> f64 {
    fraction(entries.iter().filter(|e| pred(e)).count(), entries.len())
}

/// Builds feature records. Pure: the same flow and history always yield the
/// same record.
#[derive(Debug, Clone)]
pub struct FeatureComputer {
    window_us: u64,
}

impl Default for FeatureComputer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl FeatureComputer {
    pub fn new(window: Duration) -> Self {
        Self { window_us: window.as_micros() as u64 }
    }

    pub fn window_us(&self) -> u64 {
        self.window_us
    }

    /// Must run before `flow` is recorded into `history`.
    pub fn build(&self, flow: &CompletedFlow, history: &HistoryIndex) -> FeatureRecord {
        let key = &flow.key;
        let state = &flow.state;
        let service = state.service;

        let window = history.query_window(
            key.dst_ip,
            service_for_port(key.dst_port),
            flow.completed_at,
            self.window_us,
        );
        let same_host = &window.same_host;
        let same_srv = &window.same_service;

        let same_srv_rate = rate_where(same_host, |e| e.service == service);

        let host_entries = history.query_host(key.dst_ip);
        let host_srv: Vec<&HistoryEntry> = host_entries
            .iter()
            .copied()
            .filter(|e| e.service == service)
            .collect();
        let dst_host_same_srv_rate = fraction(host_srv.len(), host_entries.len());

        FeatureRecord {
            duration: flow.duration_secs(),
            protocol_type: key.protocol,
            service,
            flag: state.conn_flag(),
            src_bytes: state.src_bytes,
            dst_bytes: state.dst_bytes,
            land: state.land as u8,
            wrong_fragment: state.wrong_fragment,
            urgent: state.urgent,

            hot: 0,
            num_failed_logins: 0,
            logged_in: 0,
            num_compromised: 0,
            root_shell: 0,
            su_attempted: 0,
            num_root: 0,
            num_file_creations: 0,
            num_shells: 0,
            num_access_files: 0,
            num_outbound_cmds: 0,
            is_host_login: 0,
            is_guest_login: 0,

            count: same_host.len() as u32,
            srv_count: same_srv.len() as u32,
            serror_rate: rate_where(same_host, |e| e.flags.is_syn_error()),
            srv_serror_rate: rate_where(same_srv, |e| e.flags.is_syn_error()),
            rerror_rate: rate_where(same_host, |e| e.flags.is_rst_error()),
            srv_rerror_rate: rate_where(same_srv, |e| e.flags.is_rst_error()),
            same_srv_rate,
            diff_srv_rate: 1.0 - same_srv_rate,
            srv_diff_host_rate: rate_where(same_srv, |e| e.dst_ip != key.dst_ip),

            dst_host_count: host_entries.len() as u32,
            dst_host_srv_count: host_srv.len() as u32,
            dst_host_same_srv_rate,
            dst_host_diff_srv_rate: 1.0 - dst_host_same_srv_rate,
            dst_host_same_src_port_rate: rate_where(&host_entries, |e| e.src_port == key.src_port),
            dst_host_srv_diff_host_rate: rate_where(&host_srv, |e| e.src_ip != key.src_ip),
            dst_host_serror_rate: rate_where(&host_entries, |e| e.flags.is_syn_error()),
            dst_host_srv_serror_rate: rate_where(&host_srv, |e| e.flags.is_syn_error()),
            dst_host_rerror_rate: rate_where(&host_entries, |e| e.flags.is_rst_error()),
            dst_host_srv_rerror_rate: rate_where(&host_srv, |e| e.flags.is_rst_error()),

            class: Label::Normal,
            confidence: 0.5,
            traffic_source: TrafficSource::Unknown,
            traffic_source_confidence: 0.0,
            src_port: key.src_port,
            dst_port: key.dst_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::flow::{ConnectionKey, ConnectionState, TcpFlags};
    use crate::processor::tracker::CompletionReason;
    use std::net::{IpAddr, Ipv4Addr};

    const SEC: u64 = 1_000_000;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn flow(src: u8, dst: u8, src_port: u16, dst_port: u16, flags: TcpFlags, start: u64, end: u64) -> CompletedFlow {
        let key = ConnectionKey::new(ip(src), ip(dst), src_port, dst_port, Protocol::Tcp);
        let mut state = ConnectionState::new(&key, start);
        state.update(start, 100, Some(flags), false);
        CompletedFlow { key, state, completed_at: end, reason: CompletionReason::Flags }
    }

    fn record_all(history: &mut HistoryIndex, flows: &[CompletedFlow]) {
        for f in flows {
            history.record(HistoryEntry::from(f));
        }
    }

    fn all_rates(r: &FeatureRecord) -> [f64; 16] {
        [
            r.serror_rate,
            r.srv_serror_rate,
            r.rerror_rate,
            r.srv_rerror_rate,
            r.same_srv_rate,
            r.diff_srv_rate,
            r.srv_diff_host_rate,
            r.dst_host_same_srv_rate,
            r.dst_host_diff_srv_rate,
            r.dst_host_same_src_port_rate,
            r.dst_host_srv_diff_host_rate,
            r.dst_host_serror_rate,
            r.dst_host_srv_serror_rate,
            r.dst_host_rerror_rate,
            r.dst_host_srv_rerror_rate,
            r.duration.min(1.0),
        ]
    }

    #[test]
    fn test_empty_history_rates_are_zero() {
        let computer = FeatureComputer::default();
        let history = HistoryIndex::new(8);
        let f = flow(100, 1, 40000, 80, TcpFlags::SYN | TcpFlags::FIN, 0, SEC);
        let r = computer.build(&f, &history);

        assert_eq!(r.count, 0);
        assert_eq!(r.srv_count, 0);
        assert_eq!(r.dst_host_count, 0);
        assert_eq!(r.serror_rate, 0.0);
        assert_eq!(r.srv_diff_host_rate, 0.0);
        assert_eq!(r.dst_host_srv_rerror_rate, 0.0);
        assert_eq!(r.same_srv_rate, 0.0);
        assert_eq!(r.same_srv_rate + r.diff_srv_rate, 1.0);
        assert_eq!(r.duration, 1.0);
        assert_eq!(r.flag, ConnFlag::SF);
        assert_eq!(r.service, "http");
    }

    #[test]
    fn test_window_rates() {
        let computer = FeatureComputer::new(Duration::from_secs(2));
        let mut history = HistoryIndex::new(64);
        record_all(
            &mut history,
            &[
                // same host, same service, SYN error
                flow(100, 1, 40001, 80, TcpFlags::SYN, 0, 9 * SEC),
                // same host, other service, RST
                flow(100, 1, 40002, 22, TcpFlags::RST, 0, 9 * SEC),
                // other host, same service
                flow(101, 2, 40003, 80, TcpFlags::SYN | TcpFlags::ACK, 0, 9 * SEC),
                // same host, outside the window
                flow(100, 1, 40004, 80, TcpFlags::RST, 0, SEC),
            ],
        );

        let f = flow(100, 1, 40001, 80, TcpFlags::SYN | TcpFlags::FIN, 9 * SEC, 10 * SEC);
        let r = computer.build(&f, &history);

        assert_eq!(r.count, 2);
        assert_eq!(r.srv_count, 2);
        assert_eq!(r.serror_rate, 0.5);
        assert_eq!(r.rerror_rate, 0.5);
        assert_eq!(r.same_srv_rate, 0.5);
        assert_eq!(r.diff_srv_rate, 0.5);
        assert_eq!(r.srv_serror_rate, 0.5);
        assert_eq!(r.srv_rerror_rate, 0.0);
        assert_eq!(r.srv_diff_host_rate, 0.5);

        // Host features see all three entries for 10.0.0.1
        assert_eq!(r.dst_host_count, 3);
        assert_eq!(r.dst_host_srv_count, 2);
        assert!((r.dst_host_same_srv_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.dst_host_same_srv_rate + r.dst_host_diff_srv_rate - 1.0).abs() < 1e-12);
        assert!((r.dst_host_same_src_port_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!((r.dst_host_rerror_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(r.dst_host_srv_serror_rate, 0.5);
        assert_eq!(r.dst_host_srv_rerror_rate, 0.5);
        assert_eq!(r.dst_host_srv_diff_host_rate, 0.0);

        for rate in all_rates(&r) {
            assert!((0.0..=1.0).contains(&rate));
        }
    }

    #[test]
    fn test_build_is_idempotent() {
        let computer = FeatureComputer::default();
        let mut history = HistoryIndex::new(8);
        record_all(&mut history, &[flow(100, 1, 40001, 80, TcpFlags::SYN, 0, SEC)]);
        let f = flow(100, 1, 40002, 80, TcpFlags::SYN | TcpFlags::FIN, SEC, 2 * SEC);

        let a = computer.build(&f, &history);
        let b = computer.build(&f, &history);
        assert_eq!(a, b);
        assert_eq!(a.csv_row(), b.csv_row());
    }

    #[test]
    fn test_csv_row_layout() {
        let computer = FeatureComputer::default();
        let history = HistoryIndex::new(8);
        let f = flow(100, 1, 40001, 53, TcpFlags::RST, 0, SEC / 2);
        let row = computer.build(&f, &history).csv_row();

        assert_eq!(row.len(), CSV_COLUMNS.len());
        assert_eq!(row[0], "0.5");
        assert_eq!(row[1], "tcp");
        assert_eq!(row[2], "domain");
        assert_eq!(row[3], "REJ");
        assert_eq!(row[4], "100");
        assert_eq!(row[24], "0.0");
        assert_eq!(row[29], "1.0");
        assert_eq!(row[41], "normal");
    }

    #[test]
    fn test_every_column_resolves() {
        let computer = FeatureComputer::default();
        let r = computer.build(&flow(1, 2, 3, 4, TcpFlags::FIN, 0, 1), &HistoryIndex::new(1));
        for column in CSV_COLUMNS {
            assert!(r.value(column).is_some(), "missing column {column}");
        }
        assert!(r.value("no_such_column").is_none());
        assert_eq!(feature_columns().len(), FEATURE_COUNT);
    }
}
