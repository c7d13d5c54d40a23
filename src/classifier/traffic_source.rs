//! Heuristic human / bot / AI-service scoring of a finished connection.

use crate::processor::{ConnFlag, FeatureRecord, TrafficSource};

/// Below this best score the source is reported as unknown.
pub const MIN_SOURCE_SCORE: f64 = 0.3;

const AI_PORTS: [u16; 5] = [80, 443, 8080, 8000, 5000];

#[derive(Debug, Clone, PartialEq)]
struct Behaviour<'a> {
    request_rate: f64,
    bytes_ratio: f64,
    service: &'a str,
    duration: f64,
    same_srv_rate: f64,
    dst_host_count: u32,
    flag: ConnFlag,
    dst_port: u16,
}

impl<'a> From<&'a FeatureRecord> for Behaviour<'a> {
    fn from(r: &'a FeatureRecord) -> Self {
        Self {
            request_rate: r.count as f64 / r.duration.max(1.0),
            bytes_ratio: r.src_bytes as f64 / r.dst_bytes.max(1) as f64,
            service: r.service,
            duration: r.duration,
            same_srv_rate: r.same_srv_rate,
            dst_host_count: r.dst_host_count,
            flag: r.flag,
            dst_port: r.dst_port,
        }
    }
}

fn bot_score(b: &Behaviour<'_>) -> f64 {
    let mut score = 0.0;
    if b.request_rate > 10.0 {
        score += 0.4;
    } else if b.request_rate > 5.0 {
        score += 0.2;
    }
    if b.same_srv_rate > 0.8 {
        score += 0.3;
    }
    if matches!(b.service, "http" | "ftp" | "ssh") {
        score += 0.1;
    }
    if matches!(b.flag, ConnFlag::S0 | ConnFlag::REJ) {
        score += 0.2;
    }
    if b.dst_host_count > 20 {
        score += 0.3;
    }
    f64::min(score, 1.0)
}

fn ai_score(b: &Behaviour<'_>) -> f64 {
    let mut score = 0.0;
    if matches!(b.service, "http" | "http_443") && AI_PORTS.contains(&b.dst_port) {
        score += 0.3;
    }
    if 1.0 < b.request_rate && b.request_rate < 5.0 {
        score += 0.2;
    }
    if 0.5 < b.bytes_ratio && b.bytes_ratio < 2.0 {
        score += 0.2;
    }
    if 1.0 < b.duration && b.duration < 30.0 {
        score += 0.1;
    }
    if 5 < b.dst_host_count && b.dst_host_count < 15 {
        score += 0.2;
    }
    f64::min(score, 1.0)
}

fn human_score(b: &Behaviour<'_>) -> f64 {
    let mut score = 0.0;
    if matches!(b.service, "http" | "http_443") {
        score += 0.2;
    }
    if 0.1 < b.request_rate && b.request_rate < 2.0 {
        score += 0.3;
    }
    if b.same_srv_rate < 0.6 {
        score += 0.2;
    }
    if b.flag == ConnFlag::SF {
        score += 0.2;
    }
    if 5.0 < b.duration && b.duration < 300.0 {
        score += 0.1;
    }
    if b.dst_host_count < 10 {
        score += 0.1;
    }
    f64::min(score, 1.0)
}

/// Scores a record and returns the winning source with its score. Ties go to
/// bot, then ai, then human.
pub fn classify(record: &FeatureRecord) -> (TrafficSource, f64) {
    let b = Behaviour::from(record);
    let scores = [
        (TrafficSource::Bot, bot_score(&b)),
        (TrafficSource::Ai, ai_score(&b)),
        (TrafficSource::Human, human_score(&b)),
    ];

    let (mut best, mut best_score) = scores[0];
    for (source, score) in &scores[1..] {
        if *score > best_score {
            best = *source;
            best_score = *score;
        }
    }

    if best_score < MIN_SOURCE_SCORE {
        return (TrafficSource::Unknown, best_score);
    }
    (best, best_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{
        ConnectionKey, ConnectionState, CompletedFlow, CompletionReason, FeatureComputer, HistoryIndex,
        Protocol, TcpFlags,
    };
    use std::net::{IpAddr, Ipv4Addr};

    fn record(dst_port: u16, flags: TcpFlags, duration_us: u64) -> FeatureRecord {
        let key = ConnectionKey::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            50000,
            dst_port,
            Protocol::Tcp,
        );
        let mut state = ConnectionState::new(&key, 0);
        state.update(0, 200, Some(flags), false);
        let flow = CompletedFlow { key, state, completed_at: duration_us, reason: CompletionReason::Flags };
        FeatureComputer::default().build(&flow, &HistoryIndex::new(4))
    }

    #[test]
    fn test_scanner_scores_as_bot() {
        let mut r = record(22, TcpFlags::SYN, 0);
        r.count = 50;
        r.same_srv_rate = 0.9;
        r.dst_host_count = 40;

        let (source, score) = classify(&r);
        assert_eq!(source, TrafficSource::Bot);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_browsing_scores_as_human() {
        // http, SF, 10 s, one prior connection, mixed services
        let mut r = record(80, TcpFlags::SYN | TcpFlags::FIN, 10_000_000);
        r.count = 2;
        r.same_srv_rate = 0.5;
        r.dst_host_count = 3;

        let (source, score) = classify(&r);
        assert_eq!(source, TrafficSource::Human);
        assert!(score > 0.9);
    }

    #[test]
    fn test_api_client_scores_as_ai() {
        let mut r = record(8080, TcpFlags::ACK, 0);
        r.service = "http";
        r.count = 3;
        r.duration = 2.0;
        r.dst_bytes = 200;
        r.same_srv_rate = 0.7;
        r.dst_host_count = 10;

        // ai: port 0.3 + rate 0.2 + ratio 0.2 + duration 0.1 + hosts 0.2
        let (source, score) = classify(&r);
        assert_eq!(source, TrafficSource::Ai);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_scores_are_unknown() {
        let mut r = record(9999, TcpFlags::ACK, 0);
        r.same_srv_rate = 0.7;
        r.dst_host_count = 12;

        let (source, score) = classify(&r);
        assert_eq!(source, TrafficSource::Unknown);
        assert!(score < MIN_SOURCE_SCORE);
    }

    #[test]
    fn test_ties_prefer_bot() {
        // bot: S0 0.2 + http 0.1, human: http 0.2 + hosts 0.1
        let mut r = record(80, TcpFlags::SYN, 0);
        r.same_srv_rate = 0.7;
        r.dst_host_count = 0;
        let b = Behaviour::from(&r);
        assert_eq!(bot_score(&b), human_score(&b));

        let (source, _) = classify(&r);
        assert_eq!(source, TrafficSource::Bot);
    }
}
