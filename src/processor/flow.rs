use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use super::service::service_for_port;

pub const STALE_FLOW_US: u64 = 60_000_000; // 60 seconds
pub const REAP_INTERVAL_US: u64 = 5_000_000; // 5 seconds

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }

    /// Maps an IP protocol number to a tracked transport, if any.
    pub fn from_ip_number(number: u8) -> Option<Self> {
        match number {
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            1 | 58 => Some(Protocol::Icmp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of TCP control bits, using the on-wire bit positions.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x01);
    pub const SYN: TcpFlags = TcpFlags(0x02);
    pub const RST: TcpFlags = TcpFlags(0x04);
    pub const PSH: TcpFlags = TcpFlags(0x08);
    pub const ACK: TcpFlags = TcpFlags(0x10);
    pub const URG: TcpFlags = TcpFlags(0x20);

    // Only the six bits the collector accounts for
    const TRACKED: u8 = 0x3f;

    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        TcpFlags(bits & Self::TRACKED)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TcpFlags) {
        self.0 |= other.0;
    }

    pub const fn union(self, other: TcpFlags) -> Self {
        TcpFlags(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// SYN seen without an ACK, the KDD "SYN error" condition.
    pub fn is_syn_error(&self) -> bool {
        self.contains(Self::SYN) && !self.contains(Self::ACK)
    }

    pub fn is_rst_error(&self) -> bool {
        self.contains(Self::RST)
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        self.union(rhs)
    }
}

/// KDD connection status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnFlag {
    SF,
    S0,
    REJ,
    RSTO,
    S1,
    OTH,
}

impl ConnFlag {
    /// Classifies an accumulated flag set. Rules are evaluated in order and the
    /// first match wins, which leaves RSTO unreachable behind REJ.
    #[allow(unreachable_patterns)]
    pub fn classify(flags: TcpFlags) -> Self {
        let syn = flags.contains(TcpFlags::SYN);
        let fin = flags.contains(TcpFlags::FIN);
        let rst = flags.contains(TcpFlags::RST);
        let ack = flags.contains(TcpFlags::ACK);

        match (syn, fin, rst, ack) {
            (true, true, _, _) => ConnFlag::SF,
            (true, false, false, _) => ConnFlag::S0,
            (_, _, true, _) => ConnFlag::REJ,
            (true, _, true, _) => ConnFlag::RSTO,
            (true, _, _, true) => ConnFlag::S1,
            _ => ConnFlag::OTH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnFlag::SF => "SF",
            ConnFlag::S0 => "S0",
            ConnFlag::REJ => "REJ",
            ConnFlag::RSTO => "RSTO",
            ConnFlag::S1 => "S1",
            ConnFlag::OTH => "OTH",
        }
    }
}

impl fmt::Display for ConnFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one flow. Each direction is its own key.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ConnectionKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl ConnectionKey {
    pub fn new(src_ip: IpAddr, dst_ip: IpAddr, src_port: u16, dst_port: u16, protocol: Protocol) -> Self {
        Self { src_ip, dst_ip, src_port, dst_port, protocol }
    }

    /// Source and destination are the same endpoint on a real port.
    pub fn is_land(&self) -> bool {
        self.src_ip == self.dst_ip && self.src_port == self.dst_port && self.src_port != 0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

/// Mutable accumulator for one active connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub start_time: u64,
    pub last_seen: u64,
    pub src_bytes: u64,
    // Single-sided capture: the reverse direction is a separate key, so this stays 0
    pub dst_bytes: u64,
    pub src_packets: u64,
    pub dst_packets: u64,
    pub flags: TcpFlags,
    pub urgent: u32,
    pub wrong_fragment: u32,
    pub land: bool,
    pub service: &'static str,
}

impl ConnectionState {
    pub fn new(key: &ConnectionKey, start_time: u64) -> Self {
        Self {
            start_time,
            last_seen: start_time,
            src_bytes: 0,
            dst_bytes: 0,
            src_packets: 0,
            dst_packets: 0,
            flags: TcpFlags::empty(),
            urgent: 0,
            wrong_fragment: 0,
            land: key.is_land(),
            service: service_for_port(key.dst_port),
        }
    }

    /// Folds one packet into the accumulator.
    pub fn update(&mut self, timestamp: u64, packet_len: u32, tcp_flags: Option<TcpFlags>, fragmented: bool) {
        self.src_bytes += packet_len as u64;
        self.src_packets += 1;
        self.last_seen = self.last_seen.max(timestamp);

        if let Some(flags) = tcp_flags {
            self.flags.insert(flags);
            if flags.contains(TcpFlags::URG) {
                self.urgent += 1;
            }
        }

        if fragmented {
            self.wrong_fragment += 1;
        }
    }

    /// TCP connections are complete once FIN or RST has been seen.
    pub fn should_terminate(&self, protocol: Protocol) -> bool {
        protocol == Protocol::Tcp
            && (self.flags.contains(TcpFlags::FIN) || self.flags.contains(TcpFlags::RST))
    }

    /// True once the connection has been open longer than `stale_us`.
    pub fn is_stale(&self, now: u64, stale_us: u64) -> bool {
        now.saturating_sub(self.start_time) > stale_us
    }

    pub fn conn_flag(&self) -> ConnFlag {
        ConnFlag::classify(self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::net::Ipv4Addr;

    fn key() -> ConnectionKey {
        ConnectionKey::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            54321,
            80,
            Protocol::Tcp,
        )
    }

    fn hash_of(k: &ConnectionKey) -> u64 {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_key_equality_and_hash() {
        let a = key();
        let b = key();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let variants = [
            ConnectionKey { src_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 101)), ..a },
            ConnectionKey { dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), ..a },
            ConnectionKey { src_port: 54322, ..a },
            ConnectionKey { dst_port: 443, ..a },
            ConnectionKey { protocol: Protocol::Udp, ..a },
        ];
        for v in variants {
            assert_ne!(a, v);
        }
    }

    #[test]
    fn test_reverse_direction_is_distinct() {
        let a = key();
        let reversed = ConnectionKey::new(a.dst_ip, a.src_ip, a.dst_port, a.src_port, a.protocol);
        assert_ne!(a, reversed);
    }

    #[test]
    fn test_land() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        assert!(ConnectionKey::new(ip, ip, 80, 80, Protocol::Tcp).is_land());
        assert!(!ConnectionKey::new(ip, ip, 0, 0, Protocol::Icmp).is_land());
        assert!(!ConnectionKey::new(ip, ip, 80, 81, Protocol::Tcp).is_land());
    }

    #[test]
    fn test_conn_flag_precedence() {
        use TcpFlags as F;
        assert_eq!(ConnFlag::classify(F::SYN | F::FIN), ConnFlag::SF);
        assert_eq!(ConnFlag::classify(F::SYN | F::FIN | F::RST), ConnFlag::SF);
        assert_eq!(ConnFlag::classify(F::SYN), ConnFlag::S0);
        assert_eq!(ConnFlag::classify(F::SYN | F::ACK), ConnFlag::S0);
        assert_eq!(ConnFlag::classify(F::RST), ConnFlag::REJ);
        // RST with SYN never reaches RSTO
        assert_eq!(ConnFlag::classify(F::SYN | F::RST), ConnFlag::REJ);
        assert_eq!(ConnFlag::classify(F::ACK | F::FIN), ConnFlag::OTH);
        assert_eq!(ConnFlag::classify(F::empty()), ConnFlag::OTH);
    }

    #[test]
    fn test_update_accumulates() {
        let k = key();
        let mut state = ConnectionState::new(&k, 1_000);
        assert_eq!(state.service, "http");

        state.update(1_100, 60, Some(TcpFlags::SYN), false);
        state.update(1_200, 1500, Some(TcpFlags::ACK | TcpFlags::URG), true);

        assert_eq!(state.src_bytes, 1560);
        assert_eq!(state.src_packets, 2);
        assert_eq!(state.urgent, 1);
        assert_eq!(state.wrong_fragment, 1);
        assert_eq!(state.last_seen, 1_200);
        assert!(state.flags.contains(TcpFlags::SYN | TcpFlags::ACK));
        assert!(!state.should_terminate(Protocol::Tcp));

        state.update(1_300, 40, Some(TcpFlags::FIN), false);
        assert!(state.should_terminate(Protocol::Tcp));
        assert!(!state.should_terminate(Protocol::Udp));
    }

    #[test]
    fn test_stale() {
        let state = ConnectionState::new(&key(), 0);
        assert!(!state.is_stale(STALE_FLOW_US, STALE_FLOW_US));
        assert!(state.is_stale(STALE_FLOW_US + 1, STALE_FLOW_US));
    }
}
