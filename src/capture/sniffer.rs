use crossbeam_channel::Sender;
use etherparse::{NetHeaders, PacketHeaders, PayloadSlice, TcpHeader, TransportHeader, UdpHeader};
use pcap::{Active, Capture, PacketHeader};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::error::{CollectorError, ErrorCounter, Result};
use crate::processor::{Protocol, TcpFlags};

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub description: String,
    pub is_up: bool,
}

/// Transport layer as seen by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { src_port: u16, dst_port: u16, flags: TcpFlags },
    Udp { src_port: u16, dst_port: u16 },
    Icmp,
    Other(u8),
}

impl Transport {
    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            Transport::Tcp { .. } => Some(Protocol::Tcp),
            Transport::Udp { .. } => Some(Protocol::Udp),
            Transport::Icmp => Some(Protocol::Icmp),
            Transport::Other(_) => None,
        }
    }

    pub fn ports(&self) -> (u16, u16) {
        match *self {
            Transport::Tcp { src_port, dst_port, .. } | Transport::Udp { src_port, dst_port } => {
                (src_port, dst_port)
            }
            _ => (0, 0),
        }
    }

    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match *self {
            Transport::Tcp { flags, .. } => Some(flags),
            _ => None,
        }
    }

    fn from_tcp(tcp: &TcpHeader) -> Self {
        let bits = (tcp.urg as u8) << 5
            | (tcp.ack as u8) << 4
            | (tcp.psh as u8) << 3
            | (tcp.rst as u8) << 2
            | (tcp.syn as u8) << 1
            | (tcp.fin as u8);
        Transport::Tcp {
            src_port: tcp.source_port,
            dst_port: tcp.destination_port,
            flags: TcpFlags::from_bits(bits),
        }
    }

    /// Decodes the transport header at the start of an IP payload. etherparse
    /// leaves first fragments undecoded even though they carry the header.
    /// A TCP or UDP header that does not fit yields `None`.
    fn from_ip_payload(ip_number: u8, payload: &[u8]) -> Option<Self> {
        match Protocol::from_ip_number(ip_number) {
            Some(Protocol::Tcp) => TcpHeader::from_slice(payload).ok().map(|(tcp, _)| Transport::from_tcp(&tcp)),
            Some(Protocol::Udp) => UdpHeader::from_slice(payload).ok().map(|(udp, _)| Transport::Udp {
                src_port: udp.source_port,
                dst_port: udp.destination_port,
            }),
            Some(Protocol::Icmp) => Some(Transport::Icmp),
            None => Some(Transport::Other(ip_number)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetHeader {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub more_fragments: bool,
    pub fragment_offset: u16,
    pub transport: Transport,
}

impl NetHeader {
    pub fn is_fragmented(&self) -> bool {
        self.more_fragments || self.fragment_offset != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub timestamp: u64,
    pub packet_len: u32,
    pub net: Option<NetHeader>,
}

pub struct PacketSniffer {
    sniffer_running: Arc<AtomicBool>,
    sniffer_thread: Option<JoinHandle<()>>,
    capture: Option<Capture<Active>>, // owned until start, then moved into thread
    packet_sender: Sender<ParsedPacket>,
    errors: Arc<ErrorCounter>,
}

impl PacketSniffer {
    pub fn new_with_sender(sender: Sender<ParsedPacket>, errors: Arc<ErrorCounter>) -> Self {
        Self {
            sniffer_running: Arc::new(AtomicBool::new(false)),
            sniffer_thread: None,
            capture: None,
            packet_sender: sender,
            errors,
        }
    }

    pub fn list_interfaces() -> Result<Vec<NetworkInterface>> {
        let devices = pcap::Device::list()?;
        Ok(devices
            .into_iter()
            .map(|d| NetworkInterface {
                description: d.desc.unwrap_or_else(|| "No description".to_string()),
                is_up: d.flags.is_up(),
                name: d.name,
            })
            .collect())
    }

    /// Opens `interface`, or the default device when none is given.
    pub fn init_sniffer(&mut self, interface: Option<&str>, filter: &str) -> Result<()> {
        let device = match interface {
            Some(name) => pcap::Device::list()?
                .into_iter()
                .find(|d| d.name == name)
                .ok_or_else(|| CollectorError::InterfaceNotFound(name.to_string()))?,
            None => pcap::Device::lookup()?
                .ok_or_else(|| CollectorError::InterfaceNotFound("<default>".to_string()))?,
        };
        let name = device.name.clone();

        let mut cap = Capture::from_device(device)?
            .promisc(true)
            .immediate_mode(true)
            .timeout(10)
            .open()?;

        if !filter.is_empty() {
            cap.filter(filter, true)?;
        }
        info!(interface = %name, filter, "Capture opened");

        self.capture = Some(cap);
        Ok(())
    }

    pub fn start_sniffer(&mut self) -> Result<()> {
        let cap = self.capture.take().ok_or(CollectorError::CaptureNotInitialized)?;

        if self.sniffer_running.swap(true, Ordering::Relaxed) {
            return Err(CollectorError::AlreadyRunning("sniffer"));
        }

        let mut cap = cap.setnonblock()?;

        let running = self.sniffer_running.clone();
        let sender = self.packet_sender.clone();
        let errors = self.errors.clone();

        self.sniffer_thread = Some(thread::spawn(move || {
            debug!("Sniffer thread started");
            while running.load(Ordering::Relaxed) {
                match cap.next_packet() {
                    Ok(packet) => {
                        if !PacketSniffer::packet_handler(packet.header, packet.data, &sender, &errors) {
                            break;
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => {
                        thread::sleep(std::time::Duration::from_millis(1));
                    }
                    Err(e) => {
                        error!("Error capturing packet: {e}");
                        break;
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
            debug!("Sniffer thread exiting");
            // cap and sender drop here, which closes the packet channel
        }));

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sniffer_running.load(Ordering::Relaxed)
    }

    pub fn stop_sniffer(&mut self) -> Result<()> {
        self.sniffer_running.store(false, Ordering::Relaxed);

        if let Some(handle) = self.sniffer_thread.take() {
            let _ = handle.join();
        }

        // If start succeeded, capture is already moved. If not, drop it now.
        self.capture = None;
        info!("Sniffer stopped");
        Ok(())
    }

    /// Returns false once the engine side of the channel is gone.
    fn packet_handler(
        header: &PacketHeader,
        packet_data: &[u8],
        sender: &Sender<ParsedPacket>,
        errors: &ErrorCounter,
    ) -> bool {
        let timestamp = (header.ts.tv_sec as u64 * 1_000_000) + header.ts.tv_usec as u64;
        match parse_frame(timestamp, header.len, packet_data) {
            Ok(parsed_packet) => sender.send(parsed_packet).is_ok(),
            Err(e) => {
                errors.record("Error parsing packet", e);
                true
            }
        }
    }
}

/// Decodes an Ethernet frame into the collector's packet view. Non-initial
/// fragments carry no transport header and come back without a network
/// header, like any other packet the collector cannot key.
pub fn parse_frame(timestamp: u64, packet_len: u32, data: &[u8]) -> std::result::Result<ParsedPacket, String> {
    let parsed = PacketHeaders::from_ethernet_slice(data)
        .map_err(|e| format!("Failed to parse packet: {e}"))?;

    let (src_ip, dst_ip, more_fragments, fragment_offset, ip_number) = match &parsed.net {
        Some(NetHeaders::Ipv4(ipv4, _)) => (
            IpAddr::V4(Ipv4Addr::from(ipv4.source)),
            IpAddr::V4(Ipv4Addr::from(ipv4.destination)),
            ipv4.more_fragments,
            ipv4.fragment_offset.value(),
            ipv4.protocol.0,
        ),
        Some(NetHeaders::Ipv6(ipv6, exts)) => {
            let (more_fragments, fragment_offset) = exts
                .fragment
                .as_ref()
                .map(|f| (f.more_fragments, f.fragment_offset.value()))
                .unwrap_or((false, 0));
            (
                IpAddr::V6(Ipv6Addr::from(ipv6.source)),
                IpAddr::V6(Ipv6Addr::from(ipv6.destination)),
                more_fragments,
                fragment_offset,
                ipv6.next_header.0,
            )
        }
        _ => return Ok(ParsedPacket { timestamp, packet_len, net: None }),
    };

    let net = transport_of(&parsed, ip_number, fragment_offset).map(|transport| NetHeader {
        src_ip,
        dst_ip,
        more_fragments,
        fragment_offset,
        transport,
    });

    Ok(ParsedPacket { timestamp, packet_len, net })
}

fn transport_of(parsed: &PacketHeaders, ip_number: u8, fragment_offset: u16) -> Option<Transport> {
    match &parsed.transport {
        Some(TransportHeader::Tcp(tcp)) => return Some(Transport::from_tcp(tcp)),
        Some(TransportHeader::Udp(udp)) => {
            return Some(Transport::Udp {
                src_port: udp.source_port,
                dst_port: udp.destination_port,
            })
        }
        Some(TransportHeader::Icmpv4(_)) | Some(TransportHeader::Icmpv6(_)) => return Some(Transport::Icmp),
        None => {}
    }

    match &parsed.payload {
        // Later fragments start mid-payload
        PayloadSlice::Ip(_) if fragment_offset != 0 => None,
        PayloadSlice::Ip(ip) => Transport::from_ip_payload(ip.ip_number.0, ip.payload),
        _ => Transport::from_ip_payload(ip_number, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::{IpFragOffset, IpHeaders, IpNumber, Ipv4Header, PacketBuilder};

    fn tcp_frame(syn: bool, fin: bool, payload: &[u8]) -> Vec<u8> {
        let mut builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 100], [10, 0, 0, 1], 64)
            .tcp(54321, 80, 1000, 64240);
        if syn {
            builder = builder.syn();
        }
        if fin {
            builder = builder.fin();
        }
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn test_parse_tcp_frame() {
        let frame = tcp_frame(true, false, b"hello");
        let pkt = parse_frame(42, frame.len() as u32, &frame).unwrap();
        let net = pkt.net.unwrap();

        assert_eq!(pkt.timestamp, 42);
        assert_eq!(net.src_ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(net.dst_ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!net.is_fragmented());
        assert_eq!(net.transport.ports(), (54321, 80));
        assert_eq!(net.transport.tcp_flags(), Some(TcpFlags::SYN));
    }

    #[test]
    fn test_parse_udp_frame() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 100], [8, 8, 8, 8], 64)
            .udp(40000, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, b"query").unwrap();

        let pkt = parse_frame(1, frame.len() as u32, &frame).unwrap();
        let net = pkt.net.unwrap();
        assert_eq!(net.transport.protocol(), Some(Protocol::Udp));
        assert_eq!(net.transport.ports(), (40000, 53));
        assert_eq!(net.transport.tcp_flags(), None);
    }

    #[test]
    fn test_non_ip_frame_has_no_net_header() {
        // Ethernet header carrying an LLDP ethertype
        let mut frame = vec![0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e];
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        frame.extend_from_slice(&[0x88, 0xcc]);
        frame.extend_from_slice(&[0u8; 32]);

        let pkt = parse_frame(1, frame.len() as u32, &frame).unwrap();
        assert!(pkt.net.is_none());
    }

    fn fragment_frame(fragment_offset: u16) -> Vec<u8> {
        let mut ipv4 = Ipv4Header::new(0, 64, IpNumber::TCP, [192, 168, 1, 100], [10, 0, 0, 1]).unwrap();
        ipv4.more_fragments = true;
        ipv4.fragment_offset = IpFragOffset::try_new(fragment_offset).unwrap();
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ip(IpHeaders::Ipv4(ipv4, Default::default()))
            .tcp(54321, 80, 1000, 64240)
            .syn();
        let mut out = Vec::with_capacity(builder.size(0));
        builder.write(&mut out, &[]).unwrap();
        out
    }

    #[test]
    fn test_first_fragment_keeps_transport_header() {
        let frame = fragment_frame(0);
        let pkt = parse_frame(7, frame.len() as u32, &frame).unwrap();
        let net = pkt.net.unwrap();

        assert!(net.is_fragmented());
        assert_eq!(net.transport.protocol(), Some(Protocol::Tcp));
        assert_eq!(net.transport.ports(), (54321, 80));
        assert_eq!(net.transport.tcp_flags(), Some(TcpFlags::SYN));
    }

    #[test]
    fn test_later_fragment_is_dropped() {
        let frame = fragment_frame(185);
        let pkt = parse_frame(7, frame.len() as u32, &frame).unwrap();
        assert!(pkt.net.is_none());
    }

    #[test]
    fn test_ip_payload_transport() {
        assert_eq!(Transport::from_ip_payload(6, &[0u8; 8]), None);
        assert_eq!(
            Transport::from_ip_payload(17, &[0x9c, 0x40, 0x00, 0x35, 0, 8, 0, 0]),
            Some(Transport::Udp { src_port: 40000, dst_port: 53 })
        );
        assert_eq!(Transport::from_ip_payload(1, &[]), Some(Transport::Icmp));
        assert_eq!(Transport::from_ip_payload(47, &[]), Some(Transport::Other(47)));
    }
}
