pub mod sniffer;

pub use sniffer::{parse_frame, NetHeader, NetworkInterface, PacketSniffer, ParsedPacket, Transport};
