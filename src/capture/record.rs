use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::SystemTime;

use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::icmp::{self, IcmpPacket, IcmpTypes, MutableIcmpPacket};
use pnet::packet::icmpv6::{self, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet::packet::sll::SLLPacket;
use pnet::packet::tcp::{self, MutableTcpPacket, TcpPacket};
use pnet::packet::udp::{self, MutableUdpPacket, UdpPacket};
use pnet::packet::vlan::VlanPacket;
use pnet::packet::Packet;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const SLL_HEADER_LEN: usize = 16;
const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_HEADER_LEN: usize = 8;

/// IEEE local experimental ethertype, used to frame bytes that carry no IP layer.
const EXPERIMENTAL_ETHERTYPE: EtherType = EtherType(0x88b5);

/// Link-layer framing of a captured frame, derived from the capture's datalink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    RawIp,
    LinuxSll,
    Other(i32),
}

impl LinkKind {
    /// Maps a pcap datalink value. libpcap reports `LINKTYPE_RAW` as `DLT_RAW`,
    /// which is 12 or 14 depending on platform.
    pub fn from_datalink(datalink: i32) -> Self {
        match datalink {
            1 => LinkKind::Ethernet,
            12 | 14 | 101 | 228 | 229 => LinkKind::RawIp,
            113 => LinkKind::LinuxSll,
            other => LinkKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkLayer {
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    Ipv6 { src: Ipv6Addr, dst: Ipv6Addr },
}

impl NetworkLayer {
    pub fn src(&self) -> IpAddr {
        match *self {
            NetworkLayer::Ipv4 { src, .. } => IpAddr::V4(src),
            NetworkLayer::Ipv6 { src, .. } => IpAddr::V6(src),
        }
    }

    pub fn dst(&self) -> IpAddr {
        match *self {
            NetworkLayer::Ipv4 { dst, .. } => IpAddr::V4(dst),
            NetworkLayer::Ipv6 { dst, .. } => IpAddr::V6(dst),
        }
    }

    fn ethertype(&self) -> EtherType {
        match self {
            NetworkLayer::Ipv4 { .. } => EtherTypes::Ipv4,
            NetworkLayer::Ipv6 { .. } => EtherTypes::Ipv6,
        }
    }
}

/// A transport-layer header found in a packet. ICMP covers both ICMPv4 and ICMPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
    Icmp,
}

impl TransportLayer {
    pub fn ports(&self) -> Option<(u16, u16)> {
        match *self {
            TransportLayer::Tcp { src_port, dst_port }
            | TransportLayer::Udp { src_port, dst_port } => {
                Some((src_port, dst_port))
            }
            TransportLayer::Icmp => None,
        }
    }

    fn header_len(&self) -> usize {
        match self {
            TransportLayer::Tcp { .. } => TCP_HEADER_LEN,
            TransportLayer::Udp { .. } => UDP_HEADER_LEN,
            TransportLayer::Icmp => ICMP_HEADER_LEN,
        }
    }
}

/// Raw bytes of a captured frame as they came off the wire or out of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub link: LinkKind,
    pub data: Vec<u8>,
    /// Length on the wire; larger than `data.len()` when the snaplen truncated it.
    pub wire_len: u32,
    network_offset: Option<usize>,
}

/// One captured or replayed packet with its decoded layer metadata.
///
/// Records built from captured bytes keep those bytes in `frame`; synthetic
/// records built with [`PacketRecord::new`] carry metadata only.
#[derive(Debug, Clone)]
pub struct PacketRecord {
    timestamp: SystemTime,
    network: Option<NetworkLayer>,
    transports: Vec<TransportLayer>,
    frame: Option<Frame>,
}

impl PacketRecord {
    pub fn new(network: Option<NetworkLayer>, transports: Vec<TransportLayer>) -> Self {
        PacketRecord {
            timestamp: SystemTime::now(),
            network,
            transports,
            frame: None,
        }
    }

    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Decodes a frame. Never fails: whatever cannot be parsed is simply absent.
    pub fn decode(link: LinkKind, timestamp: SystemTime, data: Vec<u8>, wire_len: u32) -> Self {
        let located = locate_network(link, &data).filter(|&(_, offset)| offset <= data.len());
        let (network, transports) = match located {
            Some((ethertype, offset)) => decode_network(ethertype, &data[offset..]),
            None => (None, Vec::new()),
        };
        let network_offset = if network.is_some() {
            located.map(|(_, offset)| offset)
        } else {
            None
        };

        PacketRecord {
            timestamp,
            network,
            transports,
            frame: Some(Frame {
                link,
                data,
                wire_len,
                network_offset,
            }),
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn network(&self) -> Option<&NetworkLayer> {
        self.network.as_ref()
    }

    pub fn transports(&self) -> &[TransportLayer] {
        &self.transports
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn has_network_layer(&self) -> bool {
        self.network.is_some()
    }

    pub fn has_tcp(&self) -> bool {
        self.transports.iter().any(|t| matches!(t, TransportLayer::Tcp { .. }))
    }

    pub fn has_udp(&self) -> bool {
        self.transports.iter().any(|t| matches!(t, TransportLayer::Udp { .. }))
    }

    pub fn has_icmp(&self) -> bool {
        self.transports.iter().any(|t| matches!(t, TransportLayer::Icmp))
    }

    pub fn src_addr(&self) -> Option<IpAddr> {
        self.network.map(|n| n.src())
    }

    pub fn dst_addr(&self) -> Option<IpAddr> {
        self.network.map(|n| n.dst())
    }

    /// The transport that decides the record's category: TCP, then UDP, then ICMP.
    pub fn primary_transport(&self) -> Option<&TransportLayer> {
        self.transports.iter().min_by_key(|t| match t {
            TransportLayer::Tcp { .. } => 0,
            TransportLayer::Udp { .. } => 1,
            TransportLayer::Icmp => 2,
        })
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        self.primary_transport().and_then(TransportLayer::ports)
    }

    /// Serialises the record as an Ethernet frame for a capture file.
    ///
    /// Decoded records keep their bytes. A synthetic record is rebuilt from its
    /// metadata and carries only its primary transport; one without a network
    /// layer becomes an empty frame, so its transports are not written and it
    /// reads back as OTHER, the category it already had.
    pub fn to_ethernet_frame(&self) -> Vec<u8> {
        match &self.frame {
            Some(frame) if frame.link == LinkKind::Ethernet => frame.data.clone(),
            Some(frame) => match (self.network, frame.network_offset) {
                (Some(network), Some(offset)) => {
                    ethernet_wrap(network.ethertype(), &frame.data[offset..])
                }
                _ => ethernet_wrap(EXPERIMENTAL_ETHERTYPE, &frame.data),
            },
            None => match self.network {
                Some(network) => synthesize(&network, self.primary_transport()),
                None => ethernet_wrap(EXPERIMENTAL_ETHERTYPE, &[]),
            },
        }
    }
}

fn locate_network(link: LinkKind, data: &[u8]) -> Option<(EtherType, usize)> {
    match link {
        LinkKind::Ethernet => {
            let ethernet = EthernetPacket::new(data)?;
            match ethernet.get_ethertype() {
                EtherTypes::Vlan => {
                    let vlan = VlanPacket::new(ethernet.payload())?;
                    Some((vlan.get_ethertype(), ETHERNET_HEADER_LEN + VLAN_TAG_LEN))
                }
                ethertype => Some((ethertype, ETHERNET_HEADER_LEN)),
            }
        }
        LinkKind::RawIp => match data.first().map(|b| b >> 4) {
            Some(4) => Some((EtherTypes::Ipv4, 0)),
            Some(6) => Some((EtherTypes::Ipv6, 0)),
            _ => None,
        },
        LinkKind::LinuxSll => {
            if data.len() < SLL_HEADER_LEN {
                return None;
            }
            let sll = SLLPacket::new(data)?;
            Some((sll.get_protocol(), SLL_HEADER_LEN))
        }
        LinkKind::Other(_) => None,
    }
}

fn decode_network(
    ethertype: EtherType,
    data: &[u8],
) -> (Option<NetworkLayer>, Vec<TransportLayer>) {
    match ethertype {
        EtherTypes::Ipv4 => match Ipv4Packet::new(data) {
            Some(ip) => {
                let network = NetworkLayer::Ipv4 {
                    src: ip.get_source(),
                    dst: ip.get_destination(),
                };
                // Only the first fragment carries the transport header.
                let transports = if ip.get_fragment_offset() == 0 {
                    decode_transport(ip.get_next_level_protocol(), ip.payload())
                } else {
                    Vec::new()
                };
                (Some(network), transports)
            }
            None => (None, Vec::new()),
        },
        EtherTypes::Ipv6 => match Ipv6Packet::new(data) {
            Some(ip) => {
                let network = NetworkLayer::Ipv6 {
                    src: ip.get_source(),
                    dst: ip.get_destination(),
                };
                let transports = decode_transport(ip.get_next_header(), ip.payload());
                (Some(network), transports)
            }
            None => (None, Vec::new()),
        },
        _ => (None, Vec::new()),
    }
}

fn decode_transport(protocol: IpNextHeaderProtocol, payload: &[u8]) -> Vec<TransportLayer> {
    let layer = match protocol {
        IpNextHeaderProtocols::Tcp => TcpPacket::new(payload).map(|tcp| TransportLayer::Tcp {
            src_port: tcp.get_source(),
            dst_port: tcp.get_destination(),
        }),
        IpNextHeaderProtocols::Udp => UdpPacket::new(payload).map(|udp| TransportLayer::Udp {
            src_port: udp.get_source(),
            dst_port: udp.get_destination(),
        }),
        IpNextHeaderProtocols::Icmp => IcmpPacket::new(payload).map(|_| TransportLayer::Icmp),
        IpNextHeaderProtocols::Icmpv6 => Icmpv6Packet::new(payload).map(|_| TransportLayer::Icmp),
        _ => None,
    };
    layer.into_iter().collect()
}

fn ethernet_wrap(ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; ETHERNET_HEADER_LEN + payload.len()];
    if let Some(mut ethernet) = MutableEthernetPacket::new(&mut buf) {
        ethernet.set_ethertype(ethertype);
    }
    buf[ETHERNET_HEADER_LEN..].copy_from_slice(payload);
    buf
}

fn synthesize(network: &NetworkLayer, transport: Option<&TransportLayer>) -> Vec<u8> {
    let transport_len = transport.map(TransportLayer::header_len).unwrap_or(0);
    let ip_len = match network {
        NetworkLayer::Ipv4 { .. } => IPV4_HEADER_LEN,
        NetworkLayer::Ipv6 { .. } => IPV6_HEADER_LEN,
    };

    let mut packet = vec![0u8; ip_len + transport_len];
    let protocol = match transport {
        Some(layer) => {
            write_transport(&mut packet[ip_len..], layer, network);
            match (layer, network) {
                (TransportLayer::Tcp { .. }, _) => IpNextHeaderProtocols::Tcp,
                (TransportLayer::Udp { .. }, _) => IpNextHeaderProtocols::Udp,
                (TransportLayer::Icmp, NetworkLayer::Ipv4 { .. }) => IpNextHeaderProtocols::Icmp,
                (TransportLayer::Icmp, NetworkLayer::Ipv6 { .. }) => IpNextHeaderProtocols::Icmpv6,
            }
        }
        None => IpNextHeaderProtocols::Ipv6NoNxt,
    };

    match *network {
        NetworkLayer::Ipv4 { src, dst } => {
            if let Some(mut ip) = MutableIpv4Packet::new(&mut packet) {
                ip.set_version(4);
                ip.set_header_length(5);
                ip.set_total_length((ip_len + transport_len) as u16);
                ip.set_ttl(64);
                ip.set_next_level_protocol(protocol);
                ip.set_source(src);
                ip.set_destination(dst);
                let checksum = ipv4::checksum(&ip.to_immutable());
                ip.set_checksum(checksum);
            }
        }
        NetworkLayer::Ipv6 { src, dst } => {
            if let Some(mut ip) = MutableIpv6Packet::new(&mut packet) {
                ip.set_version(6);
                ip.set_payload_length(transport_len as u16);
                ip.set_next_header(protocol);
                ip.set_hop_limit(64);
                ip.set_source(src);
                ip.set_destination(dst);
            }
        }
    }

    ethernet_wrap(network.ethertype(), &packet)
}

fn write_transport(buf: &mut [u8], layer: &TransportLayer, network: &NetworkLayer) {
    match (*layer, *network) {
        (TransportLayer::Tcp { src_port, dst_port }, network) => {
            if let Some(mut segment) = MutableTcpPacket::new(buf) {
                segment.set_source(src_port);
                segment.set_destination(dst_port);
                segment.set_data_offset(5);
                segment.set_window(u16::MAX);
                let checksum = match network {
                    NetworkLayer::Ipv4 { src, dst } => {
                        tcp::ipv4_checksum(&segment.to_immutable(), &src, &dst)
                    }
                    NetworkLayer::Ipv6 { src, dst } => {
                        tcp::ipv6_checksum(&segment.to_immutable(), &src, &dst)
                    }
                };
                segment.set_checksum(checksum);
            }
        }
        (TransportLayer::Udp { src_port, dst_port }, network) => {
            if let Some(mut datagram) = MutableUdpPacket::new(buf) {
                datagram.set_source(src_port);
                datagram.set_destination(dst_port);
                datagram.set_length(UDP_HEADER_LEN as u16);
                let checksum = match network {
                    NetworkLayer::Ipv4 { src, dst } => {
                        udp::ipv4_checksum(&datagram.to_immutable(), &src, &dst)
                    }
                    NetworkLayer::Ipv6 { src, dst } => {
                        udp::ipv6_checksum(&datagram.to_immutable(), &src, &dst)
                    }
                };
                datagram.set_checksum(checksum);
            }
        }
        (TransportLayer::Icmp, NetworkLayer::Ipv4 { .. }) => {
            if let Some(mut echo) = MutableIcmpPacket::new(buf) {
                echo.set_icmp_type(IcmpTypes::EchoRequest);
                let checksum = icmp::checksum(&echo.to_immutable());
                echo.set_checksum(checksum);
            }
        }
        (TransportLayer::Icmp, NetworkLayer::Ipv6 { src, dst }) => {
            if let Some(mut echo) = MutableIcmpv6Packet::new(buf) {
                echo.set_icmpv6_type(Icmpv6Types::EchoRequest);
                let checksum = icmpv6::checksum(&echo.to_immutable(), &src, &dst);
                echo.set_checksum(checksum);
            }
        }
    }
}
