use std::fmt;

use crate::capture::PacketRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolCategory {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl ProtocolCategory {
    pub const ALL: [ProtocolCategory; 4] = [
        ProtocolCategory::Tcp,
        ProtocolCategory::Udp,
        ProtocolCategory::Icmp,
        ProtocolCategory::Other,
    ];
}

impl fmt::Display for ProtocolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolCategory::Tcp => write!(f, "TCP"),
            ProtocolCategory::Udp => write!(f, "UDP"),
            ProtocolCategory::Icmp => write!(f, "ICMP"),
            ProtocolCategory::Other => write!(f, "OTHER"),
        }
    }
}

/// Assigns exactly one category to a record.
///
/// Checks run in a fixed order and the first match wins: a record without a
/// network layer is `Other`, then TCP beats UDP beats ICMP. A record tagged
/// with several transports (malformed or synthetic input) therefore always
/// lands in the same bucket.
pub fn classify(record: &PacketRecord) -> ProtocolCategory {
    if !record.has_network_layer() {
        ProtocolCategory::Other
    } else if record.has_tcp() {
        ProtocolCategory::Tcp
    } else if record.has_udp() {
        ProtocolCategory::Udp
    } else if record.has_icmp() {
        ProtocolCategory::Icmp
    } else {
        ProtocolCategory::Other
    }
}
