use std::net::IpAddr;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::analysis::{ProtocolCategory, Tally};
use crate::capture::PacketRecord;

/// Format bytes in human-readable format (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Local wall-clock time, second precision.
pub fn format_timestamp(timestamp: SystemTime) -> String {
    let local: DateTime<Local> = timestamp.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Address with optional port; IPv6 gets brackets when a port follows.
pub fn format_endpoint(addr: Option<IpAddr>, port: Option<u16>) -> String {
    match (addr, port) {
        (Some(IpAddr::V6(v6)), Some(port)) => format!("[{}]:{}", v6, port),
        (Some(addr), Some(port)) => format!("{}:{}", addr, port),
        (Some(addr), None) => addr.to_string(),
        (None, _) => "?".to_string(),
    }
}

/// One line per ingested packet, e.g. `[2024-01-01 12:00:00] TCP 10.0.0.1:443 -> 10.0.0.2:50000`.
pub fn format_packet_line(category: ProtocolCategory, record: &PacketRecord) -> String {
    let ports = record.ports();
    format!(
        "[{}] {} {} -> {}",
        format_timestamp(record.timestamp()),
        category,
        format_endpoint(record.src_addr(), ports.map(|(src, _)| src)),
        format_endpoint(record.dst_addr(), ports.map(|(_, dst)| dst)),
    )
}

pub fn format_summary(tally: &Tally) -> String {
    let mut lines = vec![format!("Total Packets: {}", tally.total())];
    for category in ProtocolCategory::ALL {
        let label = format!("{} Packets:", title_case(category));
        lines.push(format!(
            "{:<14} {} ({:.1}%)",
            label,
            tally.count(category),
            tally.percentage(category)
        ));
    }
    lines.join("\n")
}

fn title_case(category: ProtocolCategory) -> &'static str {
    match category {
        ProtocolCategory::Tcp => "TCP",
        ProtocolCategory::Udp => "UDP",
        ProtocolCategory::Icmp => "ICMP",
        ProtocolCategory::Other => "Other",
    }
}
