use serde::{Deserialize, Serialize};

use crate::analysis::ProtocolCategory;

/// Per-category packet counters for one run.
///
/// Only ever incremented; the counters always sum to the number of records
/// recorded since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    tcp: u64,
    udp: u64,
    icmp: u64,
    other: u64,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: ProtocolCategory) {
        let counter = match category {
            ProtocolCategory::Tcp => &mut self.tcp,
            ProtocolCategory::Udp => &mut self.udp,
            ProtocolCategory::Icmp => &mut self.icmp,
            ProtocolCategory::Other => &mut self.other,
        };
        *counter += 1;
    }

    pub fn count(&self, category: ProtocolCategory) -> u64 {
        match category {
            ProtocolCategory::Tcp => self.tcp,
            ProtocolCategory::Udp => self.udp,
            ProtocolCategory::Icmp => self.icmp,
            ProtocolCategory::Other => self.other,
        }
    }

    pub fn total(&self) -> u64 {
        self.tcp + self.udp + self.icmp + self.other
    }

    pub fn percentage(&self, category: ProtocolCategory) -> f64 {
        let total = self.total();
        if total > 0 {
            (self.count(category) as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Statistics document for a live capture run.
    pub fn report(&self) -> StatsReport {
        StatsReport {
            tcp: self.tcp,
            udp: self.udp,
            icmp: self.icmp,
            other: self.other,
            total: None,
        }
    }

    /// Statistics document for an offline analysis, which also carries `total`.
    pub fn report_with_total(&self) -> StatsReport {
        StatsReport {
            total: Some(self.total()),
            ..self.report()
        }
    }
}

/// Flat, serialisable view of a tally. Field order is the on-disk key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub tcp: u64,
    pub udp: u64,
    pub icmp: u64,
    pub other: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}
