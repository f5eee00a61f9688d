use log::{info, log_enabled, warn, Level};

use crate::analysis::{classify, Tally};
use crate::capture::PacketRecord;
use crate::utils::formatting::format_packet_line;

/// Log target of the per-packet lines, so they can be filtered on their own.
pub const PACKET_LOG_TARGET: &str = "packet_tally::packets";

struct Retention {
    records: Vec<PacketRecord>,
    limit: Option<usize>,
    dropped: u64,
}

/// Classifies and counts every record pushed into it.
///
/// When retention is enabled the records are also kept, in arrival order, for
/// one bulk write at the end of the run. Without a limit the buffer grows with
/// the capture.
pub struct ClassifyingSink {
    tally: Tally,
    retention: Option<Retention>,
}

impl ClassifyingSink {
    pub fn new() -> Self {
        ClassifyingSink {
            tally: Tally::new(),
            retention: None,
        }
    }

    pub fn with_retention(limit: Option<usize>) -> Self {
        ClassifyingSink {
            tally: Tally::new(),
            retention: Some(Retention {
                records: Vec::new(),
                limit,
                dropped: 0,
            }),
        }
    }

    pub fn ingest(&mut self, record: PacketRecord) {
        let category = classify(&record);
        self.tally.record(category);

        if log_enabled!(target: PACKET_LOG_TARGET, Level::Info) {
            info!(target: PACKET_LOG_TARGET, "{}", format_packet_line(category, &record));
        }

        if let Some(retention) = self.retention.as_mut() {
            match retention.limit {
                Some(limit) if retention.records.len() >= limit => {
                    if retention.dropped == 0 {
                        warn!(
                            "Retention limit of {} packets reached; \
                             further packets are counted but not saved",
                            limit
                        );
                    }
                    retention.dropped += 1;
                }
                _ => retention.records.push(record),
            }
        }
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn is_retaining(&self) -> bool {
        self.retention.is_some()
    }

    /// Packets counted but not kept because the retention limit was hit.
    pub fn retention_dropped(&self) -> u64 {
        self.retention.as_ref().map_or(0, |r| r.dropped)
    }

    /// Final counters plus the retained records (empty when retention is off).
    /// Repeated calls return the same view.
    pub fn finalize(&self) -> (Tally, &[PacketRecord]) {
        let retained = self.retention.as_ref().map_or(&[][..], |r| r.records.as_slice());
        (self.tally, retained)
    }

    pub fn into_parts(self) -> (Tally, Vec<PacketRecord>) {
        let retained = self.retention.map(|r| r.records).unwrap_or_default();
        (self.tally, retained)
    }
}

impl Default for ClassifyingSink {
    fn default() -> Self {
        Self::new()
    }
}
