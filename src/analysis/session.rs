use std::fmt;
use std::path::Path;

use log::{debug, info};

use crate::analysis::{ClassifyingSink, Tally};
use crate::capture::{
    CaptureError, LiveCapture, OfflineCapture, PacketRecord, PacketSource, StopSignal,
};
use crate::config::CaptureConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CountReached,
    Interrupted,
    Exhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::CountReached => write!(f, "packet count reached"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::Exhausted => write!(f, "end of input"),
        }
    }
}

/// One capture or analysis run: pulls records from a source into a sink
/// until the count bound, an interrupt, or the end of the source.
///
/// Records are handled strictly one at a time on the calling thread.
pub struct CaptureSession {
    config: CaptureConfig,
    sink: ClassifyingSink,
    stop: StopSignal,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig, retain_packets: bool, stop: StopSignal) -> Self {
        let sink = if retain_packets {
            ClassifyingSink::with_retention(config.max_retained)
        } else {
            ClassifyingSink::new()
        };
        CaptureSession { config, sink, stop }
    }

    /// Opens the configured interface and runs until stopped.
    ///
    /// Fails before anything is ingested when the interface cannot be opened.
    pub fn run_live(&mut self) -> Result<StopReason, CaptureError> {
        let mut capture = LiveCapture::open(&self.config, self.stop.clone())?;
        self.run(&mut capture)
    }

    pub fn run<S: PacketSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<StopReason, CaptureError> {
        let limit = self.config.packet_limit();
        match limit {
            Some(n) => info!("Starting packet capture ({} packets)", n),
            None => info!("Starting packet capture"),
        }

        let reason = loop {
            if limit.is_some_and(|n| self.sink.tally().total() >= n) {
                break StopReason::CountReached;
            }
            if self.stop.is_stopped() {
                break StopReason::Interrupted;
            }

            match source.next_record() {
                Ok(Some(record)) => self.sink.ingest(record),
                Ok(None) if self.stop.is_stopped() => break StopReason::Interrupted,
                Ok(None) => break StopReason::Exhausted,
                Err(e) => {
                    source.finish();
                    return Err(e);
                }
            }
        };
        source.finish();

        info!("Capture stopped ({}) after {} packets", reason, self.sink.tally().total());
        if self.sink.retention_dropped() > 0 {
            debug!("{} packets were not retained for saving", self.sink.retention_dropped());
        }
        Ok(reason)
    }

    pub fn sink(&self) -> &ClassifyingSink {
        &self.sink
    }

    pub fn finalize(&self) -> (Tally, &[PacketRecord]) {
        self.sink.finalize()
    }
}

/// Counts every packet of a stored capture file.
pub fn analyze_file(path: impl AsRef<Path>) -> Result<Tally, CaptureError> {
    let path = path.as_ref();
    info!("Analyzing {}", path.display());

    let mut source = OfflineCapture::open(path)?;
    let mut session = CaptureSession::new(CaptureConfig::default(), false, StopSignal::new());
    session.run(&mut source)?;
    Ok(session.sink().tally())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ProtocolCategory;
    use crate::capture::{NetworkLayer, ReplaySource, TransportLayer};
    use std::net::Ipv4Addr;

    fn tcp_record(port: u16) -> PacketRecord {
        PacketRecord::new(
            Some(NetworkLayer::Ipv4 {
                src: Ipv4Addr::new(10, 0, 0, 1),
                dst: Ipv4Addr::new(10, 0, 0, 2),
            }),
            vec![TransportLayer::Tcp { src_port: port, dst_port: 443 }],
        )
    }

    fn bounded(count: u64) -> CaptureConfig {
        CaptureConfig {
            count: Some(count),
            ..CaptureConfig::default()
        }
    }

    /// Yields `budget` records, then behaves like a live capture hit by Ctrl-C.
    struct InterruptAfter {
        inner: ReplaySource,
        budget: usize,
        stop: StopSignal,
    }

    impl PacketSource for InterruptAfter {
        fn next_record(&mut self) -> Result<Option<PacketRecord>, CaptureError> {
            if self.budget == 0 {
                self.stop.stop();
                return Ok(None);
            }
            self.budget -= 1;
            self.inner.next_record()
        }
    }

    struct Denied;

    impl PacketSource for Denied {
        fn next_record(&mut self) -> Result<Option<PacketRecord>, CaptureError> {
            Err(CaptureError::PermissionDenied("Operation not permitted".to_string()))
        }
    }

    #[test]
    fn test_count_bound_stops_run() {
        let records = (0..10).map(tcp_record).collect();
        let mut source = ReplaySource::new(records);
        let mut session = CaptureSession::new(bounded(4), false, StopSignal::new());

        assert_eq!(session.run(&mut source).unwrap(), StopReason::CountReached);
        assert_eq!(session.finalize().0.count(ProtocolCategory::Tcp), 4);
        assert_eq!(source.remaining(), 6);
    }

    #[test]
    fn test_exhausted_source() {
        let mut source = ReplaySource::new(Vec::new());
        let mut session = CaptureSession::new(CaptureConfig::default(), true, StopSignal::new());

        assert_eq!(session.run(&mut source).unwrap(), StopReason::Exhausted);
        let (tally, retained) = session.finalize();
        assert_eq!(tally, Tally::new());
        assert!(retained.is_empty());
    }

    #[test]
    fn test_interrupt_keeps_partial_results() {
        let stop = StopSignal::new();
        let mut source = InterruptAfter {
            inner: ReplaySource::new((0..100).map(tcp_record).collect()),
            budget: 40,
            stop: stop.clone(),
        };
        let mut session = CaptureSession::new(bounded(100), true, stop);

        assert_eq!(session.run(&mut source).unwrap(), StopReason::Interrupted);
        let (tally, retained) = session.finalize();
        assert_eq!(tally.total(), 40);
        assert_eq!(tally.count(ProtocolCategory::Tcp), 40);
        assert_eq!(retained.len(), 40);
    }

    #[test]
    fn test_stop_before_start_ingests_nothing() {
        let stop = StopSignal::new();
        stop.stop();
        let mut source = ReplaySource::new(vec![tcp_record(1)]);
        let mut session = CaptureSession::new(CaptureConfig::default(), false, stop);

        assert_eq!(session.run(&mut source).unwrap(), StopReason::Interrupted);
        assert_eq!(session.finalize().0.total(), 0);
    }

    #[test]
    fn test_permission_denied_leaves_tally_empty() {
        let mut session = CaptureSession::new(bounded(10), false, StopSignal::new());
        let err = session.run(&mut Denied).unwrap_err();

        assert!(err.is_permission_denied());
        assert_eq!(session.finalize().0, Tally::new());
    }
}
