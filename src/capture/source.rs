use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{CaptureError, PacketRecord};

/// Anything that can feed packet records into a session, one at a time.
pub trait PacketSource {
    /// Returns the next record, `Ok(None)` once the source is exhausted or stopped.
    fn next_record(&mut self) -> Result<Option<PacketRecord>, CaptureError>;

    /// Called once after the last record was taken.
    fn finish(&mut self) {}
}

/// Shared flag tripped from outside the pipeline (Ctrl-C handler, tests) to end a run.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// In-memory source replaying a fixed list of records.
pub struct ReplaySource {
    records: VecDeque<PacketRecord>,
}

impl ReplaySource {
    pub fn new(records: Vec<PacketRecord>) -> Self {
        ReplaySource {
            records: records.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl PacketSource for ReplaySource {
    fn next_record(&mut self) -> Result<Option<PacketRecord>, CaptureError> {
        Ok(self.records.pop_front())
    }
}
