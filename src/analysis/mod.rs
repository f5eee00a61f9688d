pub mod classifier;
pub mod session;
pub mod sink;
pub mod statistics;

pub use classifier::{classify, ProtocolCategory};
pub use session::{analyze_file, CaptureSession, StopReason};
pub use sink::{ClassifyingSink, PACKET_LOG_TARGET};
pub use statistics::{StatsReport, Tally};
