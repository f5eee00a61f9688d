pub mod pcap_engine;
pub mod record;
pub mod source;

use thiserror::Error;

pub use pcap_engine::{
    classify_pcap_error, list_interfaces, CaptureStats, InterfaceInfo, LiveCapture, OfflineCapture,
};
pub use record::{Frame, LinkKind, NetworkLayer, PacketRecord, TransportLayer};
pub use source::{PacketSource, ReplaySource, StopSignal};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(
        "Insufficient privileges for live capture ({0}). \
         Try: sudo, or setcap cap_net_raw,cap_net_admin=eip on the binary"
    )]
    PermissionDenied(String),

    #[error("Packet capture failed: {0}")]
    CaptureFailure(String),

    #[error("Cannot read capture file '{path}': {reason}")]
    FileReadFailure { path: String, reason: String },
}

impl CaptureError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied(_))
    }
}
