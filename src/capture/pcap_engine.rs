use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use pcap::{Active, Capture, Device, Offline};

use crate::capture::{CaptureError, LinkKind, PacketRecord, PacketSource, StopSignal};
use crate::config::CaptureConfig;
use crate::utils::formatting::format_bytes;

/// Interface name used when none is configured and libpcap offers no default.
const FALLBACK_INTERFACE: &str = "any";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub interface: String,
    pub packets_captured: u64,
    pub bytes_captured: u64,
    pub packets_dropped: u32,
    pub interface_dropped: u32,
}

pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, CaptureError> {
    let devices = Device::list().map_err(classify_pcap_error)?;
    Ok(devices
        .into_iter()
        .map(|d| InterfaceInfo {
            name: d.name,
            description: d.desc,
        })
        .collect())
}

/// Splits libpcap failures into missing privilege and everything else.
pub fn classify_pcap_error(err: pcap::Error) -> CaptureError {
    let permission = match &err {
        pcap::Error::IoError(kind) => *kind == std::io::ErrorKind::PermissionDenied,
        other => {
            let message = other.to_string().to_lowercase();
            message.contains("permission") || message.contains("not permitted")
        }
    };

    if permission {
        CaptureError::PermissionDenied(err.to_string())
    } else {
        CaptureError::CaptureFailure(err.to_string())
    }
}

fn header_timestamp(ts: &libc::timeval) -> SystemTime {
    let secs = ts.tv_sec.max(0) as u64;
    let micros = (ts.tv_usec.max(0) as u32).min(999_999);
    UNIX_EPOCH + Duration::new(secs, micros * 1_000)
}

/// Live capture on a network interface.
pub struct LiveCapture {
    capture: Capture<Active>,
    link: LinkKind,
    stop: StopSignal,
    stats: CaptureStats,
}

impl LiveCapture {
    pub fn open(config: &CaptureConfig, stop: StopSignal) -> Result<Self, CaptureError> {
        let interface = match &config.interface {
            Some(name) => {
                let available = list_interfaces()?;
                if name != FALLBACK_INTERFACE && !available.iter().any(|d| &d.name == name) {
                    let names: Vec<String> = available.into_iter().map(|d| d.name).collect();
                    return Err(CaptureError::CaptureFailure(format!(
                        "network interface '{}' not found. Available interfaces: {:?}",
                        name, names
                    )));
                }
                name.clone()
            }
            None => Device::lookup()
                .map_err(classify_pcap_error)?
                .map(|d| d.name)
                .unwrap_or_else(|| FALLBACK_INTERFACE.to_string()),
        };

        info!("Opening capture on interface: {}", interface);

        let mut capture = Capture::from_device(interface.as_str())
            .map_err(classify_pcap_error)?
            .promisc(config.promiscuous)
            .snaplen(config.snapshot_len())
            .timeout(config.read_timeout_ms())
            .open()
            .map_err(classify_pcap_error)?;

        if let Some(filter) = &config.filter {
            info!("Applying filter: {}", filter);
            capture.filter(filter, true).map_err(classify_pcap_error)?;
        }

        let link = LinkKind::from_datalink(capture.get_datalink().0);
        debug!("Datalink of {}: {:?}", interface, link);

        Ok(LiveCapture {
            capture,
            link,
            stop,
            stats: CaptureStats {
                interface,
                ..CaptureStats::default()
            },
        })
    }
}

impl PacketSource for LiveCapture {
    fn next_record(&mut self) -> Result<Option<PacketRecord>, CaptureError> {
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }

            match self.capture.next_packet() {
                Ok(packet) => {
                    self.stats.packets_captured += 1;
                    self.stats.bytes_captured += packet.data.len() as u64;

                    let timestamp = header_timestamp(&packet.header.ts);
                    let data = packet.data.to_vec();
                    let wire_len = packet.header.len;
                    return Ok(Some(PacketRecord::decode(self.link, timestamp, data, wire_len)));
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => return Ok(None),
                Err(e) => return Err(classify_pcap_error(e)),
            }
        }
    }

    fn finish(&mut self) {
        match self.capture.stats() {
            Ok(stat) => {
                self.stats.packets_dropped = stat.dropped;
                self.stats.interface_dropped = stat.if_dropped;
                info!(
                    "Capture on {}: {} packets ({}), {} dropped by kernel, {} dropped by interface",
                    self.stats.interface,
                    self.stats.packets_captured,
                    format_bytes(self.stats.bytes_captured),
                    stat.dropped,
                    stat.if_dropped
                );
            }
            Err(e) => debug!("Capture statistics unavailable: {}", e),
        }
    }
}

/// Replay of a stored capture file.
pub struct OfflineCapture {
    capture: Capture<Offline>,
    link: LinkKind,
    path: String,
}

impl OfflineCapture {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let capture = Capture::from_file(path).map_err(|e| CaptureError::FileReadFailure {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        let link = LinkKind::from_datalink(capture.get_datalink().0);
        if let LinkKind::Other(datalink) = link {
            warn!("{} uses datalink {}; packets will be counted as other", display, datalink);
        }

        Ok(OfflineCapture {
            capture,
            link,
            path: display,
        })
    }

    /// Reads the whole file into memory, in file order.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<PacketRecord>, CaptureError> {
        let mut source = Self::open(path)?;
        let mut records = Vec::new();
        while let Some(record) = source.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

impl PacketSource for OfflineCapture {
    fn next_record(&mut self) -> Result<Option<PacketRecord>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let timestamp = header_timestamp(&packet.header.ts);
                Ok(Some(PacketRecord::decode(
                    self.link,
                    timestamp,
                    packet.data.to_vec(),
                    packet.header.len,
                )))
            }
            Err(pcap::Error::NoMorePackets) => Ok(None),
            Err(e) => Err(CaptureError::FileReadFailure {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
