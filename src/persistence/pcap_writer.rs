use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use pcap::{Capture, Linktype, Packet, PacketHeader};

use crate::capture::{LinkKind, PacketRecord};
use crate::persistence::{write_atomically, WriteError};

fn timeval(timestamp: SystemTime) -> libc::timeval {
    let since_epoch = timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();
    libc::timeval {
        tv_sec: since_epoch.as_secs() as libc::time_t,
        tv_usec: since_epoch.subsec_micros() as libc::suseconds_t,
    }
}

/// Writes records as a libpcap file with Ethernet link type.
///
/// An empty slice still produces a valid file holding only the global header.
pub fn save_packets(records: &[PacketRecord], path: impl AsRef<Path>) -> Result<(), WriteError> {
    let path = path.as_ref();

    write_atomically(path, |staging| {
        let dead = Capture::dead(Linktype::ETHERNET).map_err(|e| WriteError::encode(staging, e))?;
        let mut savefile = dead.savefile(staging).map_err(|e| WriteError::encode(staging, e))?;

        for record in records {
            let data = record.to_ethernet_frame();
            let wire_len = match record.frame() {
                Some(frame) if frame.link == LinkKind::Ethernet => {
                    frame.wire_len.max(data.len() as u32)
                }
                _ => data.len() as u32,
            };
            let header = PacketHeader {
                ts: timeval(record.timestamp()),
                caplen: data.len() as u32,
                len: wire_len,
            };
            savefile.write(&Packet::new(&header, &data));
        }

        savefile.flush().map_err(|e| WriteError::encode(staging, e))
    })?;

    info!("{} packets saved to: {}", records.len(), path.display());
    Ok(())
}
