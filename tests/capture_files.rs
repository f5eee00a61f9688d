use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, UNIX_EPOCH};

use packet_tally::analysis::{
    analyze_file, CaptureSession, ClassifyingSink, ProtocolCategory, StopReason,
};
use packet_tally::capture::{
    CaptureError, LinkKind, NetworkLayer, OfflineCapture, PacketRecord, ReplaySource, StopSignal,
    TransportLayer,
};
use packet_tally::config::CaptureConfig;
use packet_tally::persistence::{load_stats, save_packets, save_stats};

fn ipv4(src: [u8; 4], dst: [u8; 4]) -> Option<NetworkLayer> {
    Some(NetworkLayer::Ipv4 {
        src: Ipv4Addr::from(src),
        dst: Ipv4Addr::from(dst),
    })
}

fn sample_records() -> Vec<PacketRecord> {
    let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    vec![
        PacketRecord::new(
            ipv4([192, 168, 1, 1], [192, 168, 1, 2]),
            vec![TransportLayer::Tcp { src_port: 12345, dst_port: 80 }],
        )
        .at(base),
        PacketRecord::new(
            ipv4([192, 168, 1, 1], [8, 8, 8, 8]),
            vec![TransportLayer::Udp { src_port: 5353, dst_port: 53 }],
        )
        .at(base + Duration::from_micros(1_500)),
        PacketRecord::new(ipv4([10, 0, 0, 1], [10, 0, 0, 254]), vec![TransportLayer::Icmp])
            .at(base + Duration::from_millis(20)),
        PacketRecord::new(
            Some(NetworkLayer::Ipv6 {
                src: Ipv6Addr::LOCALHOST,
                dst: "2001:db8::1".parse().unwrap(),
            }),
            vec![TransportLayer::Tcp { src_port: 443, dst_port: 51000 }],
        )
        .at(base + Duration::from_secs(1)),
        PacketRecord::new(ipv4([10, 0, 0, 1], [10, 0, 0, 2]), Vec::new())
            .at(base + Duration::from_secs(2)),
        PacketRecord::new(None, Vec::new()).at(base + Duration::from_secs(3)),
    ]
}

fn assert_same_metadata(left: &[PacketRecord], right: &[PacketRecord]) {
    assert_eq!(left.len(), right.len());
    for (a, b) in left.iter().zip(right) {
        assert_eq!(a.network(), b.network());
        assert_eq!(a.transports(), b.transports());
        assert_eq!(a.ports(), b.ports());
        assert_eq!(a.timestamp(), b.timestamp());
    }
}

#[test]
fn test_saved_packets_read_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.pcap");
    let records = sample_records();

    save_packets(&records, &path).unwrap();
    let restored = OfflineCapture::read_all(&path).unwrap();
    assert_same_metadata(&records, &restored);

    // Decoded records keep their bytes, so a second generation is byte-identical.
    let second = dir.path().join("second.pcap");
    save_packets(&restored, &second).unwrap();
    assert_eq!(fs::read(&path).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_cooked_capture_is_saved_as_ethernet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cooked.pcap");

    let ethernet = PacketRecord::new(
        ipv4([10, 9, 8, 7], [10, 9, 8, 1]),
        vec![TransportLayer::Udp { src_port: 68, dst_port: 67 }],
    )
    .to_ethernet_frame();
    // Linux cooked header: outgoing, ARPHRD_ETHER, 6-byte address, IPv4
    let mut cooked = vec![0x00, 0x04, 0x00, 0x01, 0x00, 0x06];
    cooked.extend_from_slice(&[0x02, 0x42, 0x0a, 0x09, 0x08, 0x07, 0x00, 0x00]);
    cooked.extend_from_slice(&[0x08, 0x00]);
    cooked.extend_from_slice(&ethernet[14..]);

    let timestamp = UNIX_EPOCH + Duration::from_secs(1_700_000_100);
    let wire_len = cooked.len() as u32;
    let record = PacketRecord::decode(LinkKind::LinuxSll, timestamp, cooked, wire_len);
    assert!(record.has_udp());

    save_packets(std::slice::from_ref(&record), &path).unwrap();
    let restored = OfflineCapture::read_all(&path).unwrap();
    assert_eq!(restored.len(), 1);

    let read_back = &restored[0];
    assert_eq!(read_back.frame().map(|f| f.link), Some(LinkKind::Ethernet));
    assert_eq!(read_back.network(), record.network());
    assert_eq!(read_back.src_addr(), record.src_addr());
    assert_eq!(read_back.dst_addr(), record.dst_addr());
    assert_eq!(read_back.ports(), Some((68, 67)));
    assert_eq!(read_back.timestamp(), timestamp);
    assert_eq!(read_back.frame().map(|f| f.data.clone()), Some(ethernet));
}

#[test]
fn test_empty_capture_round_trip_and_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.pcap");

    save_packets(&[], &path).unwrap();
    assert!(OfflineCapture::read_all(&path).unwrap().is_empty());

    let tally = analyze_file(&path).unwrap();
    let report = tally.report_with_total();
    assert_eq!((report.tcp, report.udp, report.icmp, report.other), (0, 0, 0, 0));
    assert_eq!(report.total, Some(0));
}

#[test]
fn test_offline_analysis_counts_every_packet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.pcap");
    save_packets(&sample_records(), &path).unwrap();

    let tally = analyze_file(&path).unwrap();
    assert_eq!(tally.count(ProtocolCategory::Tcp), 2);
    assert_eq!(tally.count(ProtocolCategory::Udp), 1);
    assert_eq!(tally.count(ProtocolCategory::Icmp), 1);
    assert_eq!(tally.count(ProtocolCategory::Other), 2);
    assert_eq!(tally.report_with_total().total, Some(6));
}

#[test]
fn test_garbage_file_is_read_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-capture.pcap");
    fs::write(&path, b"this is definitely not a pcap file").unwrap();

    match analyze_file(&path) {
        Err(CaptureError::FileReadFailure { .. }) => {}
        other => panic!("expected FileReadFailure, got {:?}", other.map(|t| t.total())),
    }
}

#[test]
fn test_capture_run_persists_retained_packets() {
    let dir = tempfile::tempdir().unwrap();
    let packets_path = dir.path().join("run.pcap");
    let stats_path = dir.path().join("run.json");

    let mut source = ReplaySource::new(sample_records());
    let mut session = CaptureSession::new(CaptureConfig::default(), true, StopSignal::new());
    assert_eq!(session.run(&mut source).unwrap(), StopReason::Exhausted);

    let (tally, retained) = session.finalize();
    save_packets(retained, &packets_path).unwrap();
    save_stats(&tally.report(), &stats_path).unwrap();

    assert_eq!(analyze_file(&packets_path).unwrap(), tally);
    let stats = load_stats(&stats_path).unwrap();
    assert_eq!(stats, tally.report());
    assert_eq!(stats.total, None);
}

#[test]
fn test_one_packet_per_category() {
    let mut sink = ClassifyingSink::new();
    sink.ingest(PacketRecord::new(
        ipv4([1, 1, 1, 1], [2, 2, 2, 2]),
        vec![TransportLayer::Tcp { src_port: 1, dst_port: 2 }],
    ));
    sink.ingest(PacketRecord::new(
        ipv4([1, 1, 1, 1], [2, 2, 2, 2]),
        vec![TransportLayer::Udp { src_port: 1, dst_port: 2 }],
    ));
    sink.ingest(PacketRecord::new(ipv4([1, 1, 1, 1], [2, 2, 2, 2]), vec![TransportLayer::Icmp]));
    sink.ingest(PacketRecord::new(None, Vec::new()));

    let (tally, _) = sink.finalize();
    let report = tally.report();
    assert_eq!((report.tcp, report.udp, report.icmp, report.other), (1, 1, 1, 1));
}

#[test]
fn test_tally_matches_number_ingested() {
    let records = sample_records();
    let mut sink = ClassifyingSink::new();
    for (n, record) in records.iter().cycle().take(37).enumerate() {
        sink.ingest(record.clone());
        assert_eq!(sink.tally().total(), n as u64 + 1);
    }

    let tally = sink.tally();
    let summed: u64 = ProtocolCategory::ALL.iter().map(|&c| tally.count(c)).sum();
    assert_eq!(summed, 37);
}
