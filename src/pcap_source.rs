// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP replay sensor client for offline viewing and testing.
//!
//! [`PcapClient`] loads every UDP datagram of a PCAP/PCAPNG capture and
//! serves them through the [`SensorClient`] interface, classifying each one as
//! lidar or IMU data by its destination port. Sensor metadata is read from the
//! `.json` file next to the capture, as written by the Ouster tools.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarview::pcap_source::PcapClient;
//!
//! // Loads capture.pcap and capture.json
//! let client = PcapClient::open("capture.pcap")?.looping(true);
//! ```

use crate::{
    client::{SensorClient, check_packet_size},
    lidar::{ClientState, Error},
    ouster::{PacketFormat, parse_metadata},
};
use pcap_parser::traits::PcapReaderIterator;
use std::{
    path::Path,
    thread::sleep,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// UDP payload captured on one of the sensor ports.
#[derive(Clone, Debug)]
struct CapturedPacket {
    state: ClientState,
    /// Capture time in microseconds, whatever the file's precision
    timestamp: u64,
    payload: Vec<u8>,
}

/// Sensor client replaying a capture file.
pub struct PcapClient {
    packets: Vec<CapturedPacket>,
    metadata: String,
    /// Index of the packet returned by the last poll
    current: Option<usize>,
    next: usize,
    looping: bool,
    realtime: bool,
    started: Option<(Instant, u64)>,
}

impl PcapClient {
    /// Load `path` and the metadata stored beside it with a `.json`
    /// extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let metadata = std::fs::read_to_string(path.with_extension("json")).map_err(|err| {
            Error::Metadata(format!(
                "{}: {}",
                path.with_extension("json").display(),
                err
            ))
        })?;
        let data = std::fs::read(path)?;

        let client = Self::from_bytes(&data, metadata)?;
        info!(
            "loaded {} sensor packets from {}",
            client.len(),
            path.display()
        );
        Ok(client)
    }

    /// Load capture bytes with the given metadata document.
    pub fn from_bytes(data: &[u8], metadata: String) -> Result<Self, Error> {
        let config = parse_metadata(&metadata)?.config_params;
        let ports = Ports {
            lidar: config.udp_port_lidar,
            imu: config.udp_port_imu,
        };

        let mut packets = Vec::new();
        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            // PCAPNG format (Section Header Block magic)
            extract_pcapng(data, ports, &mut packets)?;
        } else {
            extract_legacy_pcap(data, ports, &mut packets)?;
        }

        Ok(Self {
            packets,
            metadata,
            current: None,
            next: 0,
            looping: false,
            realtime: false,
            started: None,
        })
    }

    /// Restart from the first packet once the capture is exhausted.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Release packets at the pace they were captured.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.next)
    }

    /// Reset replay to the first packet.
    pub fn reset(&mut self) {
        self.next = 0;
        self.current = None;
        self.started = None;
    }

    /// Time to wait before the next packet is due, when pacing.
    fn pending(&mut self, packet_ts: u64) -> Option<Duration> {
        if !self.realtime {
            return None;
        }

        let (start, first_ts) = *self.started.get_or_insert((Instant::now(), packet_ts));
        let due = Duration::from_micros(packet_ts.saturating_sub(first_ts));
        due.checked_sub(start.elapsed()).filter(|d| !d.is_zero())
    }

    fn take(&mut self, state: ClientState, buf: &mut [u8], expected: usize) -> Result<(), Error> {
        let payload = match self.current.take() {
            Some(index) if self.packets[index].state == state => {
                self.packets[index].payload.as_slice()
            }
            _ => &[][..],
        };
        check_packet_size(expected, payload.len())?;
        buf[..payload.len()].copy_from_slice(payload);
        Ok(())
    }
}

impl SensorClient for PcapClient {
    fn poll(&mut self, timeout: Duration) -> Result<ClientState, Error> {
        self.current = None;

        if self.next >= self.packets.len() {
            if !self.looping || self.packets.is_empty() {
                sleep(timeout);
                return Ok(ClientState::TIMEOUT);
            }
            debug!("capture exhausted, restarting replay");
            self.reset();
        }

        if let Some(wait) = self.pending(self.packets[self.next].timestamp) {
            sleep(wait.min(timeout));
            if wait > timeout {
                return Ok(ClientState::TIMEOUT);
            }
        }

        let index = self.next;
        self.next += 1;
        self.current = Some(index);
        Ok(self.packets[index].state)
    }

    fn read_lidar_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
        self.take(ClientState::LIDAR_DATA, buf, format.lidar_packet_size)
    }

    fn read_imu_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
        self.take(ClientState::IMU_DATA, buf, format.imu_packet_size)
    }

    fn metadata(&mut self) -> Result<String, Error> {
        Ok(self.metadata.clone())
    }
}

#[derive(Clone, Copy, Debug)]
struct Ports {
    lidar: u16,
    imu: u16,
}

/// Extract packets from legacy PCAP format.
fn extract_legacy_pcap(
    data: &[u8],
    ports: Ports,
    packets: &mut Vec<CapturedPacket>,
) -> Result<(), Error> {
    use pcap_parser::*;

    // Buffer size must be at least as large as the data to avoid Incomplete errors
    let mut reader = LegacyPcapReader::new(data.len().max(65536), data)
        .map_err(|e| Error::InvalidPacket(format!("Failed to create PCAP reader: {:?}", e)))?;

    let mut per_second = MICROS;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        if header.is_nanosecond_precision() {
                            per_second = 1_000_000_000;
                        }
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        let timestamp = packet.ts_sec as u64 * MICROS
                            + to_micros(packet.ts_usec as u64, per_second);
                        if let Some(captured) = extract_udp_payload(packet.data, ports, timestamp) {
                            packets.push(captured);
                        }
                    }
                    _ => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            // Everything is already loaded, a truncated tail is dropped
            Err(PcapError::Incomplete(_)) => break,
            Err(e) => {
                return Err(Error::InvalidPacket(format!("PCAP parse error: {:?}", e)));
            }
        }
    }

    Ok(())
}

/// Extract packets from PCAPNG format.
fn extract_pcapng(
    data: &[u8],
    ports: Ports,
    packets: &mut Vec<CapturedPacket>,
) -> Result<(), Error> {
    use pcap_parser::*;

    let mut reader = PcapNGReader::new(data.len().max(65536), data)
        .map_err(|e| Error::InvalidPacket(format!("Failed to create PCAPNG reader: {:?}", e)))?;
    let mut last_ts = 0;
    // Timestamp units per second of each interface, by interface id
    let mut interfaces: Vec<u64> = Vec::new();

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => interfaces.clear(),
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        let resolution = idb.ts_resolution().unwrap_or_else(|| {
                            warn!("invalid if_tsresol {}, assuming microseconds", idb.if_tsresol);
                            MICROS
                        });
                        interfaces.push(resolution);
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        let ticks = ((epb.ts_high as u64) << 32) | epb.ts_low as u64;
                        let per_second = interfaces
                            .get(epb.if_id as usize)
                            .copied()
                            .unwrap_or(MICROS);
                        last_ts = to_micros(ticks, per_second);
                        if let Some(captured) = extract_udp_payload(epb.data, ports, last_ts) {
                            packets.push(captured);
                        }
                    }
                    // Simple packets carry no timestamp
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        if let Some(captured) = extract_udp_payload(spb.data, ports, last_ts) {
                            packets.push(captured);
                        }
                    }
                    _ => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => break,
            Err(e) => {
                return Err(Error::InvalidPacket(format!("PCAPNG parse error: {:?}", e)));
            }
        }
    }

    Ok(())
}

/// Capture timestamps are kept in microseconds.
const MICROS: u64 = 1_000_000;

/// Convert `ticks` at `per_second` units per second to microseconds.
fn to_micros(ticks: u64, per_second: u64) -> u64 {
    (ticks as u128 * MICROS as u128 / per_second.max(1) as u128) as u64
}

/// Extract the UDP payload of a frame addressed to one of the sensor ports.
fn extract_udp_payload(data: &[u8], ports: Ports, timestamp: u64) -> Option<CapturedPacket> {
    use etherparse::SlicedPacket;

    let packet = SlicedPacket::from_ethernet(data).ok()?;
    let udp = match packet.transport {
        Some(etherparse::TransportSlice::Udp(udp)) => udp,
        _ => return None,
    };

    let state = match udp.destination_port() {
        port if port == ports.lidar => ClientState::LIDAR_DATA,
        port if port == ports.imu => ClientState::IMU_DATA,
        _ => return None,
    };

    let payload = udp.payload();
    if payload.is_empty() {
        return None;
    }

    Some(CapturedPacket {
        state,
        timestamp,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ouster::{UdpProfile, tests::metadata_json};

    const PORTS: Ports = Ports {
        lidar: 7502,
        imu: 7503,
    };

    // Minimal valid legacy PCAP header (little-endian)
    const PCAP_HEADER: [u8; 24] = [
        0xd4, 0xc3, 0xb2, 0xa1, // Magic number (little-endian)
        0x02, 0x00, // Major version
        0x04, 0x00, // Minor version
        0x00, 0x00, 0x00, 0x00, // Timezone
        0x00, 0x00, 0x00, 0x00, // Timestamp accuracy
        0xff, 0xff, 0x00, 0x00, // Snap length
        0x01, 0x00, 0x00, 0x00, // Network type (Ethernet)
    ];

    // Create a minimal UDP packet with Ethernet + IP + UDP headers
    fn make_udp_packet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let udp_len = 8 + payload.len();
        let ip_len = 20 + udp_len;
        let mut packet = Vec::with_capacity(14 + ip_len);

        // Ethernet header
        packet.extend_from_slice(&[0x00; 12]);
        packet.extend_from_slice(&[0x08, 0x00]);

        // IPv4 header, no options
        packet.push(0x45);
        packet.push(0x00);
        packet.extend_from_slice(&(ip_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        packet.push(0x40);
        packet.push(0x11); // UDP
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&[169, 254, 10, 2]);
        packet.extend_from_slice(&[169, 254, 10, 1]);

        // UDP header
        packet.extend_from_slice(&src_port.to_be_bytes());
        packet.extend_from_slice(&dst_port.to_be_bytes());
        packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]);

        packet.extend_from_slice(payload);
        packet
    }

    fn make_pcap_record(ts_usec: u32, data: &[u8]) -> Vec<u8> {
        let len = data.len() as u32;
        let mut record = Vec::with_capacity(16 + data.len());
        record.extend_from_slice(&[0x00; 4]);
        record.extend_from_slice(&ts_usec.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(data);
        record
    }

    fn capture(records: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut data = PCAP_HEADER.to_vec();
        for (i, (port, payload)) in records.iter().enumerate() {
            let packet = make_udp_packet(7502, *port, payload);
            data.extend_from_slice(&make_pcap_record(i as u32 * 100, &packet));
        }
        data
    }

    #[test]
    fn test_extract_udp_payload_by_port() {
        let lidar = make_udp_packet(40000, 7502, b"lidar");
        let captured = extract_udp_payload(&lidar, PORTS, 5).unwrap();
        assert_eq!(captured.state, ClientState::LIDAR_DATA);
        assert_eq!(captured.payload, b"lidar");
        assert_eq!(captured.timestamp, 5);

        let imu = make_udp_packet(40000, 7503, b"imu");
        assert_eq!(
            extract_udp_payload(&imu, PORTS, 0).unwrap().state,
            ClientState::IMU_DATA
        );

        // Source port alone does not match
        let other = make_udp_packet(7502, 9999, b"other");
        assert!(extract_udp_payload(&other, PORTS, 0).is_none());
    }

    #[test]
    fn test_from_bytes_filters_ports() {
        let data = capture(&[
            (7502, b"one".to_vec()),
            (9999, b"skip".to_vec()),
            (7503, b"imu".to_vec()),
        ]);
        let client = PcapClient::from_bytes(&data, metadata_json(8, 2, "LEGACY")).unwrap();
        assert_eq!(client.len(), 2);
        assert!(!client.is_empty());
    }

    #[test]
    fn test_replay_serves_packets() {
        let format = PacketFormat::with_profile(UdpProfile::Legacy, 4, 2);
        let lidar = vec![1u8; format.lidar_packet_size];
        let imu = vec![2u8; format.imu_packet_size];
        let data = capture(&[(7502, lidar.clone()), (7503, imu.clone())]);

        let mut client = PcapClient::from_bytes(&data, metadata_json(8, 2, "LEGACY")).unwrap();
        let mut buf = vec![0u8; 65536];

        assert_eq!(client.poll(Duration::ZERO).unwrap(), ClientState::LIDAR_DATA);
        client.read_lidar_packet(&mut buf, &format).unwrap();
        assert_eq!(&buf[..lidar.len()], &lidar[..]);

        assert_eq!(client.poll(Duration::ZERO).unwrap(), ClientState::IMU_DATA);
        // Wrong kind for the current packet
        assert!(client.read_lidar_packet(&mut buf, &format).is_err());

        assert_eq!(client.remaining(), 0);
        assert!(client.poll(Duration::ZERO).unwrap().is_timeout());
    }

    #[test]
    fn test_replay_loops() {
        let data = capture(&[(7502, b"a".to_vec())]);
        let mut client = PcapClient::from_bytes(&data, metadata_json(8, 2, "LEGACY"))
            .unwrap()
            .looping(true);

        for _ in 0..3 {
            assert_eq!(client.poll(Duration::ZERO).unwrap(), ClientState::LIDAR_DATA);
        }
    }

    #[test]
    fn test_reset() {
        let data = capture(&[(7502, b"a".to_vec()), (7502, b"b".to_vec())]);
        let mut client = PcapClient::from_bytes(&data, metadata_json(8, 2, "LEGACY")).unwrap();
        client.poll(Duration::ZERO).unwrap();
        assert_eq!(client.remaining(), 1);
        client.reset();
        assert_eq!(client.remaining(), 2);
    }

    #[test]
    fn test_empty_capture() {
        let mut client =
            PcapClient::from_bytes(&PCAP_HEADER, metadata_json(8, 2, "LEGACY")).unwrap();
        assert!(client.is_empty());
        assert!(client.poll(Duration::ZERO).unwrap().is_timeout());
    }

    #[test]
    fn test_nanosecond_pcap_timestamps() {
        let mut data = PCAP_HEADER.to_vec();
        // Nanosecond magic number
        data[0..4].copy_from_slice(&[0x4d, 0x3c, 0xb2, 0xa1]);
        let packet = make_udp_packet(40000, 7502, b"ns");
        data.extend_from_slice(&make_pcap_record(250_000_000, &packet));

        let mut packets = Vec::new();
        extract_legacy_pcap(&data, PORTS, &mut packets).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].timestamp, 250_000);
    }

    // Block of `kind` wrapping `body`, padded to 32 bits
    fn pcapng_block(kind: u32, body: &[u8]) -> Vec<u8> {
        let padded = body.len().div_ceil(4) * 4;
        let len = (12 + padded) as u32;
        let mut block = Vec::with_capacity(len as usize);
        block.extend_from_slice(&kind.to_le_bytes());
        block.extend_from_slice(&len.to_le_bytes());
        block.extend_from_slice(body);
        block.resize(8 + padded, 0);
        block.extend_from_slice(&len.to_le_bytes());
        block
    }

    fn pcapng_capture(tsresol: u8, ticks: &[u64]) -> Vec<u8> {
        let mut shb = Vec::new();
        shb.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
        shb.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        shb.extend_from_slice(&(-1i64).to_le_bytes());
        let mut data = pcapng_block(0x0a0d_0d0a, &shb);

        let mut idb = Vec::new();
        idb.extend_from_slice(&1u16.to_le_bytes()); // Ethernet
        idb.extend_from_slice(&[0x00, 0x00]);
        idb.extend_from_slice(&65535u32.to_le_bytes());
        // if_tsresol option, then end of options
        idb.extend_from_slice(&9u16.to_le_bytes());
        idb.extend_from_slice(&1u16.to_le_bytes());
        idb.extend_from_slice(&[tsresol, 0, 0, 0]);
        idb.extend_from_slice(&[0x00; 4]);
        data.extend_from_slice(&pcapng_block(1, &idb));

        for &ts in ticks {
            let packet = make_udp_packet(40000, 7502, b"ng");
            let mut epb = Vec::new();
            epb.extend_from_slice(&0u32.to_le_bytes());
            epb.extend_from_slice(&((ts >> 32) as u32).to_le_bytes());
            epb.extend_from_slice(&(ts as u32).to_le_bytes());
            epb.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            epb.extend_from_slice(&(packet.len() as u32).to_le_bytes());
            epb.extend_from_slice(&packet);
            data.extend_from_slice(&pcapng_block(6, &epb));
        }
        data
    }

    #[test]
    fn test_pcapng_interface_resolution() {
        // Nanosecond interface
        let data = pcapng_capture(9, &[1_000_000_000, 1_500_000_000]);
        let mut packets = Vec::new();
        extract_pcapng(&data, PORTS, &mut packets).unwrap();
        let stamps: Vec<u64> = packets.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![1_000_000, 1_500_000]);

        // Millisecond interface
        let data = pcapng_capture(3, &[20]);
        let mut packets = Vec::new();
        extract_pcapng(&data, PORTS, &mut packets).unwrap();
        assert_eq!(packets[0].timestamp, 20_000);
    }

    #[test]
    fn test_to_micros() {
        assert_eq!(to_micros(1_500, 1_000), 1_500_000);
        assert_eq!(to_micros(1_500, 1_000_000), 1_500);
        assert_eq!(to_micros(1_500, 1_000_000_000), 1);
        // Binary resolution, 2^10 ticks per second
        assert_eq!(to_micros(512, 1024), 500_000);
    }

    #[test]
    fn test_missing_metadata() {
        assert!(matches!(
            PcapClient::open("/nonexistent/capture.pcap"),
            Err(Error::Metadata(_))
        ));
    }
}
