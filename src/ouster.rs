// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Ouster sensor metadata and UDP lidar packet layout.
//!
//! The sensor describes itself through a JSON metadata document served by its
//! HTTP API (`/api/v1/sensor/metadata`). [`parse_metadata`] turns that
//! document into [`Parameters`], from which [`PacketFormat`] derives the
//! fixed packet size and field offsets for the configured UDP profile.
//!
//! # Packet Structure
//!
//! ## LEGACY
//! - No packet header or footer
//! - Column: 16 byte header (timestamp, measurement id, frame id, encoder),
//!   12 bytes per pixel, 4 byte status footer (`0xffffffff` when valid)
//!
//! ## RNG19_RFL8_SIG16_NIR16 / RNG15_RFL8_NIR8
//! - Packet header: 32 bytes (packet type, frame id, init id, serial)
//! - Column: 12 byte header (timestamp, measurement id, status), then
//!   12 (RNG19) or 4 (RNG15) bytes per pixel
//! - Packet footer: 32 bytes

use crate::lidar::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Size of an IMU packet, identical for every supported profile.
pub const IMU_PACKET_SIZE: usize = 48;

/// Default UDP port for lidar data.
pub const DEFAULT_LIDAR_PORT: u16 = 7502;

/// Default UDP port for IMU data.
pub const DEFAULT_IMU_PORT: u16 = 7503;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SensorInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub build_rev: String,
    #[serde(default)]
    pub prod_sn: String,
    #[serde(default)]
    pub prod_pn: String,
    #[serde(default)]
    pub prod_line: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LidarDataFormat {
    #[serde(default = "default_lidar_profile")]
    pub udp_profile_lidar: String,
    #[serde(default = "default_imu_profile")]
    pub udp_profile_imu: String,
    pub columns_per_packet: usize,
    pub columns_per_frame: usize,
    pub pixels_per_column: usize,
    pub column_window: [usize; 2],
    #[serde(default)]
    pub pixel_shift_by_row: Vec<i16>,
}

fn default_lidar_profile() -> String {
    "LEGACY".to_string()
}

fn default_imu_profile() -> String {
    "LEGACY".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeamIntrinsics {
    pub beam_altitude_angles: Vec<f32>,
    pub beam_azimuth_angles: Vec<f32>,
    #[serde(default)]
    pub lidar_origin_to_beam_origin_mm: f32,
}

/// Row-major 4x4 identity, translation in millimeters.
pub const IDENTITY_TRANSFORM: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Placement of the lidar frame inside the sensor housing frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LidarIntrinsics {
    /// Row-major homogeneous transform, translation in millimeters.  OS
    /// sensors report a half turn about z and the optical center height.
    #[serde(default = "identity_transform")]
    pub lidar_to_sensor_transform: [f32; 16],
}

impl Default for LidarIntrinsics {
    fn default() -> Self {
        Self {
            lidar_to_sensor_transform: IDENTITY_TRANSFORM,
        }
    }
}

fn identity_transform() -> [f32; 16] {
    IDENTITY_TRANSFORM
}

/// Subset of the sensor configuration relevant to receiving data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigParams {
    #[serde(default)]
    pub udp_dest: String,
    #[serde(default = "default_lidar_port")]
    pub udp_port_lidar: u16,
    #[serde(default = "default_imu_port")]
    pub udp_port_imu: u16,
    #[serde(default)]
    pub lidar_mode: String,
}

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            udp_dest: String::new(),
            udp_port_lidar: DEFAULT_LIDAR_PORT,
            udp_port_imu: DEFAULT_IMU_PORT,
            lidar_mode: String::new(),
        }
    }
}

fn default_lidar_port() -> u16 {
    DEFAULT_LIDAR_PORT
}

fn default_imu_port() -> u16 {
    DEFAULT_IMU_PORT
}

/// Complete sensor description parsed from the metadata document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameters {
    pub sensor_info: SensorInfo,
    pub lidar_data_format: LidarDataFormat,
    pub beam_intrinsics: BeamIntrinsics,
    #[serde(default)]
    pub lidar_intrinsics: LidarIntrinsics,
    #[serde(default)]
    pub config_params: ConfigParams,
}

impl Parameters {
    /// Scan width in columns.
    pub fn width(&self) -> usize {
        self.lidar_data_format.columns_per_frame
    }

    /// Scan height in rows (beams).
    pub fn height(&self) -> usize {
        self.lidar_data_format.pixels_per_column
    }

    pub fn column_window(&self) -> ColumnWindow {
        let [start, end] = self.lidar_data_format.column_window;
        ColumnWindow { start, end }
    }

    /// Log the sensor identity and scan geometry.
    pub fn log_summary(&self) {
        let info = &self.sensor_info;
        let format = &self.lidar_data_format;
        info!(
            "{} serial {} firmware {}",
            info.prod_line, info.prod_sn, info.build_rev
        );
        info!(
            "scan {}x{} ({}) profile {} column window {}",
            self.width(),
            self.height(),
            self.config_params.lidar_mode,
            format.udp_profile_lidar,
            self.column_window()
        );
    }
}

/// Parse the raw metadata document returned by the sensor.
///
/// Validates that the data format and beam intrinsics agree on the number of
/// rows and that the column window lies inside the frame.
pub fn parse_metadata(metadata: &str) -> Result<Parameters, Error> {
    let params: Parameters = serde_json::from_str(metadata)?;
    let format = &params.lidar_data_format;

    if format.columns_per_frame == 0 || format.pixels_per_column == 0 {
        return Err(Error::Metadata(format!(
            "empty scan dimensions {}x{}",
            format.columns_per_frame, format.pixels_per_column
        )));
    }

    if format.columns_per_packet == 0 {
        return Err(Error::Metadata("zero columns per packet".to_string()));
    }

    let beams = &params.beam_intrinsics;
    if beams.beam_altitude_angles.len() != format.pixels_per_column
        || beams.beam_azimuth_angles.len() != format.pixels_per_column
    {
        return Err(Error::Metadata(format!(
            "{} pixels per column but {} altitude and {} azimuth angles",
            format.pixels_per_column,
            beams.beam_altitude_angles.len(),
            beams.beam_azimuth_angles.len()
        )));
    }

    let [start, end] = format.column_window;
    if start >= format.columns_per_frame || end >= format.columns_per_frame {
        return Err(Error::Metadata(format!(
            "column window [{}, {}] outside of {} columns",
            start, end, format.columns_per_frame
        )));
    }

    Ok(params)
}

/// Inclusive range of columns the sensor reports valid data for.
///
/// When `start > end` the window wraps around column zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnWindow {
    pub start: usize,
    pub end: usize,
}

impl ColumnWindow {
    pub fn contains(&self, col: usize) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&col)
        } else {
            col >= self.start || col <= self.end
        }
    }
}

impl fmt::Display for ColumnWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// UDP lidar profiles understood by the batcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UdpProfile {
    Legacy,
    Rng19Rfl8Sig16Nir16,
    Rng15Rfl8Nir8,
}

impl TryFrom<&str> for UdpProfile {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "LEGACY" => Ok(UdpProfile::Legacy),
            "RNG19_RFL8_SIG16_NIR16" => Ok(UdpProfile::Rng19Rfl8Sig16Nir16),
            "RNG15_RFL8_NIR8" => Ok(UdpProfile::Rng15Rfl8Nir8),
            other => Err(Error::UnsupportedProfile(other.to_string())),
        }
    }
}

impl fmt::Display for UdpProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UdpProfile::Legacy => write!(f, "LEGACY"),
            UdpProfile::Rng19Rfl8Sig16Nir16 => write!(f, "RNG19_RFL8_SIG16_NIR16"),
            UdpProfile::Rng15Rfl8Nir8 => write!(f, "RNG15_RFL8_NIR8"),
        }
    }
}

/// Measurements decoded from one pixel of a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pixel {
    /// Range in millimeters, zero when there is no return.
    pub range: u32,
    pub reflectivity: u32,
    pub signal: u32,
    pub near_ir: u32,
}

/// Packet layout for a sensor configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketFormat {
    pub profile: UdpProfile,
    pub columns_per_packet: usize,
    pub pixels_per_column: usize,
    pub packet_header_size: usize,
    pub col_header_size: usize,
    pub channel_data_size: usize,
    pub col_footer_size: usize,
    pub packet_footer_size: usize,
    pub lidar_packet_size: usize,
    pub imu_packet_size: usize,
}

impl PacketFormat {
    pub fn new(params: &Parameters) -> Result<Self, Error> {
        let format = &params.lidar_data_format;
        let profile = UdpProfile::try_from(format.udp_profile_lidar.as_str())?;
        Ok(Self::with_profile(
            profile,
            format.columns_per_packet,
            format.pixels_per_column,
        ))
    }

    pub fn with_profile(
        profile: UdpProfile,
        columns_per_packet: usize,
        pixels_per_column: usize,
    ) -> Self {
        let (packet_header_size, col_header_size, channel_data_size, col_footer_size) =
            match profile {
                UdpProfile::Legacy => (0, 16, 12, 4),
                UdpProfile::Rng19Rfl8Sig16Nir16 => (PacketHeader::LEN, 12, 12, 0),
                UdpProfile::Rng15Rfl8Nir8 => (PacketHeader::LEN, 12, 4, 0),
            };
        let packet_footer_size = match profile {
            UdpProfile::Legacy => 0,
            _ => 32,
        };

        let col_size = col_header_size + pixels_per_column * channel_data_size + col_footer_size;
        let lidar_packet_size =
            packet_header_size + columns_per_packet * col_size + packet_footer_size;

        Self {
            profile,
            columns_per_packet,
            pixels_per_column,
            packet_header_size,
            col_header_size,
            channel_data_size,
            col_footer_size,
            packet_footer_size,
            lidar_packet_size,
            imu_packet_size: IMU_PACKET_SIZE,
        }
    }

    /// Size in bytes of one column including header and footer.
    #[inline]
    pub fn col_size(&self) -> usize {
        self.col_header_size + self.pixels_per_column * self.channel_data_size + self.col_footer_size
    }

    #[inline]
    fn col_offset(&self, col: usize) -> usize {
        self.packet_header_size + col * self.col_size()
    }

    /// Frame id of the packet.
    ///
    /// LEGACY packets carry it in every column header, eUDP profiles in the
    /// packet header.
    pub fn frame_id(&self, packet: &[u8]) -> Result<u16, Error> {
        match self.profile {
            UdpProfile::Legacy => Ok(read_u16(packet, self.col_offset(0) + 10)),
            _ => Ok(PacketHeader::from_slice(packet)?.frame_id()),
        }
    }

    pub fn col_timestamp(&self, packet: &[u8], col: usize) -> u64 {
        read_u64(packet, self.col_offset(col))
    }

    pub fn col_measurement_id(&self, packet: &[u8], col: usize) -> u16 {
        read_u16(packet, self.col_offset(col) + 8)
    }

    /// True when the sensor marked the column as containing valid data.
    pub fn col_valid(&self, packet: &[u8], col: usize) -> bool {
        match self.profile {
            UdpProfile::Legacy => {
                let footer = self.col_offset(col) + self.col_size() - self.col_footer_size;
                read_u32(packet, footer) == 0xffff_ffff
            }
            _ => read_u16(packet, self.col_offset(col) + 10) & 0x1 != 0,
        }
    }

    /// Decode pixel `row` of column `col`.
    pub fn pixel(&self, packet: &[u8], col: usize, row: usize) -> Pixel {
        let off = self.col_offset(col) + self.col_header_size + row * self.channel_data_size;
        match self.profile {
            UdpProfile::Legacy => Pixel {
                range: read_u32(packet, off) & 0x000f_ffff,
                reflectivity: read_u16(packet, off + 4) as u32,
                signal: read_u16(packet, off + 6) as u32,
                near_ir: read_u16(packet, off + 8) as u32,
            },
            UdpProfile::Rng19Rfl8Sig16Nir16 => Pixel {
                range: read_u32(packet, off) & 0x0007_ffff,
                reflectivity: packet[off + 4] as u32,
                signal: read_u16(packet, off + 6) as u32,
                near_ir: read_u16(packet, off + 8) as u32,
            },
            // 8mm range resolution
            UdpProfile::Rng15Rfl8Nir8 => Pixel {
                range: (read_u16(packet, off) & 0x7fff) as u32 * 8,
                reflectivity: packet[off + 2] as u32,
                signal: 0,
                near_ir: packet[off + 3] as u32,
            },
        }
    }
}

/// Lidar packet header used by the eUDP profiles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketHeader<'a> {
    slice: &'a [u8],
}

impl<'a> PacketHeader<'a> {
    /// Length of the header in bytes/octets.
    pub const LEN: usize = 32;

    pub fn from_slice(slice: &'a [u8]) -> Result<PacketHeader<'a>, Error> {
        if slice.len() < Self::LEN {
            return Err(Error::PacketSize {
                expected: Self::LEN,
                received: slice.len(),
            });
        }

        let packet_type = u16::from_le_bytes([slice[0], slice[1]]);
        if packet_type != 1 {
            return Err(Error::InvalidPacket(format!(
                "unknown packet type: {}",
                packet_type
            )));
        }

        Ok(PacketHeader { slice })
    }

    pub fn packet_type(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    /// Index of the lidar scan, increments every time the sensor completes a
    /// rotation, crossing the zero azimuth angle.
    pub fn frame_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Updates on every reinit, which may be triggered by the user or an
    /// error, and every reboot.
    pub fn init_id(&self) -> u32 {
        u32::from_le_bytes([self.slice[4], self.slice[5], self.slice[6], 0])
    }
}

#[inline]
fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Metadata document for a small synthetic sensor.
    pub fn metadata_json(cols: usize, rows: usize, profile: &str) -> String {
        let altitudes: Vec<f32> = (0..rows).map(|i| 10.0 - i as f32).collect();
        let azimuths: Vec<f32> = vec![0.0; rows];
        serde_json::json!({
            "sensor_info": {
                "status": "RUNNING",
                "build_rev": "v2.5.2",
                "prod_sn": "992109000000",
                "prod_pn": "840-102145-D",
                "prod_line": "OS-1-64",
                "initialization_id": 7109750
            },
            "lidar_data_format": {
                "udp_profile_lidar": profile,
                "udp_profile_imu": "LEGACY",
                "columns_per_packet": 4,
                "columns_per_frame": cols,
                "pixels_per_column": rows,
                "column_window": [0, cols - 1],
                "pixel_shift_by_row": vec![0; rows]
            },
            "beam_intrinsics": {
                "beam_altitude_angles": altitudes,
                "beam_azimuth_angles": azimuths,
                "beam_to_lidar_transform": [1, 0, 0, 15.8, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1],
                "lidar_origin_to_beam_origin_mm": 15.8
            },
            "config_params": {
                "udp_dest": "192.168.1.10",
                "udp_port_lidar": 7502,
                "udp_port_imu": 7503,
                "lidar_mode": "1024x10"
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_metadata() {
        let params = parse_metadata(&metadata_json(16, 8, "LEGACY")).unwrap();
        assert_eq!(params.width(), 16);
        assert_eq!(params.height(), 8);
        assert_eq!(params.sensor_info.prod_line, "OS-1-64");
        assert_eq!(params.sensor_info.build_rev, "v2.5.2");
        assert_eq!(params.column_window(), ColumnWindow { start: 0, end: 15 });
        assert_eq!(params.config_params.udp_port_lidar, 7502);
        assert_eq!(params.beam_intrinsics.lidar_origin_to_beam_origin_mm, 15.8);
        assert_eq!(
            params.lidar_intrinsics.lidar_to_sensor_transform,
            IDENTITY_TRANSFORM
        );
    }

    #[test]
    fn test_parse_lidar_to_sensor_transform() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&metadata_json(16, 8, "LEGACY")).unwrap();
        doc["lidar_intrinsics"] = serde_json::json!({
            "lidar_to_sensor_transform": [-1, 0, 0, 0, 0, -1, 0, 0, 0, 0, 1, 36.18, 0, 0, 0, 1]
        });
        let params = parse_metadata(&doc.to_string()).unwrap();
        let transform = params.lidar_intrinsics.lidar_to_sensor_transform;
        assert_eq!(transform[0], -1.0);
        assert_eq!(transform[11], 36.18);
    }

    #[test]
    fn test_parse_metadata_row_mismatch() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&metadata_json(16, 8, "LEGACY")).unwrap();
        doc["lidar_data_format"]["pixels_per_column"] = 16.into();
        let err = parse_metadata(&doc.to_string()).unwrap_err();
        assert!(matches!(err, Error::Metadata(_)), "{}", err);
    }

    #[test]
    fn test_parse_metadata_not_json() {
        assert!(matches!(parse_metadata("RUNNING"), Err(Error::Json(_))));
    }

    #[test]
    fn test_column_window_wraps() {
        let window = ColumnWindow { start: 1000, end: 23 };
        assert!(window.contains(1000));
        assert!(window.contains(1023));
        assert!(window.contains(0));
        assert!(window.contains(23));
        assert!(!window.contains(24));
        assert!(!window.contains(999));
    }

    #[test]
    fn test_packet_sizes() {
        // OS1-64 LEGACY packets are 12608 bytes
        let legacy = PacketFormat::with_profile(UdpProfile::Legacy, 16, 64);
        assert_eq!(legacy.lidar_packet_size, 12608);

        let rng19 = PacketFormat::with_profile(UdpProfile::Rng19Rfl8Sig16Nir16, 16, 64);
        assert_eq!(rng19.lidar_packet_size, 32 + 16 * (12 + 64 * 12) + 32);

        let rng15 = PacketFormat::with_profile(UdpProfile::Rng15Rfl8Nir8, 16, 64);
        assert_eq!(rng15.lidar_packet_size, 32 + 16 * (12 + 64 * 4) + 32);
        assert_eq!(rng15.imu_packet_size, IMU_PACKET_SIZE);
    }

    #[test]
    fn test_unsupported_profile() {
        let params = parse_metadata(&metadata_json(16, 8, "RNG19_RFL8_SIG16_NIR16_DUAL")).unwrap();
        assert!(matches!(
            PacketFormat::new(&params),
            Err(Error::UnsupportedProfile(_))
        ));
    }

    #[test]
    fn test_packet_header() {
        let mut packet = vec![0u8; 64];
        packet[0] = 1;
        packet[2..4].copy_from_slice(&517u16.to_le_bytes());
        packet[4..7].copy_from_slice(&[0x01, 0x02, 0x03]);
        let header = PacketHeader::from_slice(&packet).unwrap();
        assert_eq!(header.packet_type(), 1);
        assert_eq!(header.frame_id(), 517);
        assert_eq!(header.init_id(), 0x030201);

        packet[0] = 2;
        assert!(PacketHeader::from_slice(&packet).is_err());
        assert!(PacketHeader::from_slice(&packet[..16]).is_err());
    }

    #[test]
    fn test_rng15_pixel_scaling() {
        let format = PacketFormat::with_profile(UdpProfile::Rng15Rfl8Nir8, 1, 1);
        let mut packet = vec![0u8; format.lidar_packet_size];
        let off = PacketHeader::LEN + 12;
        packet[off..off + 2].copy_from_slice(&(0x8000u16 | 125).to_le_bytes());
        packet[off + 2] = 40;
        packet[off + 3] = 9;
        let pixel = format.pixel(&packet, 0, 0);
        assert_eq!(pixel.range, 1000);
        assert_eq!(pixel.reflectivity, 40);
        assert_eq!(pixel.near_ir, 9);
    }
}
