// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst LiDAR Viewer Library
//!
//! Live range image and point cloud viewers for Ouster lidar sensors.
//!
//! # Architecture
//!
//! An acquisition thread turns the sensor's UDP packet stream into complete
//! scans and hands each one to a [`acquire::ScanSink`]. The range image sink
//! renders into a private back buffer and publishes it through the
//! [`buffer::FrameExchange`], which the display loop on the main thread copies
//! to the window:
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  SensorClient    │ ──► │  ScanBatcher │ ──► │  LidarScan  │
//! │  (UDP/pcap/test) │     │  (columns)   │     │  (complete) │
//! └──────────────────┘     └──────────────┘     └─────────────┘
//!                                                      │
//!                          ┌───────────────────────────┴──────────┐
//!                          ▼                                      ▼
//!               ┌─────────────────────┐               ┌─────────────────────┐
//!               │  FrameSink          │               │  CloudSink          │
//!               │  (range image)      │               │  (XYZ to Rerun)     │
//!               └─────────────────────┘               └─────────────────────┘
//!                          │ publish
//!                          ▼
//!               ┌─────────────────────┐  mouse  ┌─────────────────────┐
//!               │  FrameExchange      │ ◄─────► │  Display (minifb)   │
//!               └─────────────────────┘  blit   └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`acquire`]: Acquisition loop and thread
//! - [`args`]: Command line configuration
//! - [`buffer`]: Frame buffers and the frame exchange
//! - [`client`]: Sensor client abstraction and UDP client
//! - [`display`]: Range image window
//! - [`lidar`]: Error handling and shared types
//! - [`mouse`]: Mouse state snapshots
//! - [`ouster`]: Metadata and packet layout
//! - [`pcap_source`]: Capture replay (feature `pcap`)
//! - [`range_image`]: Normalization and mouse probe
//! - [`scan`]: Scans and packet batching
//! - [`viz`]: Point cloud visualization (feature `rerun`)
//! - [`xyz`]: Cartesian projection

pub mod acquire;
pub mod args;
pub mod buffer;
pub mod client;
pub mod display;
pub mod lidar;
pub mod mouse;
pub mod ouster;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod range_image;
pub mod scan;
#[cfg(feature = "rerun")]
pub mod viz;
pub mod xyz;

// Re-exports for convenience
pub use acquire::{Acquisition, ScanSink};
pub use buffer::{FrameBuffer, FrameExchange};
pub use client::{ScriptedClient, SensorClient};
pub use lidar::{ClientState, Error};
pub use mouse::MouseState;
pub use ouster::{PacketFormat, Parameters, parse_metadata};
#[cfg(feature = "pcap")]
pub use pcap_source::PcapClient;
pub use scan::{Batcher, ChanField, LidarScan, ScanBatcher};
