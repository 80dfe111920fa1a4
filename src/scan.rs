// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Scan storage and packet batching.
//!
//! A [`LidarScan`] holds one full rotation as `rows x columns` images, one per
//! [`ChanField`], indexed `(row, column)`. The [`ScanBatcher`] writes the
//! columns of each lidar packet into the scan by measurement id and reports
//! completion when the first packet of the next frame arrives. That packet is
//! held back and becomes the first data of the following scan.
//!
//! ```text
//!  packets:  f7 f7 f7 ... f7 | f8 f8 ...
//!                            ^ batch() returns true, scan holds frame 7
//!                              next batch() starts frame 8 with the held packet
//! ```

use crate::{
    lidar::Error,
    ouster::{ColumnWindow, PacketFormat},
};
use clap::ValueEnum;
use ndarray::{Array2, ArrayView2};
use std::fmt;
use tracing::trace;

/// Per-pixel measurement channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ChanField {
    /// Range in millimeters
    #[default]
    Range,
    /// Calibrated reflectivity
    Reflectivity,
    /// Signal photons
    Signal,
    /// Ambient near-infrared photons
    NearIr,
}

impl fmt::Display for ChanField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChanField::Range => write!(f, "RANGE"),
            ChanField::Reflectivity => write!(f, "REFLECTIVITY"),
            ChanField::Signal => write!(f, "SIGNAL"),
            ChanField::NearIr => write!(f, "NEAR_IR"),
        }
    }
}

/// One rotation of measurements.
#[derive(Clone, Debug)]
pub struct LidarScan {
    /// Columns per frame
    pub w: usize,
    /// Pixels per column
    pub h: usize,
    pub frame_id: u16,
    range: Array2<u32>,
    reflectivity: Array2<u32>,
    signal: Array2<u32>,
    near_ir: Array2<u32>,
    timestamp: Vec<u64>,
    status: Vec<bool>,
}

impl LidarScan {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            frame_id: 0,
            range: Array2::zeros((h, w)),
            reflectivity: Array2::zeros((h, w)),
            signal: Array2::zeros((h, w)),
            near_ir: Array2::zeros((h, w)),
            timestamp: vec![0; w],
            status: vec![false; w],
        }
    }

    /// Clear all channels and column headers for a new frame.
    pub fn reset(&mut self, frame_id: u16) {
        self.frame_id = frame_id;
        self.range.fill(0);
        self.reflectivity.fill(0);
        self.signal.fill(0);
        self.near_ir.fill(0);
        self.timestamp.fill(0);
        self.status.fill(false);
    }

    pub fn field(&self, field: ChanField) -> ArrayView2<'_, u32> {
        match field {
            ChanField::Range => self.range.view(),
            ChanField::Reflectivity => self.reflectivity.view(),
            ChanField::Signal => self.signal.view(),
            ChanField::NearIr => self.near_ir.view(),
        }
    }

    pub fn field_mut(&mut self, field: ChanField) -> &mut Array2<u32> {
        match field {
            ChanField::Range => &mut self.range,
            ChanField::Reflectivity => &mut self.reflectivity,
            ChanField::Signal => &mut self.signal,
            ChanField::NearIr => &mut self.near_ir,
        }
    }

    /// Mark a column as received with the given header values.
    pub fn set_column(&mut self, col: usize, timestamp: u64, valid: bool) {
        self.timestamp[col] = timestamp;
        self.status[col] = valid;
    }

    /// Timestamp of the first valid column, or zero for an empty scan.
    pub fn frame_timestamp(&self) -> u64 {
        self.status
            .iter()
            .zip(&self.timestamp)
            .find_map(|(&valid, &ts)| valid.then_some(ts))
            .unwrap_or(0)
    }

    /// True when every column inside `window` holds valid data.
    pub fn complete(&self, window: ColumnWindow) -> bool {
        self.status
            .iter()
            .enumerate()
            .all(|(col, &valid)| valid || !window.contains(col))
    }
}

/// Packet-to-scan batching.
///
/// Returns `Ok(true)` when `scan` holds a finished frame. The scan must not be
/// modified by the caller between that return and the next call.
pub trait Batcher: Send {
    fn batch(&mut self, packet: &[u8], scan: &mut LidarScan) -> Result<bool, Error>;
}

/// Column batcher for single-return lidar profiles.
pub struct ScanBatcher {
    format: PacketFormat,
    columns_per_frame: usize,
    frame_id: Option<u16>,
    pending: Vec<u8>,
    has_pending: bool,
}

impl ScanBatcher {
    pub fn new(columns_per_frame: usize, format: PacketFormat) -> Self {
        let pending = vec![0; format.lidar_packet_size];
        Self {
            format,
            columns_per_frame,
            frame_id: None,
            pending,
            has_pending: false,
        }
    }

    fn apply(format: &PacketFormat, columns_per_frame: usize, packet: &[u8], scan: &mut LidarScan) {
        for col in 0..format.columns_per_packet {
            let m = format.col_measurement_id(packet, col) as usize;
            if m >= columns_per_frame {
                trace!("measurement id {} outside of {} columns", m, columns_per_frame);
                continue;
            }

            let valid = format.col_valid(packet, col);
            scan.set_column(m, format.col_timestamp(packet, col), valid);
            if !valid {
                continue;
            }

            for row in 0..format.pixels_per_column.min(scan.h) {
                let px = format.pixel(packet, col, row);
                scan.range[(row, m)] = px.range;
                scan.reflectivity[(row, m)] = px.reflectivity;
                scan.signal[(row, m)] = px.signal;
                scan.near_ir[(row, m)] = px.near_ir;
            }
        }
    }
}

impl Batcher for ScanBatcher {
    fn batch(&mut self, packet: &[u8], scan: &mut LidarScan) -> Result<bool, Error> {
        if packet.len() != self.format.lidar_packet_size {
            return Err(Error::PacketSize {
                expected: self.format.lidar_packet_size,
                received: packet.len(),
            });
        }

        let frame_id = self.format.frame_id(packet)?;

        if self.has_pending {
            self.has_pending = false;
            scan.reset(self.frame_id.unwrap_or(frame_id));
            Self::apply(&self.format, self.columns_per_frame, &self.pending, scan);
        }

        match self.frame_id {
            Some(current) if current == frame_id => {
                Self::apply(&self.format, self.columns_per_frame, packet, scan);
                Ok(false)
            }
            Some(current) => {
                trace!("frame {} finished by frame {}", current, frame_id);
                self.pending.copy_from_slice(packet);
                self.has_pending = true;
                self.frame_id = Some(frame_id);
                Ok(true)
            }
            None => {
                self.frame_id = Some(frame_id);
                scan.reset(frame_id);
                Self::apply(&self.format, self.columns_per_frame, packet, scan);
                Ok(false)
            }
        }
    }
}
