// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Point cloud visualization through a Rerun recording stream.
//!
//! Every complete scan is projected with the [`XyzLut`] and logged as
//! `points` (one point per pixel with a return, shaded by the normalized
//! display channel) together with the normalized channel as the `image`
//! entity. Frames are indexed on the `frame` sequence timeline.

use crate::{
    acquire::ScanSink,
    buffer::{FrameBuffer, channels},
    lidar::Error,
    range_image::normalize,
    scan::{ChanField, LidarScan},
    xyz::XyzLut,
};
use rerun::RecordingStream;
use tracing::trace;

/// Scan sink logging point clouds to Rerun.
pub struct CloudSink {
    rec: RecordingStream,
    lut: XyzLut,
    channel: ChanField,
    xyz: Vec<[f32; 3]>,
    shade: FrameBuffer,
    frames: i64,
}

impl CloudSink {
    pub fn new(rec: RecordingStream, lut: XyzLut, channel: ChanField) -> Self {
        let (w, h) = (lut.w, lut.h);
        Self {
            rec,
            lut,
            channel,
            xyz: vec![[0.0; 3]; w * h],
            shade: FrameBuffer::new(w, h),
            frames: 0,
        }
    }

    /// Project the scan and pair each returned point with its gray level.
    ///
    /// Pixels without a range return are dropped.
    pub fn cloud(&mut self, scan: &LidarScan) -> (Vec<[f32; 3]>, Vec<u8>) {
        self.lut.cartesian_into(scan, &mut self.xyz);
        normalize(scan.field(self.channel), &mut self.shade);

        let range = scan.field(ChanField::Range);
        let mut points = Vec::with_capacity(self.xyz.len());
        let mut levels = Vec::with_capacity(self.xyz.len());

        for ((point, r), px) in self
            .xyz
            .iter()
            .zip(range.iter())
            .zip(self.shade.pixels())
        {
            if *r == 0 {
                continue;
            }
            points.push(*point);
            levels.push(channels(*px)[0]);
        }

        (points, levels)
    }
}

impl ScanSink for CloudSink {
    fn scan(&mut self, scan: &LidarScan) -> Result<(), Error> {
        let (points, levels) = self.cloud(scan);
        trace!("frame {} with {} points", scan.frame_id, points.len());

        self.rec.set_time_sequence("frame", self.frames);
        self.frames += 1;

        self.rec.log(
            "points",
            &rerun::Points3D::new(points).with_colors(
                levels
                    .iter()
                    .map(|&l| rerun::Color::from_rgb(l, l, l)),
            ),
        )?;

        let image: Vec<u8> = self.shade.pixels().iter().map(|&px| channels(px)[0]).collect();
        self.rec.log(
            "image",
            &rerun::Image::from_elements(
                &image,
                [scan.w as u32, scan.h as u32],
                rerun::datatypes::ColorModel::L,
            ),
        )?;

        Ok(())
    }
}
