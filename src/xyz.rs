// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Cartesian projection of range images.
//!
//! The lookup table stores a unit direction and a beam origin offset for
//! every pixel so that projecting a scan is a single multiply-add per axis:
//!
//! ```text
//! point = range * direction + offset
//! ```
//!
//! Directions are computed in the lidar frame, where column 0 faces the rear
//! connector and the encoder angle decreases as the column index increases,
//! then moved into the sensor frame with the metadata's
//! `lidar_to_sensor_transform`.

use crate::{ouster::Parameters, scan::LidarScan};
use std::f32::consts::PI;

/// Millimeters to meters.
const RANGE_UNIT: f32 = 0.001;

/// Per-pixel direction and offset table, row-major `(row, column)`.
#[derive(Clone, Debug)]
pub struct XyzLut {
    pub w: usize,
    pub h: usize,
    direction: Vec<[f32; 3]>,
    offset: Vec<[f32; 3]>,
}

impl XyzLut {
    pub fn new(params: &Parameters) -> Self {
        let w = params.width();
        let h = params.height();
        let beams = &params.beam_intrinsics;
        let n = beams.lidar_origin_to_beam_origin_mm;
        let transform = &params.lidar_intrinsics.lidar_to_sensor_transform;
        let translation = [
            transform[3] * RANGE_UNIT,
            transform[7] * RANGE_UNIT,
            transform[11] * RANGE_UNIT,
        ];

        let mut direction = Vec::with_capacity(w * h);
        let mut offset = Vec::with_capacity(w * h);

        for row in 0..h {
            let altitude = beams.beam_altitude_angles[row] * PI / 180.0;
            let azimuth = -beams.beam_azimuth_angles[row] * PI / 180.0;

            for col in 0..w {
                let encoder = 2.0 * PI * (1.0 - col as f32 / w as f32);
                let dir = [
                    (encoder + azimuth).cos() * altitude.cos(),
                    (encoder + azimuth).sin() * altitude.cos(),
                    altitude.sin(),
                ];
                let beam = [
                    (encoder.cos() * n - dir[0] * n) * RANGE_UNIT,
                    (encoder.sin() * n - dir[1] * n) * RANGE_UNIT,
                    -dir[2] * n * RANGE_UNIT,
                ];
                direction.push(rotate(transform, dir));
                let beam = rotate(transform, beam);
                offset.push([
                    beam[0] + translation[0],
                    beam[1] + translation[1],
                    beam[2] + translation[2],
                ]);
            }
        }

        Self {
            w,
            h,
            direction,
            offset,
        }
    }

    /// Project every pixel of the scan's range channel.
    ///
    /// Pixels without a return (range zero) map to the origin.
    pub fn cartesian(&self, scan: &LidarScan) -> Vec<[f32; 3]> {
        let mut points = vec![[0.0; 3]; self.w * self.h];
        self.cartesian_into(scan, &mut points);
        points
    }

    /// Like [`Self::cartesian`] but writes into a caller-owned buffer.
    pub fn cartesian_into(&self, scan: &LidarScan, points: &mut [[f32; 3]]) {
        debug_assert_eq!(scan.w, self.w);
        debug_assert_eq!(scan.h, self.h);

        let range = scan.field(crate::scan::ChanField::Range);
        for ((i, point), r) in points.iter_mut().enumerate().zip(range.iter()) {
            if *r == 0 {
                *point = [0.0; 3];
                continue;
            }

            let r = *r as f32 * RANGE_UNIT;
            let d = self.direction[i];
            let o = self.offset[i];
            *point = [r * d[0] + o[0], r * d[1] + o[1], r * d[2] + o[2]];
        }
    }
}

/// Apply the rotation part of a row-major 4x4 transform.
fn rotate(m: &[f32; 16], v: [f32; 3]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[4] * v[0] + m[5] * v[1] + m[6] * v[2],
        m[8] * v[0] + m[9] * v[1] + m[10] * v[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ouster::parse_metadata, scan::ChanField};

    fn params(cols: usize, rows: usize) -> Parameters {
        let mut doc: serde_json::Value = serde_json::from_str(
            &crate::ouster::tests::metadata_json(cols, rows, "LEGACY"),
        )
        .unwrap();
        doc["beam_intrinsics"]["lidar_origin_to_beam_origin_mm"] = 0.0.into();
        doc["beam_intrinsics"]["beam_altitude_angles"] = serde_json::json!(vec![0.0; rows]);
        parse_metadata(&doc.to_string()).unwrap()
    }

    #[test]
    fn test_zero_range_maps_to_origin() {
        let lut = XyzLut::new(&params(4, 2));
        let scan = LidarScan::new(4, 2);
        let points = lut.cartesian(&scan);
        assert_eq!(points.len(), 8);
        assert!(points.iter().all(|p| *p == [0.0; 3]));
    }

    #[test]
    fn test_quarter_turn_directions() {
        let lut = XyzLut::new(&params(4, 1));
        let mut scan = LidarScan::new(4, 1);
        scan.field_mut(ChanField::Range).fill(2000);
        let points = lut.cartesian(&scan);

        // Column 0 points along +x, column 1 along -y (encoder at 3/4 turn)
        assert!((points[0][0] - 2.0).abs() < 1e-4);
        assert!(points[0][1].abs() < 1e-4);
        assert!(points[1][0].abs() < 1e-4);
        assert!((points[1][1] + 2.0).abs() < 1e-4);
        assert!((points[2][0] + 2.0).abs() < 1e-4);
        assert!(points.iter().all(|p| p[2].abs() < 1e-4));
    }

    #[test]
    fn test_altitude_elevates_points() {
        let mut params = params(4, 1);
        params.beam_intrinsics.beam_altitude_angles = vec![30.0];
        let lut = XyzLut::new(&params);
        let mut scan = LidarScan::new(4, 1);
        scan.field_mut(ChanField::Range).fill(1000);
        let points = lut.cartesian(&scan);
        assert!((points[0][2] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_beam_origin_offset() {
        let mut params = params(4, 1);
        params.beam_intrinsics.beam_altitude_angles = vec![30.0];
        params.beam_intrinsics.lidar_origin_to_beam_origin_mm = 15.8;
        let lut = XyzLut::new(&params);
        let mut scan = LidarScan::new(4, 1);
        scan.field_mut(ChanField::Range).fill(1000);
        let points = lut.cartesian(&scan);

        // The beam leaves 15.8 mm out from the lidar origin along the
        // encoder direction, so the range is measured from there
        let cos = 30f32.to_radians().cos();
        let x = cos + 0.0158 * (1.0 - cos);
        let z = 0.5 - 0.0158 * 0.5;
        assert!((points[0][0] - x).abs() < 1e-5, "{:?}", points[0]);
        assert!(points[0][1].abs() < 1e-5);
        assert!((points[0][2] - z).abs() < 1e-5, "{:?}", points[0]);
        // Zero range stays at the origin regardless of the offset
        scan.field_mut(ChanField::Range)[(0, 1)] = 0;
        assert_eq!(lut.cartesian(&scan)[1], [0.0; 3]);
    }

    #[test]
    fn test_lidar_to_sensor_transform() {
        let mut params = params(4, 1);
        // Half turn about z, optical center 36.18 mm above the base
        params.lidar_intrinsics.lidar_to_sensor_transform = [
            -1.0, 0.0, 0.0, 0.0, //
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 36.18, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let lut = XyzLut::new(&params);
        let mut scan = LidarScan::new(4, 1);
        scan.field_mut(ChanField::Range).fill(2000);
        let points = lut.cartesian(&scan);

        assert!((points[0][0] + 2.0).abs() < 1e-4, "{:?}", points[0]);
        assert!(points[0][1].abs() < 1e-4);
        assert!((points[0][2] - 0.03618).abs() < 1e-5, "{:?}", points[0]);
        // Column 1 faces -y in the lidar frame, +y in the sensor frame
        assert!((points[1][1] - 2.0).abs() < 1e-4, "{:?}", points[1]);
    }
}
