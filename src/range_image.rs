// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Grayscale range image rendering with a mouse probe.
//!
//! Each complete scan is auto-contrasted over the whole frame: the smallest
//! channel value maps to black and the largest to white. While the mouse
//! button is held, the pixel under the cursor is painted [`HIGHLIGHT`] and the
//! raw channel value there is printed as `"{x} {y} : {value}"`.

use crate::{
    acquire::ScanSink,
    buffer::{FrameBuffer, FrameExchange, gray, rgba},
    lidar::Error,
    mouse::MouseState,
    scan::{ChanField, LidarScan},
};
use ndarray::ArrayView2;
use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};
use tracing::{debug, trace};

/// Probe marker color.
pub const HIGHLIGHT: u32 = rgba(0xff, 0, 0, 0xff);

/// Outcome of normalizing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contrast {
    /// Values spanned `min..=max` with `max > min`.
    Stretched { min: u32, max: u32 },
    /// Every value was equal; the frame was rendered black.
    Flat(u32),
}

/// Write `field` into `out` as opaque gray pixels, stretching the full value
/// range of the frame to `0..=255`.
///
/// `out` must be at least as large as `field` (columns x rows). A frame whose
/// values are all equal has no contrast to stretch and renders black.
pub fn normalize(field: ArrayView2<'_, u32>, out: &mut FrameBuffer) -> Contrast {
    let (rows, cols) = field.dim();
    debug_assert!(out.width >= cols && out.height >= rows);

    let (min, max) = field
        .iter()
        .fold((u32::MAX, u32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if rows == 0 || cols == 0 || max == min {
        let value = if rows == 0 || cols == 0 { 0 } else { min };
        for row in 0..rows {
            for col in 0..cols {
                out.set(col, row, gray(0));
            }
        }
        return Contrast::Flat(value);
    }

    let span = (max - min) as u64;
    for ((row, col), &v) in field.indexed_iter() {
        let level = (v - min) as u64 * 255 / span;
        out.set(col, row, gray(level as u8));
    }

    Contrast::Stretched { min, max }
}

/// Raw channel value under the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeReading {
    pub x: usize,
    pub y: usize,
    pub value: u32,
}

impl fmt::Display for ProbeReading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} : {}", self.x, self.y, self.value)
    }
}

/// Mark the pixel under a held mouse button and read its value.
///
/// Returns `None` and leaves `out` untouched when the button is up or the
/// cursor lies outside the scan.
pub fn probe(
    field: ArrayView2<'_, u32>,
    out: &mut FrameBuffer,
    mouse: &MouseState,
) -> Option<ProbeReading> {
    if !mouse.down {
        return None;
    }

    let (rows, cols) = field.dim();
    let (x, y) = mouse.position_in(cols, rows)?;
    if !out.set(x, y, HIGHLIGHT) {
        return None;
    }

    Some(ProbeReading {
        x,
        y,
        value: field[(y, x)],
    })
}

/// Scan sink that publishes range images to a [`FrameExchange`].
pub struct FrameSink<W: Write + Send = io::Stdout> {
    exchange: Arc<FrameExchange>,
    back: FrameBuffer,
    channel: ChanField,
    readings: W,
}

impl FrameSink<io::Stdout> {
    /// Sink printing probe readings to stdout.
    pub fn new(exchange: Arc<FrameExchange>, width: usize, height: usize, channel: ChanField) -> Self {
        Self::with_writer(exchange, width, height, channel, io::stdout())
    }
}

impl<W: Write + Send> FrameSink<W> {
    pub fn with_writer(
        exchange: Arc<FrameExchange>,
        width: usize,
        height: usize,
        channel: ChanField,
        readings: W,
    ) -> Self {
        Self {
            exchange,
            back: FrameBuffer::new(width, height),
            channel,
            readings,
        }
    }

    pub fn into_writer(self) -> W {
        self.readings
    }
}

impl<W: Write + Send> ScanSink for FrameSink<W> {
    fn scan(&mut self, scan: &LidarScan) -> Result<(), Error> {
        let field = scan.field(self.channel);

        match normalize(field, &mut self.back) {
            Contrast::Flat(value) => {
                debug!("frame {} {} flat at {}", scan.frame_id, self.channel, value)
            }
            Contrast::Stretched { min, max } => {
                trace!("frame {} {} {}..{}", scan.frame_id, self.channel, min, max)
            }
        }

        let mut reading = None;
        let seq = self.exchange.publish(&mut self.back, |back, mouse| {
            reading = probe(field, back, mouse);
        });
        trace!("published frame {}", seq);

        if let Some(reading) = reading {
            writeln!(self.readings, "{}", reading)?;
            self.readings.flush()?;
        }

        Ok(())
    }
}
