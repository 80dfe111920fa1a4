// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Acquisition loop: poll the sensor, batch packets, hand off complete scans.
//!
//! The loop runs on its own thread and stops either when the shared stop flag
//! is raised (checked before every poll) or when an error occurs. Errors are
//! returned to whoever joins the thread; nothing here exits the process.

use crate::{
    client::SensorClient,
    lidar::{ClientState, Error, timestamp},
    ouster::{ColumnWindow, PacketFormat, Parameters},
    scan::{Batcher, LidarScan, ScanBatcher},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, trace, warn};

/// Receive buffer size, large enough for any UDP datagram.
pub const UDP_BUF_SIZE: usize = 65536;

/// Default bound on a single poll so the stop flag is observed promptly.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Consumer of complete scans.
pub trait ScanSink: Send {
    fn scan(&mut self, scan: &LidarScan) -> Result<(), Error>;
}

/// What a single [`Acquisition::step`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Poll timed out
    Idle,
    /// Packets were consumed but no scan finished
    Packet,
    /// A complete scan was handed to the sink
    Frame,
    /// A scan finished with columns missing inside the column window
    Incomplete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub lidar_packets: u64,
    pub imu_packets: u64,
    pub frames: u64,
    pub incomplete: u64,
}

pub struct Acquisition<C, B, S> {
    client: C,
    batcher: B,
    sink: S,
    format: PacketFormat,
    window: ColumnWindow,
    scan: LidarScan,
    buf: Vec<u8>,
    poll_timeout: Duration,
    stats: AcquisitionStats,
    last_frame: Option<u64>,
}

impl<C, B, S> Acquisition<C, B, S>
where
    C: SensorClient,
    B: Batcher,
    S: ScanSink,
{
    pub fn new(
        client: C,
        batcher: B,
        sink: S,
        format: PacketFormat,
        window: ColumnWindow,
        scan: LidarScan,
    ) -> Self {
        Self {
            client,
            batcher,
            sink,
            format,
            window,
            scan,
            buf: vec![0; UDP_BUF_SIZE],
            poll_timeout: POLL_TIMEOUT,
            stats: AcquisitionStats::default(),
            last_frame: None,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Poll once and service whatever became ready.
    pub fn step(&mut self) -> Result<Step, Error> {
        let st = self.client.poll(self.poll_timeout)?;
        trace!("poll: {}", st);

        if st.contains(ClientState::ERROR) {
            return Err(Error::SensorState);
        }

        if st.is_timeout() {
            return Ok(Step::Idle);
        }

        let mut step = Step::Packet;

        if st.contains(ClientState::LIDAR_DATA) {
            self.client.read_lidar_packet(&mut self.buf, &self.format)?;
            self.stats.lidar_packets += 1;

            let packet = &self.buf[..self.format.lidar_packet_size];
            if self.batcher.batch(packet, &mut self.scan)? {
                step = self.finish_scan()?;
            }
        }

        if st.contains(ClientState::IMU_DATA) {
            self.client.read_imu_packet(&mut self.buf, &self.format)?;
            self.stats.imu_packets += 1;
        }

        Ok(step)
    }

    fn finish_scan(&mut self) -> Result<Step, Error> {
        if !self.scan.complete(self.window) {
            self.stats.incomplete += 1;
            debug!(
                "frame {} incomplete over column window {}",
                self.scan.frame_id, self.window
            );
            return Ok(Step::Incomplete);
        }

        self.sink.scan(&self.scan)?;
        self.stats.frames += 1;

        let now = timestamp()?;
        if let Some(last) = self.last_frame {
            debug!(
                "frame {} complete at sensor time {} ns, {:.1} ms since previous",
                self.scan.frame_id,
                self.scan.frame_timestamp(),
                (now - last) as f64 / 1e6
            );
        }
        self.last_frame = Some(now);

        Ok(Step::Frame)
    }

    /// Run until `stop` is raised or an error occurs.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<AcquisitionStats, Error> {
        while !stop.load(Ordering::Relaxed) {
            self.step()?;
        }

        debug!("acquisition stopped: {:?}", self.stats);
        Ok(self.stats)
    }
}

impl<C, S> Acquisition<C, ScanBatcher, S>
where
    C: SensorClient,
    S: ScanSink,
{
    /// Acquisition for the sensor described by `params`, batching with
    /// [`ScanBatcher`].
    pub fn from_parameters(
        client: C,
        sink: S,
        params: &Parameters,
    ) -> Result<Self, Error> {
        let format = PacketFormat::new(params)?;
        let (w, h) = (params.width(), params.height());
        Ok(Self::new(
            client,
            ScanBatcher::new(w, format.clone()),
            sink,
            format,
            params.column_window(),
            LidarScan::new(w, h),
        ))
    }
}

impl<C, B, S> Acquisition<C, B, S>
where
    C: SensorClient + 'static,
    B: Batcher + 'static,
    S: ScanSink + 'static,
{
    /// Run on a named thread. Raising `stop` ends the loop; the join result
    /// carries the loop's error if it failed.
    pub fn spawn(
        mut self,
        stop: Arc<AtomicBool>,
    ) -> Result<JoinHandle<Result<AcquisitionStats, Error>>, Error> {
        let handle = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                let result = self.run(&stop);
                if let Err(err) = &result {
                    warn!("acquisition failed: {}", err);
                }
                result
            })?;
        Ok(handle)
    }
}
