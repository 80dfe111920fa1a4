// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common LiDAR types shared by the sensor client, batcher and viewers.
//!
//! All fallible operations in this crate return [`Error`]. Nothing below the
//! binaries' `main` terminates the process; callers decide whether an error
//! is fatal.

use std::{fmt, ops};

/// Common error type for LiDAR operations
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// HTTP request to the sensor API failed
    Http(ureq::Error),
    /// Metadata or configuration JSON could not be parsed
    Json(serde_json::Error),
    /// Could not establish a connection to the sensor
    Connect(String),
    /// The sensor client reported an error state while polling
    SensorState,
    /// A packet read returned an unexpected number of bytes
    PacketSize { expected: usize, received: usize },
    /// Packet contents could not be decoded
    InvalidPacket(String),
    /// The UDP lidar profile is not supported by the batcher
    UnsupportedProfile(String),
    /// Sensor metadata is inconsistent or incomplete
    Metadata(String),
    /// Window creation or presentation failed
    Window(String),
    /// Visualization stream error
    Visualization(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Http(err) => write!(f, "sensor API error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::Connect(msg) => write!(f, "failed to connect: {}", msg),
            Error::SensorState => write!(f, "sensor client returned error state"),
            Error::PacketSize { expected, received } => write!(
                f,
                "failed to read a packet of the expected size: expected {} bytes, received {}",
                expected, received
            ),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::UnsupportedProfile(profile) => {
                write!(f, "unsupported udp lidar profile: {}", profile)
            }
            Error::Metadata(msg) => write!(f, "invalid sensor metadata: {}", msg),
            Error::Window(msg) => write!(f, "window error: {}", msg),
            Error::Visualization(msg) => write!(f, "visualization error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

#[cfg(feature = "rerun")]
impl From<rerun::RecordingStreamError> for Error {
    fn from(err: rerun::RecordingStreamError) -> Self {
        Error::Visualization(err.to_string())
    }
}

/// Readiness bitmask returned by [`crate::client::SensorClient::poll`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientState(u8);

impl ClientState {
    /// Nothing became ready before the poll timeout expired.
    pub const TIMEOUT: ClientState = ClientState(0);
    pub const ERROR: ClientState = ClientState(1);
    pub const LIDAR_DATA: ClientState = ClientState(2);
    pub const IMU_DATA: ClientState = ClientState(4);

    #[inline]
    pub fn contains(self, other: ClientState) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_timeout(self) -> bool {
        self.0 == 0
    }
}

impl ops::BitOr for ClientState {
    type Output = ClientState;

    fn bitor(self, rhs: ClientState) -> ClientState {
        ClientState(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for ClientState {
    fn bitor_assign(&mut self, rhs: ClientState) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_timeout() {
            return write!(f, "TIMEOUT");
        }

        let names = [
            (ClientState::ERROR, "ERROR"),
            (ClientState::LIDAR_DATA, "LIDAR_DATA"),
            (ClientState::IMU_DATA, "IMU_DATA"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|err| Error::Io(std::io::Error::other(err)))?;
    Ok(duration.as_nanos() as u64)
}
