// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor client abstraction.
//!
//! A [`SensorClient`] reports which data became ready and reads fixed-size
//! packets. Implementations:
//!
//! - [`UdpClient`]: live sensor, configured over its HTTP API
//! - [`crate::pcap_source::PcapClient`]: capture replay (feature `pcap`)
//! - [`ScriptedClient`]: scripted states and packets for tests
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarview::client::{SensorClient, UdpClient};
//!
//! let mut client = UdpClient::connect("os-992109000000.local", None)?;
//! let params = edgefirst_lidarview::ouster::parse_metadata(&client.metadata()?)?;
//! ```

use crate::{
    lidar::{ClientState, Error},
    ouster::{PacketFormat, parse_metadata},
};
use std::{collections::VecDeque, time::Duration};

/// Connection to a sensor's data stream.
pub trait SensorClient: Send {
    /// Wait up to `timeout` for data. Returns [`ClientState::TIMEOUT`] when
    /// nothing arrived.
    fn poll(&mut self, timeout: Duration) -> Result<ClientState, Error>;

    /// Read exactly one lidar packet into the front of `buf`.
    ///
    /// Any length other than `format.lidar_packet_size` is
    /// [`Error::PacketSize`].
    fn read_lidar_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error>;

    /// Read one IMU packet into the front of `buf`.
    fn read_imu_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error>;

    /// Raw sensor metadata document.
    fn metadata(&mut self) -> Result<String, Error>;
}

impl<T: SensorClient + ?Sized> SensorClient for Box<T> {
    fn poll(&mut self, timeout: Duration) -> Result<ClientState, Error> {
        (**self).poll(timeout)
    }

    fn read_lidar_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
        (**self).read_lidar_packet(buf, format)
    }

    fn read_imu_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
        (**self).read_imu_packet(buf, format)
    }

    fn metadata(&mut self) -> Result<String, Error> {
        (**self).metadata()
    }
}

/// Fail unless exactly `expected` bytes were received.
#[inline]
pub fn check_packet_size(expected: usize, received: usize) -> Result<(), Error> {
    if expected != received {
        return Err(Error::PacketSize { expected, received });
    }
    Ok(())
}

struct ScriptedPoll {
    state: ClientState,
    lidar: Option<Vec<u8>>,
    imu: Option<Vec<u8>>,
}

/// Sensor client replaying a fixed script of poll results.
///
/// Each poll consumes one entry; once the script is exhausted every poll
/// times out.
#[derive(Default)]
pub struct ScriptedClient {
    script: VecDeque<ScriptedPoll>,
    current: Option<ScriptedPoll>,
    metadata: String,
    polls: usize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: impl Into<String>) -> Self {
        Self {
            metadata: metadata.into(),
            ..Self::default()
        }
    }

    /// Append a poll result with an optional lidar payload.
    pub fn push_state(&mut self, state: ClientState, lidar: Option<Vec<u8>>) {
        self.script.push_back(ScriptedPoll {
            state,
            lidar,
            imu: None,
        });
    }

    pub fn push_lidar(&mut self, packet: Vec<u8>) {
        self.push_state(ClientState::LIDAR_DATA, Some(packet));
    }

    pub fn push_imu(&mut self, packet: Vec<u8>) {
        self.script.push_back(ScriptedPoll {
            state: ClientState::IMU_DATA,
            lidar: None,
            imu: Some(packet),
        });
    }

    /// Number of polls served so far.
    pub fn polls(&self) -> usize {
        self.polls
    }

    /// Entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl SensorClient for ScriptedClient {
    fn poll(&mut self, _timeout: Duration) -> Result<ClientState, Error> {
        self.polls += 1;
        self.current = self.script.pop_front();
        Ok(self
            .current
            .as_ref()
            .map_or(ClientState::TIMEOUT, |entry| entry.state))
    }

    fn read_lidar_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
        let packet = self
            .current
            .as_mut()
            .and_then(|entry| entry.lidar.take())
            .unwrap_or_default();
        check_packet_size(format.lidar_packet_size, packet.len())?;
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(())
    }

    fn read_imu_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
        let packet = self
            .current
            .as_mut()
            .and_then(|entry| entry.imu.take())
            .unwrap_or_default();
        check_packet_size(format.imu_packet_size, packet.len())?;
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(())
    }

    fn metadata(&mut self) -> Result<String, Error> {
        Ok(self.metadata.clone())
    }
}

#[cfg(unix)]
pub use self::udp::UdpClient;

#[cfg(unix)]
mod udp {
    use super::*;
    use crate::ouster::SensorInfo;
    use serde_json::json;
    use std::{
        io::ErrorKind,
        net::{IpAddr, TcpStream, ToSocketAddrs, UdpSocket},
        os::fd::AsRawFd,
        thread::sleep,
    };
    use tracing::{debug, info, warn};

    /// Receive buffer requested for the lidar socket.
    const SOCKET_BUFSIZE: usize = 16 * 1024 * 1024;

    /// How long to wait for the sensor to report `RUNNING`.
    const INIT_ATTEMPTS: usize = 60;

    /// Live sensor connected over UDP.
    pub struct UdpClient {
        lidar: UdpSocket,
        imu: UdpSocket,
        metadata: String,
    }

    impl UdpClient {
        /// Configure the sensor to stream to this host (or `udp_dest`) and
        /// bind the lidar and IMU ports from its configuration.
        pub fn connect(hostname: &str, udp_dest: Option<&str>) -> Result<Self, Error> {
            let connect_err = |err: std::io::Error| Error::Connect(format!("{}: {}", hostname, err));

            let addr = (hostname, 80)
                .to_socket_addrs()
                .map_err(connect_err)?
                .next()
                .ok_or_else(|| Error::Connect(format!("{}: no address", hostname)))?;
            let local = TcpStream::connect_timeout(&addr, Duration::from_secs(5))
                .and_then(|stream| stream.local_addr())
                .map_err(connect_err)?
                .ip();

            let dest = match udp_dest {
                Some(dest) if !dest.is_empty() => dest.to_string(),
                _ => local.to_string(),
            };

            let api = format!("http://{}/api/v1/sensor", hostname);
            debug!("setting udp_dest to {}", dest);
            ureq::post(&format!("{}/config", api)).send_json(json!({ "udp_dest": dest }))?;

            wait_running(&api)?;

            let metadata = ureq::get(&format!("{}/metadata", api))
                .call()?
                .body_mut()
                .read_to_string()?;
            let params = parse_metadata(&metadata)?;

            let lidar = bind(local, params.config_params.udp_port_lidar)?;
            let imu = bind(local, params.config_params.udp_port_imu)?;
            set_socket_bufsize(&lidar, SOCKET_BUFSIZE);

            info!(
                "receiving lidar data on port {} and imu data on port {}",
                params.config_params.udp_port_lidar, params.config_params.udp_port_imu
            );

            Ok(Self {
                lidar,
                imu,
                metadata,
            })
        }

        fn recv(socket: &UdpSocket, buf: &mut [u8], expected: usize) -> Result<(), Error> {
            let len = socket.recv(buf)?;
            check_packet_size(expected, len)
        }
    }

    fn wait_running(api: &str) -> Result<(), Error> {
        for attempt in 0..INIT_ATTEMPTS {
            let sensor_info = ureq::get(&format!("{}/metadata/sensor_info", api))
                .call()?
                .body_mut()
                .read_json::<SensorInfo>()?;
            if sensor_info.status == "RUNNING" {
                return Ok(());
            }

            if attempt == 0 {
                info!("waiting for sensor to initialize ({})", sensor_info.status);
            }
            sleep(Duration::from_secs(1));
        }

        Err(Error::Connect(format!(
            "sensor not running after {} seconds",
            INIT_ATTEMPTS
        )))
    }

    // On Linux [::] will bind to IPv4 and IPv6 but not on other platforms so
    // we bind according to the local address IP version.
    fn bind(local: IpAddr, port: u16) -> Result<UdpSocket, Error> {
        let addr = match local.is_ipv4() {
            true => format!("0.0.0.0:{}", port),
            false => format!("[::]:{}", port),
        };
        Ok(UdpSocket::bind(addr)?)
    }

    #[cfg(target_os = "linux")]
    fn set_socket_bufsize(socket: &UdpSocket, size: usize) {
        let size = size as libc::c_int;
        let err = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &size as *const _ as *const libc::c_void,
                std::mem::size_of_val(&size) as libc::socklen_t,
            )
        };
        if err != 0 {
            warn!(
                "setsockopt SO_RCVBUF failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn set_socket_bufsize(_socket: &UdpSocket, _size: usize) {}

    impl SensorClient for UdpClient {
        fn poll(&mut self, timeout: Duration) -> Result<ClientState, Error> {
            let mut fds = [
                libc::pollfd {
                    fd: self.lidar.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.imu.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    return Ok(ClientState::TIMEOUT);
                }
                warn!("poll failed: {}", err);
                return Ok(ClientState::ERROR);
            }

            let mut st = ClientState::TIMEOUT;
            for (fd, flag) in fds.iter().zip([ClientState::LIDAR_DATA, ClientState::IMU_DATA]) {
                if fd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                    st |= ClientState::ERROR;
                } else if fd.revents & libc::POLLIN != 0 {
                    st |= flag;
                }
            }
            Ok(st)
        }

        fn read_lidar_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
            Self::recv(&self.lidar, buf, format.lidar_packet_size)
        }

        fn read_imu_packet(&mut self, buf: &mut [u8], format: &PacketFormat) -> Result<(), Error> {
            Self::recv(&self.imu, buf, format.imu_packet_size)
        }

        fn metadata(&mut self) -> Result<String, Error> {
            Ok(self.metadata.clone())
        }
    }
}
