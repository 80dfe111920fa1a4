// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Command line and environment configuration shared by the viewers.

#[cfg(unix)]
use crate::client::UdpClient;
use crate::{
    client::SensorClient,
    lidar::Error,
    scan::ChanField,
};
use clap::{Args, Parser};
use tracing::level_filters::LevelFilter;

/// Sensor connection options.
#[derive(Args, Debug, Clone)]
pub struct SensorArgs {
    /// Sensor hostname or IP address.  When built with pcap support this may
    /// also name a capture file, which is replayed along with the metadata
    /// stored next to it with a .json extension.
    #[arg(env)]
    pub sensor: String,

    /// Address the sensor should stream UDP data to, defaults to the address
    /// of this host on the route to the sensor.
    #[arg(long, env)]
    pub udp_dest: Option<String>,

    /// Channel rendered as intensity.
    #[arg(long, env, value_enum, default_value_t = ChanField::Range)]
    pub channel: ChanField,

    /// Replay captures in a loop.
    #[arg(long = "loop", env = "REPLAY_LOOP")]
    pub replay_loop: bool,

    /// Replay captures at their recorded rate instead of as fast as possible.
    #[arg(long, env)]
    pub realtime: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}

impl SensorArgs {
    /// Open the sensor or capture named by `sensor`.
    pub fn connect(&self) -> Result<Box<dyn SensorClient>, Error> {
        #[cfg(feature = "pcap")]
        if std::path::Path::new(&self.sensor).is_file() {
            let client = crate::pcap_source::PcapClient::open(&self.sensor)?
                .looping(self.replay_loop)
                .realtime(self.realtime);
            return Ok(Box::new(client));
        }

        #[cfg(unix)]
        return Ok(Box::new(UdpClient::connect(
            &self.sensor,
            self.udp_dest.as_deref(),
        )?));

        #[cfg(not(unix))]
        Err(Error::Connect(format!(
            "{}: live sensors are only supported on unix",
            self.sensor
        )))
    }
}

/// Range image viewer for Ouster lidar sensors.
///
/// Hold the left mouse button over the image to print the column, row and
/// raw channel value under the cursor.  Press q or Escape to quit.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ViewArgs {
    #[command(flatten)]
    pub sensor: SensorArgs,
}

/// Point cloud viewer for Ouster lidar sensors.
#[cfg(feature = "rerun")]
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CloudArgs {
    /// Rerun parameters
    #[command(flatten)]
    pub rerun: rerun::clap::RerunArgs,

    #[command(flatten)]
    pub sensor: SensorArgs,

    /// Address the sensor should stream UDP data to, same as --udp-dest.
    #[arg(value_name = "UDP_DEST")]
    pub dest: Option<String>,
}

#[cfg(feature = "rerun")]
impl CloudArgs {
    /// Sensor options with the positional destination folded in.
    pub fn sensor(&self) -> SensorArgs {
        let mut sensor = self.sensor.clone();
        if let Some(dest) = &self.dest {
            sensor.udp_dest = Some(dest.clone());
        }
        sensor
    }
}

/// Parse arguments, printing help and exiting successfully when none were
/// given at all.
pub fn parse<P: Parser>() -> P {
    if std::env::args_os().len() <= 1 {
        let mut cmd = P::command();
        // Nothing useful can be done if stdout is gone
        let _ = cmd.print_help();
        std::process::exit(0);
    }
    P::parse()
}

/// Install the fmt subscriber on stderr, keeping stdout for probe output.
pub fn init_logging(level: LevelFilter) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_view_args() {
        let args =
            ViewArgs::try_parse_from(["lidarview", "os-1.local", "--channel", "near-ir"]).unwrap();
        assert_eq!(args.sensor.sensor, "os-1.local");
        assert_eq!(args.sensor.channel, ChanField::NearIr);
        assert_eq!(args.sensor.udp_dest, None);
        assert!(!args.sensor.replay_loop);
    }

    #[test]
    fn test_view_args_invalid() {
        assert!(ViewArgs::try_parse_from(["lidarview", "host", "--channel", "depth"]).is_err());
        assert!(ViewArgs::try_parse_from(["lidarview", "host", "--rust-log", "loud"]).is_err());
    }

    #[test]
    fn test_command_is_consistent() {
        ViewArgs::command().debug_assert();
    }

    #[cfg(feature = "rerun")]
    #[test]
    fn test_cloud_command_is_consistent() {
        CloudArgs::command().debug_assert();
    }

    #[cfg(feature = "rerun")]
    #[test]
    fn test_cloud_args_udp_dest() {
        let args = CloudArgs::try_parse_from(["cloudview", "host", "10.0.0.5"]).unwrap();
        assert_eq!(args.sensor.sensor, "host");
        assert_eq!(args.sensor().udp_dest.as_deref(), Some("10.0.0.5"));

        // The positional destination wins over the option
        let args = CloudArgs::try_parse_from([
            "cloudview",
            "host",
            "10.0.0.5",
            "--udp-dest",
            "10.0.0.9",
        ])
        .unwrap();
        assert_eq!(args.sensor().udp_dest.as_deref(), Some("10.0.0.5"));

        let args = CloudArgs::try_parse_from(["cloudview", "host", "--udp-dest", "10.0.0.9"])
            .unwrap();
        assert_eq!(args.sensor().udp_dest.as_deref(), Some("10.0.0.9"));
    }
}
