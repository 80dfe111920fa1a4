// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_lidarview::{
    acquire::Acquisition,
    args::{self, CloudArgs},
    lidar::Error,
    ouster::parse_metadata,
    viz::CloudSink,
    xyz::XyzLut,
};
use std::{
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};
use tracing::{error, info};

fn main() -> ExitCode {
    let args: CloudArgs = args::parse();
    args::init_logging(args.sensor.rust_log);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CloudArgs) -> Result<(), Error> {
    // Create Rerun logger using the provided parameters
    let (rec, _serve_guard) = args
        .rerun
        .init("cloudview")
        .map_err(|e| Error::Visualization(e.to_string()))?;

    let sensor = args.sensor();
    info!("connecting to {}", sensor.sensor);
    let mut client = sensor.connect()?;
    let params = parse_metadata(&client.metadata()?)?;
    params.log_summary();

    let sink = CloudSink::new(rec, XyzLut::new(&params), sensor.channel);
    let acquisition = Acquisition::from_parameters(client, sink, &params)?;

    // Runs until the sensor fails or the process is interrupted
    let stop = Arc::new(AtomicBool::new(false));
    let stats = acquisition
        .spawn(stop)?
        .join()
        .map_err(|_| Error::Io(std::io::Error::other("acquisition thread panicked")))??;
    info!("{} frames logged", stats.frames);

    Ok(())
}
