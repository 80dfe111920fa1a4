// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_lidarview::{
    acquire::Acquisition,
    args::{self, ViewArgs},
    buffer::FrameExchange,
    display::Display,
    lidar::Error,
    ouster::parse_metadata,
    range_image::FrameSink,
};
use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{error, info};

fn main() -> ExitCode {
    let args: ViewArgs = args::parse();
    args::init_logging(args.sensor.rust_log);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: ViewArgs) -> Result<(), Error> {
    info!("connecting to {}", args.sensor.sensor);
    let mut client = args.sensor.connect()?;
    let params = parse_metadata(&client.metadata()?)?;
    params.log_summary();

    let (w, h) = (params.width(), params.height());
    let exchange = Arc::new(FrameExchange::new(w, h));
    let sink = FrameSink::new(exchange.clone(), w, h, args.sensor.channel);
    let acquisition = Acquisition::from_parameters(client, sink, &params)?;

    let mut display = Display::new("lidarview", w, h)?;

    let stop = Arc::new(AtomicBool::new(false));
    let handle = acquisition.spawn(stop.clone())?;

    let shown = display.run(&exchange, || !handle.is_finished());

    stop.store(true, Ordering::Relaxed);
    let stats = handle
        .join()
        .map_err(|_| Error::Io(std::io::Error::other("acquisition thread panicked")))??;
    info!(
        "{} frames from {} lidar packets, {} incomplete",
        stats.frames, stats.lidar_packets, stats.incomplete
    );

    shown
}
