// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Command line behavior of the `lidarview` binary.
//!
//! These runs never reach the sensor: they either stop at the help text or
//! at an argument error.

use std::process::{Command, Output};

fn lidarview(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lidarview"))
        .args(args)
        .env_remove("SENSOR")
        .env_remove("UDP_DEST")
        .env_remove("CHANNEL")
        .env_remove("REPLAY_LOOP")
        .env_remove("REALTIME")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_no_arguments_prints_help() {
    let output = lidarview(&[]);
    assert!(output.status.success(), "{:?}", output.status);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "{}", stdout);
    assert!(stdout.contains("<SENSOR>"), "{}", stdout);
}

#[test]
fn test_missing_sensor_is_an_error() {
    let output = lidarview(&["--channel", "range"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<SENSOR>"), "{}", stderr);
}

#[test]
fn test_unknown_channel_is_an_error() {
    let output = lidarview(&["os-1.local", "--channel", "depth"]);
    assert_eq!(output.status.code(), Some(2));
}
