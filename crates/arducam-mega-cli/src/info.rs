// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::utils;
use arducam_mega::{
    create_camera, sim::SimulatedSensor, CaptureConfig, Caps, FormatNegotiation, PixelFormat,
    SensorInfo,
};
use clap::Args as ClapArgs;
use serde::Serialize;
use std::time::Duration;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Sensor model of the simulated module (3mp or 5mp)
    #[arg(short, long, default_value = "5mp")]
    model: String,

    /// Show the capability table
    #[arg(long)]
    caps: bool,
}

#[derive(Debug, Serialize)]
struct SensorReport {
    version: String,
    model: String,
    camera_id: String,
    sdk: String,
    fpga_version: String,
    device_address: String,
    autofocus: bool,
    sharpness: bool,
    exposure_range: [u32; 2],
    gain_range: [u32; 2],
    resolutions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    caps: Option<CapsReport>,
}

#[derive(Debug, Serialize)]
struct CapsReport {
    min_buffers: u8,
    formats: Vec<FormatReport>,
}

#[derive(Debug, Serialize)]
struct FormatReport {
    fourcc: String,
    name: String,
    sizes: Vec<String>,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing info command: {:?}", args);

    let (model, sensor_id) = utils::parse_model(&args.model)?;
    let (sensor, handle) = SimulatedSensor::new();
    handle.set_sensor_id(sensor_id);

    let device = create_camera()
        .with_config(CaptureConfig::default().with_reset_delay(Duration::from_millis(10)))
        .open(sensor)?;
    log::debug!("Probed {}", model);

    let caps = if args.caps || json {
        Some(caps_report(device.caps()))
    } else {
        None
    };
    let report = sensor_report(device.info(), caps);

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::General(format!("Failed to serialize info: {}", e)))?;
        println!("{}", out);
    } else {
        print_text(&report);
    }

    Ok(())
}

fn sensor_report(info: &SensorInfo, caps: Option<CapsReport>) -> SensorReport {
    SensorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: info.model.to_string(),
        camera_id: format!("0x{:02x}", info.camera_id),
        sdk: info.sdk.to_string(),
        fpga_version: format!("0x{:02x}", info.fpga_version),
        device_address: format!("0x{:02x}", info.device_address),
        autofocus: info.autofocus,
        sharpness: info.sharpness,
        exposure_range: [*info.exposure_range.start(), *info.exposure_range.end()],
        gain_range: [*info.gain_range.start(), *info.gain_range.end()],
        resolutions: info.resolutions.iter().map(|r| r.to_string()).collect(),
        caps,
    }
}

fn caps_report(caps: &Caps) -> CapsReport {
    let formats = PixelFormat::ALL
        .into_iter()
        .map(|format| FormatReport {
            fourcc: format.fourcc().to_string(),
            name: format!("{:?}", format),
            sizes: caps
                .formats
                .iter()
                .filter(|cap| cap.pixel_format == format)
                .map(|cap| format!("{}x{}", cap.width_max, cap.height_max))
                .collect(),
        })
        .collect();

    CapsReport {
        min_buffers: caps.min_buffers,
        formats,
    }
}

fn print_text(report: &SensorReport) {
    println!("=== ArduCam Mega ===");
    println!("Model:           {}", report.model);
    println!("Camera ID:       {}", report.camera_id);
    println!("SDK:             {}", report.sdk);
    println!("FPGA version:    {}", report.fpga_version);
    println!("Sensor address:  {}", report.device_address);
    println!("Autofocus:       {}", if report.autofocus { "yes" } else { "no" });
    println!("Sharpness:       {}", if report.sharpness { "yes" } else { "no" });
    println!(
        "Exposure range:  {}..{}",
        report.exposure_range[0], report.exposure_range[1]
    );
    println!(
        "Gain range:      {}..{}",
        report.gain_range[0], report.gain_range[1]
    );
    println!("Resolutions:     {}", report.resolutions.join(", "));

    if let Some(caps) = &report.caps {
        println!("\n=== Capabilities ===");
        println!("Minimum buffers: {}", caps.min_buffers);
        for format in &caps.formats {
            println!("  {} ({}): {}", format.fourcc, format.name, format.sizes.join(" "));
        }
    }
}
