// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use arducam_mega::{regs, FourCC, ImageQuality, PixelFormat, SensorModel};
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Parse resolution string in format "WxH" or "W*H"
pub fn parse_resolution(s: &str) -> Result<(u32, u32), CliError> {
    let (width_str, height_str) = s
        .split_once('x')
        .or_else(|| s.split_once('*'))
        .ok_or_else(|| {
            CliError::InvalidArgs(format!(
                "Invalid resolution format (expected WxH or W*H): {}",
                s
            ))
        })?;

    let width = width_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid width in resolution: {}", s)))?;
    let height = height_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid height in resolution: {}", s)))?;

    if width == 0 || height == 0 {
        return Err(CliError::InvalidArgs(format!(
            "Resolution dimensions must be positive: {}",
            s
        )));
    }

    Ok((width, height))
}

/// Parse a pixel format given by name (jpeg, rgb565, yuv) or FOURCC
pub fn parse_pixel_format(s: &str) -> Result<PixelFormat, CliError> {
    match s.to_lowercase().as_str() {
        "jpeg" | "jpg" => return Ok(PixelFormat::Jpeg),
        "rgb565" | "rgb" => return Ok(PixelFormat::Rgb565),
        "yuv" | "yuv422" => return Ok(PixelFormat::Yuv422),
        _ => {}
    }

    FourCC::from_str(s)
        .ok()
        .and_then(PixelFormat::from_fourcc)
        .ok_or_else(|| CliError::InvalidArgs(format!("Unsupported pixel format: {}", s)))
}

/// Parse sensor model ("5mp" or "3mp") to the id the simulated module reports
pub fn parse_model(s: &str) -> Result<(SensorModel, u8), CliError> {
    match s.to_lowercase().as_str() {
        "5mp" | "5" => Ok((SensorModel::Mega5Mp, regs::SENSOR_5MP_1)),
        "3mp" | "3" => Ok((SensorModel::Mega3Mp, regs::SENSOR_3MP_1)),
        _ => Err(CliError::InvalidArgs(format!(
            "Unknown sensor model (expected 3mp or 5mp): {}",
            s
        ))),
    }
}

pub fn parse_quality(s: &str) -> Result<ImageQuality, CliError> {
    match s.to_lowercase().as_str() {
        "low" => Ok(ImageQuality::Low),
        "medium" => Ok(ImageQuality::Medium),
        "high" => Ok(ImageQuality::High),
        _ => Err(CliError::InvalidArgs(format!(
            "Invalid quality (expected low, medium or high): {}",
            s
        ))),
    }
}

/// Parse a capture period ("33ms", "1s", "500us" or plain milliseconds)
pub fn parse_period(s: &str) -> Result<Duration, CliError> {
    let s_lower = s.trim().to_lowercase();
    let invalid = || CliError::InvalidArgs(format!("Invalid period: {}", s));

    let period = if let Some(value) = s_lower.strip_suffix("ms") {
        Duration::from_millis(value.trim().parse().map_err(|_| invalid())?)
    } else if let Some(value) = s_lower.strip_suffix("us") {
        Duration::from_micros(value.trim().parse().map_err(|_| invalid())?)
    } else if let Some(value) = s_lower.strip_suffix('s') {
        Duration::from_secs(value.trim().parse().map_err(|_| invalid())?)
    } else {
        Duration::from_millis(s_lower.parse().map_err(|_| invalid())?)
    };

    if period.is_zero() {
        return Err(CliError::InvalidArgs(format!("Period must be positive: {}", s)));
    }
    Ok(period)
}

/// File extension for dumped frames
pub fn frame_extension(format: PixelFormat) -> &'static str {
    match format {
        PixelFormat::Jpeg => "jpg",
        PixelFormat::Rgb565 => "rgb",
        PixelFormat::Yuv422 => "yuv",
    }
}

/// Install signal handler for graceful shutdown on Ctrl+C
///
/// Returns an Arc<AtomicBool> that will be set to true when SIGINT is received.
/// Check this flag periodically in your main loop to exit gracefully.
pub fn install_signal_handler() -> Result<Arc<AtomicBool>, CliError> {
    let term = Arc::new(AtomicBool::new(false));

    flag::register(SIGINT, Arc::clone(&term))
        .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;

    log::debug!("Installed SIGINT handler");
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution_valid() {
        assert_eq!(parse_resolution("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_resolution("320x240").unwrap(), (320, 240));
        assert_eq!(parse_resolution("96*96").unwrap(), (96, 96));
    }

    #[test]
    fn test_parse_resolution_invalid() {
        assert!(parse_resolution("1920").is_err());
        assert!(parse_resolution("1920x").is_err());
        assert!(parse_resolution("x1080").is_err());
        assert!(parse_resolution("1920x1080x60").is_err());
        assert!(parse_resolution("0x0").is_err());
        assert!(parse_resolution("-1920x1080").is_err());
    }

    #[test]
    fn test_parse_pixel_format() {
        assert_eq!(parse_pixel_format("jpeg").unwrap(), PixelFormat::Jpeg);
        assert_eq!(parse_pixel_format("JPEG").unwrap(), PixelFormat::Jpeg);
        assert_eq!(parse_pixel_format("YUYV").unwrap(), PixelFormat::Yuv422);
        assert_eq!(parse_pixel_format("rgb565").unwrap(), PixelFormat::Rgb565);
        assert!(parse_pixel_format("NV12").is_err());
        assert!(parse_pixel_format("").is_err());
    }

    #[test]
    fn test_parse_model() {
        assert_eq!(parse_model("3MP").unwrap().0, SensorModel::Mega3Mp);
        assert_eq!(parse_model("5mp").unwrap().1, regs::SENSOR_5MP_1);
        assert!(parse_model("12mp").is_err());
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(parse_period("33ms").unwrap(), Duration::from_millis(33));
        assert_eq!(parse_period("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_period("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_period("40").unwrap(), Duration::from_millis(40));
        assert!(parse_period("0ms").is_err());
        assert!(parse_period("fast").is_err());
    }
}
