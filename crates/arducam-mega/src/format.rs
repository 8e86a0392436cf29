// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Format negotiation types and the per-model capability table.
//!
//! The ArduCam Mega captures at a fixed set of resolution classes. Each class
//! is selected by writing its code to the capture resolution register; the
//! pixel format is selected through the format register.

use crate::{fourcc::PixelFormat, regs};
use std::{error, fmt};

/// Resolution classes supported by the module family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    R96x96,
    R128x128,
    Qvga,
    R320x320,
    Vga,
    Hd,
    Uxga,
    Fhd,
    Qxga,
    Wqxga2,
}

impl Resolution {
    pub const ALL: [Resolution; 10] = [
        Resolution::R96x96,
        Resolution::R128x128,
        Resolution::Qvga,
        Resolution::R320x320,
        Resolution::Vga,
        Resolution::Hd,
        Resolution::Uxga,
        Resolution::Fhd,
        Resolution::Qxga,
        Resolution::Wqxga2,
    ];

    pub const fn size(self) -> (u32, u32) {
        match self {
            Resolution::R96x96 => (96, 96),
            Resolution::R128x128 => (128, 128),
            Resolution::Qvga => (320, 240),
            Resolution::R320x320 => (320, 320),
            Resolution::Vga => (640, 480),
            Resolution::Hd => (1280, 720),
            Resolution::Uxga => (1600, 1200),
            Resolution::Fhd => (1920, 1080),
            Resolution::Qxga => (2048, 1536),
            Resolution::Wqxga2 => (2592, 1944),
        }
    }

    /// Code written to the capture resolution register. These are the
    /// module firmware's image mode codes, not the ordinal of the variant.
    pub const fn register_value(self) -> u8 {
        match self {
            Resolution::Qvga => 0x01,
            Resolution::Vga => 0x02,
            Resolution::Hd => 0x04,
            Resolution::Uxga => 0x06,
            Resolution::Fhd => 0x07,
            Resolution::Qxga => 0x08,
            Resolution::Wqxga2 => 0x09,
            Resolution::R96x96 => 0x0a,
            Resolution::R128x128 => 0x0b,
            Resolution::R320x320 => 0x0c,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Option<Resolution> {
        Resolution::ALL
            .into_iter()
            .find(|res| res.size() == (width, height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.size();
        write!(f, "{}x{}", width, height)
    }
}

/// Sensor variants distinguished by the sensor id register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorModel {
    /// 5 MP module with autofocus
    Mega5Mp,
    /// 3 MP module with sharpness control
    Mega3Mp,
}

impl SensorModel {
    pub fn from_id(id: u8) -> Option<SensorModel> {
        match id {
            regs::SENSOR_5MP_1 | regs::SENSOR_5MP_2 => Some(SensorModel::Mega5Mp),
            regs::SENSOR_3MP_1 | regs::SENSOR_3MP_2 => Some(SensorModel::Mega3Mp),
            _ => None,
        }
    }

    pub fn resolutions(self) -> Vec<Resolution> {
        Resolution::ALL
            .into_iter()
            .filter(|res| self.supports(*res))
            .collect()
    }

    pub fn supports(self, resolution: Resolution) -> bool {
        match self {
            SensorModel::Mega5Mp => true,
            SensorModel::Mega3Mp => resolution != Resolution::Wqxga2,
        }
    }

    /// Capability table in the shape the format negotiation layer consumes.
    pub fn caps(self) -> Caps {
        let formats = PixelFormat::ALL
            .into_iter()
            .flat_map(|pixel_format| {
                self.resolutions().into_iter().map(move |res| {
                    let (width, height) = res.size();
                    FormatCap {
                        pixel_format,
                        width_min: width,
                        width_max: width,
                        height_min: height,
                        height_max: height,
                        width_step: 0,
                        height_step: 0,
                    }
                })
            })
            .collect();

        Caps {
            formats,
            min_buffers: 1,
        }
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorModel::Mega5Mp => write!(f, "ArduCam Mega 5MP"),
            SensorModel::Mega3Mp => write!(f, "ArduCam Mega 3MP"),
        }
    }
}

/// Encoder quality selected through the image quality register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl ImageQuality {
    pub const fn register_value(self) -> u8 {
        match self {
            ImageQuality::Low => 0x00,
            ImageQuality::Medium => 0x01,
            ImageQuality::High => 0x02,
        }
    }
}

/// One supported combination of pixel format and frame size range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCap {
    pub pixel_format: PixelFormat,
    pub width_min: u32,
    pub width_max: u32,
    pub height_min: u32,
    pub height_max: u32,
    pub width_step: u16,
    pub height_step: u16,
}

impl FormatCap {
    pub fn contains(&self, pixel_format: PixelFormat, width: u32, height: u32) -> bool {
        self.pixel_format == pixel_format
            && (self.width_min..=self.width_max).contains(&width)
            && (self.height_min..=self.height_max).contains(&height)
    }
}

/// Capabilities of a video endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    pub formats: Vec<FormatCap>,
    /// Buffers that must be queued before a stream can make progress.
    pub min_buffers: u8,
}

/// Active frame format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of two consecutive rows.
    pub pitch: u32,
}

impl FormatDescriptor {
    /// Creates a descriptor with the tightest pitch for the format.
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        FormatDescriptor {
            pixel_format,
            width,
            height,
            pitch: width.saturating_mul(pixel_format.bytes_per_pixel()),
        }
    }

    /// Checks the descriptor against a capability table and returns the
    /// resolution class to program.
    pub fn validate(&self, caps: &Caps) -> Result<Resolution, ConfigError> {
        let min_pitch = self.width.saturating_mul(self.pixel_format.bytes_per_pixel());
        if self.pitch < min_pitch {
            return Err(ConfigError::InvalidPitch {
                pitch: self.pitch,
                min: min_pitch,
            });
        }

        if !caps
            .formats
            .iter()
            .any(|cap| cap.pixel_format == self.pixel_format)
        {
            return Err(ConfigError::UnsupportedFormat(self.pixel_format));
        }

        let supported = caps
            .formats
            .iter()
            .any(|cap| cap.contains(self.pixel_format, self.width, self.height));
        match Resolution::from_size(self.width, self.height) {
            Some(res) if supported => Ok(res),
            _ => Err(ConfigError::UnsupportedResolution {
                width: self.width,
                height: self.height,
            }),
        }
    }
}

impl Default for FormatDescriptor {
    fn default() -> Self {
        let (width, height) = Resolution::Qvga.size();
        FormatDescriptor::new(PixelFormat::Jpeg, width, height)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} pitch:{}",
            self.width, self.height, self.pixel_format, self.pitch
        )
    }
}

/// Format or configuration request rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Pixel format not in the capability table
    UnsupportedFormat(PixelFormat),

    /// Frame size not in the capability table for this sensor
    UnsupportedResolution { width: u32, height: u32 },

    /// Row pitch smaller than one row of pixels
    InvalidPitch { pitch: u32, min: u32 },

    /// Format changes are refused while a stream is running
    Busy,

    /// Capture tuning value out of range
    InvalidConfig(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::UnsupportedFormat(fmt) => write!(f, "unsupported pixel format {}", fmt),
            ConfigError::UnsupportedResolution { width, height } => {
                write!(f, "unsupported resolution {}x{}", width, height)
            }
            ConfigError::InvalidPitch { pitch, min } => {
                write!(f, "pitch {} below minimum {}", pitch, min)
            }
            ConfigError::Busy => write!(f, "device is streaming"),
            ConfigError::InvalidConfig(msg) => write!(f, "invalid capture config: {}", msg),
        }
    }
}

impl error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_register_codes() {
        assert_eq!(Resolution::Qvga.register_value(), 0x01);
        assert_eq!(Resolution::Vga.register_value(), 0x02);
        assert_eq!(Resolution::Wqxga2.register_value(), 0x09);
        assert_eq!(Resolution::R96x96.register_value(), 0x0a);
        assert_eq!(Resolution::R320x320.register_value(), 0x0c);
    }

    #[test]
    fn test_model_from_id() {
        assert_eq!(SensorModel::from_id(0x01), Some(SensorModel::Mega5Mp));
        assert_eq!(SensorModel::from_id(0x04), Some(SensorModel::Mega3Mp));
        assert_eq!(SensorModel::from_id(0x00), None);
    }

    #[test]
    fn test_caps_table() {
        let caps = SensorModel::Mega3Mp.caps();
        assert_eq!(caps.formats.len(), 3 * 9);
        assert!(!caps
            .formats
            .iter()
            .any(|cap| cap.contains(PixelFormat::Jpeg, 2592, 1944)));
        assert_eq!(SensorModel::Mega5Mp.caps().formats.len(), 3 * 10);
    }

    #[test]
    fn test_validate() {
        let caps = SensorModel::Mega5Mp.caps();

        let fmt = FormatDescriptor::new(PixelFormat::Yuv422, 640, 480);
        assert_eq!(fmt.pitch, 1280);
        assert_eq!(fmt.validate(&caps), Ok(Resolution::Vga));

        let fmt = FormatDescriptor::new(PixelFormat::Jpeg, 2592, 1944);
        assert_eq!(fmt.validate(&caps), Ok(Resolution::Wqxga2));
        assert_eq!(
            fmt.validate(&SensorModel::Mega3Mp.caps()),
            Err(ConfigError::UnsupportedResolution {
                width: 2592,
                height: 1944
            })
        );

        let fmt = FormatDescriptor::new(PixelFormat::Rgb565, 641, 480);
        assert!(matches!(
            fmt.validate(&caps),
            Err(ConfigError::UnsupportedResolution { .. })
        ));
    }

    #[test]
    fn test_validate_pitch() {
        let caps = SensorModel::Mega5Mp.caps();
        let mut fmt = FormatDescriptor::new(PixelFormat::Rgb565, 320, 240);
        fmt.pitch = 639;
        assert_eq!(
            fmt.validate(&caps),
            Err(ConfigError::InvalidPitch { pitch: 639, min: 640 })
        );

        // compressed formats carry no stride requirement
        let mut fmt = FormatDescriptor::new(PixelFormat::Jpeg, 320, 240);
        fmt.pitch = 0;
        assert_eq!(fmt.validate(&caps), Ok(Resolution::Qvga));
    }

    #[test]
    fn test_unsupported_format() {
        let caps = Caps {
            formats: vec![],
            min_buffers: 1,
        };
        let fmt = FormatDescriptor::default();
        assert_eq!(
            fmt.validate(&caps),
            Err(ConfigError::UnsupportedFormat(PixelFormat::Jpeg))
        );
    }
}
