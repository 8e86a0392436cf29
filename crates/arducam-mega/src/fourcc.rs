// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::regs;
use std::fmt;

/// Four-character code identifying a pixel format, stored in wire order.
///
/// The numeric form follows the V4L2 convention: the first character is the
/// least significant byte, independent of host endianness.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(code: &[u8; 4]) -> FourCC {
        FourCC(*code)
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub const fn from_u32(val: u32) -> FourCC {
        FourCC(val.to_le_bytes())
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.to_u32()
    }
}

impl std::str::FromStr for FourCC {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| ())?;
        Ok(FourCC(bytes))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                for b in self.0 {
                    write!(f, "{}", std::ascii::escape_default(b))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FourCC")
            .field(&format_args!("{}", self))
            .finish()
    }
}

/// Pixel formats produced by the ArduCam Mega.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Baseline JPEG produced by the module's encoder
    #[default]
    Jpeg,
    /// RGB 5:6:5 packed, 2 bytes per pixel
    Rgb565,
    /// YUV 4:2:2 packed (YUYV), 2 bytes per pixel
    Yuv422,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 3] = [PixelFormat::Jpeg, PixelFormat::Rgb565, PixelFormat::Yuv422];

    pub const fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Jpeg => FourCC::new(b"JPEG"),
            PixelFormat::Rgb565 => FourCC::new(b"RGBP"),
            PixelFormat::Yuv422 => FourCC::new(b"YUYV"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<PixelFormat> {
        PixelFormat::ALL.into_iter().find(|fmt| fmt.fourcc() == fourcc)
    }

    /// Value written to the format register to select this format.
    pub const fn register_value(self) -> u8 {
        match self {
            PixelFormat::Jpeg => regs::PIXELFORMAT_JPEG,
            PixelFormat::Rgb565 => regs::PIXELFORMAT_RGB565,
            PixelFormat::Yuv422 => regs::PIXELFORMAT_YUV,
        }
    }

    /// Bytes per pixel of the uncompressed layout, 0 for compressed formats.
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Jpeg => 0,
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => 2,
        }
    }

    pub const fn is_compressed(self) -> bool {
        matches!(self, PixelFormat::Jpeg)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_numeric_order() {
        assert_eq!(FourCC::new(b"YUYV").to_u32(), 0x56595559);
        assert_eq!(FourCC::from(0x56595559), FourCC(*b"YUYV"));
        assert_eq!("JPEG".parse::<FourCC>(), Ok(FourCC(*b"JPEG")));
        assert!("JPG".parse::<FourCC>().is_err());
    }

    #[test]
    fn test_fourcc_display() {
        assert_eq!(format!("{}", FourCC(*b"RGBP")), "RGBP");
        assert_eq!(format!("{}", FourCC([0xff, b'A', b'B', b'C'])), "\\xffABC");
        assert_eq!(format!("{:?}", FourCC(*b"YUYV")), "FourCC(YUYV)");
    }

    #[test]
    fn test_pixel_format_mapping() {
        for fmt in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_fourcc(fmt.fourcc()), Some(fmt));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC(*b"NV12")), None);
        assert_eq!(PixelFormat::Jpeg.register_value(), 0x00);
        assert_eq!(PixelFormat::Yuv422.register_value(), 0x02);
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert!(PixelFormat::Jpeg.is_compressed());
    }
}
