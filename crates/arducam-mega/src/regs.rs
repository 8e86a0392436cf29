// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Register addresses, bit masks and command bytes.
//!
//! Only the registers the capture sequence touches are listed. Addresses are
//! logical (7-bit); the write discriminator is applied by the register link.

/// Wire-level discriminator: set for register writes, clear for reads.
pub const WRITE_BIT: u8 = 0x80;

/// FIFO control register.
pub const ARDUCHIP_FIFO: u8 = 0x04;
pub const FIFO_CLEAR_ID_MASK: u8 = 0x01;
pub const FIFO_START_MASK: u8 = 0x02;

/// Sensor state / trigger status register.
pub const ARDUCHIP_TRIG: u8 = 0x44;
pub const VSYNC_MASK: u8 = 0x01;
pub const SHUTTER_MASK: u8 = 0x02;
pub const CAP_DONE_MASK: u8 = 0x04;

/// FIFO length, low/mid/high bytes of a 24-bit count.
pub const FIFO_SIZE1: u8 = 0x45;
pub const FIFO_SIZE2: u8 = 0x46;
pub const FIFO_SIZE3: u8 = 0x47;

/// Burst FIFO read, used for every chunk after the first.
pub const BURST_FIFO_READ: u8 = 0x3C;
/// Single FIFO read, primes the FIFO pointer on the first chunk.
pub const SINGLE_FIFO_READ: u8 = 0x3D;

pub const CAM_REG_POWER_CONTROL: u8 = 0x02;
pub const CAM_REG_SENSOR_RESET: u8 = 0x07;
pub const CAM_REG_FORMAT: u8 = 0x20;
pub const CAM_REG_CAPTURE_RESOLUTION: u8 = 0x21;
pub const CAM_REG_IMAGE_QUALITY: u8 = 0x2A;
pub const CAM_REG_SENSOR_ID: u8 = 0x40;
pub const CAM_REG_YEAR_SDK: u8 = 0x41;
pub const CAM_REG_MONTH_SDK: u8 = 0x42;
pub const CAM_REG_DAY_SDK: u8 = 0x43;
pub const CAM_REG_SENSOR_STATE: u8 = 0x44;
pub const CAM_REG_FPGA_VERSION_NUMBER: u8 = 0x49;

pub const SENSOR_STATE_MASK: u8 = 0x03;
pub const SENSOR_STATE_IDLE: u8 = 1 << 1;
pub const SENSOR_RESET_ENABLE: u8 = 1 << 6;

pub const PIXELFORMAT_JPEG: u8 = 0x00;
pub const PIXELFORMAT_RGB565: u8 = 0x01;
pub const PIXELFORMAT_YUV: u8 = 0x02;

pub const SENSOR_5MP_1: u8 = 0x01;
pub const SENSOR_3MP_1: u8 = 0x02;
pub const SENSOR_5MP_2: u8 = 0x03;
pub const SENSOR_3MP_2: u8 = 0x04;

/// Fixed I2C address of the image sensor behind the module's bridge.
pub const SENSOR_DEVICE_ADDRESS: u8 = 0x78;

/// Largest count the three FIFO size registers can express.
pub const FIFO_MAX_LENGTH: u32 = 0x00ff_ffff;
