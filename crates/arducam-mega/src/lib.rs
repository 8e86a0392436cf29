// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! ArduCam Mega Driver Core for Rust
//!
//! Driver core for ArduCam Mega camera modules attached over SPI. The core
//! turns register-level transactions into delivered video frames through a
//! pair of buffer queues:
//!
//! - a register link and FIFO bulk reader speaking the module's wire protocol,
//! - a capture state machine that configures the sensor, triggers an exposure,
//!   waits for completion and drains the frame FIFO,
//! - an incoming/outgoing buffer queue shared between the consumer and the
//!   capture worker,
//! - a stream scheduler running single-shot or periodic capture cycles on a
//!   dedicated worker thread.
//!
//! The SPI transport itself is supplied by the embedding platform through the
//! [`transport::Transport`] trait. A register-accurate simulator is provided in
//! [`sim`] for tests and bring-up without hardware.
//!
//! # Quick Start
//!
//! ```no_run
//! use arducam_mega::{create_camera, sim::SimulatedSensor};
//! use arducam_mega::{BufferQueueing, Streaming, StreamMode, VideoBuffer};
//! use std::time::Duration;
//!
//! let (sensor, _handle) = SimulatedSensor::new();
//! let device = create_camera().with_resolution(640, 480).open(sensor)?;
//!
//! device.enqueue(VideoBuffer::new(64 * 1024))?;
//! device.start(StreamMode::SingleShot)?;
//!
//! let frame = device.dequeue(Duration::from_secs(1))?;
//! println!("captured {} bytes", frame.bytes_used());
//! # Ok::<(), arducam_mega::Error>(())
//! ```
//!
//! # Support
//!
//! - Repository: <https://github.com/EdgeFirstAI/arducam-mega>
//! - Professional support: support@au-zone.com

use std::{error, fmt, io};

/// Error type for driver core operations
#[derive(Debug)]
pub enum Error {
    /// The SPI transport failed or transferred fewer bytes than requested
    Bus(transport::BusFault),

    /// A bounded status poll ran out before the sensor reported ready
    Timeout(capture::TimeoutFault),

    /// The FIFO length reported by the sensor cannot be delivered
    Length(capture::LengthFault),

    /// A buffer queue operation failed
    Queue(queue::QueueError),

    /// The requested format or configuration is not supported
    Config(format::ConfigError),

    /// The stream control request is not valid in the current state
    State(scheduler::StateError),

    /// The sensor reported an identifier this driver does not know
    UnsupportedSensor(u8),

    /// The capture worker is no longer running
    Disconnected,

    /// I/O error from the host environment (worker thread creation)
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Bus(err) => write!(f, "bus fault: {}", err),
            Error::Timeout(err) => write!(f, "timeout: {}", err),
            Error::Length(err) => write!(f, "invalid frame length: {}", err),
            Error::Queue(err) => write!(f, "buffer queue error: {}", err),
            Error::Config(err) => write!(f, "configuration error: {}", err),
            Error::State(err) => write!(f, "stream state error: {}", err),
            Error::UnsupportedSensor(id) => write!(f, "unsupported sensor id 0x{:02x}", id),
            Error::Disconnected => write!(f, "capture worker is not running"),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Bus(err) => Some(err),
            Error::Timeout(err) => Some(err),
            Error::Length(err) => Some(err),
            Error::Queue(err) => Some(err),
            Error::Config(err) => Some(err),
            Error::State(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::UnsupportedSensor(_) | Error::Disconnected => None,
        }
    }
}

impl From<transport::BusFault> for Error {
    fn from(err: transport::BusFault) -> Self {
        Error::Bus(err)
    }
}

impl From<capture::TimeoutFault> for Error {
    fn from(err: capture::TimeoutFault) -> Self {
        Error::Timeout(err)
    }
}

impl From<capture::LengthFault> for Error {
    fn from(err: capture::LengthFault) -> Self {
        Error::Length(err)
    }
}

impl From<queue::QueueError> for Error {
    fn from(err: queue::QueueError) -> Self {
        Error::Queue(err)
    }
}

impl From<format::ConfigError> for Error {
    fn from(err: format::ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<scheduler::StateError> for Error {
    fn from(err: scheduler::StateError) -> Self {
        Error::State(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// The fourcc module provides portable handling of fourcc codes and the
/// sensor's pixel formats.
pub mod fourcc;

/// Register map and wire command bytes of the ArduCam Mega.
pub mod regs;

/// The transport module defines the SPI collaborator boundary.
pub mod transport;

/// The link module provides single-register read and write transactions.
pub mod link;

/// The bulk module provides streamed FIFO reads.
pub mod bulk;

/// The buffer module provides caller-owned video buffers.
pub mod buffer;

/// The format module provides format negotiation and the capability table.
pub mod format;

/// The queue module provides the incoming/outgoing buffer queues.
pub mod queue;

/// The capture module provides the capture state machine.
pub mod capture;

/// The signal module provides per-cycle completion notification.
pub mod signal;

/// The scheduler module runs capture cycles on a worker thread.
pub mod scheduler;

/// The camera module provides the device builder and capability traits.
pub mod camera;

/// Simulated ArduCam Mega module implementing the SPI transport.
pub mod sim;

pub use buffer::{BufferStatus, Fragment, VideoBuffer};
pub use camera::{
    create_camera, ArduCam, BufferQueueing, Device, FormatNegotiation, SensorInfo, Streaming,
};
pub use capture::{CaptureConfig, CaptureState};
pub use format::{Caps, FormatDescriptor, ImageQuality, Resolution, SensorModel};
pub use fourcc::{FourCC, PixelFormat};
pub use queue::QueueError;
pub use scheduler::{StateError, StreamMode};
pub use signal::{Notify, Signal, SignalResult};
pub use transport::{BusFault, Transport};

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedSensor(0x7e);
        assert_eq!(format!("{}", err), "unsupported sensor id 0x7e");

        let err: Error = queue::QueueError::Closed.into();
        assert_eq!(format!("{}", err), "buffer queue error: queue closed");
    }

    #[test]
    fn test_error_source() {
        let err: Error = BusFault::Incomplete {
            expected: 4,
            actual: 1,
        }
        .into();
        assert!(err.source().is_some());
        assert!(Error::Disconnected.source().is_none());
    }
}
