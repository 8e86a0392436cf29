// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    buffer::VideoBuffer,
    capture::{CaptureConfig, CaptureController, CaptureState},
    format::{Caps, ConfigError, FormatDescriptor, ImageQuality, Resolution, SensorModel},
    fourcc::PixelFormat,
    link::RegisterLink,
    queue::{BufferQueue, QueueError, QueueSnapshot},
    regs,
    scheduler::{Command, StateError, StreamMode, StreamScheduler},
    signal::Notify,
    transport::Transport,
    Error,
};
use std::{
    fmt,
    ops::RangeInclusive,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

/// Format negotiation capability of a video endpoint.
pub trait FormatNegotiation {
    fn get_format(&self) -> FormatDescriptor;

    /// Validates `format` against [`FormatNegotiation::caps`] and applies it
    /// from the next capture cycle on. Refused while streaming.
    fn set_format(&self, format: FormatDescriptor) -> Result<(), Error>;

    fn caps(&self) -> &Caps;
}

/// Stream control capability of a video endpoint.
pub trait Streaming {
    fn start(&self, mode: StreamMode) -> Result<(), StateError>;

    /// Disarms the schedule; a capture in flight completes or faults on
    /// its own.
    fn stop(&self);
}

/// Buffer exchange capability of a video endpoint.
pub trait BufferQueueing {
    fn enqueue(&self, buffer: VideoBuffer) -> Result<(), QueueError>;

    fn dequeue(&self, timeout: Duration) -> Result<VideoBuffer, QueueError>;

    /// Hands every queued buffer back through dequeue. With `cancel` the
    /// capture in flight is abandoned instead of awaited.
    fn flush(&self, cancel: bool);
}

/// Build date of the module's SDK firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkVersion {
    pub year: u8,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "20{:02}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Sensor identity and control ranges read at probe time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub model: SensorModel,
    /// raw value of the sensor id register
    pub camera_id: u8,
    pub resolutions: Vec<Resolution>,
    pub exposure_range: RangeInclusive<u32>,
    pub gain_range: RangeInclusive<u32>,
    pub autofocus: bool,
    pub sharpness: bool,
    pub device_address: u8,
    pub sdk: SdkVersion,
    pub fpga_version: u8,
}

impl SensorInfo {
    fn new(model: SensorModel, camera_id: u8, sdk: SdkVersion, fpga_version: u8) -> Self {
        SensorInfo {
            model,
            camera_id,
            resolutions: model.resolutions(),
            exposure_range: 1..=30000,
            gain_range: 1..=1023,
            autofocus: model == SensorModel::Mega5Mp,
            sharpness: model == SensorModel::Mega3Mp,
            device_address: regs::SENSOR_DEVICE_ADDRESS,
            sdk,
            fpga_version,
        }
    }
}

#[derive(Clone)]
pub struct ArduCam {
    /// requested frame width, must match a resolution class
    width: u32,

    /// requested frame height, must match a resolution class
    height: u32,

    /// requested pixel format
    format: PixelFormat,

    /// encoder quality, only meaningful for JPEG
    quality: ImageQuality,

    /// capture tuning
    config: CaptureConfig,

    /// notified once per capture cycle
    signal: Option<Arc<dyn Notify>>,
}

impl ArduCam {
    pub fn with_resolution(self, width: u32, height: u32) -> ArduCam {
        ArduCam {
            width,
            height,
            format: self.format,
            quality: self.quality,
            config: self.config,
            signal: self.signal,
        }
    }

    pub fn with_format(self, format: PixelFormat) -> ArduCam {
        ArduCam {
            width: self.width,
            height: self.height,
            format,
            quality: self.quality,
            config: self.config,
            signal: self.signal,
        }
    }

    pub fn with_quality(self, quality: ImageQuality) -> ArduCam {
        ArduCam {
            width: self.width,
            height: self.height,
            format: self.format,
            quality,
            config: self.config,
            signal: self.signal,
        }
    }

    pub fn with_config(self, config: CaptureConfig) -> ArduCam {
        ArduCam {
            width: self.width,
            height: self.height,
            format: self.format,
            quality: self.quality,
            config,
            signal: self.signal,
        }
    }

    pub fn with_signal(self, signal: Arc<dyn Notify>) -> ArduCam {
        ArduCam {
            width: self.width,
            height: self.height,
            format: self.format,
            quality: self.quality,
            config: self.config,
            signal: Some(signal),
        }
    }

    /// Probes the module behind `transport` and starts its capture worker.
    pub fn open<T>(self, transport: T) -> Result<Device, Error>
    where
        T: Transport + 'static,
    {
        Device::init(self, transport)
    }
}

impl Default for ArduCam {
    fn default() -> ArduCam {
        let (width, height) = Resolution::Qvga.size();
        ArduCam {
            width,
            height,
            format: PixelFormat::Jpeg,
            quality: ImageQuality::default(),
            config: CaptureConfig::default(),
            signal: None,
        }
    }
}

impl fmt::Debug for ArduCam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArduCam")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("quality", &self.quality)
            .field("config", &self.config)
            .field("signal", &self.signal.is_some())
            .finish()
    }
}

pub fn create_camera() -> ArduCam {
    ArduCam::default()
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    format: FormatDescriptor,
    quality: ImageQuality,
}

/// An opened ArduCam Mega with a running capture worker.
///
/// All methods take `&self`; a device shared through an `Arc` can be fed
/// from one thread and drained from another. Dropping the device stops the
/// worker.
#[derive(Debug)]
pub struct Device {
    info: SensorInfo,
    caps: Caps,
    settings: Mutex<Settings>,
    queue: Arc<BufferQueue>,
    scheduler: StreamScheduler,
}

impl Device {
    fn init<T: Transport + 'static>(camera: ArduCam, transport: T) -> Result<Self, Error> {
        camera.config.validate()?;

        let mut controller = CaptureController::new(RegisterLink::new(transport), camera.config);
        let info = probe(&mut controller)?;
        let caps = info.model.caps();

        let format = FormatDescriptor::new(camera.format, camera.width, camera.height);
        let resolution = format.validate(&caps)?;
        controller.set_format(format, resolution);
        controller.set_quality(camera.quality);

        let queue = Arc::new(BufferQueue::new());
        let scheduler = StreamScheduler::spawn(controller, Arc::clone(&queue), camera.signal)?;

        log::info!(
            "opened {} (id 0x{:02x}, sdk {}, fpga 0x{:02x}) at {}",
            info.model,
            info.camera_id,
            info.sdk,
            info.fpga_version,
            format
        );

        Ok(Device {
            info,
            caps,
            settings: Mutex::new(Settings {
                format,
                quality: camera.quality,
            }),
            queue,
            scheduler,
        })
    }

    pub fn info(&self) -> &SensorInfo {
        &self.info
    }

    pub fn quality(&self) -> ImageQuality {
        self.settings().quality
    }

    /// Changes the encoder quality from the next capture cycle on.
    pub fn set_quality(&self, quality: ImageQuality) -> Result<(), Error> {
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        let resolution = settings.format.validate(&self.caps)?;
        self.scheduler.send(Command::Configure {
            format: settings.format,
            resolution,
            quality,
        })?;
        settings.quality = quality;
        Ok(())
    }

    /// Clears the FIFO and returns a faulted device to `Idle`.
    pub fn reclaim(&self) -> Result<(), Error> {
        self.scheduler.reclaim()
    }

    /// Replaces the per-cycle notifier.
    pub fn set_signal(&self, signal: Option<Arc<dyn Notify>>) -> Result<(), Error> {
        self.scheduler.send(Command::SetSignal(signal))
    }

    pub fn capture_state(&self) -> CaptureState {
        self.queue.capture_state()
    }

    pub fn stream_mode(&self) -> StreamMode {
        self.scheduler.mode()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    fn settings(&self) -> Settings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FormatNegotiation for Device {
    fn get_format(&self) -> FormatDescriptor {
        self.settings().format
    }

    fn set_format(&self, format: FormatDescriptor) -> Result<(), Error> {
        if self.scheduler.mode() != StreamMode::Stopped {
            return Err(ConfigError::Busy.into());
        }

        let resolution = format.validate(&self.caps)?;
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        self.scheduler.send(Command::Configure {
            format,
            resolution,
            quality: settings.quality,
        })?;
        settings.format = format;
        log::debug!("format set to {}", format);
        Ok(())
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }
}

impl Streaming for Device {
    fn start(&self, mode: StreamMode) -> Result<(), StateError> {
        self.scheduler.start(mode)
    }

    fn stop(&self) {
        self.scheduler.stop();
    }
}

impl BufferQueueing for Device {
    fn enqueue(&self, buffer: VideoBuffer) -> Result<(), QueueError> {
        self.queue.enqueue(buffer)
    }

    fn dequeue(&self, timeout: Duration) -> Result<VideoBuffer, QueueError> {
        self.queue.dequeue(timeout)
    }

    fn flush(&self, cancel: bool) {
        self.queue.flush(cancel)
    }
}

/// Resets the sensor and reads its identity.
fn probe<T: Transport>(controller: &mut CaptureController<T>) -> Result<SensorInfo, Error> {
    let reset_delay = controller.config().reset_delay;
    controller
        .link_mut()
        .write(regs::CAM_REG_SENSOR_RESET, regs::SENSOR_RESET_ENABLE)?;
    thread::sleep(reset_delay);
    controller.wait_sensor_idle(CaptureState::Idle)?;

    let link = controller.link_mut();
    let camera_id = link.read(regs::CAM_REG_SENSOR_ID)?;
    let model = SensorModel::from_id(camera_id).ok_or(Error::UnsupportedSensor(camera_id))?;
    let sdk = SdkVersion {
        year: link.read(regs::CAM_REG_YEAR_SDK)?,
        month: link.read(regs::CAM_REG_MONTH_SDK)?,
        day: link.read(regs::CAM_REG_DAY_SDK)?,
    };
    let fpga_version = link.read(regs::CAM_REG_FPGA_VERSION_NUMBER)?;

    Ok(SensorInfo::new(model, camera_id, sdk, fpga_version))
}
