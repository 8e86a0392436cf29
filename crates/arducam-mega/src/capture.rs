// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture state machine.
//!
//! One capture cycle walks the states below. The cycle starts by taking the
//! head of the incoming queue and always ends by handing that buffer to the
//! outgoing queue, filled, aborted or failed.
//!
//! ```text
//! Idle -> Configuring -> Triggered -> AwaitingDone -> DrainingFifo -> Complete -> Idle
//!              \______________\_____________\______________\
//!                                                           -> Faulted --(reclaim)--> Idle
//! ```

use crate::{
    buffer::VideoBuffer,
    bulk::FifoRead,
    format::{ConfigError, FormatDescriptor, ImageQuality, Resolution},
    fourcc::PixelFormat,
    link::RegisterLink,
    queue::BufferQueue,
    regs,
    transport::Transport,
    Error,
};
use std::{error, fmt, thread, time::Duration};

/// Position of the device in the capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Configuring,
    Triggered,
    AwaitingDone,
    DrainingFifo,
    Complete,
    Faulted,
}

impl CaptureState {
    /// Whether a cycle currently owns a buffer.
    pub fn is_active(self) -> bool {
        !matches!(self, CaptureState::Idle | CaptureState::Faulted)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Configuring => "configuring",
            CaptureState::Triggered => "triggered",
            CaptureState::AwaitingDone => "awaiting-done",
            CaptureState::DrainingFifo => "draining-fifo",
            CaptureState::Complete => "complete",
            CaptureState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Capture tuning.
///
/// # Example
///
/// ```
/// use arducam_mega::CaptureConfig;
/// use std::time::Duration;
///
/// let config = CaptureConfig::default()
///     .with_chunk_size(2048)
///     .with_poll_interval(Duration::from_millis(1))
///     .with_poll_limit(50);
/// assert_eq!(config.chunk_size, 2048);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Bytes read per FIFO transaction
    pub chunk_size: usize,
    /// Delay between two status polls
    pub poll_interval: Duration,
    /// Status polls before a wait is declared timed out
    pub poll_limit: u32,
    /// Settle time after a sensor reset
    pub reset_delay: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            chunk_size: 4096,
            poll_interval: Duration::from_millis(5),
            poll_limit: 200,
            reset_delay: Duration::from_millis(100),
        }
    }
}

impl CaptureConfig {
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        CaptureConfig { chunk_size, ..self }
    }

    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        CaptureConfig {
            poll_interval,
            ..self
        }
    }

    pub fn with_poll_limit(self, poll_limit: u32) -> Self {
        CaptureConfig { poll_limit, ..self }
    }

    pub fn with_reset_delay(self, reset_delay: Duration) -> Self {
        CaptureConfig {
            reset_delay,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidConfig("chunk size must be non-zero"));
        }
        if self.poll_limit == 0 {
            return Err(ConfigError::InvalidConfig("poll limit must be non-zero"));
        }
        Ok(())
    }
}

/// Description of one exposure, alive from trigger to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFrame {
    pub sequence: u64,
    pub pixel_format: PixelFormat,
    pub resolution: Resolution,
    /// Frame length reported by the sensor, once read.
    pub length: Option<u32>,
}

/// A bounded status poll ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutFault {
    pub stage: CaptureState,
    pub polls: u32,
    pub waited: Duration,
}

impl fmt::Display for TimeoutFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "sensor not ready while {} after {} polls ({:?})",
            self.stage, self.polls, self.waited
        )
    }
}

impl error::Error for TimeoutFault {}

/// The reported FIFO length cannot be delivered into the active buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthFault {
    /// The sensor reported an empty FIFO
    Zero,
    /// The frame does not fit into the destination buffer
    Overflow { length: u32, capacity: usize },
}

impl fmt::Display for LengthFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LengthFault::Zero => write!(f, "sensor reported an empty FIFO"),
            LengthFault::Overflow { length, capacity } => write!(
                f,
                "frame of {} bytes exceeds buffer capacity {}",
                length, capacity
            ),
        }
    }
}

impl error::Error for LengthFault {}

/// How a cycle that did not fault ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Done(CaptureFrame),
    Aborted(CaptureFrame),
}

enum Drain {
    Complete(usize),
    Aborted,
}

/// Sequences one capture at a time over a [`RegisterLink`].
#[derive(Debug)]
pub struct CaptureController<T> {
    link: RegisterLink<T>,
    config: CaptureConfig,
    format: FormatDescriptor,
    resolution: Resolution,
    quality: ImageQuality,
    sequence: u64,
}

impl<T: Transport> CaptureController<T> {
    pub fn new(link: RegisterLink<T>, config: CaptureConfig) -> Self {
        CaptureController {
            link,
            config,
            format: FormatDescriptor::default(),
            resolution: Resolution::Qvga,
            quality: ImageQuality::default(),
            sequence: 0,
        }
    }

    /// Format and resolution class programmed at the next cycle. The caller
    /// validates the pair against the capability table.
    pub fn set_format(&mut self, format: FormatDescriptor, resolution: Resolution) {
        self.format = format;
        self.resolution = resolution;
    }

    pub fn set_quality(&mut self, quality: ImageQuality) {
        self.quality = quality;
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Sequence number of the most recent trigger.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn link_mut(&mut self) -> &mut RegisterLink<T> {
        &mut self.link
    }

    /// Runs one capture cycle into the head of the incoming queue.
    ///
    /// Returns `Ok(None)` without touching the bus when no buffer is queued.
    /// On a fault the buffer is handed back with an error status, the device
    /// is left `Faulted` and the fault is returned.
    pub fn run_cycle(&mut self, queue: &BufferQueue) -> Result<Option<CycleOutcome>, Error> {
        let Some(mut buffer) = queue.take_active()? else {
            return Ok(None);
        };

        self.sequence += 1;
        let mut frame = CaptureFrame {
            sequence: self.sequence,
            pixel_format: self.format.pixel_format,
            resolution: self.resolution,
            length: None,
        };
        log::debug!(
            "capture {} ({} {}) into buffer {}",
            frame.sequence,
            frame.pixel_format,
            frame.resolution,
            buffer.id()
        );

        match self.capture(&mut buffer, &mut frame, queue) {
            Ok(Drain::Complete(length)) => {
                buffer.complete(length, frame.sequence);
                queue.set_state(CaptureState::Complete);
                queue.publish(buffer, CaptureState::Idle);
                Ok(Some(CycleOutcome::Done(frame)))
            }
            Ok(Drain::Aborted) => {
                log::warn!("capture {} aborted by flush", frame.sequence);
                buffer.abort();
                // best effort
                if let Err(err) = self.clear_fifo() {
                    log::warn!("FIFO clear after abort failed: {}", err);
                }
                queue.publish(buffer, CaptureState::Idle);
                Ok(Some(CycleOutcome::Aborted(frame)))
            }
            Err(err) => {
                log::error!("capture {} failed: {}", frame.sequence, err);
                buffer.fail(frame.sequence);
                queue.publish(buffer, CaptureState::Faulted);
                Err(err)
            }
        }
    }

    /// Clears the FIFO and moves a faulted device back to `Idle`.
    pub fn reclaim(&mut self, queue: &BufferQueue) -> Result<(), Error> {
        let state = queue.capture_state();
        if state.is_active() {
            return Err(crate::scheduler::StateError::Busy(state).into());
        }

        self.clear_fifo()?;
        if queue.recover() == CaptureState::Faulted {
            log::info!("capture reclaimed after fault");
        }
        Ok(())
    }

    fn capture(
        &mut self,
        buffer: &mut VideoBuffer,
        frame: &mut CaptureFrame,
        queue: &BufferQueue,
    ) -> Result<Drain, Error> {
        if !self.configure_sensor(queue)? || queue.abort_requested() {
            return Ok(Drain::Aborted);
        }

        queue.set_state(CaptureState::Triggered);
        self.clear_fifo()?;
        self.link
            .write(regs::ARDUCHIP_FIFO, regs::FIFO_START_MASK)?;

        queue.set_state(CaptureState::AwaitingDone);
        if !self.await_capture_done(queue)? {
            return Ok(Drain::Aborted);
        }

        let reported = self.fifo_length()?;
        frame.length = Some(reported);
        let length = check_length(reported, buffer.capacity())?;

        queue.set_state(CaptureState::DrainingFifo);
        self.drain(buffer, length, queue)
    }

    /// Returns false when a flush cancelled the capture while the sensor
    /// was still settling.
    fn configure_sensor(&mut self, queue: &BufferQueue) -> Result<bool, Error> {
        self.link
            .write(regs::CAM_REG_FORMAT, self.format.pixel_format.register_value())?;
        self.link.write(
            regs::CAM_REG_CAPTURE_RESOLUTION,
            self.resolution.register_value(),
        )?;
        self.link
            .write(regs::CAM_REG_IMAGE_QUALITY, self.quality.register_value())?;
        self.poll_sensor_idle(CaptureState::Configuring, || queue.abort_requested())
    }

    fn clear_fifo(&mut self) -> Result<(), Error> {
        self.link
            .write(regs::ARDUCHIP_FIFO, regs::FIFO_CLEAR_ID_MASK)?;
        Ok(())
    }

    /// Polls until the sensor state machine reports idle.
    pub(crate) fn wait_sensor_idle(&mut self, stage: CaptureState) -> Result<(), Error> {
        self.poll_sensor_idle(stage, || false).map(|_| ())
    }

    /// Returns false when `cancelled` fires between polls.
    fn poll_sensor_idle(
        &mut self,
        stage: CaptureState,
        cancelled: impl Fn() -> bool,
    ) -> Result<bool, Error> {
        for polls in 0..self.config.poll_limit {
            let state = self.link.read(regs::CAM_REG_SENSOR_STATE)?;
            if state & regs::SENSOR_STATE_MASK == regs::SENSOR_STATE_IDLE {
                return Ok(true);
            }
            if cancelled() {
                return Ok(false);
            }
            if polls + 1 < self.config.poll_limit {
                thread::sleep(self.config.poll_interval);
            }
        }
        Err(self.timeout(stage).into())
    }

    /// Returns false when a flush cancelled the capture while waiting.
    fn await_capture_done(&mut self, queue: &BufferQueue) -> Result<bool, Error> {
        for polls in 0..self.config.poll_limit {
            let status = self.link.read(regs::ARDUCHIP_TRIG)?;
            if status & regs::CAP_DONE_MASK != 0 {
                log::trace!("capture done after {} polls", polls + 1);
                return Ok(true);
            }
            if queue.abort_requested() {
                return Ok(false);
            }
            if polls + 1 < self.config.poll_limit {
                thread::sleep(self.config.poll_interval);
            }
        }
        Err(self.timeout(CaptureState::AwaitingDone).into())
    }

    fn fifo_length(&mut self) -> Result<u32, Error> {
        let low = self.link.read(regs::FIFO_SIZE1)? as u32;
        let mid = self.link.read(regs::FIFO_SIZE2)? as u32;
        let high = self.link.read(regs::FIFO_SIZE3)? as u32;
        Ok(((high << 16) | (mid << 8) | low) & regs::FIFO_MAX_LENGTH)
    }

    fn drain(
        &mut self,
        buffer: &mut VideoBuffer,
        length: usize,
        queue: &BufferQueue,
    ) -> Result<Drain, Error> {
        let mut offset = 0;
        let mut kind = FifoRead::First;

        while offset < length {
            let end = length.min(offset + self.config.chunk_size);
            self.link
                .bulk()
                .read_block(buffer.region_mut(offset..end), kind)?;
            offset = end;
            kind = kind.next();

            if queue.abort_requested() {
                return Ok(Drain::Aborted);
            }
        }

        log::debug!("drained {} bytes into buffer {}", length, buffer.id());
        Ok(Drain::Complete(length))
    }

    fn timeout(&self, stage: CaptureState) -> TimeoutFault {
        let sleeps = self.config.poll_limit.saturating_sub(1);
        TimeoutFault {
            stage,
            polls: self.config.poll_limit,
            waited: self.config.poll_interval * sleeps,
        }
    }
}

fn check_length(reported: u32, capacity: usize) -> Result<usize, LengthFault> {
    if reported == 0 {
        return Err(LengthFault::Zero);
    }
    let length = reported as usize;
    if length > capacity {
        return Err(LengthFault::Overflow {
            length: reported,
            capacity,
        });
    }
    Ok(length)
}
