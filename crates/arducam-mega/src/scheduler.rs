// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture worker and stream control.
//!
//! Each device runs one worker thread that owns the transport and the
//! [`CaptureController`]. The consumer side talks to it through the shared
//! [`BufferQueue`] (buffers, stream mode, abort requests) and a command
//! channel for everything that has to touch the controller itself.

use crate::{
    capture::{CaptureController, CaptureState, CycleOutcome},
    format::{FormatDescriptor, ImageQuality, Resolution},
    queue::BufferQueue,
    signal::{Notify, SignalResult},
    transport::Transport,
    Error,
};
use std::{
    error, fmt,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// How capture cycles are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamMode {
    /// No cycles are started
    #[default]
    Stopped,
    /// Exactly one cycle, then back to `Stopped`
    SingleShot,
    /// One cycle per period while buffers are available
    Continuous(Duration),
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Stopped => write!(f, "stopped"),
            StreamMode::SingleShot => write!(f, "single-shot"),
            StreamMode::Continuous(period) => write!(f, "continuous every {:?}", period),
        }
    }
}

/// Stream control request not valid in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// The device has been torn down
    Closed,
    /// `Stopped`, a zero period or a period past the clock's range was
    /// passed to start
    InvalidMode(StreamMode),
    /// A stream is already running in the given mode
    AlreadyStreaming(StreamMode),
    /// A previous cycle faulted and the device has not been reclaimed
    Faulted,
    /// A capture cycle is in progress
    Busy(CaptureState),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StateError::Closed => write!(f, "device closed"),
            StateError::InvalidMode(mode) => write!(f, "cannot start stream in mode {}", mode),
            StateError::AlreadyStreaming(mode) => write!(f, "already streaming ({})", mode),
            StateError::Faulted => write!(f, "capture faulted, reclaim required"),
            StateError::Busy(state) => write!(f, "capture in progress ({})", state),
        }
    }
}

impl error::Error for StateError {}

pub(crate) enum Command {
    Configure {
        format: FormatDescriptor,
        resolution: Resolution,
        quality: ImageQuality,
    },
    SetSignal(Option<Arc<dyn Notify>>),
    Reclaim(Sender<Result<(), Error>>),
    Shutdown,
}

/// Handle to a device's capture worker.
pub struct StreamScheduler {
    queue: Arc<BufferQueue>,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for StreamScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamScheduler")
            .field("mode", &self.queue.stream_mode())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl StreamScheduler {
    /// Moves the controller onto a new worker thread.
    pub fn spawn<T>(
        controller: CaptureController<T>,
        queue: Arc<BufferQueue>,
        notifier: Option<Arc<dyn Notify>>,
    ) -> Result<Self, Error>
    where
        T: Transport + 'static,
    {
        let (commands, receiver) = mpsc::channel();
        let worker = Worker {
            controller,
            queue: Arc::clone(&queue),
            commands: receiver,
            notifier,
            tick: None,
            epoch: 0,
        };

        let handle = thread::Builder::new()
            .name("arducam-capture".to_string())
            .spawn(move || worker.run())?;

        Ok(StreamScheduler {
            queue,
            commands,
            worker: Some(handle),
        })
    }

    pub fn start(&self, mode: StreamMode) -> Result<(), StateError> {
        self.queue.begin_stream(mode)?;
        log::info!("stream started: {}", mode);
        Ok(())
    }

    /// Disarms the schedule. A cycle already in flight runs to completion.
    /// Returns the mode that was active.
    pub fn stop(&self) -> StreamMode {
        let previous = self.queue.end_stream();
        if previous != StreamMode::Stopped {
            log::info!("stream stopped: {}", previous);
        }
        previous
    }

    pub fn mode(&self) -> StreamMode {
        self.queue.stream_mode()
    }

    /// Re-arms a faulted controller. Waits for a cycle in flight to end.
    pub fn reclaim(&self) -> Result<(), Error> {
        let (reply, result) = mpsc::channel();
        self.send(Command::Reclaim(reply))?;
        result.recv().map_err(|_| Error::Disconnected)?
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), Error> {
        self.commands
            .send(command)
            .map_err(|_| Error::Disconnected)?;
        self.queue.wake();
        Ok(())
    }

    /// Stops the worker and closes the queue. Buffers already filled stay
    /// available to dequeue.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = self.commands.send(Command::Shutdown);
        self.queue.close();
        if worker.join().is_err() {
            log::error!("capture worker panicked");
        }
        log::debug!("capture worker stopped");
    }
}

impl Drop for StreamScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker<T> {
    controller: CaptureController<T>,
    queue: Arc<BufferQueue>,
    commands: Receiver<Command>,
    notifier: Option<Arc<dyn Notify>>,
    /// next periodic tick while streaming continuously
    tick: Option<Instant>,
    /// start the tick belongs to
    epoch: u64,
}

impl<T: Transport> Worker<T> {
    fn run(mut self) {
        log::debug!("capture worker running");

        while self.process_commands() && !self.queue.is_closed() {
            let (mode, epoch) = self.queue.stream();
            if epoch != self.epoch {
                self.epoch = epoch;
                self.tick = None;
            }

            let timeout = match mode {
                StreamMode::Stopped => {
                    self.tick = None;
                    None
                }
                StreamMode::SingleShot => {
                    if self.queue.ready_for_cycle() && self.single_shot() {
                        continue;
                    }
                    None
                }
                StreamMode::Continuous(period) => {
                    let now = Instant::now();
                    if self.tick.is_none() {
                        self.tick = now.checked_add(period);
                    }
                    match self.tick {
                        Some(tick) if now >= tick => {
                            if self.queue.ready_for_cycle() {
                                self.cycle();
                            } else {
                                log::trace!("tick skipped, no buffer or capture not idle");
                            }
                            self.tick = next_tick(tick, period, Instant::now());
                            continue;
                        }
                        Some(tick) => Some(tick - now),
                        // past the clock's range, never ticks
                        None => None,
                    }
                }
            };

            self.queue.wait_for_work(timeout);
        }

        log::debug!("capture worker exiting");
    }

    /// Returns false once the worker should exit.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Configure {
                    format,
                    resolution,
                    quality,
                }) => {
                    log::debug!("configure {} quality {:?}", format, quality);
                    self.controller.set_format(format, resolution);
                    self.controller.set_quality(quality);
                }
                Ok(Command::SetSignal(notifier)) => self.notifier = notifier,
                Ok(Command::Reclaim(reply)) => {
                    let _ = reply.send(self.controller.reclaim(&self.queue));
                }
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    /// Ends single-shot mode only once a cycle has taken a buffer. A flush
    /// that emptied `incoming` leaves the mode armed for the next enqueue.
    fn single_shot(&mut self) -> bool {
        let ran = self.cycle();
        if ran {
            self.queue.finish_single_shot();
        }
        ran
    }

    /// Runs one cycle and reports it exactly once. Returns false when no
    /// buffer was taken.
    fn cycle(&mut self) -> bool {
        let result = match self.controller.run_cycle(&self.queue) {
            Ok(Some(CycleOutcome::Done(frame))) => {
                log::debug!(
                    "frame {} complete ({} bytes)",
                    frame.sequence,
                    frame.length.unwrap_or(0)
                );
                SignalResult::Done
            }
            Ok(Some(CycleOutcome::Aborted(_))) => SignalResult::Aborted,
            Ok(None) => return false,
            Err(Error::State(err)) => {
                log::debug!("cycle not started: {}", err);
                return false;
            }
            Err(_) => SignalResult::Error,
        };

        if let Some(notifier) = &self.notifier {
            notifier.signal(result);
        }
        true
    }
}

/// First tick strictly after `now` on the `tick + n * period` grid, or
/// `None` once the grid runs past what `Instant` can represent.
fn next_tick(tick: Instant, period: Duration, now: Instant) -> Option<Instant> {
    let next = tick.checked_add(period)?;
    if next > now {
        return Some(next);
    }
    let behind = now.duration_since(tick).as_nanos() / period.as_nanos().max(1);
    let skipped = u32::try_from(behind).unwrap_or(u32::MAX).saturating_add(1);
    tick.checked_add(period.saturating_mul(skipped))
}
