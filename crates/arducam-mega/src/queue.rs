// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Incoming/outgoing buffer queues shared by the consumer and the capture
//! worker.
//!
//! A [`VideoBuffer`] is a value: while it sits in `incoming` the queue owns
//! it, the instant the capture worker selects it as its destination it is
//! moved out and owned by the worker, and it is moved into `outgoing` when
//! the cycle ends. A buffer can therefore never be reachable from both
//! queues. The capture state, stream mode and the in-flight abort request
//! live under the same lock so that state checks and buffer selection are a
//! single atomic step.

use crate::{
    buffer::VideoBuffer,
    capture::CaptureState,
    scheduler::{StateError, StreamMode},
};
use std::{
    collections::VecDeque,
    error, fmt,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Buffer queue operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The endpoint has been torn down
    Closed,
    /// No filled buffer is available and the caller asked not to wait
    Empty,
    /// No filled buffer arrived before the timeout expired
    Timeout,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueError::Closed => write!(f, "queue closed"),
            QueueError::Empty => write!(f, "no buffer available"),
            QueueError::Timeout => write!(f, "timed out waiting for a buffer"),
        }
    }
}

impl error::Error for QueueError {}

/// Point-in-time view of buffer custody, by buffer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub incoming: Vec<u64>,
    pub active: Option<u64>,
    pub outgoing: Vec<u64>,
    pub state: CaptureState,
}

#[derive(Debug)]
struct Inner {
    incoming: VecDeque<VideoBuffer>,
    outgoing: VecDeque<VideoBuffer>,
    active: Option<u64>,
    state: CaptureState,
    mode: StreamMode,
    /// bumped by every accepted start
    epoch: u64,
    abort: bool,
    wake: bool,
    closed: bool,
}

#[derive(Debug)]
pub struct BufferQueue {
    inner: Mutex<Inner>,
    /// outgoing became non-empty or the queue closed
    filled: Condvar,
    /// the in-flight capture handed its buffer back
    settled: Condvar,
    /// the worker has something to look at
    work: Condvar,
}

impl Default for BufferQueue {
    fn default() -> Self {
        BufferQueue::new()
    }
}

impl BufferQueue {
    pub fn new() -> Self {
        BufferQueue {
            inner: Mutex::new(Inner {
                incoming: VecDeque::new(),
                outgoing: VecDeque::new(),
                active: None,
                state: CaptureState::Idle,
                mode: StreamMode::Stopped,
                epoch: 0,
                abort: false,
                wake: false,
                closed: false,
            }),
            filled: Condvar::new(),
            settled: Condvar::new(),
            work: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands an empty buffer to the driver.
    pub fn enqueue(&self, mut buffer: VideoBuffer) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }

        buffer.reset();
        log::trace!("enqueue buffer {} ({} bytes)", buffer.id(), buffer.capacity());
        inner.incoming.push_back(buffer);
        inner.wake = true;
        self.work.notify_one();
        Ok(())
    }

    /// Takes the oldest buffer from the outgoing queue, waiting up to
    /// `timeout` for one to arrive.
    ///
    /// A zero timeout never blocks. `Duration::MAX` waits indefinitely.
    pub fn dequeue(&self, timeout: Duration) -> Result<VideoBuffer, QueueError> {
        let mut inner = self.lock();
        if let Some(buffer) = inner.outgoing.pop_front() {
            return Ok(buffer);
        }
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if timeout.is_zero() {
            return Err(QueueError::Empty);
        }

        let deadline = Instant::now().checked_add(timeout);
        loop {
            inner = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Timeout);
                    }
                    self.filled
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .filled
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
            };

            if let Some(buffer) = inner.outgoing.pop_front() {
                return Ok(buffer);
            }
            if inner.closed {
                return Err(QueueError::Closed);
            }
        }
    }

    /// Returns every queued buffer to the consumer through the outgoing
    /// queue, marked aborted.
    ///
    /// With `cancel` the in-flight capture, if any, is asked to stop at its
    /// next poll or chunk boundary and hands its buffer back aborted. Without
    /// `cancel` the call first waits for the in-flight capture to finish.
    pub fn flush(&self, cancel: bool) {
        let mut inner = self.lock();

        if cancel {
            if inner.active.is_some() {
                inner.abort = true;
            }
        } else {
            let pending = inner.active;
            while pending.is_some() && inner.active == pending && !inner.closed {
                inner = self
                    .settled
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        let flushed = inner.incoming.len();
        while let Some(mut buffer) = inner.incoming.pop_front() {
            buffer.abort();
            inner.outgoing.push_back(buffer);
        }
        if flushed > 0 {
            log::debug!("flushed {} queued buffers (cancel: {})", flushed, cancel);
            self.filled.notify_all();
        }
    }

    /// Tears the endpoint down. Filled buffers remain available to dequeue.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.mode = StreamMode::Stopped;
        self.filled.notify_all();
        self.settled.notify_all();
        self.work.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn capture_state(&self) -> CaptureState {
        self.lock().state
    }

    pub fn stream_mode(&self) -> StreamMode {
        self.lock().mode
    }

    pub fn incoming_len(&self) -> usize {
        self.lock().incoming.len()
    }

    pub fn outgoing_len(&self) -> usize {
        self.lock().outgoing.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.lock();
        QueueSnapshot {
            incoming: inner.incoming.iter().map(VideoBuffer::id).collect(),
            active: inner.active,
            outgoing: inner.outgoing.iter().map(VideoBuffer::id).collect(),
            state: inner.state,
        }
    }

    /// Selects the head of the incoming queue as the capture destination.
    ///
    /// This is the ownership transfer point: the buffer leaves the queue and
    /// the capture state leaves `Idle` in the same critical section.
    pub(crate) fn take_active(&self) -> Result<Option<VideoBuffer>, StateError> {
        let mut inner = self.lock();
        match inner.state {
            CaptureState::Idle => {}
            CaptureState::Faulted => return Err(StateError::Faulted),
            state => return Err(StateError::Busy(state)),
        }

        let Some(buffer) = inner.incoming.pop_front() else {
            return Ok(None);
        };
        inner.state = CaptureState::Configuring;
        inner.active = Some(buffer.id());
        inner.abort = false;
        Ok(Some(buffer))
    }

    pub(crate) fn set_state(&self, state: CaptureState) {
        let mut inner = self.lock();
        log::debug!("capture state {:?} -> {:?}", inner.state, state);
        inner.state = state;
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.lock().abort
    }

    /// Ends the active cycle: the buffer moves to the outgoing queue and the
    /// capture state becomes `next`.
    pub(crate) fn publish(&self, buffer: VideoBuffer, next: CaptureState) {
        let mut inner = self.lock();
        log::debug!(
            "publish buffer {} ({:?}), capture state {:?} -> {:?}",
            buffer.id(),
            buffer.status(),
            inner.state,
            next
        );
        inner.active = None;
        inner.abort = false;
        inner.state = next;
        inner.outgoing.push_back(buffer);
        self.filled.notify_one();
        self.settled.notify_all();
    }

    /// Moves a faulted device back to `Idle`. Returns the state found.
    pub(crate) fn recover(&self) -> CaptureState {
        let mut inner = self.lock();
        let found = inner.state;
        if found == CaptureState::Faulted {
            inner.state = CaptureState::Idle;
        }
        found
    }

    /// Whether a periodic tick may start a cycle right now.
    pub(crate) fn ready_for_cycle(&self) -> bool {
        let inner = self.lock();
        inner.state == CaptureState::Idle && !inner.incoming.is_empty()
    }

    pub(crate) fn begin_stream(&self, mode: StreamMode) -> Result<(), StateError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StateError::Closed);
        }
        match mode {
            StreamMode::Stopped => return Err(StateError::InvalidMode(mode)),
            StreamMode::Continuous(period)
                if period.is_zero() || Instant::now().checked_add(period).is_none() =>
            {
                return Err(StateError::InvalidMode(mode))
            }
            _ => {}
        }
        if inner.mode != StreamMode::Stopped {
            return Err(StateError::AlreadyStreaming(inner.mode));
        }
        if inner.state == CaptureState::Faulted {
            return Err(StateError::Faulted);
        }

        inner.mode = mode;
        inner.epoch += 1;
        inner.wake = true;
        self.work.notify_one();
        Ok(())
    }

    /// Current mode and the start it belongs to.
    pub(crate) fn stream(&self) -> (StreamMode, u64) {
        let inner = self.lock();
        (inner.mode, inner.epoch)
    }

    /// Returns the mode that was active.
    pub(crate) fn end_stream(&self) -> StreamMode {
        let mut inner = self.lock();
        let previous = inner.mode;
        inner.mode = StreamMode::Stopped;
        inner.wake = true;
        self.work.notify_one();
        previous
    }

    /// Drops back to `Stopped` once a single-shot cycle has run.
    pub(crate) fn finish_single_shot(&self) {
        let mut inner = self.lock();
        if inner.mode == StreamMode::SingleShot {
            inner.mode = StreamMode::Stopped;
        }
    }

    pub(crate) fn wake(&self) {
        let mut inner = self.lock();
        inner.wake = true;
        self.work.notify_one();
    }

    /// Parks the worker until woken, closed, or `timeout` elapses.
    pub(crate) fn wait_for_work(&self, timeout: Option<Duration>) {
        let mut inner = self.lock();
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        while !inner.wake && !inner.closed {
            inner = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.work
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.work.wait(inner).unwrap_or_else(PoisonError::into_inner),
            };
        }
        inner.wake = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferStatus;
    use std::{sync::Arc, thread};

    #[test]
    fn test_dequeue_zero_timeout_is_empty() {
        let queue = BufferQueue::new();
        let start = Instant::now();
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap_err(), QueueError::Empty);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_dequeue_timeout() {
        let queue = BufferQueue::new();
        let start = Instant::now();
        assert_eq!(
            queue.dequeue(Duration::from_millis(30)).unwrap_err(),
            QueueError::Timeout
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_enqueue_after_close() {
        let queue = BufferQueue::new();
        queue.close();
        assert_eq!(queue.enqueue(VideoBuffer::new(4)), Err(QueueError::Closed));
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap_err(), QueueError::Closed);
    }

    #[test]
    fn test_take_active_transfers_ownership() {
        let queue = BufferQueue::new();
        let buf = VideoBuffer::new(8);
        let id = buf.id();
        queue.enqueue(buf).unwrap();

        let active = queue.take_active().unwrap().unwrap();
        assert_eq!(active.id(), id);
        let snap = queue.snapshot();
        assert!(snap.incoming.is_empty());
        assert_eq!(snap.active, Some(id));
        assert_eq!(snap.state, CaptureState::Configuring);

        // no second trigger while a capture is in flight
        assert_eq!(
            queue.take_active().unwrap_err(),
            StateError::Busy(CaptureState::Configuring)
        );

        queue.publish(active, CaptureState::Idle);
        let snap = queue.snapshot();
        assert_eq!(snap.active, None);
        assert_eq!(snap.outgoing, vec![id]);
    }

    #[test]
    fn test_take_active_refuses_faulted() {
        let queue = BufferQueue::new();
        queue.enqueue(VideoBuffer::new(8)).unwrap();
        queue.set_state(CaptureState::Faulted);
        assert_eq!(queue.take_active().unwrap_err(), StateError::Faulted);
        assert_eq!(queue.recover(), CaptureState::Faulted);
        assert!(queue.take_active().unwrap().is_some());
    }

    #[test]
    fn test_flush_cancel_returns_queued() {
        let queue = BufferQueue::new();
        for _ in 0..3 {
            queue.enqueue(VideoBuffer::new(8)).unwrap();
        }
        let active = queue.take_active().unwrap().unwrap();

        queue.flush(true);
        assert!(queue.abort_requested());
        assert_eq!(queue.incoming_len(), 0);
        assert_eq!(queue.outgoing_len(), 2);

        queue.publish(active, CaptureState::Idle);
        assert!(!queue.abort_requested());
        for _ in 0..3 {
            let buf = queue.dequeue(Duration::ZERO).unwrap();
            assert_eq!(buf.status(), BufferStatus::Aborted);
        }
    }

    #[test]
    fn test_flush_waits_for_in_flight() {
        let queue = Arc::new(BufferQueue::new());
        queue.enqueue(VideoBuffer::new(8)).unwrap();
        queue.enqueue(VideoBuffer::new(8)).unwrap();
        let active = queue.take_active().unwrap().unwrap();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.publish(active, CaptureState::Idle);
            })
        };

        queue.flush(false);
        assert!(!queue.abort_requested());
        assert_eq!(queue.snapshot().active, None);
        assert_eq!(queue.outgoing_len(), 2);
        worker.join().unwrap();
    }

    #[test]
    fn test_dequeue_wakes_on_publish() {
        let queue = Arc::new(BufferQueue::new());
        queue.enqueue(VideoBuffer::new(8)).unwrap();
        let active = queue.take_active().unwrap().unwrap();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.publish(active, CaptureState::Idle);
            })
        };

        assert!(queue.dequeue(Duration::from_secs(5)).is_ok());
        worker.join().unwrap();
    }

    #[test]
    fn test_begin_stream_rules() {
        let queue = BufferQueue::new();
        assert_eq!(
            queue.begin_stream(StreamMode::Stopped),
            Err(StateError::InvalidMode(StreamMode::Stopped))
        );
        assert_eq!(
            queue.begin_stream(StreamMode::Continuous(Duration::ZERO)),
            Err(StateError::InvalidMode(StreamMode::Continuous(Duration::ZERO)))
        );
        let forever = StreamMode::Continuous(Duration::MAX);
        assert_eq!(
            queue.begin_stream(forever),
            Err(StateError::InvalidMode(forever))
        );
        assert_eq!(queue.stream_mode(), StreamMode::Stopped);
        queue.begin_stream(StreamMode::SingleShot).unwrap();
        assert_eq!(
            queue.begin_stream(StreamMode::SingleShot),
            Err(StateError::AlreadyStreaming(StreamMode::SingleShot))
        );
        queue.finish_single_shot();
        assert_eq!(queue.stream_mode(), StreamMode::Stopped);

        queue.set_state(CaptureState::Faulted);
        assert_eq!(
            queue.begin_stream(StreamMode::SingleShot),
            Err(StateError::Faulted)
        );
    }

    #[test]
    fn test_wait_for_work() {
        let queue = BufferQueue::new();
        let start = Instant::now();
        queue.wait_for_work(Some(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));

        queue.wake();
        let start = Instant::now();
        queue.wait_for_work(Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
