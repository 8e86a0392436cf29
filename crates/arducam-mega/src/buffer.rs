// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{
    fmt,
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use unix_ts::Timestamp;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Where a buffer came from the last time the driver handed it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferStatus {
    /// Sitting in the incoming queue, or never enqueued
    #[default]
    Queued,
    /// Holds a complete frame
    Filled,
    /// Returned by a cancelling flush without frame data
    Aborted,
    /// The capture cycle filling this buffer faulted
    Error,
}

/// Receive status for fragmented frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fragment {
    /// More data of the same frame follows in another buffer
    #[default]
    Partial,
    /// The buffer holds the end of the frame
    EndOfFrame,
}

/// Caller-owned frame memory.
///
/// The consumer allocates buffers and hands them to the device with an
/// enqueue; the device hands them back through dequeue. Frame metadata is
/// only written by the driver while the buffer is in its custody, and the
/// memory itself is never released by the driver.
///
/// # Examples
///
/// ```
/// use arducam_mega::{BufferStatus, VideoBuffer};
///
/// let buf = VideoBuffer::new(4096);
/// assert_eq!(buf.capacity(), 4096);
/// assert_eq!(buf.bytes_used(), 0);
/// assert_eq!(buf.status(), BufferStatus::Queued);
/// ```
pub struct VideoBuffer {
    id: u64,
    data: Vec<u8>,
    bytes_used: usize,
    bytes_frame: usize,
    timestamp: Option<Timestamp>,
    sequence: u64,
    fragment: Fragment,
    status: BufferStatus,
}

impl VideoBuffer {
    /// Allocates a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        VideoBuffer::from_vec(vec![0; capacity])
    }

    /// Wraps existing memory; the capacity is the vector's length.
    pub fn from_vec(data: Vec<u8>) -> Self {
        VideoBuffer {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data,
            bytes_used: 0,
            bytes_frame: 0,
            timestamp: None,
            sequence: 0,
            fragment: Fragment::Partial,
            status: BufferStatus::Queued,
        }
    }

    /// Process-unique identifier, stable across enqueue/dequeue round trips.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid frame bytes at the start of the buffer.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Total length of the frame this buffer belongs to.
    pub fn bytes_frame(&self) -> usize {
        self.bytes_frame
    }

    /// Valid frame bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.bytes_used]
    }

    /// Time at which the last frame byte was received.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Capture sequence number of the frame, 0 if none was captured.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn fragment(&self) -> Fragment {
        self.fragment
    }

    pub fn status(&self) -> BufferStatus {
        self.status
    }

    /// Releases the buffer memory back to the caller.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn region_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.data[range]
    }

    pub(crate) fn reset(&mut self) {
        self.bytes_used = 0;
        self.bytes_frame = 0;
        self.timestamp = None;
        self.sequence = 0;
        self.fragment = Fragment::Partial;
        self.status = BufferStatus::Queued;
    }

    pub(crate) fn complete(&mut self, length: usize, sequence: u64) {
        self.bytes_used = length;
        self.bytes_frame = length;
        self.sequence = sequence;
        self.timestamp = Some(now());
        self.fragment = Fragment::EndOfFrame;
        self.status = BufferStatus::Filled;
    }

    pub(crate) fn abort(&mut self) {
        self.bytes_used = 0;
        self.status = BufferStatus::Aborted;
    }

    pub(crate) fn fail(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.status = BufferStatus::Error;
    }
}

impl fmt::Debug for VideoBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoBuffer")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("bytes_used", &self.bytes_used)
            .field("sequence", &self.sequence)
            .field("status", &self.status)
            .finish()
    }
}

fn now() -> Timestamp {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Timestamp::new(elapsed.as_secs() as i64, elapsed.subsec_nanos())
}
