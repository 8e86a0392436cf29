// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{
    fmt,
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// How a capture cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalResult {
    Done,
    Aborted,
    Error,
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalResult::Done => write!(f, "done"),
            SignalResult::Aborted => write!(f, "aborted"),
            SignalResult::Error => write!(f, "error"),
        }
    }
}

/// Receives one notification per capture cycle.
///
/// Called from the capture worker thread after the cycle's buffer has been
/// handed to the outgoing queue. Implementations must not block for long.
pub trait Notify: Send + Sync {
    fn signal(&self, result: SignalResult);
}

impl<F> Notify for F
where
    F: Fn(SignalResult) + Send + Sync,
{
    fn signal(&self, result: SignalResult) {
        self(result)
    }
}

#[derive(Debug, Default)]
struct Raised {
    result: Option<SignalResult>,
    count: u64,
}

/// Pollable notifier holding the most recent cycle result.
///
/// # Example
///
/// ```
/// use arducam_mega::{Notify, Signal, SignalResult};
/// use std::time::Duration;
///
/// let signal = Signal::new();
/// assert_eq!(signal.poll(Duration::ZERO), None);
///
/// signal.signal(SignalResult::Done);
/// assert_eq!(signal.poll(Duration::ZERO), Some(SignalResult::Done));
/// assert_eq!(signal.count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Signal {
    raised: Mutex<Raised>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Signal::default()
    }

    /// Waits up to `timeout` for a result and consumes it.
    pub fn poll(&self, timeout: Duration) -> Option<SignalResult> {
        let deadline = Instant::now().checked_add(timeout);
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(result) = raised.result.take() {
                return Some(result);
            }

            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => return None,
                Some(deadline) => deadline - now,
                None => Duration::from_secs(3600),
            };
            raised = self
                .cond
                .wait_timeout(raised, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Clears a pending result without waiting.
    pub fn reset(&self) {
        self.raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .result = None;
    }

    /// Total number of results raised since creation.
    pub fn count(&self) -> u64 {
        self.raised
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count
    }
}

impl Notify for Signal {
    fn signal(&self, result: SignalResult) {
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        raised.result = Some(result);
        raised.count += 1;
        self.cond.notify_all();
    }
}
