// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{error, fmt};

/// Failure reported by the SPI transport or detected while framing a
/// transaction.
///
/// Bus faults are never retried inside the core. A fault during a capture
/// cycle fails that cycle and leaves the device faulted until reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusFault {
    /// The transport could not complete the transfer
    Transfer(String),

    /// Fewer bytes were clocked in than the transaction requires
    Incomplete { expected: usize, actual: usize },

    /// The logical register address collides with the write discriminator
    Address(u8),
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BusFault::Transfer(msg) => write!(f, "transfer failed: {}", msg),
            BusFault::Incomplete { expected, actual } => {
                write!(f, "short transfer: {} of {} bytes", actual, expected)
            }
            BusFault::Address(addr) => {
                write!(f, "register address 0x{:02x} out of range", addr)
            }
        }
    }
}

impl error::Error for BusFault {}

/// Synchronous serial bus collaborator.
///
/// Implementations own bus acquisition and chip-select handling; the core
/// only frames transactions. Each call is one chip-select assertion and
/// blocks the calling (worker) thread until the transfer finishes.
pub trait Transport: Send {
    /// Clocks out `tx`, then clocks `rx.len()` bytes into `rx`.
    ///
    /// Returns the number of bytes actually received, which may be less
    /// than `rx.len()` on a partial transfer.
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, BusFault>;

    /// Clocks out `tx`, discarding anything received.
    fn write(&mut self, tx: &[u8]) -> Result<(), BusFault>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, BusFault> {
        (**self).write_then_read(tx, rx)
    }

    fn write(&mut self, tx: &[u8]) -> Result<(), BusFault> {
        (**self).write(tx)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, BusFault> {
        (**self).write_then_read(tx, rx)
    }

    fn write(&mut self, tx: &[u8]) -> Result<(), BusFault> {
        (**self).write(tx)
    }
}
