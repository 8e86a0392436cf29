// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    regs,
    transport::{BusFault, Transport},
};

/// Position of a FIFO read within one frame.
///
/// The first read of a capture primes the FIFO pointer with the single-read
/// command; every later chunk of the same frame must use the burst command.
/// Mixing them up either repeats a stale byte or skips one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoRead {
    First,
    Continuation,
}

impl FifoRead {
    pub const fn command(self) -> u8 {
        match self {
            FifoRead::First => regs::SINGLE_FIFO_READ,
            FifoRead::Continuation => regs::BURST_FIFO_READ,
        }
    }

    /// Kind of the read that follows this one.
    pub const fn next(self) -> FifoRead {
        FifoRead::Continuation
    }
}

/// Streamed FIFO reads borrowed from a [`crate::link::RegisterLink`].
#[derive(Debug)]
pub struct BulkReader<'a, T> {
    transport: &'a mut T,
}

impl<'a, T: Transport> BulkReader<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        BulkReader { transport }
    }

    /// Reads exactly `dest.len()` FIFO bytes in one transaction.
    pub fn read_block(&mut self, dest: &mut [u8], kind: FifoRead) -> Result<usize, BusFault> {
        if dest.is_empty() {
            return Ok(0);
        }

        let received = self.transport.write_then_read(&[kind.command()], dest)?;
        log::trace!("fifo {:?} read {} of {} bytes", kind, received, dest.len());
        if received != dest.len() {
            return Err(BusFault::Incomplete {
                expected: dest.len(),
                actual: received,
            });
        }

        Ok(received)
    }
}
