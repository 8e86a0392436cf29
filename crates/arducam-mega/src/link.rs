// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::{
    bulk::BulkReader,
    regs,
    transport::{BusFault, Transport},
};

/// Single-register access over the SPI transport.
///
/// A write is framed as `{addr | 0x80, value}`. A read is framed as
/// `{addr & 0x7f, 0x00}` with a two byte receive window; the byte clocked in
/// while the address goes out is not valid data and is dropped.
#[derive(Debug)]
pub struct RegisterLink<T> {
    transport: T,
}

impl<T: Transport> RegisterLink<T> {
    pub fn new(transport: T) -> Self {
        RegisterLink { transport }
    }

    pub fn write(&mut self, addr: u8, value: u8) -> Result<(), BusFault> {
        check_address(addr)?;
        log::trace!("reg write 0x{:02x} <- 0x{:02x}", addr, value);
        self.transport.write(&[addr | regs::WRITE_BIT, value])
    }

    pub fn read(&mut self, addr: u8) -> Result<u8, BusFault> {
        check_address(addr)?;
        let tx = [addr & !regs::WRITE_BIT, 0x00];
        let mut rx = [0u8; 2];
        let received = self.transport.write_then_read(&tx, &mut rx)?;
        if received < rx.len() {
            return Err(BusFault::Incomplete {
                expected: rx.len(),
                actual: received,
            });
        }
        log::trace!("reg read 0x{:02x} -> 0x{:02x}", addr, rx[1]);
        Ok(rx[1])
    }

    /// Borrows the transport for streamed FIFO reads.
    pub fn bulk(&mut self) -> BulkReader<'_, T> {
        BulkReader::new(&mut self.transport)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

fn check_address(addr: u8) -> Result<(), BusFault> {
    if addr & regs::WRITE_BIT != 0 {
        return Err(BusFault::Address(addr));
    }
    Ok(())
}
