// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Simulated ArduCam Mega module.
//!
//! [`SimulatedSensor`] answers the module's SPI protocol from a register file
//! and a scripted frame FIFO. It is handed to the driver as its
//! [`Transport`]; the paired [`SimHandle`] stays with the test or tool and
//! scripts frames, timing and faults while the driver runs.
//!
//! ```
//! use arducam_mega::{link::RegisterLink, regs, sim::SimulatedSensor};
//!
//! let (sensor, handle) = SimulatedSensor::new();
//! handle.set_sensor_id(regs::SENSOR_3MP_1);
//!
//! let mut link = RegisterLink::new(sensor);
//! assert_eq!(link.read(regs::CAM_REG_SENSOR_ID).unwrap(), regs::SENSOR_3MP_1);
//! ```

use crate::{
    regs,
    transport::{BusFault, Transport},
};
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Capture latency value for a capture that never reports done.
pub const NEVER: u32 = u32::MAX;

/// One-shot fault armed through [`SimHandle::inject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The next register read fails.
    RegisterRead,
    /// The next register write fails.
    RegisterWrite,
    /// The next FIFO read fails.
    FifoRead,
    /// After `after` good FIFO reads, one read transfers `missing` bytes
    /// less than requested.
    ShortFifoRead { after: usize, missing: usize },
}

#[derive(Debug)]
struct State {
    sensor_id: u8,
    sdk: (u8, u8, u8),
    fpga_version: u8,
    registers: [u8; 0x80],

    frames: VecDeque<Vec<u8>>,
    default_frame_len: usize,
    reported_length: Option<u32>,
    capture_latency: u32,
    sensor_busy: bool,

    fifo: Vec<u8>,
    fifo_pos: usize,
    capturing: bool,
    polls_left: u32,
    done: bool,
    reads_in_frame: usize,

    faults: Vec<Fault>,
    hold_after: Option<usize>,
    held: bool,

    writes: Vec<(u8, u8)>,
    fifo_commands: Vec<u8>,
    captures: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    gate: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// SPI side of the simulated module.
#[derive(Debug)]
pub struct SimulatedSensor {
    shared: Arc<Shared>,
}

/// Scripting and inspection side of the simulated module.
#[derive(Debug, Clone)]
pub struct SimHandle {
    shared: Arc<Shared>,
}

impl SimulatedSensor {
    /// A 5 MP module that completes captures on the first status poll and
    /// produces 3000 byte frames unless frames are scripted.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (SimulatedSensor, SimHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                sensor_id: regs::SENSOR_5MP_1,
                sdk: (24, 6, 15),
                fpga_version: 0x21,
                registers: [0; 0x80],
                frames: VecDeque::new(),
                default_frame_len: 3000,
                reported_length: None,
                capture_latency: 0,
                sensor_busy: false,
                fifo: Vec::new(),
                fifo_pos: 0,
                capturing: false,
                polls_left: 0,
                done: false,
                reads_in_frame: 0,
                faults: Vec::new(),
                hold_after: None,
                held: false,
                writes: Vec::new(),
                fifo_commands: Vec::new(),
                captures: 0,
            }),
            gate: Condvar::new(),
        });

        (
            SimulatedSensor {
                shared: Arc::clone(&shared),
            },
            SimHandle { shared },
        )
    }

    fn register_write(&self, addr: u8, value: u8) -> Result<(), BusFault> {
        let mut state = self.shared.lock();
        if take_fault(&mut state, |fault| matches!(fault, Fault::RegisterWrite)) {
            return Err(BusFault::Transfer(format!(
                "simulated write fault at 0x{:02x}",
                addr
            )));
        }

        state.writes.push((addr, value));
        state.registers[addr as usize] = value;

        match (addr, value) {
            (regs::ARDUCHIP_FIFO, regs::FIFO_CLEAR_ID_MASK) => {
                state.done = false;
                state.capturing = false;
                state.fifo_pos = 0;
                state.reads_in_frame = 0;
            }
            (regs::ARDUCHIP_FIFO, regs::FIFO_START_MASK) => {
                let frame = match state.frames.pop_front() {
                    Some(frame) => frame,
                    None => synthetic_frame(state.default_frame_len, state.captures),
                };
                state.fifo = frame;
                state.fifo_pos = 0;
                state.reads_in_frame = 0;
                state.capturing = true;
                state.done = false;
                state.polls_left = state.capture_latency;
                state.captures += 1;
            }
            (regs::CAM_REG_SENSOR_RESET, regs::SENSOR_RESET_ENABLE) => {
                state.capturing = false;
                state.done = false;
                state.fifo.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn register_read(&self, addr: u8) -> Result<u8, BusFault> {
        let mut state = self.shared.lock();
        if take_fault(&mut state, |fault| matches!(fault, Fault::RegisterRead)) {
            return Err(BusFault::Transfer(format!(
                "simulated read fault at 0x{:02x}",
                addr
            )));
        }

        let length = state
            .reported_length
            .unwrap_or(state.fifo.len() as u32)
            .min(regs::FIFO_MAX_LENGTH);
        let value = match addr {
            regs::CAM_REG_SENSOR_ID => state.sensor_id,
            regs::CAM_REG_YEAR_SDK => state.sdk.0,
            regs::CAM_REG_MONTH_SDK => state.sdk.1,
            regs::CAM_REG_DAY_SDK => state.sdk.2,
            regs::CAM_REG_FPGA_VERSION_NUMBER => state.fpga_version,
            regs::ARDUCHIP_TRIG => {
                if state.capturing && !state.done {
                    if state.polls_left == 0 {
                        state.done = true;
                    } else if state.polls_left != NEVER {
                        state.polls_left -= 1;
                    }
                }
                let done = if state.done { regs::CAP_DONE_MASK } else { 0 };
                let idle = if state.sensor_busy {
                    0
                } else {
                    regs::SENSOR_STATE_IDLE
                };
                idle | done
            }
            regs::FIFO_SIZE1 if state.done => length as u8,
            regs::FIFO_SIZE2 if state.done => (length >> 8) as u8,
            regs::FIFO_SIZE3 if state.done => (length >> 16) as u8,
            regs::FIFO_SIZE1 | regs::FIFO_SIZE2 | regs::FIFO_SIZE3 => 0,
            addr => state.registers[addr as usize],
        };
        Ok(value)
    }

    fn fifo_read(&self, command: u8, rx: &mut [u8]) -> Result<usize, BusFault> {
        let mut state = self.shared.lock();

        while state.hold_after.is_some_and(|after| state.reads_in_frame >= after) {
            if !state.held {
                state.held = true;
                self.shared.gate.notify_all();
            }
            state = self
                .shared
                .gate
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.held = false;

        if take_fault(&mut state, |fault| matches!(fault, Fault::FifoRead)) {
            return Err(BusFault::Transfer("simulated FIFO read fault".into()));
        }

        let mut missing = 0;
        for fault in state.faults.iter_mut() {
            if let Fault::ShortFifoRead { after, missing: count } = fault {
                if *after == 0 {
                    missing = (*count).max(1);
                } else {
                    *after -= 1;
                }
            }
        }
        if missing > 0 {
            take_fault(&mut state, |fault| {
                matches!(fault, Fault::ShortFifoRead { after: 0, .. })
            });
        }

        state.fifo_commands.push(command);
        state.reads_in_frame += 1;

        let delivered = rx.len().saturating_sub(missing);
        for byte in rx[..delivered].iter_mut() {
            *byte = state.fifo.get(state.fifo_pos).copied().unwrap_or(0);
            state.fifo_pos += 1;
        }
        Ok(delivered)
    }
}

impl Transport for SimulatedSensor {
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, BusFault> {
        match tx {
            [regs::SINGLE_FIFO_READ] | [regs::BURST_FIFO_READ] => self.fifo_read(tx[0], rx),
            [addr, ..] if addr & regs::WRITE_BIT == 0 => {
                let value = self.register_read(*addr)?;
                if let Some(first) = rx.first_mut() {
                    *first = 0xff;
                }
                if let Some(second) = rx.get_mut(1) {
                    *second = value;
                }
                Ok(rx.len())
            }
            _ => Err(BusFault::Transfer(format!("unexpected frame {:02x?}", tx))),
        }
    }

    fn write(&mut self, tx: &[u8]) -> Result<(), BusFault> {
        match tx {
            [addr, value] if addr & regs::WRITE_BIT != 0 => {
                self.register_write(addr & !regs::WRITE_BIT, *value)
            }
            _ => Err(BusFault::Transfer(format!("unexpected frame {:02x?}", tx))),
        }
    }
}

impl SimHandle {
    /// Queues a frame for the next capture trigger.
    pub fn push_frame(&self, frame: Vec<u8>) {
        self.shared.lock().frames.push_back(frame);
    }

    /// Length of the generated frame used when no frame is scripted.
    pub fn set_default_frame_len(&self, len: usize) {
        self.shared.lock().default_frame_len = len;
    }

    /// Overrides the length reported through the FIFO size registers.
    pub fn set_reported_length(&self, length: Option<u32>) {
        self.shared.lock().reported_length = length;
    }

    /// Status polls answered "not done" before a capture completes.
    /// [`NEVER`] keeps the capture pending forever. Applies from the next
    /// trigger.
    pub fn set_capture_latency(&self, polls: u32) {
        self.shared.lock().capture_latency = polls;
    }

    /// Keeps the sensor state register from reporting idle.
    pub fn set_sensor_busy(&self, busy: bool) {
        self.shared.lock().sensor_busy = busy;
    }

    pub fn set_sensor_id(&self, id: u8) {
        self.shared.lock().sensor_id = id;
    }

    pub fn inject(&self, fault: Fault) {
        self.shared.lock().faults.push(fault);
    }

    /// Parks every FIFO read past the first `reads` of a frame until
    /// [`SimHandle::release`] is called.
    pub fn hold_fifo_reads_after(&self, reads: usize) {
        let mut state = self.shared.lock();
        state.hold_after = Some(reads);
        state.held = false;
    }

    /// Waits until a FIFO read is parked by the hold. Returns false on
    /// timeout.
    pub fn wait_held(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while !state.held {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .gate
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Lifts the hold and lets parked reads continue.
    pub fn release(&self) {
        let mut state = self.shared.lock();
        state.hold_after = None;
        self.shared.gate.notify_all();
    }

    /// Register writes in order, by logical address.
    pub fn register_writes(&self) -> Vec<(u8, u8)> {
        self.shared.lock().writes.clone()
    }

    /// FIFO read commands in order.
    pub fn fifo_commands(&self) -> Vec<u8> {
        self.shared.lock().fifo_commands.clone()
    }

    /// Number of capture triggers seen.
    pub fn captures_started(&self) -> u64 {
        self.shared.lock().captures
    }

    pub fn clear_logs(&self) {
        let mut state = self.shared.lock();
        state.writes.clear();
        state.fifo_commands.clear();
    }
}

fn take_fault(state: &mut State, pred: impl Fn(&Fault) -> bool) -> bool {
    match state.faults.iter().position(pred) {
        Some(index) => {
            state.faults.remove(index);
            true
        }
        None => false,
    }
}

/// JPEG-framed filler whose payload depends on the capture number.
fn synthetic_frame(len: usize, seed: u64) -> Vec<u8> {
    let mut frame: Vec<u8> = (0..len)
        .map(|i| (i as u64).wrapping_mul(31).wrapping_add(seed) as u8)
        .collect();
    if len >= 4 {
        frame[..2].copy_from_slice(&[0xff, 0xd8]);
        frame[len - 2..].copy_from_slice(&[0xff, 0xd9]);
    }
    frame
}
