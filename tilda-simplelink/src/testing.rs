//! Simulated co-processor bootloader for host tests
//!
//! [`SimTarget`] is a UART that parses every packet the host writes,
//! checks it, and queues the acks and responses a real bootloader would.
//! It keeps the written SRAM, SFLASH and filesystem images so tests can
//! compare them with what was sent.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use tilda_hal::{OutputPin, UartBreak, UartRx, UartTx};

use crate::opcode::{Status, ACK};
use crate::packet::{PacketHeader, HEADER_SIZE};
use crate::sequencer::CancelToken;

pub const ROM_BOOTLOADER: [u8; 4] = [2, 0, 4, 0];
pub const PATCHED_BOOTLOADER: [u8; 4] = [2, 0, 7, 0];
pub const NWP_VERSION: [u8; 4] = [3, 7, 0, 1];

const SRAM_SIZE: usize = 16 * 4096;
const SFLASH_SIZE: usize = 256 * 4096;
const BLOCK: usize = 4096;

/// Things that happened on the link, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Break(bool),
    Reset(bool),
    DelayMs(u32),
    BootAck,
    Command(u8),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Fewer bytes queued than the host asked for
    Timeout,
}

pub struct SimTarget {
    log: EventLog,
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    host_bytes: Vec<u8>,
    commands: Vec<u8>,
    host_acks_due: usize,
    host_acks: usize,
    protocol_errors: usize,
    boot_ack_queued: bool,

    bootloader: [u8; 4],
    last_status: u8,
    status_calls: usize,
    sram: Vec<u8>,
    sflash: Vec<u8>,
    erased: Vec<(u32, usize, usize)>,
    erases: Vec<(u32, u32, u32)>,
    fs_image: Vec<u8>,
    raw_writes: usize,
    max_raw_chunk: usize,
    max_fs_chunk: usize,
    exec_count: usize,
    uart_delay: Option<u32>,

    /// Ack when break is asserted
    pub boot_ack: bool,
    /// Never answer
    pub silent: bool,
    /// Answer the next command with `00 00` and nothing else
    pub corrupt_next_ack: bool,
    /// Report FlashFail for this GetStatus, counting from 0
    pub fail_status_at: Option<usize>,
    /// Status returned for every FSProgram
    pub fs_status: i32,
    /// Never send the second ExecFromRAM ack
    pub exec_fails: bool,
    /// Cancel the token once this many raw writes arrived
    pub cancel_after_writes: Option<(usize, &'static CancelToken)>,
}

impl SimTarget {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            rx: VecDeque::new(),
            pending: Vec::new(),
            host_bytes: Vec::new(),
            commands: Vec::new(),
            host_acks_due: 0,
            host_acks: 0,
            protocol_errors: 0,
            boot_ack_queued: false,
            bootloader: ROM_BOOTLOADER,
            last_status: Status::SUCCESS,
            status_calls: 0,
            sram: vec![0; SRAM_SIZE],
            sflash: vec![0; SFLASH_SIZE],
            erased: Vec::new(),
            erases: Vec::new(),
            fs_image: Vec::new(),
            raw_writes: 0,
            max_raw_chunk: 0,
            max_fs_chunk: 0,
            exec_count: 0,
            uart_delay: None,
            boot_ack: true,
            silent: false,
            corrupt_next_ack: false,
            fail_status_at: None,
            fs_status: 0,
            exec_fails: false,
            cancel_after_writes: None,
        }
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    /// Queue bytes for the host to read, outside any exchange
    pub fn queue_raw(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Everything the host wrote
    pub fn host_bytes(&self) -> &[u8] {
        &self.host_bytes
    }

    /// Opcodes received, in order
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    pub fn host_acks(&self) -> usize {
        self.host_acks
    }

    /// Bad checksums, missing host acks and malformed payloads seen
    pub fn protocol_errors(&self) -> usize {
        self.protocol_errors
    }

    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    pub fn sflash(&self) -> &[u8] {
        &self.sflash
    }

    /// `(storage, first block, block count)` per erase
    pub fn erases(&self) -> &[(u32, u32, u32)] {
        &self.erases
    }

    pub fn fs_image(&self) -> &[u8] {
        &self.fs_image
    }

    pub fn raw_writes(&self) -> usize {
        self.raw_writes
    }

    pub fn max_raw_chunk(&self) -> usize {
        self.max_raw_chunk
    }

    pub fn max_fs_chunk(&self) -> usize {
        self.max_fs_chunk
    }

    pub fn exec_count(&self) -> usize {
        self.exec_count
    }

    pub fn uart_delay(&self) -> Option<u32> {
        self.uart_delay
    }

    fn process(&mut self) {
        loop {
            if self.host_acks_due > 0 {
                if self.pending.len() < 2 {
                    return;
                }
                if self.pending[..2] == ACK {
                    self.pending.drain(..2);
                    self.host_acks_due -= 1;
                    self.host_acks += 1;
                    continue;
                }
                self.protocol_errors += 1;
                self.host_acks_due = 0;
            }

            let header = match PacketHeader::parse(&self.pending) {
                Ok(header) => header,
                Err(_) if self.pending.len() < HEADER_SIZE => return,
                Err(_) => {
                    self.protocol_errors += 1;
                    self.pending.clear();
                    return;
                }
            };
            if self.pending.len() < header.frame_len() {
                return;
            }

            let frame: Vec<u8> = self.pending.drain(..header.frame_len()).collect();
            if header.verify(&frame[HEADER_SIZE..]).is_err() {
                self.protocol_errors += 1;
            }
            self.handle(header.opcode, &frame[HEADER_SIZE..]);
        }
    }

    fn handle(&mut self, opcode: u8, payload: &[u8]) {
        self.log.borrow_mut().push(Event::Command(opcode));
        self.commands.push(opcode);

        if self.silent {
            return;
        }
        if self.corrupt_next_ack {
            self.corrupt_next_ack = false;
            self.rx.extend([0x00, 0x00]);
            return;
        }
        self.rx.extend(ACK);

        match opcode {
            0x23 => {
                let status = if self.fail_status_at == Some(self.status_calls) {
                    Status::FlashFail.as_u8()
                } else {
                    self.last_status
                };
                self.status_calls += 1;
                self.last_status = Status::SUCCESS;
                self.rx.extend([0x00, 0x03, status, status]);
                self.host_acks_due += 1;
            }
            0x27 => self.rx.push_back(0b0000_0101),
            0x2F => {
                let mut info = [0u8; 31];
                info[1] = 0x1C;
                info[4..8].copy_from_slice(&self.bootloader);
                info[8..12].copy_from_slice(&NWP_VERSION);
                info[12..16].copy_from_slice(&[31, 0, 0, 1]);
                info[16..20].copy_from_slice(&[2, 13, 0, 2]);
                info[20] = 0x31;
                self.rx.extend(info);
                self.host_acks_due += 1;
            }
            0x31 => {
                let blocks: u16 = match be32(payload, 0) {
                    Some(0) => (SRAM_SIZE / BLOCK) as u16,
                    Some(2) => (SFLASH_SIZE / BLOCK) as u16,
                    _ => 0,
                };
                let mut info = [0u8; 11];
                info[1] = 0x0A;
                info[3..5].copy_from_slice(&(BLOCK as u16).to_be_bytes());
                info[5..7].copy_from_slice(&blocks.to_be_bytes());
                self.rx.extend(info);
                self.host_acks_due += 1;
            }
            0x30 => self.erase(payload),
            0x2D => self.raw_write(payload),
            0x32 => {
                self.exec_count += 1;
                if !self.exec_fails {
                    self.bootloader = PATCHED_BOOTLOADER;
                    self.rx.extend(ACK);
                }
            }
            0x33 => self.uart_delay = be32(payload, 0),
            0x34 => self.fs_program(payload),
            _ => self.last_status = Status::UnknownCommand.as_u8(),
        }
    }

    fn erase(&mut self, payload: &[u8]) {
        let (Some(id), Some(first), Some(count)) =
            (be32(payload, 0), be32(payload, 4), be32(payload, 8))
        else {
            self.protocol_errors += 1;
            return;
        };
        self.erases.push((id, first, count));

        let start = first as usize * BLOCK;
        let end = start + count as usize * BLOCK;
        let fits = self.storage(id).is_some_and(|storage| end <= storage.len());
        if !fits {
            self.last_status = Status::InvalidAddress.as_u8();
            return;
        }
        if let Some(storage) = self.storage(id) {
            storage[start..end].fill(0xFF);
        }
        self.erased.push((id, start, end));
    }

    fn raw_write(&mut self, payload: &[u8]) {
        let (Some(id), Some(offset), Some(len)) =
            (be32(payload, 0), be32(payload, 4), be32(payload, 8))
        else {
            self.protocol_errors += 1;
            return;
        };
        let data = &payload[12..];
        if len as usize != data.len() {
            self.protocol_errors += 1;
        }

        self.raw_writes += 1;
        self.max_raw_chunk = self.max_raw_chunk.max(data.len());

        let start = offset as usize;
        let end = start + data.len();
        let erased = self
            .erased
            .iter()
            .any(|&(eid, from, to)| eid == id && from <= start && end <= to);

        if data.len() > 4080 {
            self.last_status = Status::InvalidCommand.as_u8();
        } else if !erased {
            self.last_status = Status::FlashFail.as_u8();
        } else if let Some(storage) = self.storage(id) {
            storage[start..end].copy_from_slice(data);
        }

        if let Some((after, token)) = self.cancel_after_writes {
            if self.raw_writes == after {
                token.cancel();
            }
        }
    }

    fn fs_program(&mut self, payload: &[u8]) {
        if payload.len() < 8 {
            self.protocol_errors += 1;
            return;
        }
        let key_size = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let chunk_len = u16::from_be_bytes([payload[2], payload[3]]) as usize;
        let flags = be32(payload, 4);
        if flags != Some(0) || 8 + key_size + chunk_len != payload.len() {
            self.protocol_errors += 1;
        }

        let data = &payload[(8 + key_size).min(payload.len())..];
        self.max_fs_chunk = self.max_fs_chunk.max(data.len());
        self.fs_image.extend_from_slice(data);
        self.rx.extend(self.fs_status.to_be_bytes());
    }

    fn storage(&mut self, id: u32) -> Option<&mut Vec<u8>> {
        match id {
            0 => Some(&mut self.sram),
            2 => Some(&mut self.sflash),
            _ => None,
        }
    }
}

fn be32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

impl UartTx for SimTarget {
    type Error = SimError;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), SimError> {
        self.host_bytes.extend_from_slice(data);
        self.pending.extend_from_slice(data);
        self.process();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

impl UartRx for SimTarget {
    type Error = SimError;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, SimError> {
        if self.rx.len() < buf.len() {
            return Err(SimError::Timeout);
        }
        for byte in buf.iter_mut() {
            *byte = self.rx.pop_front().unwrap_or(0);
        }
        if self.boot_ack_queued {
            self.boot_ack_queued = false;
            self.log.borrow_mut().push(Event::BootAck);
        }
        Ok(buf.len())
    }
}

impl UartBreak for SimTarget {
    fn set_break(&mut self, asserted: bool) {
        self.log.borrow_mut().push(Event::Break(asserted));
        if asserted && self.boot_ack {
            self.rx.extend(ACK);
            self.boot_ack_queued = true;
        }
    }
}

/// Reset line that records its edges
pub struct RecordingPin {
    log: EventLog,
    high: bool,
}

impl RecordingPin {
    pub fn new(log: EventLog) -> Self {
        Self { log, high: true }
    }
}

impl OutputPin for RecordingPin {
    fn set_high(&mut self) {
        self.high = true;
        self.log.borrow_mut().push(Event::Reset(true));
    }

    fn set_low(&mut self) {
        self.high = false;
        self.log.borrow_mut().push(Event::Reset(false));
    }

    fn is_set_high(&self) -> bool {
        self.high
    }
}

/// Delay that returns at once and records the request
pub struct NoDelay {
    log: EventLog,
}

impl NoDelay {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.log.borrow_mut().push(Event::DelayMs(ms));
    }
}
