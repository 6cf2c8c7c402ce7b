//! Byte-level exchange with the bootloader
//!
//! Every command goes through the same handshake:
//!
//! ```text
//! Idle ─send_command─> AwaitAck ─recv_ack─> AwaitResponse ─recv_response─> AwaitFinalAck ─send_ack─> Idle
//!                         │                      (if any)                     (if required)
//!                         └─ bad ack or link error from any state ─> Failed
//! ```
//!
//! `Failed` is terminal until [`Framer::reset`]; a framer that lost
//! sync with the target refuses new commands instead of guessing where
//! the byte stream is.

use tilda_hal::{Uart, UartTx};

use crate::error::BootloaderError;
use crate::opcode::{Opcode, ACK};
use crate::packet::{self, MAX_FRAME_SIZE};
use crate::response::{FsProgramStatus, StatusResponse, StorageInfo, StorageList, VersionInfo};

/// Largest fixed-size response
pub const MAX_RESPONSE_SIZE: usize = VersionInfo::LEN;

/// Handshake position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramerState {
    Idle,
    AwaitAck,
    AwaitResponse,
    AwaitFinalAck,
    Failed,
}

/// What the target sends back for one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Exchange {
    /// Ack only
    Ack,
    /// Ack, then a `len`-byte response, then an ack from the host if
    /// `host_ack` is set
    Response { len: usize, host_ack: bool },
    /// Ack for the command, then a second ack once the target restarted
    DoubleAck,
}

impl Exchange {
    pub const fn for_opcode(opcode: Opcode) -> Self {
        match opcode {
            Opcode::GetStatus => Exchange::Response {
                len: StatusResponse::LEN,
                host_ack: true,
            },
            Opcode::GetStorageList => Exchange::Response {
                len: StorageList::LEN,
                host_ack: false,
            },
            Opcode::GetVersionInfo => Exchange::Response {
                len: VersionInfo::LEN,
                host_ack: true,
            },
            Opcode::GetStorageInfo => Exchange::Response {
                len: StorageInfo::LEN,
                host_ack: true,
            },
            Opcode::FsProgram => Exchange::Response {
                len: FsProgramStatus::LEN,
                host_ack: false,
            },
            Opcode::ExecFromRam => Exchange::DoubleAck,
            Opcode::RawStorageWrite | Opcode::RawStorageErase | Opcode::SwitchUart => {
                Exchange::Ack
            }
        }
    }
}

/// Packet framer over a bootloader UART
///
/// Owns the transmit and receive scratch buffers for one session.
pub struct Framer<U> {
    uart: U,
    state: FramerState,
    pending: Exchange,
    tx: [u8; MAX_FRAME_SIZE],
    rx: [u8; MAX_RESPONSE_SIZE],
}

type Result<T, U> = core::result::Result<T, BootloaderError<<U as UartTx>::Error>>;

impl<U: Uart> Framer<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            state: FramerState::Idle,
            pending: Exchange::Ack,
            tx: [0; MAX_FRAME_SIZE],
            rx: [0; MAX_RESPONSE_SIZE],
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Back to `Idle` after a failure
    ///
    /// Only meaningful once the target itself has been reset.
    pub fn reset(&mut self) {
        self.state = FramerState::Idle;
        self.pending = Exchange::Ack;
    }

    /// Assert or release break on the TX line
    pub fn set_break(&mut self, asserted: bool) {
        self.uart.set_break(asserted);
    }

    pub fn uart(&mut self) -> &mut U {
        &mut self.uart
    }

    pub fn release(self) -> U {
        self.uart
    }

    /// Encode and transmit one command packet
    ///
    /// `payload` parts are sent back to back as one payload.
    pub fn send_command(&mut self, opcode: Opcode, payload: &[&[u8]]) -> Result<(), U> {
        if self.state != FramerState::Idle {
            return Err(BootloaderError::Faulted);
        }

        let len = packet::encode(opcode, payload, &mut self.tx)?;
        trace!("-> {:?} ({} bytes)", opcode, len);

        match self.uart.write_blocking(&self.tx[..len]) {
            Ok(()) => {
                self.pending = Exchange::for_opcode(opcode);
                self.state = FramerState::AwaitAck;
                Ok(())
            }
            Err(e) => Err(self.fail(BootloaderError::Uart(e))),
        }
    }

    /// Read two bytes and require them to be an ack
    ///
    /// In `Idle` this takes the unsolicited ack the target sends when it
    /// enters the bootloader.
    pub fn recv_ack(&mut self) -> Result<(), U> {
        if !matches!(self.state, FramerState::Idle | FramerState::AwaitAck) {
            return Err(BootloaderError::Faulted);
        }

        let mut ack = [0u8; 2];
        if let Err(e) = self.uart.read_blocking(&mut ack) {
            return Err(self.fail(BootloaderError::Uart(e)));
        }
        if ack != ACK {
            error!("Bad ack {:?}", ack);
            return Err(self.fail(BootloaderError::BadAck(ack)));
        }

        if self.state == FramerState::AwaitAck {
            self.state = match self.pending {
                Exchange::Ack => FramerState::Idle,
                Exchange::Response { .. } => FramerState::AwaitResponse,
                Exchange::DoubleAck => {
                    self.pending = Exchange::Ack;
                    FramerState::AwaitAck
                }
            };
        }
        Ok(())
    }

    /// Send the host's ack for a response that requires one
    pub fn send_ack(&mut self) -> Result<(), U> {
        if self.state != FramerState::AwaitFinalAck {
            return Err(BootloaderError::Faulted);
        }

        if let Err(e) = self.uart.write_blocking(&ACK) {
            return Err(self.fail(BootloaderError::Uart(e)));
        }
        self.state = FramerState::Idle;
        Ok(())
    }

    /// Read exactly `len` response bytes into the receive buffer
    ///
    /// `len` must be the response size of the pending opcode; nothing is
    /// read otherwise.
    pub fn recv_response(&mut self, len: usize) -> Result<&[u8], U> {
        if self.state != FramerState::AwaitResponse {
            return Err(BootloaderError::Faulted);
        }
        match self.pending {
            Exchange::Response { len: expected, .. } if expected == len => {}
            _ => return Err(BootloaderError::InvalidArgument),
        }

        if let Err(e) = self.uart.read_blocking(&mut self.rx[..len]) {
            return Err(self.fail(BootloaderError::Uart(e)));
        }

        self.state = match self.pending {
            Exchange::Response { host_ack: true, .. } => FramerState::AwaitFinalAck,
            _ => FramerState::Idle,
        };
        Ok(&self.rx[..len])
    }

    /// Run the whole exchange for one command
    ///
    /// Returns the response bytes, empty for commands that only ack.
    pub fn transact(&mut self, opcode: Opcode, payload: &[&[u8]]) -> Result<&[u8], U> {
        self.send_command(opcode, payload)?;
        self.recv_ack()?;

        match Exchange::for_opcode(opcode) {
            Exchange::Ack => Ok(&[]),
            Exchange::DoubleAck => {
                self.recv_ack()?;
                Ok(&[])
            }
            Exchange::Response { len, host_ack } => {
                self.recv_response(len)?;
                if host_ack {
                    self.send_ack()?;
                }
                Ok(&self.rx[..len])
            }
        }
    }

    fn fail(&mut self, e: BootloaderError<<U as UartTx>::Error>) -> BootloaderError<<U as UartTx>::Error> {
        self.state = FramerState::Failed;
        e
    }
}
