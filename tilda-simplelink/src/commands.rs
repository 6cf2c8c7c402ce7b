//! Typed bootloader commands
//!
//! One method per opcode. Arguments are checked here before anything
//! goes on the wire, and responses come back parsed.

use tilda_hal::{Uart, UartTx};

use crate::error::BootloaderError;
use crate::framer::{Framer, FramerState};
use crate::opcode::{Opcode, Status};
use crate::response::{FsProgramStatus, StatusResponse, StorageInfo, StorageList, VersionInfo};

/// Largest data chunk in one RawStorageWrite
pub const MAX_RAW_WRITE: usize = 4080;

/// Largest data chunk in one FSProgram
pub const MAX_FS_CHUNK: usize = 4096;

/// Largest FSProgram key
pub const MAX_KEY_SIZE: usize = 16;

/// SwitchUART delay the reference host sends
pub const SWITCH_UART_DELAY: u32 = 26_666_667;

/// Storage identifier for the raw storage commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageId(pub u32);

impl StorageId {
    /// Volatile RAM the bootloader patches run from
    pub const SRAM: StorageId = StorageId(0);
    /// Serial flash, holds the persistent bootloader patches
    pub const SFLASH: StorageId = StorageId(2);

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

type Result<T, U> = core::result::Result<T, BootloaderError<<U as UartTx>::Error>>;

/// Command session with the bootloader
pub struct Bootloader<U> {
    framer: Framer<U>,
}

impl<U: Uart> Bootloader<U> {
    pub fn new(uart: U) -> Self {
        Self {
            framer: Framer::new(uart),
        }
    }

    pub fn framer(&mut self) -> &mut Framer<U> {
        &mut self.framer
    }

    pub fn release(self) -> U {
        self.framer.release()
    }

    /// Wait for the ack the target sends when it enters the bootloader
    pub fn recv_boot_ack(&mut self) -> Result<(), U> {
        self.framer.recv_ack()
    }

    /// Status of the previous command
    pub fn get_status(&mut self) -> Result<Status, U> {
        let raw = self.framer.transact(Opcode::GetStatus, &[])?;
        let status = StatusResponse::parse(Self::fixed(raw)?).status;
        trace!("Status {:?}", status);
        Ok(status)
    }

    /// GetStatus, requiring success
    pub fn check_status(&mut self) -> Result<(), U> {
        match self.get_status()? {
            Status::Success => Ok(()),
            other => {
                error!("Bootloader status {:?}", other);
                Err(BootloaderError::BadStatus(other))
            }
        }
    }

    pub fn get_storage_list(&mut self) -> Result<StorageList, U> {
        let raw = self.framer.transact(Opcode::GetStorageList, &[])?;
        Ok(StorageList::parse(Self::fixed(raw)?))
    }

    pub fn get_version_info(&mut self) -> Result<VersionInfo, U> {
        let raw = self.framer.transact(Opcode::GetVersionInfo, &[])?;
        Ok(VersionInfo::parse(Self::fixed(raw)?))
    }

    pub fn get_storage_info(&mut self, id: StorageId) -> Result<StorageInfo, U> {
        let raw = self
            .framer
            .transact(Opcode::GetStorageInfo, &[&id.to_be_bytes()])?;
        Ok(StorageInfo::parse(Self::fixed(raw)?))
    }

    /// Erase `count` blocks starting at block `first`
    pub fn raw_storage_erase(&mut self, id: StorageId, first: u32, count: u32) -> Result<(), U> {
        let mut args = [0u8; 12];
        args[0..4].copy_from_slice(&id.to_be_bytes());
        args[4..8].copy_from_slice(&first.to_be_bytes());
        args[8..12].copy_from_slice(&count.to_be_bytes());

        self.framer.transact(Opcode::RawStorageErase, &[&args])?;
        Ok(())
    }

    /// Write `data` at byte `offset`
    ///
    /// The target reports the outcome through the next GetStatus.
    pub fn raw_storage_write(&mut self, id: StorageId, offset: u32, data: &[u8]) -> Result<(), U> {
        if data.len() > MAX_RAW_WRITE {
            return Err(BootloaderError::PayloadTooLarge);
        }

        let mut header = [0u8; 12];
        header[0..4].copy_from_slice(&id.to_be_bytes());
        header[4..8].copy_from_slice(&offset.to_be_bytes());
        header[8..12].copy_from_slice(&(data.len() as u32).to_be_bytes());

        trace!("Raw write {:?} at {=u32:#x}, {} bytes", id, offset, data.len());
        self.framer
            .transact(Opcode::RawStorageWrite, &[&header, data])?;
        Ok(())
    }

    /// Restart into the bootloader image in SRAM
    ///
    /// Returns once the new image has acked.
    pub fn exec_from_ram(&mut self) -> Result<(), U> {
        self.framer.transact(Opcode::ExecFromRam, &[])?;
        Ok(())
    }

    /// Ask the target to change UART speed after `delay`
    pub fn switch_uart(&mut self, delay: u32) -> Result<(), U> {
        self.framer
            .transact(Opcode::SwitchUart, &[&delay.to_be_bytes()])?;
        Ok(())
    }

    /// Program one chunk of a filesystem image
    ///
    /// No flags are defined yet, so `flags` must be zero.
    pub fn fs_program(&mut self, key: &[u8], data: &[u8], flags: u32) -> Result<FsProgramStatus, U> {
        if flags != 0 || key.len() > MAX_KEY_SIZE {
            return Err(BootloaderError::InvalidArgument);
        }
        if data.len() > MAX_FS_CHUNK {
            return Err(BootloaderError::PayloadTooLarge);
        }

        let mut header = [0u8; 8];
        header[0..2].copy_from_slice(&(key.len() as u16).to_be_bytes());
        header[2..4].copy_from_slice(&(data.len() as u16).to_be_bytes());
        header[4..8].copy_from_slice(&flags.to_be_bytes());

        let raw = self
            .framer
            .transact(Opcode::FsProgram, &[&header, key, data])?;
        let status = FsProgramStatus::parse(Self::fixed(raw)?);
        trace!("FS program status {}", status.0);

        if status.is_error() {
            error!("FS program failed: {}", status.0);
            return Err(BootloaderError::ProgramFailed(status.0));
        }
        Ok(status)
    }

    /// View a response as the fixed-size array its parser takes
    fn fixed<const N: usize>(raw: &[u8]) -> Result<&[u8; N], U> {
        raw.try_into().map_err(|_| BootloaderError::InvalidArgument)
    }

    /// Drop any half-finished exchange
    pub fn reset(&mut self) {
        if self.framer.state() != FramerState::Idle {
            warn!("Resetting framer from {:?}", self.framer.state());
        }
        self.framer.reset();
    }
}
