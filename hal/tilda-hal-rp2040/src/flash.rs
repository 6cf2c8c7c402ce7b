//! Flash storage driver for RP2040
//!
//! Exposes the on-chip QSPI flash through `NvStorage`. Offsets are
//! relative to the start of flash, not the XIP window.

use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Error, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use embedded_storage_async::nor_flash::{NorFlash, ReadNorFlash};

use tilda_hal::{FlashError, NvStorage};

/// Flash fitted to the badge
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Smallest erasable unit; layouts must use multiples of this
pub const FLASH_ERASE_SIZE: usize = ERASE_SIZE;

/// XIP address flash is mapped at
pub const XIP_BASE: usize = 0x1000_0000;

/// RP2040 flash as sector storage
pub struct Rp2040Flash<'d> {
    flash: Flash<'d, FLASH, Async, FLASH_SIZE>,
}

impl<'d> Rp2040Flash<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
        }
    }

    /// Get the raw flash peripheral for low-level access
    pub fn flash(&mut self) -> &mut Flash<'d, FLASH, Async, FLASH_SIZE> {
        &mut self.flash
    }
}

fn map_error(e: Error, op: FlashError) -> FlashError {
    match e {
        Error::OutOfBounds => FlashError::OutOfBounds,
        Error::Unaligned => FlashError::NotAligned,
        _ => op,
    }
}

impl<'d> NvStorage for Rp2040Flash<'d> {
    async fn read(&mut self, offset: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        ReadNorFlash::read(&mut self.flash, offset, buffer)
            .await
            .map_err(|e| map_error(e, FlashError::Read))
    }

    async fn erase(&mut self, offset: u32, length: u32) -> Result<(), FlashError> {
        let end = offset.checked_add(length).ok_or(FlashError::OutOfBounds)?;
        NorFlash::erase(&mut self.flash, offset, end)
            .await
            .map_err(|e| map_error(e, FlashError::Erase))
    }

    async fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        NorFlash::write(&mut self.flash, offset, data)
            .await
            .map_err(|e| map_error(e, FlashError::Program))
    }
}
