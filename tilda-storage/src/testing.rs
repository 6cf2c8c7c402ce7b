//! In-memory doubles for host tests

use core::cell::Cell;

use tilda_hal::{FlashError, NvStorage, OutputPin};

/// NOR flash in RAM
///
/// Erase sets bytes to 0xFF, program can only clear bits, like the real
/// part. Counters and fault switches let tests observe and break it.
pub struct RamFlash<const SIZE: usize> {
    pub data: [u8; SIZE],
    pub reads: usize,
    pub erases: usize,
    pub programs: usize,
    pub fail_read: bool,
    pub fail_erase: bool,
    /// Fail this many erases, then recover
    pub failing_erases: usize,
    pub fail_program: bool,
    /// Report erase success without erasing
    pub skip_erase: bool,
}

impl<const SIZE: usize> RamFlash<SIZE> {
    pub fn new() -> Self {
        Self {
            data: [0xFF; SIZE],
            reads: 0,
            erases: 0,
            programs: 0,
            fail_read: false,
            fail_erase: false,
            failing_erases: 0,
            fail_program: false,
            skip_erase: false,
        }
    }

    /// Total storage operations so far
    pub fn ops(&self) -> usize {
        self.reads + self.erases + self.programs
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, FlashError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(FlashError::OutOfBounds)?;
        if end > SIZE {
            return Err(FlashError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<const SIZE: usize> NvStorage for RamFlash<SIZE> {
    async fn read(&mut self, offset: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        self.reads += 1;
        if self.fail_read {
            return Err(FlashError::Read);
        }
        let range = self.range(offset, buffer.len())?;
        buffer.copy_from_slice(&self.data[range]);
        Ok(())
    }

    async fn erase(&mut self, offset: u32, length: u32) -> Result<(), FlashError> {
        self.erases += 1;
        if self.fail_erase {
            return Err(FlashError::Erase);
        }
        if self.failing_erases > 0 {
            self.failing_erases -= 1;
            return Err(FlashError::Erase);
        }
        let range = self.range(offset, length as usize)?;
        if !self.skip_erase {
            self.data[range].fill(0xFF);
        }
        Ok(())
    }

    async fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        self.programs += 1;
        if self.fail_program {
            return Err(FlashError::Program);
        }
        let range = self.range(offset, data.len())?;
        for (cell, byte) in self.data[range].iter_mut().zip(data) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// LED whose state stays visible to the test after the pin is moved
pub struct SharedLed<'a>(pub &'a Cell<bool>);

impl OutputPin for SharedLed<'_> {
    fn set_high(&mut self) {
        self.0.set(true);
    }

    fn set_low(&mut self) {
        self.0.set(false);
    }

    fn is_set_high(&self) -> bool {
        self.0.get()
    }
}
