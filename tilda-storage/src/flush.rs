//! Deferred flush
//!
//! Writers only mark the resident sector dirty. This scheduler writes it
//! back on a fixed period, or sooner when someone calls
//! [`FlashBlockDevice::request_flush`]. It goes through the same locked
//! flush path as SYNC, so it waits for any block transfer in progress.
//!
//! A failed flush is not escalated: the sector stays dirty, the LED stays
//! on, and the next tick tries again.

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Ticker;
use tilda_hal::{NvStorage, OutputPin};

use crate::device::FlashBlockDevice;
use crate::error::StorageError;

/// Result of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlushOutcome {
    /// Device not initialised, nothing attempted
    Idle,
    /// Nothing was dirty
    Clean,
    /// A dirty sector was written back
    Flushed,
    /// Write-back failed; will retry next tick
    Failed(StorageError),
}

/// Periodic flush driver for a [`FlashBlockDevice`]
pub struct FlushScheduler<'d, M: RawMutex, F, L, const N: usize> {
    device: &'d FlashBlockDevice<M, F, L, N>,
    failures: u32,
}

impl<'d, M, F, L, const N: usize> FlushScheduler<'d, M, F, L, N>
where
    M: RawMutex,
    F: NvStorage,
    L: OutputPin,
{
    pub fn new(device: &'d FlashBlockDevice<M, F, L, N>) -> Self {
        Self {
            device,
            failures: 0,
        }
    }

    /// Consecutive failed ticks so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// One flush attempt
    pub async fn tick(&mut self) -> FlushOutcome {
        if !self.device.is_running() {
            return FlushOutcome::Idle;
        }

        match self.device.flush().await {
            Ok(true) => {
                if self.failures > 0 {
                    info!("Flush recovered after {} failures", self.failures);
                }
                self.failures = 0;
                FlushOutcome::Flushed
            }
            Ok(false) => FlushOutcome::Clean,
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                error!("Periodic flush failed ({}): {:?}", self.failures, e);
                FlushOutcome::Failed(e)
            }
        }
    }

    /// Flush every `interval`, or on request, forever
    pub async fn run(&mut self) -> ! {
        let mut ticker = Ticker::every(self.device.config().interval);

        loop {
            select(ticker.next(), self.device.wait_flush_request()).await;
            self.tick().await;
        }
    }
}
