//! Single-slot write-back sector cache
//!
//! Exactly one sector is resident at a time. Reads and writes inside the
//! resident sector never touch storage; moving to another sector first
//! writes the resident one back if it is dirty, then loads the new one.
//!
//! The dirty flag is authoritative: it is only cleared after a sector
//! has been erased, programmed and verified. The activity LED follows
//! the flag and is only ever changed together with it.

use tilda_hal::{NvStorage, OutputPin};

use crate::error::StorageError;
use crate::layout::{FlashLayout, Sector};
use crate::write_policy;

/// Write-back cache over one flash sector
///
/// `N` is the buffer size and must be at least the largest sector in
/// the layout.
pub struct SectorCache<F, L, const N: usize> {
    storage: F,
    layout: FlashLayout,
    led: L,
    resident: Option<Sector>,
    dirty: bool,
    buffer: [u8; N],
}

impl<F: NvStorage, L: OutputPin, const N: usize> SectorCache<F, L, N> {
    /// Create an empty cache
    ///
    /// Fails with [`StorageError::SectorTooLarge`] if a sector in the
    /// layout does not fit in `N` bytes.
    pub fn new(storage: F, layout: FlashLayout, mut led: L) -> Result<Self, StorageError> {
        if layout.max_sector_size() as usize > N {
            return Err(StorageError::SectorTooLarge);
        }
        led.set_low();

        Ok(Self {
            storage,
            layout,
            led,
            resident: None,
            dirty: false,
            buffer: [0; N],
        })
    }

    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    /// The sector currently held in the buffer, if any
    pub fn resident(&self) -> Option<Sector> {
        self.resident
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Find the sector containing `addr`
    pub fn resolve_sector(&self, addr: u32) -> Result<Sector, StorageError> {
        self.layout.resolve(addr)
    }

    /// Bytes from `addr` to the end of its sector
    ///
    /// Reflects unflushed writes to the resident sector.
    pub async fn get_for_read(&mut self, addr: u32) -> Result<&[u8], StorageError> {
        let sector = self.make_resident(addr).await?;
        let offset = (addr - sector.start) as usize;
        Ok(&self.buffer[offset..sector.size as usize])
    }

    /// Mutable bytes from `addr` to the end of its sector
    ///
    /// Marks the sector dirty and asserts the activity LED.
    pub async fn get_for_write(&mut self, addr: u32) -> Result<&mut [u8], StorageError> {
        let sector = self.make_resident(addr).await?;
        if !self.dirty {
            trace!("Sector {} dirty", sector.id);
        }
        self.dirty = true;
        self.led.set_high();

        let offset = (addr - sector.start) as usize;
        Ok(&mut self.buffer[offset..sector.size as usize])
    }

    /// Write the resident sector back if it is dirty
    ///
    /// Returns `true` if a sector was written. On failure the sector stays
    /// dirty and resident, and the LED stays on.
    pub async fn flush(&mut self) -> Result<bool, StorageError> {
        if !self.dirty {
            return Ok(false);
        }

        let Some(sector) = self.resident else {
            // dirty implies resident; recover rather than write garbage
            self.dirty = false;
            self.led.set_low();
            return Ok(false);
        };

        let data = &self.buffer[..sector.size as usize];
        if let Err(e) = write_policy::write_sector(&mut self.storage, sector.start, data).await {
            warn!("Flush of sector {} failed: {:?}", sector.id, e);
            return Err(e.into());
        }

        debug!("Flushed sector {}", sector.id);
        self.dirty = false;
        self.led.set_low();
        Ok(true)
    }

    /// Forget the resident sector without writing it back
    ///
    /// Used at device init; anything still dirty is discarded.
    pub fn invalidate(&mut self) {
        if self.dirty {
            if let Some(sector) = self.resident {
                warn!("Discarding unflushed sector {}", sector.id);
            }
        }
        self.resident = None;
        self.dirty = false;
        self.led.set_low();
    }

    /// Ensure the sector holding `addr` is in the buffer
    async fn make_resident(&mut self, addr: u32) -> Result<Sector, StorageError> {
        let sector = self.layout.resolve(addr)?;
        if self.resident == Some(sector) {
            return Ok(sector);
        }

        self.flush().await?;

        // Nothing valid is resident while the load is in flight
        self.resident = None;
        self.storage
            .read(sector.start, &mut self.buffer[..sector.size as usize])
            .await?;
        trace!("Loaded sector {}", sector.id);

        self.resident = Some(sector);
        Ok(sector)
    }
}
