//! Uncached block device over one flash region
//!
//! One block is one sector, so every write is a full erase + program +
//! verify straight to storage and nothing is ever left dirty. Suited to
//! small regions where the filesystem block size can match the sector.

use tilda_hal::NvStorage;

use crate::device::IoctlOp;
use crate::error::StorageError;
use crate::layout::FlashRegion;
use crate::write_policy;

/// Sector-per-block device without a cache
pub struct NvsBlockDevice<F> {
    storage: F,
    region: FlashRegion,
}

impl<F: NvStorage> NvsBlockDevice<F> {
    pub fn new(storage: F, region: FlashRegion) -> Result<Self, StorageError> {
        if region.sector_size == 0 || region.sector_count == 0 {
            return Err(StorageError::InvalidLayout);
        }
        Ok(Self { storage, region })
    }

    pub fn block_count(&self) -> u32 {
        self.region.sector_count
    }

    pub fn block_size(&self) -> u32 {
        self.region.sector_size
    }

    /// Read whole sectors starting at block `first`
    pub async fn read_blocks(&mut self, dest: &mut [u8], first: u32) -> Result<(), StorageError> {
        let addr = self.block_address(first, dest.len())?;
        self.storage.read(addr, dest).await?;
        Ok(())
    }

    /// Replace whole sectors starting at block `first`
    pub async fn write_blocks(&mut self, src: &[u8], first: u32) -> Result<(), StorageError> {
        let mut addr = self.block_address(first, src.len())?;
        for sector in src.chunks(self.region.sector_size as usize) {
            write_policy::write_sector(&mut self.storage, addr, sector).await?;
            addr += self.region.sector_size;
        }
        Ok(())
    }

    /// Block count and size queries; other ops have nothing to do
    pub fn ioctl(&self, op: IoctlOp) -> Option<u32> {
        match op {
            IoctlOp::BlockCount => Some(self.block_count()),
            IoctlOp::BlockSize => Some(self.block_size()),
            IoctlOp::Init | IoctlOp::Deinit | IoctlOp::Sync => None,
        }
    }

    fn block_address(&self, first: u32, len: usize) -> Result<u32, StorageError> {
        let size = self.region.sector_size as usize;
        if len == 0 || len % size != 0 {
            return Err(StorageError::BadBufferLength);
        }
        let count = (len / size) as u32;
        match first.checked_add(count) {
            Some(end) if end <= self.region.sector_count => {}
            _ => return Err(StorageError::BlockOutOfRange),
        }
        Ok(self.region.base + first * self.region.sector_size)
    }
}
