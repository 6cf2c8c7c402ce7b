//! Flash layout descriptor
//!
//! An ordered list of regions, each a run of equally sized sectors.
//! Sector ids count up across regions in order, so a byte address
//! resolves to exactly one sector by linear search.

use heapless::Vec;

use crate::error::StorageError;

/// Maximum number of regions in one layout
pub const MAX_REGIONS: usize = 4;

/// A run of equally sized sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    /// Address of the first byte of the region
    pub base: u32,
    /// Erase granularity in bytes
    pub sector_size: u32,
    /// Number of sectors in the region
    pub sector_count: u32,
}

impl FlashRegion {
    pub const fn new(base: u32, sector_size: u32, sector_count: u32) -> Self {
        Self {
            base,
            sector_size,
            sector_count,
        }
    }

    /// Region size in bytes
    pub const fn size(&self) -> u32 {
        self.sector_size * self.sector_count
    }

    /// One past the last address in the region
    pub const fn end(&self) -> u32 {
        self.base + self.size()
    }

    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }
}

/// A resolved sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sector {
    /// Index across the whole layout
    pub id: u32,
    /// Address of the first byte
    pub start: u32,
    /// Size in bytes
    pub size: u32,
}

impl Sector {
    /// One past the last address in the sector
    pub const fn end(&self) -> u32 {
        self.start + self.size
    }
}

/// Ordered, contiguous flash regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLayout {
    regions: Vec<FlashRegion, MAX_REGIONS>,
}

impl FlashLayout {
    /// Build a layout, checking that regions are non-empty and that each
    /// starts where the previous one ends
    pub fn new(regions: &[FlashRegion]) -> Result<Self, StorageError> {
        if regions.is_empty() {
            return Err(StorageError::InvalidLayout);
        }

        let mut expected_base = regions[0].base;
        for region in regions {
            if region.sector_size == 0 || region.sector_count == 0 {
                return Err(StorageError::InvalidLayout);
            }
            if region.base != expected_base {
                return Err(StorageError::InvalidLayout);
            }
            expected_base = region
                .base
                .checked_add(
                    region
                        .sector_size
                        .checked_mul(region.sector_count)
                        .ok_or(StorageError::InvalidLayout)?,
                )
                .ok_or(StorageError::InvalidLayout)?;
        }

        let mut vec = Vec::new();
        vec.extend_from_slice(regions)
            .map_err(|_| StorageError::InvalidLayout)?;
        Ok(Self { regions: vec })
    }

    pub fn regions(&self) -> &[FlashRegion] {
        &self.regions
    }

    /// First address of the layout
    pub fn start(&self) -> u32 {
        self.regions[0].base
    }

    /// Total bytes across all regions
    pub fn capacity(&self) -> u32 {
        self.regions.iter().map(|r| r.size()).sum()
    }

    /// Total sectors across all regions
    pub fn sector_count(&self) -> u32 {
        self.regions.iter().map(|r| r.sector_count).sum()
    }

    /// Largest sector in the layout
    pub fn max_sector_size(&self) -> u32 {
        self.regions
            .iter()
            .map(|r| r.sector_size)
            .max()
            .unwrap_or(0)
    }

    /// Find the sector containing `addr`
    pub fn resolve(&self, addr: u32) -> Result<Sector, StorageError> {
        let mut first_id = 0;
        for region in &self.regions {
            if region.contains(addr) {
                let index = (addr - region.base) / region.sector_size;
                return Ok(Sector {
                    id: first_id + index,
                    start: region.base + index * region.sector_size,
                    size: region.sector_size,
                });
            }
            first_id += region.sector_count;
        }
        Err(StorageError::OutOfRange)
    }
}
