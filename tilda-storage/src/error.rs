//! Storage error type

use tilda_hal::FlashError;

/// Errors surfaced by the block device and the sector cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Byte address outside every declared flash region
    OutOfRange,
    /// Block number at or past the device capacity
    BlockOutOfRange,
    /// Buffer length is not a whole number of blocks
    BadBufferLength,
    /// A sector in the layout does not fit the cache buffer
    SectorTooLarge,
    /// Regions overlap, leave gaps, or are empty
    InvalidLayout,
    /// Bounded sync gave up before the cache became clean
    Timeout,
    /// Underlying storage read, erase, program or verify failed
    Flash(FlashError),
}

impl From<FlashError> for StorageError {
    fn from(e: FlashError) -> Self {
        StorageError::Flash(e)
    }
}
