//! Non-volatile storage abstractions
//!
//! Provides the raw sector interface that the block device cache sits on.
//! Offsets are absolute byte addresses in the storage address space.

use core::future::Future;

/// Errors from raw storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Read operation failed
    Read,
    /// Program operation failed
    Program,
    /// Erase operation failed
    Erase,
    /// Read-back after program did not match the written data
    Verify,
    /// Address range outside the device
    OutOfBounds,
    /// Address or length not aligned to the required granularity
    NotAligned,
}

/// Sector-erasable non-volatile storage
///
/// The storage must be erased before it is programmed. Implementations
/// only need to support erase ranges that start and end on sector
/// boundaries; callers are responsible for that alignment.
pub trait NvStorage {
    /// Read `buffer.len()` bytes starting at `offset`
    fn read(
        &mut self,
        offset: u32,
        buffer: &mut [u8],
    ) -> impl Future<Output = Result<(), FlashError>>;

    /// Erase `length` bytes starting at `offset`
    fn erase(&mut self, offset: u32, length: u32) -> impl Future<Output = Result<(), FlashError>>;

    /// Program previously erased storage at `offset` with `data`
    fn program(&mut self, offset: u32, data: &[u8]) -> impl Future<Output = Result<(), FlashError>>;
}

impl<T: NvStorage> NvStorage for &mut T {
    fn read(
        &mut self,
        offset: u32,
        buffer: &mut [u8],
    ) -> impl Future<Output = Result<(), FlashError>> {
        T::read(self, offset, buffer)
    }

    fn erase(&mut self, offset: u32, length: u32) -> impl Future<Output = Result<(), FlashError>> {
        T::erase(self, offset, length)
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> impl Future<Output = Result<(), FlashError>> {
        T::program(self, offset, data)
    }
}
