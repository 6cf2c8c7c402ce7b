//! Flash-backed block device for the badge filesystem
//!
//! The FAT filesystem above this crate sees a device of fixed 512-byte
//! logical blocks. Internal flash can only be erased a whole sector at a
//! time, and sectors are much larger than a block, so writes land in a
//! single in-memory copy of the current sector and reach flash later as
//! one erase + program + verify.
//!
//! ```text
//!   filesystem ──► FlashBlockDevice ──► SectorCache ──► NvStorage
//!                        ▲                  ▲
//!                        │ SYNC             │ periodic flush
//!                        └── FlushScheduler ┘
//! ```
//!
//! - [`layout`] maps byte addresses to sectors
//! - [`cache`] holds the single resident sector and its dirty flag
//! - [`device`] exposes block reads/writes and the ioctl surface
//! - [`flush`] bounds how long a dirty sector may stay unflushed
//! - [`nvs`] is the uncached variant where one block is one sector

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod cache;
pub mod device;
pub mod error;
pub mod flush;
pub mod layout;
pub mod nvs;

mod write_policy;

#[cfg(test)]
mod testing;

pub use cache::SectorCache;
pub use device::{FlashBlockDevice, FlushConfig, IoctlOp, BLOCK_SIZE};
pub use error::StorageError;
pub use flush::{FlushOutcome, FlushScheduler};
pub use layout::{FlashLayout, FlashRegion, Sector};
pub use nvs::NvsBlockDevice;
