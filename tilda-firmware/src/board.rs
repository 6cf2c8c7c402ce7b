//! Badge board definition
//!
//! Flash map (2 MiB QSPI):
//!
//! ```text
//! 0x000000 ┌──────────────────────────────┐
//!          │ firmware (memory.x)          │
//! 0x100000 ├──────────────────────────────┤
//!          │ filesystem, 20 x 16 KiB      │
//! 0x150000 ├──────────────────────────────┤
//!          │ radio firmware bundle        │
//! 0x200000 └──────────────────────────────┘
//! ```
//!
//! Pins: UART1 TX=GPIO4 RX=GPIO5 to the co-processor, nHIB=GPIO6,
//! radio update button=GPIO7 (active low), storage LED=GPIO25.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use tilda_hal_rp2040::flash::{FLASH_ERASE_SIZE, FLASH_SIZE, XIP_BASE};
use tilda_hal_rp2040::{Rp2040Flash, Rp2040Output};
use tilda_storage::{FlashBlockDevice, FlashRegion};

/// Filesystem erase unit
///
/// The 64 x 2 KiB layout used on parts with small erase pages does not
/// fit here: RP2040 flash cannot erase less than 4 KiB.
pub const SECTOR_SIZE: usize = 16 * 1024;

pub const FILESYSTEM_BASE: u32 = 0x0010_0000;

pub const FILESYSTEM_SECTORS: u32 = 20;

pub const FILESYSTEM_REGIONS: [FlashRegion; 1] = [FlashRegion::new(
    FILESYSTEM_BASE,
    SECTOR_SIZE as u32,
    FILESYSTEM_SECTORS,
)];

pub const RADIO_BUNDLE_OFFSET: usize =
    FILESYSTEM_BASE as usize + SECTOR_SIZE * FILESYSTEM_SECTORS as usize;

pub const RADIO_BUNDLE_SIZE: usize = FLASH_SIZE - RADIO_BUNDLE_OFFSET;

const _: () = assert!(SECTOR_SIZE % FLASH_ERASE_SIZE == 0);
const _: () = assert!(RADIO_BUNDLE_OFFSET % FLASH_ERASE_SIZE == 0);

/// The badge filesystem device
pub type BlockDevice = FlashBlockDevice<
    CriticalSectionRawMutex,
    Rp2040Flash<'static>,
    Rp2040Output<'static>,
    SECTOR_SIZE,
>;

/// Radio firmware bundle partition, read through the XIP window
pub fn radio_bundle() -> &'static [u8] {
    // SAFETY: the partition is always mapped and this firmware never
    // erases or programs it, so the bytes stay valid and unaliased by
    // any mutable reference.
    unsafe {
        core::slice::from_raw_parts(
            (XIP_BASE + RADIO_BUNDLE_OFFSET) as *const u8,
            RADIO_BUNDLE_SIZE,
        )
    }
}
