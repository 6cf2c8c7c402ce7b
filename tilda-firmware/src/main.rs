//! Tilda - Badge Firmware
//!
//! Brings up the radio co-processor (reflashing it over its serial
//! bootloader when the bundled service pack is newer) and the flash
//! block device that backs the badge filesystem.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use tilda_hal::UartConfig;
use tilda_hal_rp2040::{BootloaderUart, Rp2040Flash, Rp2040Output, UartId};
use tilda_storage::{FlashBlockDevice, FlashLayout, FlushConfig, IoctlOp};

mod board;
mod radio;
mod tasks;

// Block device must live forever for the flush task
static BLOCK_DEVICE: StaticCell<board::BlockDevice> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Tilda firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Radio first: the bootloader exchange is blocking and must finish
    // before anything else is scheduled
    let uart = BootloaderUart::new(
        p.UART1,
        UartId::Uart1,
        p.PIN_4,
        p.PIN_5,
        &UartConfig::bootloader(),
    );
    let nhib = Rp2040Output::new(Output::new(p.PIN_6, Level::High));
    let force_update = Input::new(p.PIN_7, Pull::Up).is_low();
    radio::ensure_firmware(uart, nhib, force_update);

    // Filesystem block device
    let flash = Rp2040Flash::new(p.FLASH, p.DMA_CH0);
    let led = Rp2040Output::new(Output::new(p.PIN_25, Level::Low));

    let device = match FlashLayout::new(&board::FILESYSTEM_REGIONS)
        .and_then(|layout| FlashBlockDevice::new(flash, layout, led, FlushConfig::default()))
    {
        Ok(device) => BLOCK_DEVICE.init(device),
        Err(e) => {
            error!("Block device setup failed: {}", e);
            loop {
                embassy_time::Timer::after_secs(60).await;
            }
        }
    };

    device.init().await;
    match device.ioctl(IoctlOp::BlockCount).await {
        Ok(blocks) => info!("Filesystem: {} blocks of {} bytes", blocks, tilda_storage::BLOCK_SIZE),
        Err(e) => warn!("Block count query failed: {}", e),
    }

    spawner.spawn(unwrap!(tasks::flush_task(device)));

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}
