//! RP2040 implementation of the Tilda HAL
//!
//! - [`flash::Rp2040Flash`] - on-chip QSPI flash as [`tilda_hal::NvStorage`]
//! - [`uart::BootloaderUart`] - blocking UART with break control and read timeout
//! - [`gpio::Rp2040Output`] - GPIO output as [`tilda_hal::OutputPin`]

#![no_std]

pub mod flash;
pub mod gpio;
pub mod uart;

pub use flash::Rp2040Flash;
pub use gpio::Rp2040Output;
pub use uart::{gpio_to_uart, BootloaderUart, UartError, UartId};
