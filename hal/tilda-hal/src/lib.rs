//! Tilda Hardware Abstraction Layer
//!
//! This crate defines the hardware traits the storage and radio update
//! code is written against. Chip-specific HALs implement them, and the
//! host test suites implement them with in-memory doubles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  tilda-storage, tilda-simplelink, firmware   │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │  tilda-hal (this crate - traits)             │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//!              ┌─────────────────┐
//!              │ tilda-hal-rp2040│
//!              └─────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::NvStorage`] - Sector-erasable non-volatile storage
//! - [`uart::UartTx`], [`uart::UartRx`], [`uart::UartBreak`] - Serial link
//! - [`gpio::OutputPin`] - Digital outputs (reset lines, status LEDs)

#![no_std]
#![deny(unsafe_code)]

pub mod flash;
pub mod gpio;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use flash::{FlashError, NvStorage};
pub use gpio::{NoPin, OutputPin};
pub use uart::{Uart, UartBreak, UartConfig, UartRx, UartTx};
