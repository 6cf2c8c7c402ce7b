//! SimpleLink Serial Bootloader
//!
//! This crate speaks the serial bootloader of the SimpleLink WiFi
//! co-processor and uses it to replace the co-processor's bootloader
//! patches and service pack.
//!
//! # Protocol Overview
//!
//! Every command is one binary packet:
//! ```text
//! ┌──────────┬──────────┬────────┬──────────────┐
//! │ LENGTH   │ CHECKSUM │ OPCODE │ PAYLOAD      │
//! │ 2B (BE)  │ 1B       │ 1B     │ 0–4120B      │
//! └──────────┴──────────┴────────┴──────────────┘
//! ```
//!
//! The target answers every packet with the two-byte ack `00 CC`. Some
//! commands then send a fixed-size response, and some of those expect
//! the host to ack it in turn. There is no framing on responses: the
//! host must know how many bytes each opcode returns.
//!
//! - [`packet`] builds and checksums packets
//! - [`framer`] runs the byte-level exchange over a UART
//! - [`commands`] wraps each opcode in a typed call
//! - [`sequencer`] runs the complete firmware update

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod bundle;
pub mod commands;
pub mod error;
pub mod framer;
pub mod opcode;
pub mod packet;
pub mod response;
pub mod sequencer;

#[cfg(test)]
mod testing;

pub use bundle::{BundleError, ImageBundle};
pub use commands::{Bootloader, StorageId, MAX_FS_CHUNK, MAX_KEY_SIZE, MAX_RAW_WRITE, SWITCH_UART_DELAY};
pub use error::BootloaderError;
pub use framer::{Exchange, Framer, FramerState};
pub use opcode::{Opcode, Status, ACK};
pub use packet::{FrameError, PacketHeader, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use response::{FsProgramStatus, StatusResponse, StorageInfo, StorageList, VersionInfo};
pub use sequencer::{
    needs_update, CancelToken, EraseRange, FirmwareImages, FirmwareUpdate, UpdateError, UpdatePlan,
    UpdateReport, UpdateStage,
};
