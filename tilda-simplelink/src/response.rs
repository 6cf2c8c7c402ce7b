//! Fixed-size bootloader responses
//!
//! Responses carry no length prefix of their own that the host can
//! trust, so every type here knows its exact size and field offsets.
//! Where a response starts with the usual length/checksum bytes they
//! are skipped rather than validated.

use crate::opcode::Status;

/// GetStatus response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusResponse {
    pub status: Status,
}

impl StatusResponse {
    pub const LEN: usize = 4;

    pub fn parse(bytes: &[u8; Self::LEN]) -> Self {
        Self {
            status: Status::from_u8(bytes[3]),
        }
    }
}

/// GetStorageList response: one bit per available storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageList(pub u8);

impl StorageList {
    pub const LEN: usize = 1;

    pub fn parse(bytes: &[u8; Self::LEN]) -> Self {
        Self(bytes[0])
    }

    /// Whether storage `id` is listed
    pub fn contains(&self, id: u32) -> bool {
        id < 8 && self.0 & (1 << id) != 0
    }
}

/// GetVersionInfo response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VersionInfo {
    pub bootloader: [u8; 4],
    pub nwp: [u8; 4],
    pub mac: [u8; 4],
    pub phy: [u8; 4],
    pub chip: [u8; 4],
}

impl VersionInfo {
    pub const LEN: usize = 31;

    pub fn parse(bytes: &[u8; Self::LEN]) -> Self {
        let group = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        Self {
            bootloader: group(4),
            nwp: group(8),
            mac: group(12),
            phy: group(16),
            chip: group(20),
        }
    }

    /// NWP version packed most significant part first, for ordering
    pub fn nwp_packed(&self) -> u32 {
        u32::from_be_bytes(self.nwp)
    }
}

/// GetStorageInfo response
///
/// The trailing four bytes are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageInfo {
    pub block_size: u16,
    pub block_count: u16,
}

impl StorageInfo {
    pub const LEN: usize = 11;

    pub fn parse(bytes: &[u8; Self::LEN]) -> Self {
        Self {
            block_size: u16::from_be_bytes([bytes[3], bytes[4]]),
            block_count: u16::from_be_bytes([bytes[5], bytes[6]]),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.block_size as u32 * self.block_count as u32
    }
}

/// FSProgram response
///
/// A negative value is an error code from the target; anything else
/// means the chunk was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FsProgramStatus(pub i32);

impl FsProgramStatus {
    pub const LEN: usize = 4;

    pub fn parse(bytes: &[u8; Self::LEN]) -> Self {
        Self(i32::from_be_bytes(*bytes))
    }

    pub fn is_error(&self) -> bool {
        self.0 < 0
    }
}
