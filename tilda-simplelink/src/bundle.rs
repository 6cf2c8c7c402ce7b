//! Radio firmware bundle
//!
//! The three update images travel together in one flash partition,
//! written by the flashing tool:
//!
//! ```text
//! ┌───────┬──────────────┬─────────┬───────────┬─────────────────┬──────────────────────────┐
//! │ MAGIC │ REQUIRED NWP │ RAM LEN │ FLASH LEN │ PROGRAMMING LEN │ RAM | FLASH | PROGRAMMING │
//! │ SLFW  │ u32 LE       │ u32 LE  │ u32 LE    │ u32 LE          │ images back to back      │
//! └───────┴──────────────┴─────────┴───────────┴─────────────────┴──────────────────────────┘
//! ```

use crate::sequencer::FirmwareImages;

pub const BUNDLE_MAGIC: [u8; 4] = *b"SLFW";

pub const BUNDLE_HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BundleError {
    /// No bundle at this address
    BadMagic,
    /// Header lengths run past the end of the partition
    Truncated,
}

/// Parsed bundle, borrowing the images from the partition
#[derive(Debug, Clone, Copy)]
pub struct ImageBundle<'a> {
    /// Lowest packed NWP version that does not need an update
    pub required_nwp: u32,
    pub images: FirmwareImages<'a>,
}

impl<'a> ImageBundle<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, BundleError> {
        if bytes.len() < BUNDLE_HEADER_SIZE {
            return Err(BundleError::Truncated);
        }
        if bytes[..4] != BUNDLE_MAGIC {
            return Err(BundleError::BadMagic);
        }

        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let required_nwp = word(4);

        let mut rest = &bytes[BUNDLE_HEADER_SIZE..];
        let mut take = |len: u32| -> Result<&'a [u8], BundleError> {
            let len = len as usize;
            if len > rest.len() {
                return Err(BundleError::Truncated);
            }
            let (image, tail) = rest.split_at(len);
            rest = tail;
            Ok(image)
        };

        let ram_patches = take(word(8))?;
        let flash_patches = take(word(12))?;
        let programming = take(word(16))?;

        Ok(Self {
            required_nwp,
            images: FirmwareImages {
                ram_patches,
                flash_patches,
                programming,
            },
        })
    }
}
