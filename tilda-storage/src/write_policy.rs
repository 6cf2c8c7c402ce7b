//! Erase + program + verify
//!
//! Every sector write goes through here. A read-back mismatch is
//! reported as [`FlashError::Verify`] and the write counts as failed.

use tilda_hal::{FlashError, NvStorage};

/// Bytes compared per read-back
const VERIFY_CHUNK: usize = 64;

/// Replace the sector at `start` with `data`
pub(crate) async fn write_sector<F: NvStorage>(
    storage: &mut F,
    start: u32,
    data: &[u8],
) -> Result<(), FlashError> {
    storage.erase(start, data.len() as u32).await?;
    storage.program(start, data).await?;
    verify(storage, start, data).await
}

async fn verify<F: NvStorage>(storage: &mut F, start: u32, data: &[u8]) -> Result<(), FlashError> {
    let mut readback = [0u8; VERIFY_CHUNK];
    let mut offset = 0;

    for chunk in data.chunks(VERIFY_CHUNK) {
        let buf = &mut readback[..chunk.len()];
        storage.read(start + offset, buf).await?;
        if buf != chunk {
            return Err(FlashError::Verify);
        }
        offset += chunk.len() as u32;
    }

    Ok(())
}
