//! Filesystem flush task
//!
//! Writes the cached sector back on the device's flush interval, or
//! sooner when a writer requests it.

use defmt::*;
use tilda_storage::FlushScheduler;

use crate::board::BlockDevice;

#[embassy_executor::task]
pub async fn flush_task(device: &'static BlockDevice) {
    info!(
        "Flush task started ({} ms interval)",
        device.config().interval.as_millis()
    );

    FlushScheduler::new(device).run().await
}
