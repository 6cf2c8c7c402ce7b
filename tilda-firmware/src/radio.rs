//! Radio co-processor firmware check
//!
//! Runs once at boot, before any task is spawned, so the blocking
//! bootloader exchange has the CPU to itself.

use defmt::*;
use embassy_time::Delay;

use tilda_hal_rp2040::{BootloaderUart, Rp2040Output};
use tilda_simplelink::{
    needs_update, FirmwareUpdate, ImageBundle, UpdatePlan, UpdateReport, VersionInfo,
};

use crate::board;

/// Update the co-processor if its NWP is older than the bundled one
///
/// `force` reflashes regardless of the reported version. Returns the
/// report when an update ran and succeeded.
pub fn ensure_firmware(
    uart: BootloaderUart<'_>,
    nhib: Rp2040Output<'_>,
    force: bool,
) -> Option<UpdateReport> {
    let bundle = match ImageBundle::parse(board::radio_bundle()) {
        Ok(bundle) => bundle,
        Err(e) => {
            warn!("No radio firmware bundle: {}", e);
            return None;
        }
    };

    let mut update = FirmwareUpdate::new(uart, nhib, Delay, UpdatePlan::CC3120);

    let reported = match update.probe() {
        Ok(version) => {
            log_version("Radio", &version);
            Some(version)
        }
        Err(e) => {
            warn!("Radio version probe failed in {}: {}", e.stage, e.error);
            None
        }
    };

    if force {
        info!("Radio update forced");
    } else if !needs_update(reported.as_ref(), bundle.required_nwp) {
        info!("Radio firmware up to date");
        return None;
    }

    match update.run(&bundle.images) {
        Ok(report) => {
            info!(
                "Radio updated: {} RAM, {} SFLASH, {} programmed in {} chunks",
                report.sram_bytes,
                report.sflash_bytes,
                report.programmed_bytes,
                report.programmed_chunks
            );
            match update.probe() {
                Ok(version) => log_version("Radio now", &version),
                Err(e) => warn!("Post-update probe failed in {}: {}", e.stage, e.error),
            }
            Some(report)
        }
        Err(e) => {
            error!("Radio update failed in {}: {}", e.stage, e.error);
            update.restart();
            None
        }
    }
}

fn log_version(label: &str, version: &VersionInfo) {
    info!(
        "{}: bootloader {} NWP {} PHY {} chip {}",
        label, version.bootloader, version.nwp, version.phy, version.chip
    );
}
