//! Co-processor firmware update
//!
//! Runs the fixed reflash sequence:
//!
//! 1. Hold break on TX, pulse the reset line, and wait for the boot ack
//! 2. Read the storage list, versions and storage geometry
//! 3. Erase SRAM and load the bootloader patches, polling status after
//!    every chunk
//! 4. Execute from RAM and wait for the patched bootloader's second ack
//! 5. Erase the SFLASH patch area and write the persistent patches
//! 6. Program the filesystem image in 4096-byte chunks
//!
//! Each step only runs if everything before it succeeded. There is no
//! resume: a failed run is retried from step 1 after the caller decides
//! to.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use tilda_hal::{OutputPin, Uart, UartTx};

use crate::commands::{Bootloader, StorageId, MAX_FS_CHUNK, MAX_RAW_WRITE};
use crate::error::BootloaderError;
use crate::response::{StorageInfo, StorageList, VersionInfo};

/// Block range for a RawStorageErase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EraseRange {
    pub first_block: u32,
    pub block_count: u32,
}

/// Where and how the images are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdatePlan {
    pub sram: StorageId,
    pub sram_erase: EraseRange,
    /// Byte offset of the RAM patches
    pub sram_offset: u32,
    pub sflash: StorageId,
    pub sflash_erase: EraseRange,
    /// Byte offset of the persistent patches
    pub sflash_offset: u32,
    /// Data bytes per RawStorageWrite
    pub raw_chunk: usize,
    /// Data bytes per FSProgram
    pub fs_chunk: usize,
    /// Reset pulse width
    pub reset_pulse_ms: u32,
    /// Settle time after the boot ack
    pub boot_settle_ms: u32,
}

impl UpdatePlan {
    /// CC3120 service pack layout
    ///
    /// The persistent patches live 8 bytes into SFLASH block 33.
    pub const CC3120: UpdatePlan = UpdatePlan {
        sram: StorageId::SRAM,
        sram_erase: EraseRange {
            first_block: 0,
            block_count: 3,
        },
        sram_offset: 0,
        sflash: StorageId::SFLASH,
        sflash_erase: EraseRange {
            first_block: 33,
            block_count: 2,
        },
        sflash_offset: 33 * 4096 + 8,
        raw_chunk: MAX_RAW_WRITE,
        fs_chunk: MAX_FS_CHUNK,
        reset_pulse_ms: 50,
        boot_settle_ms: 1000,
    };

    /// Chunk sizes the commands accept
    pub fn is_valid(&self) -> bool {
        (1..=MAX_RAW_WRITE).contains(&self.raw_chunk) && (1..=MAX_FS_CHUNK).contains(&self.fs_chunk)
    }
}

impl Default for UpdatePlan {
    fn default() -> Self {
        Self::CC3120
    }
}

/// Images to install, usually linked into the host firmware
#[derive(Debug, Clone, Copy)]
pub struct FirmwareImages<'a> {
    /// Bootloader patches loaded into SRAM and executed
    pub ram_patches: &'a [u8],
    /// Bootloader patches kept in SFLASH
    pub flash_patches: &'a [u8],
    /// Service pack programming image
    pub programming: &'a [u8],
}

/// Step of the update, for reporting where it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateStage {
    EnterBootloader,
    Discover,
    EraseRam,
    WriteRam,
    ExecFromRam,
    EraseFlash,
    WriteFlash,
    ProgramFilesystem,
}

/// Failed update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateError<E> {
    pub stage: UpdateStage,
    pub error: BootloaderError<E>,
}

/// What a successful update saw and wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateReport {
    pub storage_list: u8,
    pub sram_info: StorageInfo,
    pub sflash_info: StorageInfo,
    /// Versions reported by the ROM bootloader
    pub version_before: VersionInfo,
    /// Versions reported after executing the RAM patches
    pub version_after: VersionInfo,
    pub sram_bytes: u32,
    pub sflash_bytes: u32,
    pub programmed_bytes: u32,
    pub programmed_chunks: u32,
}

/// Cross-task request to stop an update
///
/// Checked before every command, so cancellation lands between
/// exchanges and never mid-packet.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Whether the co-processor needs the service pack
///
/// `reported` is the version the running NWP reported, `None` when it
/// could not be read. Versions compare as big-endian packed NWP words.
pub fn needs_update(reported: Option<&VersionInfo>, required_nwp: u32) -> bool {
    match reported {
        Some(version) => version.nwp_packed() < required_nwp,
        None => true,
    }
}

type StepResult<T, U> = Result<T, BootloaderError<<U as UartTx>::Error>>;

/// Firmware update session
///
/// `P` drives the target's active-low hibernate/reset line.
pub struct FirmwareUpdate<'c, U, P, D> {
    bootloader: Bootloader<U>,
    reset: P,
    delay: D,
    plan: UpdatePlan,
    cancel: Option<&'c CancelToken>,
}

impl<'c, U, P, D> FirmwareUpdate<'c, U, P, D>
where
    U: Uart,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(uart: U, reset: P, delay: D, plan: UpdatePlan) -> Self {
        Self {
            bootloader: Bootloader::new(uart),
            reset,
            delay,
            plan,
            cancel: None,
        }
    }

    /// Stop at the next command once `token` is cancelled
    pub fn with_cancel(mut self, token: &'c CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn plan(&self) -> &UpdatePlan {
        &self.plan
    }

    /// Give back the UART and reset pin
    pub fn release(self) -> (U, P) {
        (self.bootloader.release(), self.reset)
    }

    /// Run the whole update
    pub fn run(
        &mut self,
        images: &FirmwareImages<'_>,
    ) -> Result<UpdateReport, UpdateError<<U as UartTx>::Error>> {
        if !self.plan.is_valid() {
            return Err(UpdateError {
                stage: UpdateStage::EnterBootloader,
                error: BootloaderError::InvalidArgument,
            });
        }

        self.bootloader.reset();
        let mut report = UpdateReport::default();

        let entered = self.enter_bootloader();
        if entered.is_err() {
            self.bootloader.framer().set_break(false);
        }
        stage(UpdateStage::EnterBootloader, entered)?;

        let (list, version, sram_info, sflash_info) =
            stage(UpdateStage::Discover, self.discover())?;
        report.storage_list = list.0;
        report.version_before = version;
        report.sram_info = sram_info;
        report.sflash_info = sflash_info;

        let plan = self.plan;
        stage(UpdateStage::EraseRam, self.erase(plan.sram, plan.sram_erase))?;
        report.sram_bytes = stage(
            UpdateStage::WriteRam,
            self.write_image(plan.sram, plan.sram_offset, images.ram_patches),
        )?;

        report.version_after = stage(UpdateStage::ExecFromRam, self.exec_from_ram())?;

        stage(UpdateStage::EraseFlash, self.erase_flash())?;
        report.sflash_bytes = stage(
            UpdateStage::WriteFlash,
            self.write_image(plan.sflash, plan.sflash_offset, images.flash_patches),
        )?;

        let (bytes, chunks) = stage(
            UpdateStage::ProgramFilesystem,
            self.program(images.programming),
        )?;
        report.programmed_bytes = bytes;
        report.programmed_chunks = chunks;

        info!("Co-processor update done: {} bytes programmed", bytes);
        Ok(report)
    }

    /// Read the versions the target reports, then let it boot normally
    pub fn probe(&mut self) -> Result<VersionInfo, UpdateError<<U as UartTx>::Error>> {
        self.bootloader.reset();

        let entered = self.enter_bootloader();
        if entered.is_err() {
            self.bootloader.framer().set_break(false);
        }
        stage(UpdateStage::EnterBootloader, entered)?;

        let version = self.command().and_then(|bl| bl.get_version_info());
        self.restart();
        stage(UpdateStage::Discover, version)
    }

    /// Pulse reset with break released so the target boots its firmware
    pub fn restart(&mut self) {
        self.bootloader.framer().set_break(false);
        self.reset.set_low();
        self.delay.delay_ms(self.plan.reset_pulse_ms);
        self.reset.set_high();
        self.bootloader.reset();
    }

    /// Next command, unless cancelled
    fn command(&mut self) -> StepResult<&mut Bootloader<U>, U> {
        match self.cancel {
            Some(token) if token.is_cancelled() => {
                warn!("Update cancelled");
                Err(BootloaderError::Cancelled)
            }
            _ => Ok(&mut self.bootloader),
        }
    }

    fn enter_bootloader(&mut self) -> StepResult<(), U> {
        info!("Entering co-processor bootloader");
        self.command()?;

        self.bootloader.framer().set_break(true);
        self.reset.set_low();
        self.delay.delay_ms(self.plan.reset_pulse_ms);
        self.reset.set_high();

        self.bootloader.recv_boot_ack()?;
        self.bootloader.framer().set_break(false);
        self.delay.delay_ms(self.plan.boot_settle_ms);
        Ok(())
    }

    fn discover(&mut self) -> StepResult<(StorageList, VersionInfo, StorageInfo, StorageInfo), U> {
        let list = self.command()?.get_storage_list()?;
        debug!("Storage list {=u8:#x}", list.0);

        let version = self.command()?.get_version_info()?;
        info!(
            "Bootloader {}.{}.{}.{}",
            version.bootloader[0], version.bootloader[1], version.bootloader[2], version.bootloader[3]
        );

        let sram = self.plan.sram;
        let sflash = self.plan.sflash;
        let sram_info = self.command()?.get_storage_info(sram)?;
        let sflash_info = self.command()?.get_storage_info(sflash)?;
        debug!(
            "SRAM {}x{}, SFLASH {}x{}",
            sram_info.block_count, sram_info.block_size, sflash_info.block_count, sflash_info.block_size
        );

        Ok((list, version, sram_info, sflash_info))
    }

    fn erase(&mut self, id: StorageId, range: EraseRange) -> StepResult<(), U> {
        info!(
            "Erasing storage {} blocks {}+{}",
            id.0, range.first_block, range.block_count
        );
        self.command()?
            .raw_storage_erase(id, range.first_block, range.block_count)?;
        self.command()?.check_status()
    }

    fn erase_flash(&mut self) -> StepResult<(), U> {
        let sflash = self.plan.sflash;
        self.command()?.get_storage_info(sflash)?;
        self.erase(sflash, self.plan.sflash_erase)
    }

    /// Raw-write `image` at `base` in bounded chunks, checking status after each
    fn write_image(&mut self, id: StorageId, base: u32, image: &[u8]) -> StepResult<u32, U> {
        info!("Writing {} bytes to storage {}", image.len(), id.0);
        let chunk_size = self.plan.raw_chunk;

        let mut offset = base;
        for chunk in image.chunks(chunk_size) {
            self.command()?.raw_storage_write(id, offset, chunk)?;
            self.command()?.check_status()?;
            offset += chunk.len() as u32;
        }
        Ok(image.len() as u32)
    }

    fn exec_from_ram(&mut self) -> StepResult<VersionInfo, U> {
        self.command()?.get_version_info()?;
        info!("Executing bootloader patches from RAM");
        self.command()?.exec_from_ram()?;

        let version = self.command()?.get_version_info()?;
        info!(
            "Patched bootloader {}.{}.{}.{}",
            version.bootloader[0], version.bootloader[1], version.bootloader[2], version.bootloader[3]
        );
        Ok(version)
    }

    fn program(&mut self, image: &[u8]) -> StepResult<(u32, u32), U> {
        self.command()?.get_version_info()?;
        info!("Programming {} byte service pack", image.len());

        let mut chunks = 0u32;
        for chunk in image.chunks(self.plan.fs_chunk) {
            self.command()?.fs_program(&[], chunk, 0)?;
            chunks += 1;
        }
        Ok((image.len() as u32, chunks))
    }
}

fn stage<T, E>(stage: UpdateStage, result: Result<T, BootloaderError<E>>) -> Result<T, UpdateError<E>> {
    result.map_err(|error| {
        error!("Update failed at {:?}", stage);
        UpdateError { stage, error }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Status;
    use crate::testing::{Event, NoDelay, RecordingPin, SimTarget, NWP_VERSION, PATCHED_BOOTLOADER};
    use proptest::prelude::*;

    fn image(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn update<'c>(target: SimTarget) -> FirmwareUpdate<'c, SimTarget, RecordingPin, NoDelay> {
        let log = target.log();
        FirmwareUpdate::new(
            target,
            RecordingPin::new(log.clone()),
            NoDelay::new(log),
            UpdatePlan::CC3120,
        )
    }

    #[test]
    fn test_full_update() {
        let ram = image(9000, 1);
        let flash = image(5000, 2);
        let programming = image(10_000, 3);
        let images = FirmwareImages {
            ram_patches: &ram,
            flash_patches: &flash,
            programming: &programming,
        };

        let mut update = update(SimTarget::new());
        let report = update.run(&images).unwrap();

        assert_eq!(report.sram_bytes, 9000);
        assert_eq!(report.sflash_bytes, 5000);
        assert_eq!(report.programmed_bytes, 10_000);
        assert_eq!(report.programmed_chunks, 3);
        assert_eq!(report.storage_list, 0b101);
        assert_eq!(report.sflash_info.block_size, 4096);
        assert_eq!(report.version_after.bootloader, PATCHED_BOOTLOADER);
        assert_ne!(report.version_before.bootloader, PATCHED_BOOTLOADER);

        let (target, _) = update.release();
        assert_eq!(&target.sram()[..9000], &ram[..]);
        let base = 33 * 4096 + 8;
        assert_eq!(&target.sflash()[base..base + 5000], &flash[..]);
        assert_eq!(target.fs_image(), &programming[..]);
        assert_eq!(target.erases(), &[(0, 0, 3), (2, 33, 2)]);
        assert_eq!(target.exec_count(), 1);
        assert_eq!(target.protocol_errors(), 0);
    }

    #[test]
    fn test_command_order() {
        let ram = image(4081, 1);
        let flash = image(10, 2);
        let programming = image(4096, 3);
        let images = FirmwareImages {
            ram_patches: &ram,
            flash_patches: &flash,
            programming: &programming,
        };

        let mut update = update(SimTarget::new());
        update.run(&images).unwrap();
        let (target, _) = update.release();

        assert_eq!(
            target.commands(),
            &[
                0x27, 0x2F, 0x31, 0x31, // discover
                0x30, 0x23, // erase SRAM
                0x2D, 0x23, 0x2D, 0x23, // two SRAM chunks
                0x2F, 0x32, 0x2F, // exec from RAM
                0x31, 0x30, 0x23, // erase SFLASH
                0x2D, 0x23, // one SFLASH chunk
                0x2F, 0x34, // program
            ]
        );
    }

    #[test]
    fn test_boot_entry_sequence() {
        let images = FirmwareImages {
            ram_patches: &[],
            flash_patches: &[],
            programming: &[],
        };

        let target = SimTarget::new();
        let log = target.log();
        let mut update = update(target);
        update.run(&images).unwrap();

        let events = log.borrow();
        assert_eq!(
            &events[..7],
            &[
                Event::Break(true),
                Event::Reset(false),
                Event::DelayMs(50),
                Event::Reset(true),
                Event::BootAck,
                Event::Break(false),
                Event::DelayMs(1000),
            ]
        );
        assert_eq!(events[7], Event::Command(0x27));
    }

    #[test]
    fn test_bad_status_aborts() {
        let ram = image(12_000, 1);
        let images = FirmwareImages {
            ram_patches: &ram,
            flash_patches: &[1, 2, 3],
            programming: &[4, 5, 6],
        };

        let mut target = SimTarget::new();
        // 0 is the SRAM erase, 1 and 2 are the first two chunks
        target.fail_status_at = Some(2);
        let mut update = update(target);

        assert_eq!(
            update.run(&images),
            Err(UpdateError {
                stage: UpdateStage::WriteRam,
                error: BootloaderError::BadStatus(Status::FlashFail),
            })
        );

        let (target, _) = update.release();
        assert_eq!(target.raw_writes(), 2);
        assert_eq!(target.exec_count(), 0);
        assert!(target.fs_image().is_empty());
    }

    #[test]
    fn test_missing_boot_ack() {
        let mut target = SimTarget::new();
        target.boot_ack = false;
        let log = target.log();
        let mut update = update(target);

        let images = FirmwareImages {
            ram_patches: &[],
            flash_patches: &[],
            programming: &[],
        };
        let err = update.run(&images).unwrap_err();
        assert_eq!(err.stage, UpdateStage::EnterBootloader);
        assert!(matches!(err.error, BootloaderError::Uart(_)));
        // break is not left asserted
        assert_eq!(log.borrow().last(), Some(&Event::Break(false)));
    }

    #[test]
    fn test_second_exec_ack_missing() {
        let mut target = SimTarget::new();
        target.exec_fails = true;
        let mut update = update(target);

        let images = FirmwareImages {
            ram_patches: &[0; 16],
            flash_patches: &[0; 16],
            programming: &[0; 16],
        };
        let err = update.run(&images).unwrap_err();
        assert_eq!(err.stage, UpdateStage::ExecFromRam);

        let (target, _) = update.release();
        assert_eq!(target.raw_writes(), 1);
    }

    #[test]
    fn test_cancel_stops_before_next_command() {
        let token = CancelToken::new();
        token.cancel();

        let mut update = update(SimTarget::new()).with_cancel(&token);
        let images = FirmwareImages {
            ram_patches: &[0; 16],
            flash_patches: &[],
            programming: &[],
        };

        assert_eq!(
            update.run(&images),
            Err(UpdateError {
                stage: UpdateStage::EnterBootloader,
                error: BootloaderError::Cancelled,
            })
        );
        let (target, _) = update.release();
        assert!(target.host_bytes().is_empty());

        token.clear();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_mid_write() {
        static TOKEN: CancelToken = CancelToken::new();

        let ram = image(9000, 1);
        let images = FirmwareImages {
            ram_patches: &ram,
            flash_patches: &[],
            programming: &[],
        };

        let mut target = SimTarget::new();
        target.cancel_after_writes = Some((1, &TOKEN));
        let mut update = update(target).with_cancel(&TOKEN);

        assert_eq!(
            update.run(&images),
            Err(UpdateError {
                stage: UpdateStage::WriteRam,
                error: BootloaderError::Cancelled,
            })
        );
        let (target, _) = update.release();
        assert_eq!(target.raw_writes(), 1);
    }

    #[test]
    fn test_probe_reads_version_and_reboots() {
        let target = SimTarget::new();
        let log = target.log();
        let mut update = update(target);

        let version = update.probe().unwrap();
        assert_eq!(version.nwp, NWP_VERSION);
        assert!(!needs_update(Some(&version), 0x0307_0001));

        let events = log.borrow();
        assert_eq!(
            &events[events.len() - 4..],
            &[
                Event::Break(false),
                Event::Reset(false),
                Event::DelayMs(50),
                Event::Reset(true),
            ]
        );
    }

    #[test]
    fn test_probe_failure_releases_break() {
        let mut target = SimTarget::new();
        target.silent = true;
        let log = target.log();
        let mut update = update(target);

        let err = update.probe().unwrap_err();
        assert_eq!(err.stage, UpdateStage::Discover);
        assert_eq!(log.borrow().last(), Some(&Event::Reset(true)));
    }

    #[test]
    fn test_plan_rejects_oversize_chunks() {
        let mut plan = UpdatePlan::CC3120;
        assert!(plan.is_valid());
        plan.raw_chunk = 4096;
        assert!(!plan.is_valid());
        plan.raw_chunk = 4080;
        plan.fs_chunk = 0;
        assert!(!plan.is_valid());
    }

    #[test]
    fn test_needs_update() {
        let mut version = VersionInfo::default();
        version.nwp = [3, 7, 0, 1];

        assert!(needs_update(None, 0x0307_0001));
        assert!(!needs_update(Some(&version), 0x0307_0001));
        assert!(needs_update(Some(&version), 0x0307_0002));
        assert!(!needs_update(Some(&version), 0x0207_0009));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn chunks_reconstruct_images(
            ram_len in 0usize..12_288,
            flash_len in 0usize..8_184,
            fs_len in 0usize..13_000,
            seed in any::<u8>(),
        ) {
            let ram = image(ram_len, seed);
            let flash = image(flash_len, seed.wrapping_add(1));
            let programming = image(fs_len, seed.wrapping_add(2));
            let images = FirmwareImages {
                ram_patches: &ram,
                flash_patches: &flash,
                programming: &programming,
            };

            let mut update = update(SimTarget::new());
            update.run(&images).unwrap();
            let (target, _) = update.release();

            prop_assert!(target.max_raw_chunk() <= MAX_RAW_WRITE);
            prop_assert!(target.max_fs_chunk() <= MAX_FS_CHUNK);
            prop_assert_eq!(&target.sram()[..ram_len], &ram[..]);
            let base = 33 * 4096 + 8;
            prop_assert_eq!(&target.sflash()[base..base + flash_len], &flash[..]);
            prop_assert_eq!(target.fs_image(), &programming[..]);
            prop_assert_eq!(target.protocol_errors(), 0);
        }
    }
}
