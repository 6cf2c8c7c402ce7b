//! Block device over the sector cache
//!
//! Maps 512-byte logical blocks onto the flash layout. Block `n` always
//! lives at `layout.start() + n * 512`; there is no remapping.
//!
//! All cache access happens under one async mutex, so a block transfer,
//! a periodic flush and a SYNC never interleave inside the single
//! sector buffer.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use tilda_hal::{NvStorage, OutputPin};

use crate::cache::SectorCache;
use crate::error::StorageError;
use crate::layout::FlashLayout;

/// Logical block size seen by the filesystem
pub const BLOCK_SIZE: usize = 512;

/// Block device control operations
///
/// Numbered as in the MicroPython block device protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum IoctlOp {
    /// Reset the cache and start periodic flushing
    Init = 1,
    /// Flush and stop periodic flushing
    Deinit = 2,
    /// Block until nothing is dirty
    Sync = 3,
    /// Number of logical blocks
    BlockCount = 4,
    /// Logical block size in bytes
    BlockSize = 5,
}

impl IoctlOp {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(IoctlOp::Init),
            2 => Some(IoctlOp::Deinit),
            3 => Some(IoctlOp::Sync),
            4 => Some(IoctlOp::BlockCount),
            5 => Some(IoctlOp::BlockSize),
            _ => None,
        }
    }
}

/// Flush timing
#[derive(Debug, Clone, Copy)]
pub struct FlushConfig {
    /// Period of the background flush
    pub interval: Duration,
    /// Pause between SYNC attempts after a failed flush
    pub retry_delay: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
        }
    }
}

/// FAT-compatible block device backed by flash
pub struct FlashBlockDevice<M: RawMutex, F, L, const N: usize> {
    cache: Mutex<M, SectorCache<F, L, N>>,
    flush_request: Signal<M, ()>,
    running: AtomicBool,
    base: u32,
    block_count: u32,
    config: FlushConfig,
}

impl<M, F, L, const N: usize> FlashBlockDevice<M, F, L, N>
where
    M: RawMutex,
    F: NvStorage,
    L: OutputPin,
{
    /// Create a device over `layout`
    ///
    /// Any trailing bytes that do not make up a whole block are unused.
    pub fn new(
        storage: F,
        layout: FlashLayout,
        led: L,
        config: FlushConfig,
    ) -> Result<Self, StorageError> {
        let base = layout.start();
        let block_count = layout.capacity() / BLOCK_SIZE as u32;
        if block_count == 0 {
            return Err(StorageError::InvalidLayout);
        }

        Ok(Self {
            cache: Mutex::new(SectorCache::new(storage, layout, led)?),
            flush_request: Signal::new(),
            running: AtomicBool::new(false),
            base,
            block_count,
            config,
        })
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn config(&self) -> &FlushConfig {
        &self.config
    }

    /// Whether periodic flushing is enabled (between INIT and DEINIT)
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub async fn is_dirty(&self) -> bool {
        self.cache.lock().await.is_dirty()
    }

    /// Read one block into `dest`, which must be exactly [`BLOCK_SIZE`] bytes
    pub async fn read_block(&self, dest: &mut [u8], block: u32) -> Result<(), StorageError> {
        if dest.len() != BLOCK_SIZE {
            return Err(StorageError::BadBufferLength);
        }
        self.read_blocks(dest, block).await
    }

    /// Write one block from `src`, which must be exactly [`BLOCK_SIZE`] bytes
    ///
    /// Data is durable only after the next flush.
    pub async fn write_block(&self, src: &[u8], block: u32) -> Result<(), StorageError> {
        if src.len() != BLOCK_SIZE {
            return Err(StorageError::BadBufferLength);
        }
        self.write_blocks(src, block).await
    }

    /// Read consecutive blocks starting at `first`
    pub async fn read_blocks(&self, dest: &mut [u8], first: u32) -> Result<(), StorageError> {
        let mut addr = self.block_address(first, dest.len())?;
        let mut cache = self.cache.lock().await;

        let mut done = 0;
        while done < dest.len() {
            let src = cache.get_for_read(addr).await?;
            let n = src.len().min(dest.len() - done);
            dest[done..done + n].copy_from_slice(&src[..n]);
            done += n;
            addr += n as u32;
        }
        Ok(())
    }

    /// Write consecutive blocks starting at `first`
    pub async fn write_blocks(&self, src: &[u8], first: u32) -> Result<(), StorageError> {
        let mut addr = self.block_address(first, src.len())?;
        let mut cache = self.cache.lock().await;

        let mut done = 0;
        while done < src.len() {
            let dest = cache.get_for_write(addr).await?;
            let n = dest.len().min(src.len() - done);
            dest[..n].copy_from_slice(&src[done..done + n]);
            done += n;
            addr += n as u32;
        }
        Ok(())
    }

    /// Block device control
    ///
    /// INIT, DEINIT and SYNC return 0 on success.
    pub async fn ioctl(&self, op: IoctlOp) -> Result<u32, StorageError> {
        match op {
            IoctlOp::Init => {
                self.init().await;
                Ok(0)
            }
            IoctlOp::Deinit => {
                self.deinit().await;
                Ok(0)
            }
            IoctlOp::Sync => {
                self.sync().await;
                Ok(0)
            }
            IoctlOp::BlockCount => Ok(self.block_count),
            IoctlOp::BlockSize => Ok(BLOCK_SIZE as u32),
        }
    }

    /// Reset the cache to empty and enable periodic flushing
    pub async fn init(&self) {
        self.cache.lock().await.invalidate();
        self.running.store(true, Ordering::Relaxed);
        info!("Flash block device ready, {} blocks", self.block_count);
    }

    /// Flush everything and disable periodic flushing
    pub async fn deinit(&self) {
        self.sync().await;
        self.running.store(false, Ordering::Relaxed);
    }

    /// One flush attempt under the cache lock
    ///
    /// Returns `true` if a sector was written.
    pub async fn flush(&self) -> Result<bool, StorageError> {
        self.cache.lock().await.flush().await
    }

    /// Ask the flush task to flush soon, without waiting
    pub fn request_flush(&self) {
        self.flush_request.signal(());
    }

    /// Wait for a flush request from [`request_flush`](Self::request_flush)
    pub async fn wait_flush_request(&self) {
        self.flush_request.wait().await;
    }

    /// Block until the cache is clean, retrying failed flushes forever
    pub async fn sync(&self) {
        loop {
            match self.flush().await {
                Ok(_) => return,
                Err(e) => {
                    warn!("Sync flush failed: {:?}, retrying", e);
                    Timer::after(self.config.retry_delay).await;
                }
            }
        }
    }

    /// [`sync`](Self::sync) with an upper bound on how long to keep trying
    pub async fn sync_within(&self, timeout: Duration) -> Result<(), StorageError> {
        with_timeout(timeout, self.sync())
            .await
            .map_err(|_| StorageError::Timeout)
    }

    /// Address of block `first`, checking that `len` bytes from there fit
    fn block_address(&self, first: u32, len: usize) -> Result<u32, StorageError> {
        if len == 0 || len % BLOCK_SIZE != 0 {
            return Err(StorageError::BadBufferLength);
        }
        let count = (len / BLOCK_SIZE) as u32;
        match first.checked_add(count) {
            Some(end) if end <= self.block_count => {}
            _ => return Err(StorageError::BlockOutOfRange),
        }
        Ok(self.base + first * BLOCK_SIZE as u32)
    }
}
