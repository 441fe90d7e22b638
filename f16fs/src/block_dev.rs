use crate::config::{BLOCK_COUNT, BLOCK_SIZE};
use crate::{FsError, Result};
use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use spin::Mutex;

/// Raw storage addressed in `BLOCK_SIZE` units.
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()>;
}

/// A device held entirely in memory, sized for a full image.
pub struct RamDevice(Mutex<Vec<u8>>);

impl RamDevice {
    pub fn new() -> Self {
        Self(Mutex::new(vec![0u8; BLOCK_COUNT * BLOCK_SIZE]))
    }

    fn range(block_id: usize, len: usize) -> Result<core::ops::Range<usize>> {
        if block_id >= BLOCK_COUNT || len != BLOCK_SIZE {
            return Err(FsError::Io { block_id });
        }
        let start = block_id * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}

impl Default for RamDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for RamDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        let range = Self::range(block_id, buf.len())?;
        buf.copy_from_slice(&self.0.lock()[range]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        let range = Self::range(block_id, buf.len())?;
        self.0.lock()[range].copy_from_slice(buf);
        Ok(())
    }
}
