use crate::bitmap::Bitmap;
use crate::block_dev::BlockDevice;
use crate::block_manager::BlockManager;
use crate::config::{BLOCK_COUNT, BLOCK_SIZE, FBM_BLOCK_COUNT, FBM_BYTES};
use crate::{FsError, Result};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

/// Fixed-size block storage with its own free block map.
///
/// Blocks `0..FBM_BLOCK_COUNT` hold the map and cannot be read, written,
/// requested or released through the store. Every other block is handed out
/// by [`allocate`](Self::allocate) or claimed by [`request`](Self::request).
///
/// Outside the crate blocks are plain bytes; typed views stay internal:
///
/// ```compile_fail
/// use f16fs::{BlockStore, RamDevice};
/// use std::sync::Arc;
///
/// let mut bs = BlockStore::create(Arc::new(RamDevice::new())).unwrap();
/// let id = bs.allocate().unwrap() as usize;
/// let _ = bs.read(id, 0, |x: &core::num::NonZeroU32| x.get());
/// ```
pub struct BlockStore {
    manager: BlockManager,
    fbm: Vec<u8>,
    /// one bit per map block waiting to be written
    fbm_dirty: u16,
    /// no free block below this one
    search_from: usize,
}

impl BlockStore {
    /// Wipe the device and start with only the map blocks in use.
    pub fn create(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        // clear all blocks
        let zeros = [0u8; BLOCK_SIZE];
        for block_id in 0..BLOCK_COUNT {
            block_device.write_block(block_id, &zeros)?;
        }
        let mut bs = Self {
            manager: BlockManager::new(block_device),
            fbm: vec![0u8; FBM_BYTES],
            fbm_dirty: 0,
            search_from: 0,
        };
        for block_id in 0..FBM_BLOCK_COUNT {
            bs.mark(block_id, true);
        }
        bs.sync()?;
        Ok(bs)
    }

    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut fbm = vec![0u8; FBM_BYTES];
        for (block_id, chunk) in fbm.chunks_mut(BLOCK_SIZE).enumerate() {
            block_device.read_block(block_id, chunk)?;
        }
        let bs = Self {
            manager: BlockManager::new(block_device),
            fbm,
            fbm_dirty: 0,
            search_from: 0,
        };
        if (0..FBM_BLOCK_COUNT).any(|block_id| !bs.is_allocated(block_id)) {
            return Err(FsError::InvalidImage);
        }
        Ok(bs)
    }

    pub fn close(mut self) -> Result<()> {
        self.sync()
    }

    fn bitmap(&mut self) -> Bitmap<'_> {
        Bitmap::over(&mut self.fbm)
    }

    fn mark(&mut self, block_id: usize, used: bool) {
        let mut bitmap = self.bitmap();
        if used {
            bitmap.set(block_id);
        } else {
            bitmap.reset(block_id);
            self.search_from = self.search_from.min(block_id);
        }
        self.fbm_dirty |= 1 << (block_id / BITS_PER_BLOCK);
    }

    pub fn is_allocated(&self, block_id: usize) -> bool {
        block_id < BLOCK_COUNT && self.fbm[block_id / 8] & (1 << (block_id % 8)) != 0
    }

    /// Claim the first free block; its content reads as zeros.
    pub fn allocate(&mut self) -> Option<u16> {
        let from = self.search_from;
        let block_id = match self.bitmap().ffz_from(from) {
            Some(block_id) => block_id,
            None => {
                self.search_from = BLOCK_COUNT;
                return None;
            }
        };
        self.search_from = block_id;
        self.mark(block_id, true);
        if let Err(e) = self.manager.get_zeroed(block_id).and_then(|cache| cache.sync()) {
            log::warn!("cannot zero block {}: {}", block_id, e);
            self.manager.invalidate(block_id);
            self.mark(block_id, false);
            return None;
        }
        Some(block_id as u16)
    }

    /// Claim a specific block. Fails if it is already in use or reserved for the map.
    pub fn request(&mut self, block_id: usize) -> bool {
        if !Self::accessible(block_id) || self.is_allocated(block_id) {
            return false;
        }
        self.mark(block_id, true);
        true
    }

    pub fn release(&mut self, block_id: usize) {
        if Self::accessible(block_id) {
            self.manager.invalidate(block_id);
            self.mark(block_id, false);
        }
    }

    pub fn free_blocks(&self) -> usize {
        let used: usize = self.fbm.iter().map(|byte| byte.count_ones() as usize).sum();
        BLOCK_COUNT - used
    }

    fn accessible(block_id: usize) -> bool {
        (FBM_BLOCK_COUNT..BLOCK_COUNT).contains(&block_id)
    }

    fn check(block_id: usize) -> Result<()> {
        if Self::accessible(block_id) {
            Ok(())
        } else {
            Err(FsError::BlockOutOfRange(block_id))
        }
    }

    pub fn read_block(&mut self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        Self::check(block_id)?;
        if buf.len() != BLOCK_SIZE {
            return Err(FsError::InvalidArgument);
        }
        let cache = self.manager.get_block_cache(block_id)?;
        buf.copy_from_slice(cache.bytes());
        Ok(())
    }

    pub fn write_block(&mut self, block_id: usize, buf: &[u8]) -> Result<()> {
        Self::check(block_id)?;
        if buf.len() != BLOCK_SIZE {
            return Err(FsError::InvalidArgument);
        }
        // the old content is replaced whole, no need to load it
        let cache = self.manager.get_zeroed(block_id)?;
        cache.bytes_mut().copy_from_slice(buf);
        self.write_through(block_id)
    }

    /// Run `f` on the `T` stored at `offset` of a block.
    pub(crate) fn read<T, V>(&mut self, block_id: usize, offset: usize, f: impl FnOnce(&T) -> V) -> Result<V> {
        Self::check(block_id)?;
        let cache = self.manager.get_block_cache(block_id)?;
        Ok(f(cache.as_ref::<T>(offset)))
    }

    /// Run `f` on the `T` stored at `offset` of a block, then write the block through.
    pub(crate) fn modify<T, V>(
        &mut self,
        block_id: usize,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> Result<V> {
        Self::check(block_id)?;
        let cache = self.manager.get_block_cache(block_id)?;
        let ret = f(cache.as_mut_ref::<T>(offset));
        self.write_through(block_id)?;
        Ok(ret)
    }

    fn write_through(&mut self, block_id: usize) -> Result<()> {
        let synced = self.manager.get_block_cache(block_id)?.sync();
        if synced.is_err() {
            // the cached copy no longer matches the device
            self.manager.invalidate(block_id);
        }
        synced
    }

    /// Flush the free block map.
    pub fn sync(&mut self) -> Result<()> {
        self.manager.sync_all()?;
        for (block_id, chunk) in self.fbm.chunks(BLOCK_SIZE).enumerate() {
            if self.fbm_dirty & (1 << block_id) != 0 {
                self.manager.block_device().write_block(block_id, chunk)?;
                self.fbm_dirty &= !(1 << block_id);
            }
        }
        Ok(())
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            log::error!("free block map not saved: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RamDevice;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> BlockStore {
        BlockStore::create(Arc::new(RamDevice::new())).unwrap()
    }

    #[test]
    fn map_blocks_are_reserved() {
        let mut bs = store();
        let mut buf = [0u8; BLOCK_SIZE];
        for block_id in 0..FBM_BLOCK_COUNT {
            assert!(!bs.request(block_id));
            assert_eq!(bs.read_block(block_id, &mut buf), Err(FsError::BlockOutOfRange(block_id)));
            assert_eq!(bs.write_block(block_id, &buf), Err(FsError::BlockOutOfRange(block_id)));
        }
        assert_eq!(bs.free_blocks(), BLOCK_COUNT - FBM_BLOCK_COUNT);
    }

    #[test]
    fn allocate_request_release() {
        let mut bs = store();
        let a = bs.allocate().unwrap() as usize;
        assert_eq!(a, FBM_BLOCK_COUNT);
        assert!(!bs.request(a));
        assert!(bs.request(a + 5));
        assert_eq!(bs.allocate().unwrap() as usize, a + 1);

        let data = [0xA5u8; BLOCK_SIZE];
        bs.write_block(a, &data).unwrap();
        let mut back = [0u8; BLOCK_SIZE];
        bs.read_block(a, &mut back).unwrap();
        assert_eq!(back, data);

        bs.release(a);
        assert!(!bs.is_allocated(a));
        // a reused block comes back zeroed
        assert_eq!(bs.allocate().unwrap() as usize, a);
        bs.read_block(a, &mut back).unwrap();
        assert_eq!(back, [0u8; BLOCK_SIZE]);
    }

    #[test]
    fn full_device_refuses_allocation() {
        let mut bs = store();
        assert!((FBM_BLOCK_COUNT..BLOCK_COUNT).all(|block_id| bs.request(block_id)));
        assert_eq!(bs.free_blocks(), 0);
        assert_eq!(bs.allocate(), None);
    }

    #[test]
    fn map_survives_reopen() {
        let device: Arc<dyn BlockDevice> = Arc::new(RamDevice::new());
        let mut bs = BlockStore::create(Arc::clone(&device)).unwrap();
        let a = bs.allocate().unwrap() as usize;
        assert!(bs.request(40_000));
        bs.write_block(a, &[7u8; BLOCK_SIZE]).unwrap();
        bs.close().unwrap();

        let mut bs = BlockStore::open(device).unwrap();
        assert!(bs.is_allocated(a));
        assert!(bs.is_allocated(40_000));
        let mut back = [0u8; BLOCK_SIZE];
        bs.read_block(a, &mut back).unwrap();
        assert_eq!(back, [7u8; BLOCK_SIZE]);
    }

    struct CountingDevice {
        inner: RamDevice,
        reads: AtomicUsize,
    }

    impl BlockDevice for CountingDevice {
        fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_block(block_id, buf)
        }
        fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
            self.inner.write_block(block_id, buf)
        }
    }

    #[test]
    fn whole_block_write_skips_the_read() {
        let device = Arc::new(CountingDevice {
            inner: RamDevice::new(),
            reads: AtomicUsize::new(0),
        });
        let mut bs = BlockStore::create(device.clone()).unwrap();
        let before = device.reads.load(Ordering::SeqCst);
        bs.write_block(40_000, &[3u8; BLOCK_SIZE]).unwrap();
        assert_eq!(device.reads.load(Ordering::SeqCst), before);

        let mut back = [0u8; BLOCK_SIZE];
        device.inner.read_block(40_000, &mut back).unwrap();
        assert_eq!(back, [3u8; BLOCK_SIZE]);
    }

    #[test]
    fn blank_device_is_not_a_store() {
        let device: Arc<dyn BlockDevice> = Arc::new(RamDevice::new());
        assert!(matches!(BlockStore::open(device), Err(FsError::InvalidImage)));
    }
}
