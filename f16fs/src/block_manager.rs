use crate::block_cache::BlockCache;
use crate::block_dev::BlockDevice;
use crate::config::BLOCK_CACHE_CAP;
use crate::{FsError, Result};
use alloc::sync::Arc;
use core::num::NonZeroUsize;
use lru::LruCache;

/// Least-recently-used set of cached blocks for one device.
pub struct BlockManager {
    block_device: Arc<dyn BlockDevice>,
    lru_cache: LruCache<usize, BlockCache>,
}

impl BlockManager {
    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        let cap = NonZeroUsize::new(BLOCK_CACHE_CAP).unwrap_or(NonZeroUsize::MIN);
        Self {
            block_device,
            lru_cache: LruCache::new(cap),
        }
    }

    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }

    pub fn get_block_cache(&mut self, block_id: usize) -> Result<&mut BlockCache> {
        if !self.lru_cache.contains(&block_id) {
            let cache = BlockCache::load(block_id, Arc::clone(&self.block_device))?;
            self.insert(block_id, cache)?;
        }
        self.lru_cache
            .get_mut(&block_id)
            .ok_or(FsError::Io { block_id })
    }

    /// Cache a block of zeros without reading the device; it is written on the next sync.
    pub fn get_zeroed(&mut self, block_id: usize) -> Result<&mut BlockCache> {
        self.lru_cache.pop(&block_id);
        let cache = BlockCache::zeroed(block_id, Arc::clone(&self.block_device));
        self.insert(block_id, cache)?;
        self.lru_cache
            .get_mut(&block_id)
            .ok_or(FsError::Io { block_id })
    }

    fn insert(&mut self, block_id: usize, cache: BlockCache) -> Result<()> {
        // evict
        if let Some((_, mut evicted)) = self.lru_cache.push(block_id, cache) {
            evicted.sync()?;
        }
        Ok(())
    }

    /// Forget a block, dropping any unwritten change.
    pub fn invalidate(&mut self, block_id: usize) {
        if let Some(mut cache) = self.lru_cache.pop(&block_id) {
            cache.discard();
        }
    }

    pub fn sync_all(&mut self) -> Result<()> {
        for (_, cache) in self.lru_cache.iter_mut() {
            cache.sync()?;
        }
        Ok(())
    }
}
