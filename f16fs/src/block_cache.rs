use crate::block_dev::BlockDevice;
use crate::config::BLOCK_SIZE;
use crate::layout::DataBlock;
use crate::Result;
use alloc::sync::Arc;

/// One block held in memory.
pub struct BlockCache {
    data: DataBlock,
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
    dirty: bool,
}

impl BlockCache {
    /// Load a block from the device.
    pub fn load(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut data = DataBlock::zeroed();
        block_device.read_block(block_id, &mut data.0)?;
        Ok(Self {
            data,
            block_id,
            block_device,
            dirty: false,
        })
    }

    /// A block whose on-disk content is about to be replaced by zeros.
    pub fn zeroed(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            data: DataBlock::zeroed(),
            block_id,
            block_device,
            dirty: true,
        }
    }

    /// `T` must be a `#[repr(C)]` plain-data layout type valid for any byte pattern.
    pub fn as_ref<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= BLOCK_SIZE);
        let ptr = unsafe { self.data.0.as_ptr().add(offset) };
        assert_eq!(ptr as usize % core::mem::align_of::<T>(), 0);
        unsafe { &*(ptr as *const T) }
    }

    pub fn as_mut_ref<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= BLOCK_SIZE);
        self.dirty = true;
        let ptr = unsafe { self.data.0.as_mut_ptr().add(offset) };
        assert_eq!(ptr as usize % core::mem::align_of::<T>(), 0);
        unsafe { &mut *(ptr as *mut T) }
    }

    pub fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.data.0
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        self.dirty = true;
        &mut self.data.0
    }

    pub fn sync(&mut self) -> Result<()> {
        if self.dirty {
            self.block_device.write_block(self.block_id, &self.data.0)?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn discard(&mut self) {
        self.dirty = false;
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            log::error!("lost write to block {}: {}", self.block_id, e);
        }
    }
}
