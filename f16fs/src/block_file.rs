use crate::config::{BLOCK_COUNT, BLOCK_SIZE, IMAGE_SIZE};
use crate::{BlockDevice, FsError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// An image file on the host used as a block device.
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    /// Create (or truncate) an image file of exactly `IMAGE_SIZE` zeroed bytes.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        f.set_len(IMAGE_SIZE as u64)?;
        Ok(Self(Mutex::new(f)))
    }

    /// Open an existing image; its length must match `IMAGE_SIZE`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = OpenOptions::new().read(true).write(true).open(path)?;
        if f.metadata()?.len() != IMAGE_SIZE as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "image has the wrong size",
            ));
        }
        Ok(Self(Mutex::new(f)))
    }

    fn transfer<F>(&self, block_id: usize, len: usize, op: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        if block_id >= BLOCK_COUNT || len != BLOCK_SIZE {
            return Err(FsError::Io { block_id });
        }
        let mut file = self.0.lock().map_err(|_| FsError::Io { block_id })?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .and_then(|_| op(&mut *file))
            .map_err(|e| {
                log::error!("block {}: {}", block_id, e);
                FsError::Io { block_id }
            })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        self.transfer(block_id, buf.len(), |file| file.read_exact(buf))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        self.transfer(block_id, buf.len(), |file| file.write_all(buf))
    }
}
