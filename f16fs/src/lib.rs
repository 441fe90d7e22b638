#![no_std]
extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

pub use crate::block_dev::{BlockDevice, RamDevice};

mod bitmap;
mod block_cache;
mod block_dev;
#[cfg(feature = "std")]
mod block_file;
mod block_manager;
mod block_store;
pub mod config;
mod error;
mod file;
mod fs;
mod layout;
mod path;
mod tree;

pub use bitmap::Bitmap;
#[cfg(feature = "std")]
pub use block_file::BlockFile;
pub use block_store::BlockStore;
pub use config::BLOCK_SIZE;
pub use error::{FsError, Result};
pub use file::Whence;
pub use fs::{FileRecord, FileSystem};
pub use layout::{FileType, Mode};
pub use path::Located;

/// Seconds since the epoch, truncated to the on-disk width.
#[cfg(feature = "std")]
pub(crate) fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(not(feature = "std"))]
pub(crate) fn now() -> u32 {
    0
}
