//! Geometry of an F16FS image. Everything is fixed at compile time.

pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_COUNT: usize = 65536;
pub const IMAGE_SIZE: usize = BLOCK_COUNT * BLOCK_SIZE;

/// the free block bitmap lives in blocks `0..FBM_BLOCK_COUNT`
pub const FBM_BLOCK_COUNT: usize = 16;
pub const FBM_BYTES: usize = FBM_BLOCK_COUNT * BLOCK_SIZE;

pub const INODE_BLOCK_OFFSET: usize = 16;
pub const INODE_BLOCK_TOTAL: usize = 32;
pub const DATA_BLOCK_OFFSET: usize = INODE_BLOCK_OFFSET + INODE_BLOCK_TOTAL;
pub const ROOT_DIR_BLOCK: usize = DATA_BLOCK_OFFSET;
pub const ROOT_INODE: u8 = 0;
/// 8 inodes per table block
pub const INODE_TOTAL: usize = INODE_BLOCK_TOTAL * 8;

pub const DIRECT_TOTAL: usize = 6;
/// pointers held by one indirect block
pub const INDIRECT_TOTAL: usize = BLOCK_SIZE / core::mem::size_of::<u16>();
pub const DBL_INDIRECT_TOTAL: usize = INDIRECT_TOTAL * INDIRECT_TOTAL;
pub const FILE_BLOCKS_MAX: usize = DIRECT_TOTAL + INDIRECT_TOTAL + DBL_INDIRECT_TOTAL;
pub const FILE_SIZE_MAX: usize = FILE_BLOCKS_MAX * BLOCK_SIZE;

/// maximum entries in a directory
pub const DIR_REC_MAX: usize = 7;
/// file name buffer length, NUL included
pub const FNAME_MAX: usize = 64;
pub const PATH_MAX: usize = 16322;

pub const DESCRIPTOR_MAX: usize = 256;

pub const BLOCK_CACHE_CAP: usize = 32;
