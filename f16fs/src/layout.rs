use crate::config::{
    BLOCK_SIZE, DIRECT_TOTAL, DIR_REC_MAX, FILE_BLOCKS_MAX, FNAME_MAX, INDIRECT_TOTAL,
    INODE_BLOCK_OFFSET, INODE_BLOCK_TOTAL, INODE_TOTAL,
};
use bitflags::bitflags;
use core::mem::size_of;

/// should be BLOCK_SIZE bytes, aligned for the layout types below
#[repr(C, align(8))]
pub struct DataBlock(pub [u8; BLOCK_SIZE]);

impl DataBlock {
    pub fn zeroed() -> Self {
        Self([0u8; BLOCK_SIZE])
    }
}

bitflags! {
    /// Permission bits. Stored, never enforced.
    pub struct Mode: u32 {
        const OTHER_EXEC = 0o001;
        const OTHER_WRITE = 0o002;
        const OTHER_READ = 0o004;
        const GROUP_EXEC = 0o010;
        const GROUP_WRITE = 0o020;
        const GROUP_READ = 0o040;
        const OWNER_EXEC = 0o100;
        const OWNER_WRITE = 0o200;
        const OWNER_READ = 0o400;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
}

impl FileType {
    fn tag(self) -> u8 {
        match self {
            FileType::Regular => 1,
            FileType::Directory => 2,
        }
    }
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FileType::Regular),
            2 => Some(FileType::Directory),
            _ => None,
        }
    }
}

/// Shared by inodes and directory blocks, 48 bytes.
/// A directory block only uses `size`, as its entry count.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct InodeMeta {
    pub size: u32,
    pub mode: u32,
    pub c_time: u32,
    pub a_time: u32,
    pub m_time: u32,
    pub parent: u8,
    type_: u8,
    pub in_use: u8,
    pub links: u8,
    _padding: [u8; 24],
}

pub const INODE_PTR_TOTAL: usize = 8;
pub const INDIRECT_PTR: usize = DIRECT_TOTAL;
pub const DBL_INDIRECT_PTR: usize = DIRECT_TOTAL + 1;

/// size should be 64 bytes
/// 6 direct, 1 single indirect, 1 double indirect
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct DiskInode {
    pub meta: InodeMeta,
    pub data_ptrs: [u16; INODE_PTR_TOTAL],
}

pub const DISK_INODE_SIZE: usize = size_of::<DiskInode>();
pub const DISK_INODE_PER_BLOCK: usize = BLOCK_SIZE / DISK_INODE_SIZE;

impl DiskInode {
    pub fn new(type_: FileType, parent: u8, now: u32) -> Self {
        let mut inode = Self::default();
        inode.meta.mode = Mode::all().bits();
        inode.meta.c_time = now;
        inode.meta.a_time = now;
        inode.meta.m_time = now;
        inode.meta.parent = parent;
        inode.meta.type_ = type_.tag();
        inode.meta.in_use = 1;
        inode.meta.links = 1;
        inode
    }
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_tag(self.meta.type_)
    }
    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }
    pub fn is_file(&self) -> bool {
        self.file_type() == Some(FileType::Regular)
    }
    pub fn in_use(&self) -> bool {
        self.meta.in_use != 0
    }
    pub fn size(&self) -> usize {
        self.meta.size as usize
    }
}

/// Block id and byte offset of an inode inside the inode table.
pub fn inode_pos(inode: u8) -> (usize, usize) {
    let inode = inode as usize;
    (
        INODE_BLOCK_OFFSET + inode / DISK_INODE_PER_BLOCK,
        (inode % DISK_INODE_PER_BLOCK) * DISK_INODE_SIZE,
    )
}

pub type IndirectBlock = [u16; INDIRECT_TOTAL];

/// Where a file block index lives in the pointer tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPos {
    Direct(usize),
    Indirect(usize),
    DoubleIndirect(usize, usize),
}

pub fn block_pos(index: usize) -> Option<BlockPos> {
    if index < DIRECT_TOTAL {
        Some(BlockPos::Direct(index))
    } else if index < DIRECT_TOTAL + INDIRECT_TOTAL {
        Some(BlockPos::Indirect(index - DIRECT_TOTAL))
    } else if index < FILE_BLOCKS_MAX {
        let index = index - DIRECT_TOTAL - INDIRECT_TOTAL;
        Some(BlockPos::DoubleIndirect(
            index / INDIRECT_TOTAL,
            index % INDIRECT_TOTAL,
        ))
    } else {
        None
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirEntry {
    name: [u8; FNAME_MAX],
    inode: u8,
}

impl DirEntry {
    pub fn empty() -> Self {
        Self {
            name: [0u8; FNAME_MAX],
            inode: 0,
        }
    }
    /// `name` must be shorter than `FNAME_MAX`.
    pub fn new(name: &str, inode: u8) -> Self {
        let mut entry = Self::empty();
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry.inode = inode;
        entry
    }
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&x| x == 0)
            .unwrap_or(FNAME_MAX);
        &self.name[..len]
    }
    pub fn inode(&self) -> u8 {
        self.inode
    }
}

/// should be BLOCK_SIZE bytes
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirBlock {
    pub meta: InodeMeta,
    pub entries: [DirEntry; DIR_REC_MAX],
    _padding: [u8; 9],
}

impl DirBlock {
    pub fn empty() -> Self {
        Self {
            meta: InodeMeta::default(),
            entries: [DirEntry::empty(); DIR_REC_MAX],
            _padding: [0u8; 9],
        }
    }
    pub fn len(&self) -> usize {
        self.meta.size as usize
    }
    pub fn is_empty(&self) -> bool {
        self.meta.size == 0
    }
    pub fn is_full(&self) -> bool {
        self.len() >= DIR_REC_MAX
    }
    /// Slot holding `name`, compared byte for byte.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| !entry.is_free() && entry.name_bytes() == name.as_bytes())
    }
    pub fn insert(&mut self, name: &str, inode: u8) -> Option<usize> {
        let slot = self.entries.iter().position(DirEntry::is_free)?;
        self.entries[slot] = DirEntry::new(name, inode);
        self.meta.size += 1;
        Some(slot)
    }
    pub fn remove(&mut self, slot: usize) {
        if !self.entries[slot].is_free() {
            self.entries[slot] = DirEntry::empty();
            self.meta.size -= 1;
        }
    }
    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|entry| !entry.is_free())
    }
}

const _: () = assert!(size_of::<InodeMeta>() == 48);
const _: () = assert!(DISK_INODE_SIZE == 64);
const _: () = assert!(DISK_INODE_PER_BLOCK * INODE_BLOCK_TOTAL == INODE_TOTAL);
const _: () = assert!(size_of::<DirBlock>() == BLOCK_SIZE);
const _: () = assert!(size_of::<IndirectBlock>() == BLOCK_SIZE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DBL_INDIRECT_TOTAL;

    #[test]
    fn tiers_split_at_direct_and_indirect_bounds() {
        assert_eq!(block_pos(0), Some(BlockPos::Direct(0)));
        assert_eq!(block_pos(5), Some(BlockPos::Direct(5)));
        assert_eq!(block_pos(6), Some(BlockPos::Indirect(0)));
        assert_eq!(block_pos(6 + 255), Some(BlockPos::Indirect(255)));
        assert_eq!(block_pos(6 + 256), Some(BlockPos::DoubleIndirect(0, 0)));
        assert_eq!(block_pos(6 + 256 + 257), Some(BlockPos::DoubleIndirect(1, 1)));
        assert_eq!(
            block_pos(FILE_BLOCKS_MAX - 1),
            Some(BlockPos::DoubleIndirect(255, 255))
        );
        assert_eq!(block_pos(FILE_BLOCKS_MAX), None);
        assert_eq!(FILE_BLOCKS_MAX, 6 + 256 + DBL_INDIRECT_TOTAL);
    }

    #[test]
    fn inode_table_addressing() {
        assert_eq!(inode_pos(0), (16, 0));
        assert_eq!(inode_pos(7), (16, 7 * 64));
        assert_eq!(inode_pos(8), (17, 0));
        assert_eq!(inode_pos(255), (47, 7 * 64));
    }

    #[test]
    fn dir_block_slots_are_reused() {
        let mut dir = DirBlock::empty();
        for i in 0..DIR_REC_MAX {
            let name = alloc::format!("f{}", i);
            assert_eq!(dir.insert(&name, i as u8 + 1), Some(i));
        }
        assert!(dir.is_full());
        assert_eq!(dir.insert("extra", 9), None);
        assert_eq!(dir.find("f3"), Some(3));
        dir.remove(3);
        assert_eq!(dir.len(), DIR_REC_MAX - 1);
        assert_eq!(dir.find("f3"), None);
        assert_eq!(dir.insert("g", 10), Some(3));
        assert_eq!(dir.entries[3].inode(), 10);
    }

    #[test]
    fn names_match_exactly() {
        let mut dir = DirBlock::empty();
        dir.insert("Readme", 1);
        assert_eq!(dir.find("Readme"), Some(0));
        assert_eq!(dir.find("readme"), None);
        assert_eq!(dir.find("Read"), None);
    }

    #[test]
    fn new_inode_is_live() {
        let inode = DiskInode::new(FileType::Regular, 3, 42);
        assert!(inode.in_use());
        assert!(inode.is_file());
        assert_eq!(inode.meta.parent, 3);
        assert_eq!(inode.meta.mode, 0o777);
        assert_eq!(inode.meta.links, 1);
        assert_eq!(inode.data_ptrs, [0; INODE_PTR_TOTAL]);
    }
}
