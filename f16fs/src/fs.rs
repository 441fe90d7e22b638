use crate::block_store::BlockStore;
use crate::config::{INODE_BLOCK_OFFSET, INODE_TOTAL, ROOT_DIR_BLOCK, ROOT_INODE};
use crate::file::FdTable;
use crate::layout::{inode_pos, DirBlock, DirEntry, DiskInode, FileType};
use crate::path::split_parent;
use crate::tree;
use crate::{now, BlockDevice, FsError, Result};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub file_type: FileType,
}

/// free block map, inode table, data
pub struct FileSystem {
    pub(crate) store: BlockStore,
    pub(crate) fd_table: FdTable,
}

impl FileSystem {
    /// Build an empty file system on `block_device`, destroying its contents.
    pub fn format(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut store = BlockStore::create(block_device)?;
        // inode table plus the root directory block
        for block_id in INODE_BLOCK_OFFSET..=ROOT_DIR_BLOCK {
            if !store.request(block_id) {
                return Err(FsError::InvalidImage);
            }
        }
        let mut fs = Self {
            store,
            fd_table: FdTable::new(),
        };
        fs.store
            .modify(ROOT_DIR_BLOCK, 0, |dir: &mut DirBlock| *dir = DirBlock::empty())?;
        // create root inode
        let mut root = DiskInode::new(FileType::Directory, ROOT_INODE, now());
        root.data_ptrs[0] = ROOT_DIR_BLOCK as u16;
        fs.write_inode(ROOT_INODE, &root)?;
        fs.store.sync()?;
        log::info!("formatted: {} inodes, {} free blocks", INODE_TOTAL, fs.free_blocks());
        Ok(fs)
    }

    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let store = BlockStore::open(block_device)?;
        let mut fs = Self {
            store,
            fd_table: FdTable::new(),
        };
        let root = fs.read_inode(ROOT_INODE)?;
        if !root.in_use()
            || !root.is_dir()
            || root.data_ptrs[0] as usize != ROOT_DIR_BLOCK
            || !fs.store.is_allocated(ROOT_DIR_BLOCK)
        {
            return Err(FsError::InvalidImage);
        }
        log::info!("mounted: {} free blocks", fs.free_blocks());
        Ok(fs)
    }

    /// Format a new image file at `path`.
    #[cfg(feature = "std")]
    pub fn format_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = crate::BlockFile::create(path.as_ref()).map_err(|e| {
            log::error!("cannot create {}: {}", path.as_ref().display(), e);
            FsError::DeviceUnavailable
        })?;
        Self::format(Arc::new(file))
    }

    #[cfg(feature = "std")]
    pub fn mount_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = crate::BlockFile::open(path.as_ref()).map_err(|e| {
            log::error!("cannot open {}: {}", path.as_ref().display(), e);
            FsError::DeviceUnavailable
        })?;
        Self::mount(Arc::new(file))
    }

    /// Flush everything and release the device. Open descriptors are dropped.
    pub fn unmount(mut self) -> Result<()> {
        self.store.sync()?;
        log::info!("unmounted");
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    pub fn free_blocks(&self) -> usize {
        self.store.free_blocks()
    }

    pub(crate) fn read_inode(&mut self, inode: u8) -> Result<DiskInode> {
        let (block_id, offset) = inode_pos(inode);
        self.store.read(block_id, offset, |disk_inode: &DiskInode| *disk_inode)
    }

    pub(crate) fn write_inode(&mut self, inode: u8, disk_inode: &DiskInode) -> Result<()> {
        let (block_id, offset) = inode_pos(inode);
        self.store
            .modify(block_id, offset, |on_disk: &mut DiskInode| *on_disk = *disk_inode)
    }

    fn read_dir(&mut self, block_id: u16) -> Result<DirBlock> {
        self.store.read(block_id as usize, 0, |dir: &DirBlock| *dir)
    }

    /// First inode not in use. Inode 0 is the root and never handed out.
    fn find_free_inode(&mut self) -> Result<Option<u8>> {
        for inode in 1..INODE_TOTAL {
            let inode = inode as u8;
            if !self.read_inode(inode)?.in_use() {
                return Ok(Some(inode));
            }
        }
        Ok(None)
    }

    /// Resolve the directory that will hold `path`'s leaf, and make sure the leaf is free.
    fn prepare_entry<'p>(&mut self, path: &'p str) -> Result<(u8, u16, &'p str)> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.locate(parent_path)?;
        if !parent.found {
            return Err(FsError::NotFound);
        }
        let block = parent.block.ok_or(FsError::NotADirectory)?;
        if self.scan_directory(parent.inode, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        Ok((parent.inode, block, name))
    }

    /// Create a file or an empty directory. Missing directories along the path are not created.
    pub fn create(&mut self, path: &str, file_type: FileType) -> Result<()> {
        let (parent, parent_block, name) = self.prepare_entry(path)?;
        if self.read_dir(parent_block)?.is_full() {
            return Err(FsError::DirectoryFull);
        }
        let inode_id = self.find_free_inode()?.ok_or(FsError::NoFreeInode)?;
        let mut inode = DiskInode::new(file_type, parent, now());

        // the child is complete on disk before the parent links to it
        match file_type {
            FileType::Regular => self.write_inode(inode_id, &inode)?,
            FileType::Directory => {
                // a fresh block is already zeroed, which is an empty directory
                let block_id = self.store.allocate().ok_or(FsError::NoSpace)?;
                inode.data_ptrs[0] = block_id;
                if let Err(e) = self.write_inode(inode_id, &inode) {
                    self.store.release(block_id as usize);
                    return Err(e);
                }
            }
        }
        let linked = self
            .store
            .modify(parent_block as usize, 0, |dir: &mut DirBlock| dir.insert(name, inode_id));
        match linked {
            Ok(Some(_)) => {}
            Ok(None) => return Err(FsError::DirectoryFull),
            Err(e) => {
                log::warn!("inode {} for {} written but not linked", inode_id, path);
                return Err(e);
            }
        }
        self.store.sync()?;
        log::debug!("create {} -> inode {}", path, inode_id);
        Ok(())
    }

    /// Delete a file or an empty directory.
    ///
    /// Descriptors open on a regular file are closed once its last link goes away.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let target = self.locate(path)?;
        if !target.found {
            return Err(FsError::NotFound);
        }
        // the root has no slot
        let slot = target.slot.ok_or(FsError::InvalidArgument)?;
        if let Some(block) = target.block {
            if !self.read_dir(block)?.is_empty() {
                return Err(FsError::DirectoryNotEmpty);
            }
        }
        let parent_block = self.read_inode(target.parent)?.data_ptrs[0];
        let mut inode = self.read_inode(target.inode)?;

        if inode.is_file() && inode.meta.links > 1 {
            inode.meta.links -= 1;
            self.write_inode(target.inode, &inode)?;
        } else {
            if inode.is_file() {
                self.fd_table.close_inode(target.inode);
            }
            tree::release_all(&mut self.store, &mut inode)?;
            self.write_inode(target.inode, &DiskInode::default())?;
        }
        self.store
            .modify(parent_block as usize, 0, |dir: &mut DirBlock| dir.remove(slot))?;
        self.store.sync()?;
        log::debug!("remove {} (inode {})", path, target.inode);
        Ok(())
    }

    /// Entries of the directory at `path`, in slot order.
    pub fn get_dir(&mut self, path: &str) -> Result<Vec<FileRecord>> {
        let found = self.locate(path)?;
        if !found.found {
            return Err(FsError::NotFound);
        }
        let block = found.block.ok_or(FsError::NotADirectory)?;
        let dir = self.read_dir(block)?;
        let mut records = Vec::with_capacity(dir.len());
        for entry in dir.iter() {
            let file_type = self
                .read_inode(entry.inode())?
                .file_type()
                .ok_or(FsError::InvalidImage)?;
            records.push(FileRecord {
                name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                file_type,
            });
        }
        Ok(records)
    }

    /// Whether directory `ancestor` is `dir` or one of its parents.
    fn is_ancestor(&mut self, ancestor: u8, mut dir: u8) -> Result<bool> {
        // bounded so a damaged parent chain cannot loop forever
        for _ in 0..INODE_TOTAL {
            if dir == ancestor {
                return Ok(true);
            }
            if dir == ROOT_INODE {
                return Ok(false);
            }
            dir = self.read_inode(dir)?.meta.parent;
        }
        Err(FsError::InvalidImage)
    }

    /// Move or rename `src` to `dst`. Open descriptors keep working.
    pub fn move_file(&mut self, src: &str, dst: &str) -> Result<()> {
        let from = self.locate(src)?;
        if !from.found {
            return Err(FsError::NotFound);
        }
        let slot = from.slot.ok_or(FsError::InvalidArgument)?;
        let (to_parent, to_block, name) = self.prepare_entry(dst)?;
        if from.is_dir() && self.is_ancestor(from.inode, to_parent)? {
            return Err(FsError::InvalidArgument);
        }
        let from_block = self.read_inode(from.parent)?.data_ptrs[0];

        if from.parent == to_parent {
            self.store.modify(from_block as usize, 0, |dir: &mut DirBlock| {
                dir.entries[slot] = DirEntry::new(name, from.inode)
            })?;
        } else {
            // link at the destination first; a failure in between leaves two names, not zero
            let added = self
                .store
                .modify(to_block as usize, 0, |dir: &mut DirBlock| dir.insert(name, from.inode))?;
            if added.is_none() {
                return Err(FsError::DirectoryFull);
            }
            self.store
                .modify(from_block as usize, 0, |dir: &mut DirBlock| dir.remove(slot))?;
            let mut inode = self.read_inode(from.inode)?;
            inode.meta.parent = to_parent;
            self.write_inode(from.inode, &inode)?;
        }
        self.store.sync()?;
        log::debug!("move {} -> {}", src, dst);
        Ok(())
    }

    /// Make `dst` another name for the regular file at `src`.
    pub fn link(&mut self, src: &str, dst: &str) -> Result<()> {
        let from = self.locate(src)?;
        if !from.found {
            return Err(FsError::NotFound);
        }
        if from.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let (_, to_block, name) = self.prepare_entry(dst)?;
        if self.read_dir(to_block)?.is_full() {
            return Err(FsError::DirectoryFull);
        }
        let mut inode = self.read_inode(from.inode)?;
        if inode.meta.links == u8::MAX {
            return Err(FsError::InvalidArgument);
        }
        // count first; an extra count only keeps blocks alive longer
        inode.meta.links += 1;
        self.write_inode(from.inode, &inode)?;
        let added = self
            .store
            .modify(to_block as usize, 0, |dir: &mut DirBlock| dir.insert(name, from.inode))?;
        if added.is_none() {
            return Err(FsError::DirectoryFull);
        }
        self.store.sync()?;
        log::debug!("link {} -> {}", dst, src);
        Ok(())
    }
}
