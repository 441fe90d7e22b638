use crate::bitmap::Bitmap;
use crate::config::{BLOCK_SIZE, DESCRIPTOR_MAX, FILE_SIZE_MAX};
use crate::fs::FileSystem;
use crate::layout::DataBlock;
use crate::tree::{self, Resolve};
use crate::{now, FsError, Result};
use core::ops::Range;

/// Base of a [`FileSystem::seek`] offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Open descriptors. Slot usage lives in a bit vector, the rest in parallel arrays.
pub(crate) struct FdTable {
    status: [u8; DESCRIPTOR_MAX / 8],
    pos: [usize; DESCRIPTOR_MAX],
    inode: [u8; DESCRIPTOR_MAX],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            status: [0u8; DESCRIPTOR_MAX / 8],
            pos: [0; DESCRIPTOR_MAX],
            inode: [0; DESCRIPTOR_MAX],
        }
    }

    fn bits(&mut self) -> Bitmap<'_> {
        Bitmap::over(&mut self.status)
    }

    /// Bind the lowest free descriptor to `inode`, cursor at 0.
    pub fn alloc(&mut self, inode: u8) -> Option<usize> {
        let mut bits = self.bits();
        let fd = bits.ffz()?;
        bits.set(fd);
        self.pos[fd] = 0;
        self.inode[fd] = inode;
        Some(fd)
    }

    pub fn free(&mut self, fd: usize) -> Result<()> {
        self.get(fd)?;
        self.bits().reset(fd);
        Ok(())
    }

    /// Inode and cursor of an open descriptor.
    pub fn get(&mut self, fd: usize) -> Result<(u8, usize)> {
        if !self.bits().test(fd) {
            return Err(FsError::BadDescriptor(fd));
        }
        Ok((self.inode[fd], self.pos[fd]))
    }

    pub fn set_pos(&mut self, fd: usize, pos: usize) {
        self.pos[fd] = pos;
    }

    /// Close every descriptor bound to `inode`.
    pub fn close_inode(&mut self, inode: u8) {
        for fd in 0..DESCRIPTOR_MAX {
            if self.inode[fd] == inode && self.bits().test(fd) {
                self.bits().reset(fd);
                log::debug!("descriptor {} closed with its file", fd);
            }
        }
    }
}

/// A byte range of a file cut along block boundaries.
struct Span {
    /// offset of the first byte inside its block
    offset: usize,
    len: usize,
}

impl Span {
    fn new(pos: usize, len: usize) -> Self {
        Self {
            offset: pos % BLOCK_SIZE,
            len,
        }
    }

    fn blocks(&self) -> usize {
        (self.offset + self.len + BLOCK_SIZE - 1) / BLOCK_SIZE
    }

    /// Byte range inside block `i` of the span, and the matching range of the caller's buffer.
    fn chunk(&self, i: usize) -> (Range<usize>, Range<usize>) {
        let (start, buf_start) = if i == 0 {
            (self.offset, 0)
        } else {
            (0, i * BLOCK_SIZE - self.offset)
        };
        let n = (BLOCK_SIZE - start).min(self.len - buf_start);
        (start..start + n, buf_start..buf_start + n)
    }
}

impl FileSystem {
    /// Open the regular file at `path` with its cursor at 0.
    pub fn open(&mut self, path: &str) -> Result<usize> {
        let found = self.locate(path)?;
        if !found.found {
            return Err(FsError::NotFound);
        }
        if found.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.fd_table.alloc(found.inode).ok_or(FsError::NoFreeDescriptor)
    }

    pub fn close(&mut self, fd: usize) -> Result<()> {
        self.fd_table.free(fd)
    }

    /// Move the cursor, clamped into `0..=size`. Returns the new position.
    pub fn seek(&mut self, fd: usize, offset: i64, whence: Whence) -> Result<u64> {
        let (inode, pos) = self.fd_table.get(fd)?;
        let size = self.read_inode(inode)?.size() as i64;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => pos as i64,
            Whence::End => size,
        };
        let pos = base.saturating_add(offset).clamp(0, size);
        self.fd_table.set_pos(fd, pos as usize);
        Ok(pos as u64)
    }

    /// Read from the cursor. Returns 0 at end of file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let (inode_id, pos) = self.fd_table.get(fd)?;
        let mut inode = self.read_inode(inode_id)?;
        let len = buf.len().min(inode.size().saturating_sub(pos));
        if len == 0 {
            return Ok(0);
        }
        let span = Span::new(pos, len);
        let ids = tree::resolve(&mut self.store, &mut inode, pos, span.blocks(), Resolve::Lookup)?;

        let mut done = 0;
        let mut failed = None;
        for (i, &block_id) in ids.iter().enumerate() {
            let (in_block, in_buf) = span.chunk(i);
            let dst = &mut buf[in_buf.clone()];
            let copied = if in_block.len() == BLOCK_SIZE {
                self.store.read_block(block_id as usize, dst)
            } else {
                self.store.read(block_id as usize, 0, |block: &DataBlock| {
                    dst.copy_from_slice(&block.0[in_block])
                })
            };
            if let Err(e) = copied {
                failed = Some(e);
                break;
            }
            done = in_buf.end;
        }
        self.fd_table.set_pos(fd, pos + done);
        match failed {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }

    /// Write at the cursor, growing the file as needed.
    ///
    /// Stops early when the device fills up or the file reaches its maximum
    /// size; the count returned is what actually landed.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize> {
        let (inode_id, pos) = self.fd_table.get(fd)?;
        let mut inode = self.read_inode(inode_id)?;
        let len = buf.len().min(FILE_SIZE_MAX - pos);
        if len == 0 {
            return Ok(0);
        }
        let span = Span::new(pos, len);
        let resolved = tree::resolve(&mut self.store, &mut inode, pos, span.blocks(), Resolve::Allocate);
        let ids = match resolved {
            Ok(ids) => ids,
            Err(e) => {
                // keep whatever pointers were handed out
                self.write_inode(inode_id, &inode)?;
                return Err(e);
            }
        };

        let mut done = 0;
        let mut failed = None;
        for (i, &block_id) in ids.iter().enumerate() {
            let (in_block, in_buf) = span.chunk(i);
            let src = &buf[in_buf.clone()];
            let copied = if in_block.len() == BLOCK_SIZE {
                self.store.write_block(block_id as usize, src)
            } else {
                self.store.modify(block_id as usize, 0, |block: &mut DataBlock| {
                    block.0[in_block].copy_from_slice(src)
                })
            };
            if let Err(e) = copied {
                failed = Some(e);
                break;
            }
            done = in_buf.end;
        }

        if pos + done > inode.size() {
            inode.meta.size = (pos + done) as u32;
        }
        inode.meta.m_time = now();
        self.write_inode(inode_id, &inode)?;
        self.fd_table.set_pos(fd, pos + done);
        self.store.sync()?;
        match failed {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }
}
