//! The per-inode block pointer tree: 6 direct pointers, one single indirect
//! block and one double indirect block, all addressed through [`block_pos`].

use crate::block_store::BlockStore;
use crate::config::{BLOCK_SIZE, DIRECT_TOTAL};
use crate::layout::{block_pos, BlockPos, DiskInode, IndirectBlock, DBL_INDIRECT_PTR, INDIRECT_PTR};
use crate::Result;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
    /// materialize missing data and pointer blocks
    Allocate,
    /// stop at the first missing block
    Lookup,
}

/// A pointer block held for the duration of one resolve call.
struct PtrBlock {
    id: u16,
    ptrs: IndirectBlock,
    dirty: bool,
}

impl PtrBlock {
    fn load(bs: &mut BlockStore, id: u16) -> Result<Self> {
        let ptrs = bs.read(id as usize, 0, |ptrs: &IndirectBlock| *ptrs)?;
        Ok(Self {
            id,
            ptrs,
            dirty: false,
        })
    }

    fn flush(&mut self, bs: &mut BlockStore) -> Result<()> {
        if self.dirty {
            let ptrs = &self.ptrs;
            bs.modify(self.id as usize, 0, |on_disk: &mut IndirectBlock| *on_disk = *ptrs)?;
            self.dirty = false;
        }
        Ok(())
    }
}

/// Return the block behind `slot`, allocating one into it if allowed.
fn ensure(bs: &mut BlockStore, how: Resolve, slot: &mut u16) -> Option<u16> {
    if *slot == 0 {
        if how == Resolve::Lookup {
            return None;
        }
        match bs.allocate() {
            Some(block_id) => *slot = block_id,
            None => {
                log::debug!("device full while growing a file");
                return None;
            }
        }
    }
    Some(*slot)
}

struct Walker<'a> {
    bs: &'a mut BlockStore,
    how: Resolve,
    single: Option<PtrBlock>,
    outer: Option<PtrBlock>,
    /// inner table of the double indirect tier, with its outer index
    inner: Option<(usize, PtrBlock)>,
}

impl<'a> Walker<'a> {
    fn new(bs: &'a mut BlockStore, how: Resolve) -> Self {
        Self {
            bs,
            how,
            single: None,
            outer: None,
            inner: None,
        }
    }

    /// Load the table behind `slot`, allocating it if allowed.
    fn table(bs: &mut BlockStore, how: Resolve, slot: &mut u16) -> Result<Option<PtrBlock>> {
        match ensure(bs, how, slot) {
            Some(id) => PtrBlock::load(bs, id).map(Some),
            None => Ok(None),
        }
    }

    /// Pick `slot` out of a table, marking it dirty if a block was allocated.
    fn entry(bs: &mut BlockStore, how: Resolve, table: &mut PtrBlock, slot: usize) -> Option<u16> {
        let before = table.ptrs[slot];
        let block_id = ensure(bs, how, &mut table.ptrs[slot]);
        if table.ptrs[slot] != before {
            table.dirty = true;
        }
        block_id
    }

    fn block(&mut self, inode: &mut DiskInode, index: usize) -> Result<Option<u16>> {
        let pos = match block_pos(index) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        match pos {
            BlockPos::Direct(i) => Ok(ensure(self.bs, self.how, &mut inode.data_ptrs[i])),
            BlockPos::Indirect(i) => {
                if self.single.is_none() {
                    self.single = Self::table(self.bs, self.how, &mut inode.data_ptrs[INDIRECT_PTR])?;
                }
                Ok(match self.single.as_mut() {
                    Some(table) => Self::entry(self.bs, self.how, table, i),
                    None => None,
                })
            }
            BlockPos::DoubleIndirect(j, k) => {
                if self.outer.is_none() {
                    self.outer = Self::table(self.bs, self.how, &mut inode.data_ptrs[DBL_INDIRECT_PTR])?;
                }
                let outer = match self.outer.as_mut() {
                    Some(outer) => outer,
                    None => return Ok(None),
                };
                if !matches!(self.inner, Some((at, _)) if at == j) {
                    if let Some((_, mut old)) = self.inner.take() {
                        old.flush(self.bs)?;
                    }
                    let before = outer.ptrs[j];
                    let inner = Self::table(self.bs, self.how, &mut outer.ptrs[j])?;
                    if outer.ptrs[j] != before {
                        outer.dirty = true;
                    }
                    match inner {
                        Some(inner) => self.inner = Some((j, inner)),
                        None => return Ok(None),
                    }
                }
                Ok(match self.inner.as_mut() {
                    Some((_, inner)) => Self::entry(self.bs, self.how, inner, k),
                    None => None,
                })
            }
        }
    }

    /// Write back every pointer block this walk changed, innermost first.
    fn finish(mut self) -> Result<()> {
        if let Some((_, mut inner)) = self.inner.take() {
            inner.flush(self.bs)?;
        }
        if let Some(mut outer) = self.outer.take() {
            outer.flush(self.bs)?;
        }
        if let Some(mut single) = self.single.take() {
            single.flush(self.bs)?;
        }
        Ok(())
    }
}

/// Block ids of `count` consecutive file blocks starting at the block holding
/// byte `pos`.
///
/// The pointers in `inode` are updated in place and the caller must write the
/// inode back; pointer blocks are written before returning. A result shorter
/// than `count` means the remaining blocks could not be obtained (a hole in
/// `Lookup` mode, no free block in `Allocate` mode, or the maximum file size);
/// nothing past that point may be used.
pub fn resolve(
    bs: &mut BlockStore,
    inode: &mut DiskInode,
    pos: usize,
    count: usize,
    how: Resolve,
) -> Result<Vec<u16>> {
    let first = pos / BLOCK_SIZE;
    let mut ids = Vec::with_capacity(count);
    let mut walker = Walker::new(bs, how);
    let mut walked = Ok(());
    for index in first..first + count {
        match walker.block(inode, index) {
            Ok(Some(block_id)) => ids.push(block_id),
            Ok(None) => break,
            Err(e) => {
                walked = Err(e);
                break;
            }
        }
    }
    // pointer blocks are written back even after a failure so no allocation is lost
    let flushed = walker.finish();
    walked.and(flushed)?;
    Ok(ids)
}

fn release_table(bs: &mut BlockStore, id: u16) -> Result<()> {
    let ptrs = bs.read(id as usize, 0, |ptrs: &IndirectBlock| *ptrs)?;
    for &ptr in ptrs.iter().filter(|&&ptr| ptr != 0) {
        bs.release(ptr as usize);
    }
    bs.release(id as usize);
    Ok(())
}

/// Give every block reachable from `inode` back to the store and clear its pointers.
pub fn release_all(bs: &mut BlockStore, inode: &mut DiskInode) -> Result<()> {
    for &ptr in inode.data_ptrs[..DIRECT_TOTAL].iter().filter(|&&ptr| ptr != 0) {
        bs.release(ptr as usize);
    }
    let single = inode.data_ptrs[INDIRECT_PTR];
    if single != 0 {
        release_table(bs, single)?;
    }
    let double = inode.data_ptrs[DBL_INDIRECT_PTR];
    if double != 0 {
        let outer = bs.read(double as usize, 0, |ptrs: &IndirectBlock| *ptrs)?;
        for &inner in outer.iter().filter(|&&ptr| ptr != 0) {
            release_table(bs, inner)?;
        }
        bs.release(double as usize);
    }
    inode.data_ptrs = Default::default();
    Ok(())
}
