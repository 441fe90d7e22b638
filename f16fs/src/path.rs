use crate::config::{FNAME_MAX, PATH_MAX, ROOT_INODE};
use crate::fs::FileSystem;
use crate::layout::{DirBlock, FileType};
use crate::{FsError, Result};

/// Outcome of walking a well-formed path.
///
/// `found` tells whether the path names an existing entry; every other field
/// is only meaningful when it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub found: bool,
    pub inode: u8,
    pub parent: u8,
    pub file_type: Option<FileType>,
    /// data block, for a directory
    pub block: Option<u16>,
    /// entry slot inside the parent directory, `None` for the root
    pub slot: Option<usize>,
}

impl Located {
    fn missing() -> Self {
        Self {
            found: false,
            inode: 0,
            parent: 0,
            file_type: None,
            block: None,
            slot: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == Some(FileType::Directory)
    }
}

/// An absolute path: non-empty, starting with `/`, shorter than `PATH_MAX`.
pub fn check_path(path: &str) -> Result<()> {
    if path.is_empty() || !path.starts_with('/') || path.len() >= PATH_MAX {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= FNAME_MAX || name.contains('\0') {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|name| !name.is_empty())
}

/// Split an absolute path into its parent directory path and leaf name.
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
    check_path(path)?;
    let trimmed = path.trim_end_matches('/');
    let (parent, leaf) = match trimmed.rfind('/') {
        Some(at) => (&trimmed[..at], &trimmed[at + 1..]),
        None => ("", trimmed),
    };
    check_name(leaf)?;
    Ok((if parent.is_empty() { "/" } else { parent }, leaf))
}

impl FileSystem {
    /// Walk `path` from the root.
    ///
    /// A malformed path is an error; a well-formed path to nothing is
    /// `Ok` with `found == false`.
    pub fn locate(&mut self, path: &str) -> Result<Located> {
        check_path(path)?;
        let mut inode = ROOT_INODE;
        let mut parent = ROOT_INODE;
        let mut slot = None;
        for name in components(path) {
            match self.scan_directory(inode, name)? {
                Some((child, at)) => {
                    parent = inode;
                    inode = child;
                    slot = Some(at);
                }
                None => return Ok(Located::missing()),
            }
        }
        let disk_inode = self.read_inode(inode)?;
        if !disk_inode.in_use() {
            log::warn!("entry for inode {} points at a free inode", inode);
            return Err(FsError::InvalidImage);
        }
        let file_type = disk_inode.file_type().ok_or(FsError::InvalidImage)?;
        Ok(Located {
            found: true,
            inode,
            parent,
            file_type: Some(file_type),
            block: (file_type == FileType::Directory).then(|| disk_inode.data_ptrs[0]),
            slot,
        })
    }

    /// Look `name` up in directory `dir`, returning the inode and the slot holding it.
    /// Anything but a directory holds no names.
    pub(crate) fn scan_directory(&mut self, dir: u8, name: &str) -> Result<Option<(u8, usize)>> {
        if name.len() >= FNAME_MAX {
            return Ok(None);
        }
        let disk_inode = self.read_inode(dir)?;
        if !disk_inode.is_dir() {
            return Ok(None);
        }
        self.store.read(disk_inode.data_ptrs[0] as usize, 0, |dir: &DirBlock| {
            dir.find(name).map(|slot| (dir.entries[slot].inode(), slot))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_paths_are_rejected() {
        assert_eq!(check_path(""), Err(FsError::InvalidArgument));
        assert_eq!(check_path("a/b"), Err(FsError::InvalidArgument));
        let long = alloc::format!("/{}", "x".repeat(PATH_MAX));
        assert_eq!(check_path(&long), Err(FsError::InvalidArgument));
        assert_eq!(check_path("/"), Ok(()));
    }

    #[test]
    fn split_finds_parent_and_leaf() {
        assert_eq!(split_parent("/a"), Ok(("/", "a")));
        assert_eq!(split_parent("/a/b/c"), Ok(("/a/b", "c")));
        assert_eq!(split_parent("/a/b/"), Ok(("/a", "b")));
        assert_eq!(split_parent("/"), Err(FsError::InvalidName));
        assert_eq!(split_parent("//"), Err(FsError::InvalidName));
        assert_eq!(split_parent("nope"), Err(FsError::InvalidArgument));
    }

    #[test]
    fn leaf_length_is_bounded() {
        let ok = alloc::format!("/{}", "n".repeat(FNAME_MAX - 1));
        let too_long = alloc::format!("/{}", "n".repeat(FNAME_MAX));
        assert!(split_parent(&ok).is_ok());
        assert_eq!(split_parent(&too_long), Err(FsError::InvalidName));
    }

    #[test]
    fn components_skip_empty_segments() {
        let parts: alloc::vec::Vec<&str> = components("//a///b/").collect();
        assert_eq!(parts, ["a", "b"]);
    }
}
