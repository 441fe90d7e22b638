use thiserror::Error;

/// Every failure is scoped to the call that reported it; the file system stays usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("file name is empty or too long")]
    InvalidName,
    #[error("descriptor {0} is not open")]
    BadDescriptor(usize),
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("file already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("directory has no free entry")]
    DirectoryFull,
    #[error("inode table is full")]
    NoFreeInode,
    #[error("descriptor table is full")]
    NoFreeDescriptor,
    #[error("no free block on the device")]
    NoSpace,
    #[error("block {0} is outside the accessible range")]
    BlockOutOfRange(usize),
    #[error("device failed on block {block_id}")]
    Io { block_id: usize },
    #[error("the image cannot be opened")]
    DeviceUnavailable,
    #[error("the image does not contain a valid file system")]
    InvalidImage,
}

pub type Result<T> = core::result::Result<T, FsError>;
