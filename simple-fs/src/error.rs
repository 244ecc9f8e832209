use core::fmt::{self, Display, Formatter};

/// The type returned by file system operations.
pub type Result<T = ()> = core::result::Result<T, FsError>;

/// The error type of SimpleFileSystem.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FsError {
    /// The device is already mounted.
    AlreadyMounted,
    /// The superblock does not describe a valid layout for this device.
    InvalidLayout,
    /// The inode number is not below the inode count.
    OutOfRange,
    /// The inode slot is not in use.
    InvalidInode,
    /// The read offset is at (or past) the end of the file.
    EndOfFile,
    /// No free block is left on the device.
    DeviceFull,
    /// A block was freed while not allocated.
    FreeUnallocated(u32),
}

impl Display for FsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyMounted => write!(f, "device is already mounted"),
            Self::InvalidLayout => write!(f, "invalid file system layout"),
            Self::OutOfRange => write!(f, "inode number out of range"),
            Self::InvalidInode => write!(f, "inode is not valid"),
            Self::EndOfFile => write!(f, "end of file"),
            Self::DeviceFull => write!(f, "no free block on device"),
            Self::FreeUnallocated(block_id) => {
                write!(f, "block {} freed while not allocated", block_id)
            }
        }
    }
}
