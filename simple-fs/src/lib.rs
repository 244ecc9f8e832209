#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

//! SimpleFileSystem: a flat, inode-numbered file system on a block device.

extern crate alloc;

mod bitmap;
mod block;
mod block_dev;
mod error;
mod inode_table;
mod layout;
mod sfs;
mod span;
#[cfg(test)]
mod test_helper;
mod vfs;

/// Each block is of 4096 bytes.
pub const BLOCK_SZ: usize = 4096;
pub use bitmap::Bitmap;
pub use block_dev::BlockDevice;
pub use error::{FsError, Result};
pub use layout::{
    DiskInode, Layout, SuperBlock, INODES_PER_BLOCK, INODE_DIRECT_COUNT, MAX_FILE_SIZE,
    POINTERS_PER_BLOCK,
};
pub use sfs::{Dump, SimpleFileSystem};
pub use vfs::File;
