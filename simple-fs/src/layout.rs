use super::block::OnDisk;
use super::{FsError, Result, BLOCK_SZ};
use core::fmt::{Debug, Formatter};
use log::warn;

/// Magic number for sanity check
const SFS_MAGIC: u32 = 0xf0f0_3410;
/// The number of direct block pointers of an inode
pub const INODE_DIRECT_COUNT: usize = 5;
/// Size of an on-disk inode record
pub const DISK_INODE_SZ: usize = 32;
/// The number of inode records packed in one block
pub const INODES_PER_BLOCK: usize = BLOCK_SZ / DISK_INODE_SZ;
/// The number of block pointers in an indirect block
pub const POINTERS_PER_BLOCK: usize = BLOCK_SZ / 4;
/// The upper bound of direct block index
pub const DIRECT_BOUND: usize = INODE_DIRECT_COUNT;
/// The upper bound of indirect block index
pub const INDIRECT_BOUND: usize = DIRECT_BOUND + POINTERS_PER_BLOCK;
/// The largest file size in bytes
pub const MAX_FILE_SIZE: usize = INDIRECT_BOUND * BLOCK_SZ;

/// A indirect block
pub type IndirectBlock = [u32; POINTERS_PER_BLOCK];
/// A data block
pub type DataBlock = [u8; BLOCK_SZ];
/// A block of the inode table
pub type InodeBlock = [DiskInode; INODES_PER_BLOCK];

/// Number of blocks reserved for inodes on a device of `blocks` blocks:
/// ten percent, rounded up.
pub fn inode_blocks_for(blocks: u32) -> u32 {
    blocks / 10 + u32::from(blocks % 10 != 0)
}

/// Number of inode slots in `inode_blocks` blocks, `None` on overflow.
pub fn inode_count_for(inode_blocks: u32) -> Option<u32> {
    inode_blocks.checked_mul(INODES_PER_BLOCK as u32)
}

/// Super block of a filesystem
#[repr(C)]
#[derive(Default, Copy, Clone)]
pub struct SuperBlock {
    magic: u32,
    /// Total number of blocks of the device
    pub blocks: u32,
    /// Number of blocks of the inode table
    pub inode_blocks: u32,
    /// Number of inode slots
    pub inode_count: u32,
}

unsafe impl OnDisk for SuperBlock {}

impl Debug for SuperBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SuperBlock")
            .field("blocks", &self.blocks)
            .field("inode_blocks", &self.inode_blocks)
            .field("inode_count", &self.inode_count)
            .finish()
    }
}

impl SuperBlock {
    /// Initialize a super block for a device of `blocks` blocks.
    ///
    /// Fails if the device cannot hold the super block and its inode table.
    pub fn initialize(&mut self, blocks: u32) -> Result {
        let inode_blocks = inode_blocks_for(blocks);
        let inode_count = inode_count_for(inode_blocks).ok_or(FsError::InvalidLayout)?;
        if 1 + inode_blocks as u64 > blocks as u64 {
            warn!("device of {} blocks is too small", blocks);
            return Err(FsError::InvalidLayout);
        }
        *self = Self {
            magic: SFS_MAGIC,
            blocks,
            inode_blocks,
            inode_count,
        };
        Ok(())
    }
    /// Check if a super block is valid using sfs magic
    pub fn is_valid(&self) -> bool {
        self.magic == SFS_MAGIC
    }
    /// Check the super block against a device of `device_blocks` blocks
    /// and return the layout it describes.
    pub fn validate(&self, device_blocks: u32) -> Result<Layout> {
        if !self.is_valid() {
            warn!("bad magic number {:#x}", self.magic);
            return Err(FsError::InvalidLayout);
        }
        if self.blocks != device_blocks {
            warn!(
                "super block records {} blocks, device has {}",
                self.blocks, device_blocks
            );
            return Err(FsError::InvalidLayout);
        }
        if self.inode_blocks != inode_blocks_for(self.blocks) {
            warn!("{} inode blocks for {} blocks", self.inode_blocks, self.blocks);
            return Err(FsError::InvalidLayout);
        }
        if 1 + self.inode_blocks as u64 > self.blocks as u64 {
            warn!("{} blocks cannot hold {} inode blocks", self.blocks, self.inode_blocks);
            return Err(FsError::InvalidLayout);
        }
        if inode_count_for(self.inode_blocks) != Some(self.inode_count) {
            warn!(
                "{} inodes in {} inode blocks",
                self.inode_count, self.inode_blocks
            );
            return Err(FsError::InvalidLayout);
        }
        Ok(Layout {
            blocks: self.blocks,
            inode_blocks: self.inode_blocks,
            inode_count: self.inode_count,
        })
    }
}

/// The validated geometry of a mounted file system.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Layout {
    /// Total number of blocks
    pub blocks: u32,
    /// Number of blocks of the inode table, starting at block 1
    pub inode_blocks: u32,
    /// Number of inode slots
    pub inode_count: u32,
}

impl Layout {
    /// First block that may hold file data.
    pub fn data_start(&self) -> u32 {
        1 + self.inode_blocks
    }
    /// Location of inode `inumber`: the block id and the slot inside it.
    pub fn inode_pos(&self, inumber: u32) -> (usize, usize) {
        let inodes_per_block = INODES_PER_BLOCK as u32;
        (
            (inumber / inodes_per_block + 1) as usize,
            (inumber % inodes_per_block) as usize,
        )
    }
}

/// A disk inode
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskInode {
    valid: u32,
    /// File size in bytes
    pub size: u32,
    /// Direct block pointers, 0 for none
    pub direct: [u32; INODE_DIRECT_COUNT],
    /// Indirect block pointer, 0 for none
    pub indirect: u32,
}

unsafe impl OnDisk for DiskInode {}

impl DiskInode {
    /// Initialize a disk inode as an empty, valid file
    pub fn initialize(&mut self) {
        *self = Self {
            valid: 1,
            ..Self::default()
        };
    }
    /// Whether this slot holds a file
    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }
    /// Mark the slot unused and drop every pointer
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
    /// Non-zero direct pointers
    pub fn direct_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.direct.iter().copied().filter(|block_id| *block_id != 0)
    }
}

/// Whether a logical block index of a file goes through a direct pointer
/// or through an entry of the indirect block.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Slot {
    /// Index into `DiskInode::direct`
    Direct(usize),
    /// Index into the indirect block
    Indirect(usize),
}

impl Slot {
    /// Classify logical block `inner_id`; `None` past the largest file.
    pub fn of(inner_id: usize) -> Option<Self> {
        if inner_id < DIRECT_BOUND {
            Some(Self::Direct(inner_id))
        } else if inner_id < INDIRECT_BOUND {
            Some(Self::Indirect(inner_id - DIRECT_BOUND))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    pub fn test_static_size() {
        assert_eq!(size_of::<SuperBlock>(), 16);
        assert_eq!(size_of::<DiskInode>(), DISK_INODE_SZ);
        assert_eq!(size_of::<InodeBlock>(), BLOCK_SZ);
        assert_eq!(size_of::<IndirectBlock>(), BLOCK_SZ);
        assert_eq!(INODES_PER_BLOCK, 128);
        assert_eq!(POINTERS_PER_BLOCK, 1024);
    }

    #[test]
    pub fn test_inode_blocks_round_up() {
        assert_eq!(inode_blocks_for(20), 2);
        assert_eq!(inode_blocks_for(21), 3);
        assert_eq!(inode_blocks_for(200), 20);
        assert_eq!(inode_blocks_for(5), 1);
    }

    #[test]
    pub fn test_super_block_validate() {
        let mut super_block = SuperBlock::default();
        assert_eq!(super_block.validate(20), Err(FsError::InvalidLayout));

        assert_eq!(super_block.initialize(20), Ok(()));
        assert_eq!(
            super_block.validate(20),
            Ok(Layout {
                blocks: 20,
                inode_blocks: 2,
                inode_count: 256,
            })
        );
        // device size disagrees
        assert_eq!(super_block.validate(21), Err(FsError::InvalidLayout));

        let mut bad = super_block;
        bad.inode_blocks = 3;
        assert_eq!(bad.validate(20), Err(FsError::InvalidLayout));

        let mut bad = super_block;
        bad.inode_count = 255;
        assert_eq!(bad.validate(20), Err(FsError::InvalidLayout));
    }

    #[test]
    pub fn test_device_too_small() {
        let mut super_block = SuperBlock::default();
        assert_eq!(super_block.initialize(0), Err(FsError::InvalidLayout));
        assert_eq!(super_block.initialize(1), Err(FsError::InvalidLayout));
        assert!(!super_block.is_valid());
        assert_eq!(super_block.initialize(2), Ok(()));
        assert_eq!(super_block.inode_blocks, 1);
        assert!(super_block.validate(2).is_ok());

        // well formed for one block, but there is no room for its inode table
        let forged = SuperBlock {
            magic: SFS_MAGIC,
            blocks: 1,
            inode_blocks: 1,
            inode_count: 128,
        };
        assert_eq!(forged.validate(1), Err(FsError::InvalidLayout));
        let empty = SuperBlock {
            magic: SFS_MAGIC,
            ..SuperBlock::default()
        };
        assert_eq!(empty.validate(0), Err(FsError::InvalidLayout));
    }

    #[test]
    pub fn test_inode_pos() {
        let layout = Layout {
            blocks: 200,
            inode_blocks: 20,
            inode_count: 20 * 128,
        };
        assert_eq!(layout.inode_pos(0), (1, 0));
        assert_eq!(layout.inode_pos(127), (1, 127));
        assert_eq!(layout.inode_pos(128), (2, 0));
        assert_eq!(layout.inode_pos(300), (3, 44));
        assert_eq!(layout.data_start(), 21);
    }

    #[test]
    pub fn test_slot_of() {
        assert_eq!(Slot::of(0), Some(Slot::Direct(0)));
        assert_eq!(Slot::of(4), Some(Slot::Direct(4)));
        assert_eq!(Slot::of(5), Some(Slot::Indirect(0)));
        assert_eq!(Slot::of(1028), Some(Slot::Indirect(1023)));
        assert_eq!(Slot::of(1029), None);
    }

    #[test]
    pub fn test_disk_inode_lifecycle() {
        let mut disk_inode = DiskInode::default();
        assert!(!disk_inode.is_valid());
        disk_inode.initialize();
        assert!(disk_inode.is_valid());
        assert_eq!(disk_inode.size, 0);
        disk_inode.direct[1] = 7;
        disk_inode.direct[3] = 9;
        assert_eq!(disk_inode.direct_blocks().collect::<Vec<_>>(), vec![7, 9]);
        disk_inode.invalidate();
        assert!(!disk_inode.is_valid());
        assert_eq!(disk_inode.direct_blocks().count(), 0);
    }
}
