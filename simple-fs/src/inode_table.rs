use crate::block::{modify_block, read_block, BlockBuf};
use crate::layout::{DiskInode, InodeBlock, Layout, INODES_PER_BLOCK};
use crate::{BlockDevice, FsError, Result};
use alloc::sync::Arc;
use log::debug;

/// Access to the inode records packed in blocks `1..=inode_blocks`.
///
/// Every call goes to the device; nothing is kept between calls.
pub struct InodeTable {
    block_device: Arc<dyn BlockDevice>,
    layout: Layout,
}

impl InodeTable {
    /// An accessor for the inode table described by `layout`.
    pub fn new(block_device: Arc<dyn BlockDevice>, layout: Layout) -> Self {
        Self {
            block_device,
            layout,
        }
    }

    fn check_range(&self, inumber: u32) -> Result {
        if inumber >= self.layout.inode_count {
            return Err(FsError::OutOfRange);
        }
        Ok(())
    }

    /// Load inode `inumber`, which must be in range and valid.
    pub fn load(&self, inumber: u32) -> Result<DiskInode> {
        self.check_range(inumber)?;
        let (block_id, slot) = self.layout.inode_pos(inumber);
        let disk_inode = read_block(&self.block_device, block_id, 0, |inodes: &InodeBlock| {
            inodes[slot]
        });
        if !disk_inode.is_valid() {
            return Err(FsError::InvalidInode);
        }
        Ok(disk_inode)
    }

    /// Store `disk_inode` in slot `inumber`, leaving the other records of
    /// the same block as they are.
    pub fn save(&self, inumber: u32, disk_inode: &DiskInode) -> Result {
        self.check_range(inumber)?;
        let (block_id, slot) = self.layout.inode_pos(inumber);
        modify_block(&self.block_device, block_id, 0, |inodes: &mut InodeBlock| {
            inodes[slot] = *disk_inode;
        });
        Ok(())
    }

    /// Take the lowest unused inode slot, returning its number, or `None`
    /// if every slot is in use.
    pub fn create(&self) -> Option<u32> {
        for block_pos in 0..self.layout.inode_blocks {
            let block_id = block_pos as usize + 1;
            let mut inode_block = BlockBuf::load(&self.block_device, block_id);
            let slot = inode_block.write(0, |inodes: &mut InodeBlock| {
                let slot = inodes.iter().position(|inode| !inode.is_valid())?;
                inodes[slot].initialize();
                Some(slot)
            });
            if let Some(slot) = slot {
                inode_block.store(&self.block_device, block_id);
                let inumber = block_pos * INODES_PER_BLOCK as u32 + slot as u32;
                debug!("created inode {}", inumber);
                return Some(inumber);
            }
        }
        None
    }

    /// Iterate over `(inumber, inode)` of every valid slot, in ascending
    /// order. Each inode block is read once.
    pub fn valid_inodes(&self) -> impl Iterator<Item = (u32, DiskInode)> + '_ {
        (0..self.layout.inode_blocks).flat_map(move |block_pos| {
            let inodes: InodeBlock =
                read_block(&self.block_device, block_pos as usize + 1, 0, |inodes: &InodeBlock| {
                    *inodes
                });
            inodes
                .into_iter()
                .enumerate()
                .filter(|(_, inode)| inode.is_valid())
                .map(move |(slot, inode)| (block_pos * INODES_PER_BLOCK as u32 + slot as u32, inode))
        })
    }
}
