use crate::block::read_block;
use crate::inode_table::InodeTable;
use crate::layout::{IndirectBlock, Layout};
use crate::{BlockDevice, FsError, Result};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use log::{trace, warn};

/// Number of bits in a bitmap word
const WORD_BITS: usize = 64;

/// Decompose bits into (word_pos, inner_pos)
fn decomposition(bit: usize) -> (usize, usize) {
    (bit / WORD_BITS, bit % WORD_BITS)
}

/// Which blocks of the device are in use.
///
/// Kept in memory only: it is rebuilt from the inode table on every mount.
/// A set bit marks a block in use; block 0 and the inode table are never free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    blocks: usize,
    reserved: usize,
}

impl Bitmap {
    /// A bitmap of `blocks` blocks where only the first `reserved` ones are
    /// in use.
    pub(crate) fn new(blocks: usize, reserved: usize) -> Self {
        let mut words = vec![0u64; (blocks + WORD_BITS - 1) / WORD_BITS];
        // bits past the last block never look free
        let tail = blocks % WORD_BITS;
        if let Some(last) = words.last_mut().filter(|_| tail != 0) {
            *last = u64::MAX << tail;
        }
        let mut bitmap = Self {
            words,
            blocks,
            reserved: reserved.min(blocks),
        };
        for bit in 0..bitmap.reserved {
            bitmap.set(bit);
        }
        bitmap
    }

    fn set(&mut self, bit: usize) {
        let (word_pos, inner_pos) = decomposition(bit);
        self.words[word_pos] |= 1u64 << inner_pos;
    }

    /// Build the bitmap of a mounted file system by walking every valid
    /// inode's direct pointers, indirect block and indirect entries.
    ///
    /// Every block may have one owner only.
    pub(crate) fn build(
        block_device: &Arc<dyn BlockDevice>,
        layout: &Layout,
        inode_table: &InodeTable,
    ) -> Result<Self> {
        let mut bitmap = Self::new(layout.blocks as usize, layout.data_start() as usize);
        for (inumber, disk_inode) in inode_table.valid_inodes() {
            for block_id in disk_inode.direct_blocks() {
                bitmap.mark_referenced(inumber, block_id)?;
            }
            if disk_inode.indirect != 0 {
                bitmap.mark_referenced(inumber, disk_inode.indirect)?;
                read_block(
                    block_device,
                    disk_inode.indirect as usize,
                    0,
                    |indirect: &IndirectBlock| -> Result {
                        for &block_id in indirect.iter().filter(|block_id| **block_id != 0) {
                            bitmap.mark_referenced(inumber, block_id)?;
                        }
                        Ok(())
                    },
                )?;
            }
        }
        Ok(bitmap)
    }

    fn mark_referenced(&mut self, inumber: u32, block_id: u32) -> Result {
        let bit = block_id as usize;
        if bit < self.reserved || bit >= self.blocks {
            warn!("inode {} points at block {} outside the data area", inumber, block_id);
            return Err(FsError::InvalidLayout);
        }
        if !self.is_free(block_id) {
            warn!("inode {} shares block {} with another owner", inumber, block_id);
            return Err(FsError::InvalidLayout);
        }
        self.set(bit);
        Ok(())
    }

    /// Allocate the free block with the lowest number.
    pub(crate) fn alloc(&mut self) -> Option<u32> {
        let (word_pos, inner_pos) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, bits64)| **bits64 != u64::MAX)
            .map(|(word_pos, bits64)| (word_pos, bits64.trailing_ones() as usize))?;
        self.words[word_pos] |= 1u64 << inner_pos;
        let block_id = (word_pos * WORD_BITS + inner_pos) as u32;
        trace!("alloc block {}", block_id);
        Some(block_id)
    }

    /// Return a block to the free pool.
    pub(crate) fn dealloc(&mut self, block_id: u32) -> Result {
        let bit = block_id as usize;
        if bit < self.reserved || bit >= self.blocks || self.is_free(block_id) {
            return Err(FsError::FreeUnallocated(block_id));
        }
        let (word_pos, inner_pos) = decomposition(bit);
        self.words[word_pos] &= !(1u64 << inner_pos);
        trace!("free block {}", block_id);
        Ok(())
    }

    /// Whether `block_id` is free. Blocks past the device are never free.
    pub fn is_free(&self, block_id: u32) -> bool {
        let bit = block_id as usize;
        if bit >= self.blocks {
            return false;
        }
        let (word_pos, inner_pos) = decomposition(bit);
        self.words[word_pos] & (1u64 << inner_pos) == 0
    }

    /// Number of free blocks.
    pub fn free_count(&self) -> usize {
        self.words.iter().map(|bits64| bits64.count_zeros() as usize).sum()
    }

    /// Number of blocks covered, free or not.
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}
