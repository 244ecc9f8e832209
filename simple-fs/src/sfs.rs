use crate::bitmap::Bitmap;
use crate::block::{modify_block, read_block, BlockBuf};
use crate::inode_table::InodeTable;
use crate::layout::{
    DataBlock, DiskInode, IndirectBlock, InodeBlock, Layout, Slot, SuperBlock, POINTERS_PER_BLOCK,
};
use crate::span::BlockSpan;
use crate::{BlockDevice, FsError, Result};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use log::{debug, info, warn};

const SUPER_BLOCK_ID: usize = 0;

/// The SimpleFileSystem mounted on a block device.
///
/// layout: SuperBlock | InodeTable (ceil(blocks / 10) blocks) | DataArea
///
/// The free block bitmap lives only as long as this value; dropping it
/// unmounts the device.
pub struct SimpleFileSystem {
    block_device: Arc<dyn BlockDevice>,
    layout: Layout,
    inode_table: InodeTable,
    bitmap: Bitmap,
}

/// The indirect block of a file under write, loaded on first use and
/// written back once at the end.
struct IndirectCursor {
    block_id: u32,
    entries: IndirectBlock,
    dirty: bool,
}

impl SimpleFileSystem {
    /// Write a fresh file system over the whole device.
    ///
    /// Every block but the super block is zeroed; there is no way back.
    pub fn format(block_device: &Arc<dyn BlockDevice>) -> Result {
        if block_device.mounted() {
            return Err(FsError::AlreadyMounted);
        }
        let mut super_block = SuperBlock::default();
        super_block.initialize(block_device.num_blocks())?;

        let mut buf = BlockBuf::default();
        buf.write(0, |super_block_inner: &mut SuperBlock| {
            *super_block_inner = super_block;
        });
        buf.store(block_device, SUPER_BLOCK_ID);
        // clear all other blocks
        let empty = BlockBuf::default();
        for block_id in 1..super_block.blocks {
            empty.store(block_device, block_id as usize);
        }
        info!("formatted {:?}", super_block);
        Ok(())
    }

    /// Open a formatted device as a file system.
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        if block_device.mounted() {
            return Err(FsError::AlreadyMounted);
        }
        let super_block = read_block(
            &block_device,
            SUPER_BLOCK_ID,
            0,
            |super_block: &SuperBlock| *super_block,
        );
        let layout = super_block.validate(block_device.num_blocks())?;
        let inode_table = InodeTable::new(Arc::clone(&block_device), layout);
        let bitmap = Bitmap::build(&block_device, &layout, &inode_table)?;
        block_device.mount();
        info!(
            "mounted {:?}, {} blocks free",
            super_block,
            bitmap.free_count()
        );
        Ok(Self {
            block_device,
            layout,
            inode_table,
            bitmap,
        })
    }

    /// Unmount the file system, dropping the bitmap.
    pub fn unmount(self) {}

    /// The validated layout of this file system.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The current free block bitmap.
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Dump the super block and every valid inode of a device.
    pub fn debug(block_device: &Arc<dyn BlockDevice>) -> Dump {
        Dump {
            block_device: Arc::clone(block_device),
        }
    }

    fn alloc_block(&mut self) -> Result<u32> {
        self.bitmap.alloc().ok_or(FsError::DeviceFull)
    }

    /// Create an empty file, returning its inode number, or `None` when the
    /// inode table is full.
    pub fn create(&self) -> Option<u32> {
        self.inode_table.create()
    }

    /// Every block a file owns: data blocks first, then the indirect block.
    fn owned_blocks(&self, disk_inode: &DiskInode) -> Vec<u32> {
        let mut v: Vec<u32> = disk_inode.direct_blocks().collect();
        if disk_inode.indirect != 0 {
            read_block(
                &self.block_device,
                disk_inode.indirect as usize,
                0,
                |indirect: &IndirectBlock| {
                    v.extend(indirect.iter().copied().filter(|block_id| *block_id != 0));
                },
            );
            v.push(disk_inode.indirect);
        }
        v
    }

    /// Remove a file and free all of its blocks.
    pub fn remove(&mut self, inumber: u32) -> Result {
        let mut disk_inode = self.inode_table.load(inumber)?;
        let blocks = self.owned_blocks(&disk_inode);
        // check every block first so a failure frees nothing
        if let Some(&block_id) = blocks.iter().find(|block_id| self.bitmap.is_free(**block_id)) {
            warn!("inode {} owns free block {}", inumber, block_id);
            return Err(FsError::FreeUnallocated(block_id));
        }
        for &block_id in blocks.iter() {
            self.bitmap.dealloc(block_id)?;
        }
        disk_inode.invalidate();
        self.inode_table.save(inumber, &disk_inode)?;
        debug!("removed inode {}, {} blocks freed", inumber, blocks.len());
        Ok(())
    }

    /// Size in bytes of a file.
    pub fn stat(&self, inumber: u32) -> Result<u32> {
        self.inode_table.load(inumber).map(|disk_inode| disk_inode.size)
    }

    /// Read from a file at `offset` into `buf`, returning the number of
    /// bytes copied.
    ///
    /// Only bytes in `[offset, size)` are read. A block that was never
    /// written is skipped without using up any of `buf`: the bytes that were
    /// copied are packed into `buf[..n]`.
    pub fn read(&self, inumber: u32, buf: &mut [u8], offset: usize) -> Result<usize> {
        let disk_inode = self.inode_table.load(inumber)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let size = disk_inode.size as usize;
        if offset >= size {
            return Err(FsError::EndOfFile);
        }
        let mut indirect: Option<IndirectBlock> = None;
        let mut read_size = 0usize;
        for segment in BlockSpan::new(offset, size - offset) {
            if read_size == buf.len() {
                break;
            }
            let block_id = match Slot::of(segment.block_index) {
                Some(Slot::Direct(i)) => disk_inode.direct[i],
                Some(Slot::Indirect(i)) if disk_inode.indirect != 0 => {
                    indirect.get_or_insert_with(|| {
                        read_block(
                            &self.block_device,
                            disk_inode.indirect as usize,
                            0,
                            |indirect: &IndirectBlock| *indirect,
                        )
                    })[i]
                }
                _ => 0,
            };
            if block_id == 0 {
                continue;
            }
            let copy_len = segment.range.len().min(buf.len() - read_size);
            let src = segment.range.start..segment.range.start + copy_len;
            read_block(
                &self.block_device,
                block_id as usize,
                0,
                |data_block: &DataBlock| {
                    buf[read_size..read_size + copy_len].copy_from_slice(&data_block[src]);
                },
            );
            read_size += copy_len;
        }
        Ok(read_size)
    }

    /// Write `buf` into a file at `offset`, returning the number of bytes
    /// written.
    ///
    /// Blocks are allocated as the write reaches them. When the device runs
    /// out of blocks the write stops there and the bytes written so far are
    /// returned; the inode is saved after every block.
    pub fn write(&mut self, inumber: u32, buf: &[u8], offset: usize) -> Result<usize> {
        let mut disk_inode = self.inode_table.load(inumber)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut indirect: Option<IndirectCursor> = None;
        let mut write_size = 0usize;
        let mut result = Ok(());
        for segment in BlockSpan::new(offset, buf.len()) {
            let block_id =
                match self.block_for_write(&mut disk_inode, &mut indirect, segment.block_index) {
                    Ok(block_id) => block_id,
                    Err(FsError::DeviceFull) => {
                        warn!(
                            "device full, inode {} write stopped after {} bytes",
                            inumber, write_size
                        );
                        break;
                    }
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                };
            modify_block(
                &self.block_device,
                block_id as usize,
                0,
                |data_block: &mut DataBlock| {
                    data_block[segment.range.clone()].copy_from_slice(&buf[segment.buf.clone()]);
                },
            );
            write_size += segment.range.len();
            disk_inode.size = disk_inode.size.max((offset + write_size) as u32);
            if let Err(err) = self.inode_table.save(inumber, &disk_inode) {
                result = Err(err);
                break;
            }
        }
        // the pointers allocated so far must reach the disk on every exit
        if let Some(cursor) = indirect.filter(|cursor| cursor.dirty) {
            let mut block = BlockBuf::default();
            block.write(0, |entries: &mut IndirectBlock| *entries = cursor.entries);
            block.store(&self.block_device, cursor.block_id as usize);
        }
        self.inode_table.save(inumber, &disk_inode)?;
        result?;
        Ok(write_size)
    }

    /// Find the block behind logical block `block_index` of a file,
    /// allocating it (and the indirect block) when missing.
    fn block_for_write(
        &mut self,
        disk_inode: &mut DiskInode,
        indirect: &mut Option<IndirectCursor>,
        block_index: usize,
    ) -> Result<u32> {
        match Slot::of(block_index) {
            Some(Slot::Direct(i)) => {
                if disk_inode.direct[i] == 0 {
                    disk_inode.direct[i] = self.alloc_block()?;
                }
                Ok(disk_inode.direct[i])
            }
            Some(Slot::Indirect(i)) => {
                let cursor = match indirect.take() {
                    Some(cursor) => cursor,
                    None => self.indirect_cursor(disk_inode)?,
                };
                let cursor = indirect.insert(cursor);
                if cursor.entries[i] == 0 {
                    cursor.entries[i] = self.alloc_block()?;
                    cursor.dirty = true;
                }
                Ok(cursor.entries[i])
            }
            // BlockSpan stops at the largest file size
            None => Err(FsError::DeviceFull),
        }
    }

    fn indirect_cursor(&mut self, disk_inode: &mut DiskInode) -> Result<IndirectCursor> {
        if disk_inode.indirect == 0 {
            disk_inode.indirect = self.alloc_block()?;
            // a reused block may hold stale pointers
            return Ok(IndirectCursor {
                block_id: disk_inode.indirect,
                entries: [0; POINTERS_PER_BLOCK],
                dirty: true,
            });
        }
        let entries = read_block(
            &self.block_device,
            disk_inode.indirect as usize,
            0,
            |entries: &IndirectBlock| *entries,
        );
        Ok(IndirectCursor {
            block_id: disk_inode.indirect,
            entries,
            dirty: false,
        })
    }
}

impl Drop for SimpleFileSystem {
    fn drop(&mut self) {
        self.block_device.unmount();
        info!("unmounted");
    }
}

/// Human readable dump of a device, produced by [`SimpleFileSystem::debug`].
pub struct Dump {
    block_device: Arc<dyn BlockDevice>,
}

impl Display for Dump {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let block_device = &self.block_device;
        let super_block = read_block(
            block_device,
            SUPER_BLOCK_ID,
            0,
            |super_block: &SuperBlock| *super_block,
        );
        writeln!(f, "SuperBlock:")?;
        if super_block.is_valid() {
            writeln!(f, "    magic number is valid")?;
        } else {
            writeln!(f, "    magic number is invalid")?;
        }
        writeln!(f, "    {} blocks", super_block.blocks)?;
        writeln!(f, "    {} inode blocks", super_block.inode_blocks)?;
        writeln!(f, "    {} inodes", super_block.inode_count)?;
        // walking a table we cannot trust could run off the device
        let layout = match super_block.validate(block_device.num_blocks()) {
            Ok(layout) => layout,
            Err(_) => return Ok(()),
        };
        for block_pos in 0..layout.inode_blocks {
            let inodes = read_block(
                block_device,
                block_pos as usize + 1,
                0,
                |inodes: &InodeBlock| *inodes,
            );
            for (slot, disk_inode) in inodes.iter().enumerate() {
                if !disk_inode.is_valid() {
                    continue;
                }
                let inumber = block_pos as usize * inodes.len() + slot;
                writeln!(f, "Inode {}:", inumber)?;
                writeln!(f, "    size: {} bytes", disk_inode.size)?;
                write!(f, "    direct blocks:")?;
                for block_id in disk_inode.direct_blocks() {
                    write!(f, " {}", block_id)?;
                }
                writeln!(f)?;
                if disk_inode.indirect == 0 {
                    continue;
                }
                writeln!(f, "    indirect block: {}", disk_inode.indirect)?;
                if disk_inode.indirect >= layout.blocks {
                    continue;
                }
                let entries = read_block(
                    block_device,
                    disk_inode.indirect as usize,
                    0,
                    |entries: &IndirectBlock| *entries,
                );
                write!(f, "    indirect data blocks:")?;
                for block_id in entries.iter().filter(|block_id| **block_id != 0) {
                    write!(f, " {}", block_id)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
