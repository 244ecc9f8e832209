use crate::{BlockDevice, BLOCK_SZ};

use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};

/// Plain old data that can be viewed in place inside a block.
///
/// # Safety
///
/// Implementors must have a fixed `#[repr(C)]` (or primitive) layout and be
/// valid for every bit pattern, since they are read straight from disk bytes.
pub unsafe trait OnDisk: Sized {}

unsafe impl OnDisk for u8 {}
unsafe impl OnDisk for u32 {}
unsafe impl<T: OnDisk, const N: usize> OnDisk for [T; N] {}

/// One block worth of bytes in memory.
#[derive(Copy, Clone)]
#[repr(C, align(8))]
pub struct BlockBuf([u8; BLOCK_SZ]);

impl Default for BlockBuf {
    fn default() -> Self {
        Self([0u8; BLOCK_SZ])
    }
}

impl Deref for BlockBuf {
    type Target = [u8; BLOCK_SZ];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BlockBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl BlockBuf {
    /// Read block `block_id` from the device.
    pub fn load(block_device: &Arc<dyn BlockDevice>, block_id: usize) -> Self {
        let mut buf = Self::default();
        block_device.read_block(block_id, &mut buf.0);
        buf
    }

    /// Write this buffer to block `block_id` of the device.
    pub fn store(&self, block_device: &Arc<dyn BlockDevice>, block_id: usize) {
        block_device.write_block(block_id, &self.0);
    }

    fn check_value_validity<T>(&self, offset: usize) {
        let start_addr = &self.0[offset] as *const u8 as usize;
        // Callers only pass offsets derived from the layout constants, so
        // a violation here is a bug rather than bad input.
        assert_eq!(start_addr % core::mem::align_of::<T>(), 0);
        assert!(offset + core::mem::size_of::<T>() <= BLOCK_SZ);
    }

    /// Get a reference to a value of type T at a given offset in the block.
    pub fn value_ref_at_offset<T: OnDisk>(&self, offset: usize) -> &T {
        self.check_value_validity::<T>(offset);
        // Safety: the address is aligned for T, the value lies inside the
        // block, and T is valid for any bit pattern.
        unsafe { &*(self.0.as_ptr().add(offset) as *const T) }
    }

    /// Get a mutable reference to a value of type T at a given offset in the block.
    pub fn value_mut_at_offset<T: OnDisk>(&mut self, offset: usize) -> &mut T {
        self.check_value_validity::<T>(offset);
        // Safety: See value_ref_at_offset.
        unsafe { &mut *(self.0.as_mut_ptr().add(offset) as *mut T) }
    }

    /// Apply a read operation on this block at the given offset.
    pub fn read<T: OnDisk, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.value_ref_at_offset::<T>(offset))
    }

    /// Apply a write operation on this block at the given offset.
    pub fn write<T: OnDisk, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.value_mut_at_offset::<T>(offset))
    }
}

/// Apply a read operation on a block of the device at the given offset.
pub fn read_block<T: OnDisk, V>(
    block_device: &Arc<dyn BlockDevice>,
    block_id: usize,
    offset: usize,
    op: impl FnOnce(&T) -> V,
) -> V {
    BlockBuf::load(block_device, block_id).read(offset, op)
}

/// Read a block, apply a write operation at the given offset and write the
/// whole block back.
pub fn modify_block<T: OnDisk, V>(
    block_device: &Arc<dyn BlockDevice>,
    block_id: usize,
    offset: usize,
    op: impl FnOnce(&mut T) -> V,
) -> V {
    let mut buf = BlockBuf::load(block_device, block_id);
    let ret = buf.write(offset, op);
    buf.store(block_device, block_id);
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helper::*;

    #[test]
    pub fn test_read_write() {
        let mut buf = BlockBuf::default();
        let test_value: u32 = 0x11223344;
        {
            let u32_mut = buf.value_mut_at_offset::<u32>(8);
            *u32_mut = test_value;
        }
        assert_eq!(*buf.value_ref_at_offset::<u32>(8), test_value);
        assert_eq!(buf[8..12], test_value.to_ne_bytes());
        assert!(buf[..8].iter().all(|byte| *byte == 0));
    }

    #[test]
    pub fn test_load_store() {
        let block_dev: Arc<dyn BlockDevice> = Arc::new(TestBlockDevice::<4>::new());
        let mut buf = BlockBuf::load(&block_dev, 1);
        assert!(buf.iter().all(|byte| *byte == 0));

        buf.write(4, |v: &mut u32| *v = 0x55667788);
        // nothing reaches the device before store
        assert_eq!(read_block(&block_dev, 1, 4, |v: &u32| *v), 0);
        buf.store(&block_dev, 1);
        assert_eq!(read_block(&block_dev, 1, 4, |v: &u32| *v), 0x55667788);
    }

    #[test]
    pub fn test_modify_block_keeps_neighbours() {
        let block_dev: Arc<dyn BlockDevice> = Arc::new(TestBlockDevice::<4>::new());
        modify_block(&block_dev, 2, 0, |v: &mut u32| *v = 1);
        modify_block(&block_dev, 2, 4, |v: &mut u32| *v = 2);
        let mut raw = [0u8; BLOCK_SZ];
        block_dev.read_block(2, &mut raw);
        assert_eq!(raw[..4], 1u32.to_ne_bytes());
        assert_eq!(raw[4..8], 2u32.to_ne_bytes());
        assert!(raw[8..].iter().all(|byte| *byte == 0));
    }

    #[test]
    #[should_panic]
    pub fn test_unaligned_access() {
        let buf = BlockBuf::default();
        let _ = buf.value_ref_at_offset::<u32>(2);
    }

    #[test]
    #[should_panic]
    pub fn test_out_of_block_access() {
        let buf = BlockBuf::default();
        let _ = buf.value_ref_at_offset::<[u32; 2]>(BLOCK_SZ - 4);
    }
}
