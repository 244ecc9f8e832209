use core::any::Any;

/// Interface of the block storage SimpleFileSystem lives on.
///
/// Every method takes `&self`; implementations provide their own interior
/// mutability, so a device can be shared as `Arc<dyn BlockDevice>`.
pub trait BlockDevice: Send + Sync + Any {
    /// Read block `block_id` into `buf`, which is exactly `BLOCK_SZ` bytes.
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// Write `buf`, which is exactly `BLOCK_SZ` bytes, to block `block_id`.
    fn write_block(&self, block_id: usize, buf: &[u8]);
    /// Total number of blocks on the device.
    fn num_blocks(&self) -> u32;
    /// Whether a file system currently holds this device mounted.
    fn mounted(&self) -> bool;
    /// Record that a file system mounted this device.
    fn mount(&self);
    /// Record that the file system holding this device went away.
    fn unmount(&self);
}
