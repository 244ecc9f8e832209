use crate::sfs::SimpleFileSystem;
use crate::Result;
use alloc::sync::Arc;

/// A file of a shared SimpleFileSystem, named by its inode number.
///
/// Every operation takes the file system lock for its whole duration.
pub struct File<R: lock_api::RawMutex> {
    inumber: u32,
    fs: Arc<lock_api::Mutex<R, SimpleFileSystem>>,
}

impl<R: lock_api::RawMutex> File<R> {
    /// Create a new empty file, or `None` if the inode table is full.
    pub fn create(fs: &Arc<lock_api::Mutex<R, SimpleFileSystem>>) -> Option<Self> {
        let inumber = fs.lock().create()?;
        Some(Self {
            inumber,
            fs: Arc::clone(fs),
        })
    }

    /// Open an existing file.
    pub fn open(fs: &Arc<lock_api::Mutex<R, SimpleFileSystem>>, inumber: u32) -> Result<Self> {
        fs.lock().stat(inumber)?;
        Ok(Self {
            inumber,
            fs: Arc::clone(fs),
        })
    }

    /// The inode number of this file.
    pub fn inumber(&self) -> u32 {
        self.inumber
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u32> {
        self.fs.lock().stat(self.inumber)
    }

    /// Read at `offset` into `buf`.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.fs.lock().read(self.inumber, buf, offset)
    }

    /// Write `buf` at `offset`; may write less when the device is full.
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        self.fs.lock().write(self.inumber, buf, offset)
    }

    /// Remove the file and free its blocks.
    pub fn remove(self) -> Result {
        self.fs.lock().remove(self.inumber)
    }
}
