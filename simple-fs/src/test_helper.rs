pub use crate::{BlockDevice, BLOCK_SZ};
use core::mem::swap;
use lock_api::{GuardSend, RawMutex};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// An in-memory device of `N` blocks.
pub struct TestBlockDevice<const N: usize> {
    pub blocks: Box<Mutex<Vec<[u8; BLOCK_SZ]>>>,
    mounted: AtomicBool,
}

impl<const N: usize> TestBlockDevice<N> {
    pub fn new() -> Self {
        Self {
            blocks: Box::new(Mutex::new(vec![[0u8; BLOCK_SZ]; N])),
            mounted: AtomicBool::new(false),
        }
    }

    /// Fill every block with `byte`, like a device holding old data.
    pub fn fill(&self, byte: u8) {
        let mut blocks = self.blocks.as_ref().lock().unwrap();
        for block in blocks.iter_mut() {
            block.iter_mut().for_each(|b| *b = byte);
        }
    }
}

impl<const N: usize> BlockDevice for TestBlockDevice<N> {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert!(block_id < N);
        let blocks = self.blocks.as_ref().lock().unwrap();
        buf.copy_from_slice(&blocks[block_id]);
    }
    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert!(block_id < N);
        let mut blocks = self.blocks.as_ref().lock().unwrap();
        blocks[block_id].copy_from_slice(buf);
    }
    fn num_blocks(&self) -> u32 {
        N as u32
    }
    fn mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }
    fn mount(&self) {
        self.mounted.store(true, Ordering::Release);
    }
    fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }
}

/// Define our raw lock type
///
/// From [lock_api](https://docs.rs/lock_api/latest/lock_api/index.html)
pub struct RawSpinlock(AtomicBool);

// Implement RawMutex for this type
unsafe impl RawMutex for RawSpinlock {
    const INIT: RawSpinlock = RawSpinlock(AtomicBool::new(false));

    // A spinlock guard can be sent to another thread and unlocked there
    type GuardMarker = GuardSend;

    fn lock(&self) {
        while !self.try_lock() {
            core::hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The expected content of a file, kept in host memory.
pub struct FakeFile {
    v: Vec<u8>,
}

impl FakeFile {
    pub fn new() -> Self {
        Self { v: Vec::new() }
    }
    pub fn size(&self) -> usize {
        self.v.len()
    }
    /// Read like the file system does: clamp to the size, nothing at the end.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> Option<usize> {
        if offset >= self.v.len() {
            return None;
        }
        let len = dst.len().min(self.v.len() - offset);
        dst[..len].copy_from_slice(&self.v[offset..offset + len]);
        Some(len)
    }
    /// Write and grow, zero filling any gap.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) {
        let end = offset + src.len();
        if self.v.len() < end {
            self.v.resize(end, 0);
        }
        self.v[offset..end].copy_from_slice(src);
    }
}

pub struct FileOpGenerator;

#[derive(Debug)]
pub enum FileOp {
    FileRead { offset: usize, len: usize },
    FileWrite { offset: usize, data: Vec<u8> },
}

impl FileOpGenerator {
    /// A random read or write inside the first `file_len` bytes.
    pub fn generate(file_len: usize) -> FileOp {
        let offset: usize;
        let len: usize;
        let mut rng = rand::thread_rng();
        loop {
            let mut offset0 = rng.gen::<u64>() % (file_len as u64 - 1);
            let mut offset1 = rng.gen::<u64>() % (file_len as u64 - 1);
            if offset0 != offset1 {
                if offset0 > offset1 {
                    swap(&mut offset0, &mut offset1);
                }
                offset = offset0 as usize;
                len = (offset1 - offset0) as usize;
                break;
            }
        }
        if rand::random() {
            FileOp::FileRead { offset, len }
        } else {
            let data: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
            FileOp::FileWrite { offset, data }
        }
    }
}

/// `len` bytes of a recognisable pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i % 251) as u8 ^ seed)
        .collect()
}
