use crate::layout::MAX_FILE_SIZE;
use crate::BLOCK_SZ;
use core::ops::Range;

/// The part of a byte range of a file that falls inside one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Logical block index inside the file
    pub block_index: usize,
    /// Byte range inside that block
    pub range: Range<usize>,
    /// Matching byte range of the caller's buffer
    pub buf: Range<usize>,
}

/// Iterator splitting the bytes `[offset, offset + len)` of a file into
/// per-block segments, in ascending order.
///
/// The range is clipped to the largest file size, so a request reaching past
/// it yields fewer bytes than asked for.
pub struct BlockSpan {
    start: usize,
    current: usize,
    end: usize,
}

impl BlockSpan {
    /// Segments of `len` bytes starting at file offset `offset`.
    pub fn new(offset: usize, len: usize) -> Self {
        Self {
            start: offset,
            current: offset,
            end: offset.saturating_add(len).min(MAX_FILE_SIZE),
        }
    }
}

impl Iterator for BlockSpan {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.current >= self.end {
            return None;
        }
        let block_index = self.current / BLOCK_SZ;
        let block_start = block_index * BLOCK_SZ;
        // calculate end of current block
        let end_current_block = (block_start + BLOCK_SZ).min(self.end);
        let segment = Segment {
            block_index,
            range: self.current - block_start..end_current_block - block_start,
            buf: self.current - self.start..end_current_block - self.start,
        };
        self.current = end_current_block;
        Some(segment)
    }
}
