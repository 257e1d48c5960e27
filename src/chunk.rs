pub const CHUNK_SIZE: u64 = 1024 * 1024 * 100; // 100MB
pub const CHUNK_OVERLAP: u64 = 1024 * 2; // 2KB

/// Byte interval of the input assigned to one worker.
///
/// `start..end` is what gets read; it reaches `overlap` bytes past the
/// nominal interval on both sides so a line crossing a nominal boundary is
/// readable in full. A line belongs to the chunk whose
/// `nominal_start..nominal_end` holds its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub nominal_start: u64,
    pub nominal_end: u64,
    /// `end` is the end of the file, so an unterminated last line is complete.
    pub reaches_eof: bool,
}

impl ByteRange {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Splits `file_size` bytes into `max(file_size / chunk_size, 1)` ranges.
///
/// The last range absorbs the remainder of the integer division.
pub fn plan_chunks(file_size: u64, chunk_size: u64, overlap: u64) -> Vec<ByteRange> {
    let chunk_size = chunk_size.max(1);
    let count = (file_size / chunk_size).max(1);

    (0..count)
        .zip(0usize..)
        .map(|(i, index)| {
            let nominal_start = i * chunk_size;
            let nominal_end = if i + 1 == count {
                file_size
            } else {
                nominal_start + chunk_size
            };
            let end = nominal_end.saturating_add(overlap).min(file_size);

            ByteRange {
                index,
                start: nominal_start.saturating_sub(overlap),
                end,
                nominal_start,
                nominal_end,
                reaches_eof: end == file_size,
            }
        })
        .collect()
}
