use crate::chunk::ByteRange;
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;

/// How chunk bytes are brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Memory-map, falling back to a plain read if mapping fails.
    #[default]
    Auto,
    Mapped,
    Buffered,
}

/// Read-only bytes of one `ByteRange`. Unmapped (or freed) on drop.
#[derive(Debug)]
pub enum ByteView {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl ByteView {
    pub fn open(file: &File, range: &ByteRange, mode: ViewMode) -> io::Result<ByteView> {
        let len = usize::try_from(range.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk larger than address space"))?;

        if len == 0 {
            return Ok(ByteView::Buffered(Vec::new()));
        }

        match mode {
            ViewMode::Mapped => map_range(file, range.start, len).map(ByteView::Mapped),
            ViewMode::Buffered => read_range(file, range.start, len).map(ByteView::Buffered),
            ViewMode::Auto => match map_range(file, range.start, len) {
                Ok(mmap) => Ok(ByteView::Mapped(mmap)),
                Err(e) => {
                    tracing::warn!(chunk = range.index, error = %e, "mmap failed, reading chunk instead");
                    read_range(file, range.start, len).map(ByteView::Buffered)
                }
            },
        }
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        matches!(self, ByteView::Mapped(_))
    }
}

impl Deref for ByteView {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            ByteView::Mapped(mmap) => mmap,
            ByteView::Buffered(buf) => buf,
        }
    }
}

#[allow(unsafe_code)]
fn map_range(file: &File, offset: u64, len: usize) -> io::Result<Mmap> {
    // SAFETY: read-only mapping of a file that is not written during the run;
    // the mapping never outlives the chunk it was created for.
    unsafe { MmapOptions::new().offset(offset).len(len).map(file) }
}

fn read_range(mut file: &File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::plan_chunks;
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_modes_agree() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let file = fixture(&data);

        for range in plan_chunks(data.len() as u64, 3000, 100) {
            let expected = &data[range.start as usize..range.end as usize];
            for mode in [ViewMode::Auto, ViewMode::Mapped, ViewMode::Buffered] {
                let view = ByteView::open(&file, &range, mode).unwrap();
                assert_eq!(&*view, expected, "{mode:?} chunk {}", range.index);
            }
        }
    }

    #[test]
    fn test_mapped_and_buffered_variants() {
        let file = fixture(b"hello\nworld\n");
        let range = plan_chunks(12, 100, 10)[0];
        assert!(ByteView::open(&file, &range, ViewMode::Mapped).unwrap().is_mapped());
        assert!(!ByteView::open(&file, &range, ViewMode::Buffered).unwrap().is_mapped());
    }

    #[test]
    fn test_empty_range() {
        let file = fixture(b"");
        let range = plan_chunks(0, 100, 10)[0];
        let view = ByteView::open(&file, &range, ViewMode::Mapped).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_read_past_end_fails() {
        let file = fixture(b"short");
        let range = plan_chunks(50, 100, 10)[0];
        assert!(ByteView::open(&file, &range, ViewMode::Buffered).is_err());
    }
}
