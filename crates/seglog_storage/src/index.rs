//! Fixed-width, memory-mapped offset index.

use crate::error::{StorageError, StorageResult};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Width of the relative offset field.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Selects which entry [`Index::read`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEntry {
    /// The most recently written entry.
    Last,
    /// The entry for this relative offset.
    At(u32),
}

/// Memory-mapped translation from relative record offset to store position.
///
/// ## Entry Format
///
/// ```text
/// | relative_offset (4, big-endian) | position (8, big-endian) |
/// ```
///
/// The backing file is extended to its full capacity when opened and mapped
/// once, so appends are plain memory writes. Closing flushes the mapping,
/// syncs the file and truncates it back to its logical size; a later open
/// recovers the logical size from the file length alone.
///
/// Dropping an index that was not closed performs the same commit.
#[derive(Debug)]
pub struct Index {
    path: PathBuf,
    file: File,
    /// `None` once the index has been committed.
    mmap: Option<MmapMut>,
    size: u64,
    capacity: u64,
}

impl Index {
    /// Opens or creates the index file at `path`, preallocating `max_bytes`.
    ///
    /// A file already longer than `max_bytes` keeps its length as capacity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CapacityTooSmall`] if not even one entry fits,
    /// or an I/O error if the file cannot be opened, resized or mapped.
    pub fn open(path: &Path, max_bytes: u64) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let existing = file.metadata()?.len();
        let capacity = max_bytes.max(existing);

        if capacity < ENTRY_WIDTH {
            return Err(StorageError::CapacityTooSmall {
                capacity,
                required: ENTRY_WIDTH,
            });
        }

        let len = usize::try_from(capacity).map_err(|_| {
            StorageError::Corrupted(format!("index capacity {capacity} exceeds address space"))
        })?;

        file.set_len(capacity)?;

        // SAFETY: the file is owned by this index and stays open for the
        // lifetime of the mapping; its length was just set to `len`. The
        // mapping is dropped before the file is truncated in `commit`.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap: Some(mmap),
            size: existing - existing % ENTRY_WIDTH,
            capacity,
        })
    }

    /// Reads one entry, returning `(relative_offset, position)`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EndOfIndex`] if the index is empty or the entry
    /// has not been written.
    pub fn read(&self, entry: IndexEntry) -> StorageResult<(u32, u64)> {
        let mmap = self.mmap.as_ref().ok_or(StorageError::Closed)?;
        let entries = self.entries();

        let n = match entry {
            IndexEntry::Last if entries == 0 => {
                return Err(StorageError::EndOfIndex { entry: 0, entries });
            }
            IndexEntry::Last => entries - 1,
            IndexEntry::At(n) => u64::from(n),
        };

        if n >= entries {
            return Err(StorageError::EndOfIndex { entry: n, entries });
        }

        Ok(decode_entry(mmap, n))
    }

    /// Appends one entry at the current logical size.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexFull`] if the entry does not fit in the
    /// mapped capacity.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> StorageResult<()> {
        let (size, capacity) = (self.size, self.capacity);
        let mmap = self.mmap.as_mut().ok_or(StorageError::Closed)?;

        if size + ENTRY_WIDTH > capacity {
            return Err(StorageError::IndexFull { size, capacity });
        }

        let start = size as usize;
        let split = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;
        mmap[start..split].copy_from_slice(&relative_offset.to_be_bytes());
        mmap[split..end].copy_from_slice(&position.to_be_bytes());

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Trims entries that cannot belong to a store of `store_size` bytes.
    ///
    /// Walks the entries from the start and stops at the first one whose
    /// relative offset is not its entry number, whose position does not
    /// increase, or whose position lies at or past the end of the store.
    /// Returns the number of entries dropped.
    ///
    /// An index that was never closed is still at its preallocated length,
    /// with zeroed or stale entries past the last real one; this restores the
    /// logical size.
    pub fn recover(&mut self, store_size: u64) -> StorageResult<u64> {
        let mmap = self.mmap.as_ref().ok_or(StorageError::Closed)?;
        let entries = self.entries();

        let mut valid = 0;
        let mut last_position = None;
        while valid < entries {
            let (relative, position) = decode_entry(mmap, valid);
            if u64::from(relative) != valid
                || position >= store_size
                || last_position.is_some_and(|last| position <= last)
            {
                break;
            }
            last_position = Some(position);
            valid += 1;
        }

        self.size = valid * ENTRY_WIDTH;
        Ok(entries - valid)
    }

    /// Drops every entry from `entries` onwards.
    ///
    /// Keeping more entries than are written is a no-op.
    pub fn truncate(&mut self, entries: u64) -> StorageResult<()> {
        if self.mmap.is_none() {
            return Err(StorageError::Closed);
        }
        self.size = self.size.min(entries * ENTRY_WIDTH);
        Ok(())
    }

    /// Flushes the mapped region to the file.
    pub fn flush(&self) -> StorageResult<()> {
        let mmap = self.mmap.as_ref().ok_or(StorageError::Closed)?;
        mmap.flush()?;
        Ok(())
    }

    /// Commits the index and closes the file.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing, syncing or truncating fails.
    pub fn close(mut self) -> StorageResult<()> {
        self.commit()
    }

    /// Flush, sync, unmap, then truncate to the logical size.
    ///
    /// The order matters: the file length is the only record of the logical
    /// size once the index is closed.
    fn commit(&mut self) -> StorageResult<()> {
        let Some(mmap) = self.mmap.take() else {
            return Ok(());
        };

        mmap.flush()?;
        self.file.sync_all()?;
        drop(mmap);
        self.file.set_len(self.size)?;

        Ok(())
    }

    /// Returns the logical size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the mapped capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the number of entries written.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Returns true if no entries have been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns true if another entry would not fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size + ENTRY_WIDTH > self.capacity
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(err) = self.commit() {
            warn!(path = %self.path.display(), error = %err, "failed to commit index on drop");
        }
    }
}

fn decode_entry(mmap: &MmapMut, n: u64) -> (u32, u64) {
    let start = (n * ENTRY_WIDTH) as usize;
    let split = start + OFFSET_WIDTH as usize;
    let end = start + ENTRY_WIDTH as usize;

    let mut relative = [0u8; OFFSET_WIDTH as usize];
    relative.copy_from_slice(&mmap[start..split]);
    let mut position = [0u8; POSITION_WIDTH as usize];
    position.copy_from_slice(&mmap[split..end]);

    (u32::from_be_bytes(relative), u64::from_be_bytes(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CAPACITY: u64 = 1024;

    #[test]
    fn index_write_and_read() {
        let dir = tempdir().unwrap();
        let mut index = Index::open(&dir.path().join("0.index"), CAPACITY).unwrap();
        assert_eq!(index.capacity(), CAPACITY);
        assert!(index.is_empty());

        let entries = [(0u32, 0u64), (1, 10)];
        for (offset, position) in entries {
            index.write(offset, position).unwrap();

            let (read_offset, read_position) = index.read(IndexEntry::At(offset)).unwrap();
            assert_eq!(read_offset, offset);
            assert_eq!(read_position, position);
        }

        let result = index.read(IndexEntry::At(entries.len() as u32));
        assert!(matches!(result, Err(StorageError::EndOfIndex { .. })));
    }

    #[test]
    fn index_empty_read_is_eof() {
        let dir = tempdir().unwrap();
        let index = Index::open(&dir.path().join("0.index"), CAPACITY).unwrap();

        let err = index.read(IndexEntry::Last).unwrap_err();
        assert!(err.is_eof());
        assert!(index.read(IndexEntry::At(0)).unwrap_err().is_eof());
    }

    #[test]
    fn index_file_preallocated_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.index");
        let mut index = Index::open(&path, CAPACITY).unwrap();
        index.write(0, 0).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), CAPACITY);
        index.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), ENTRY_WIDTH);
    }

    #[test]
    fn index_reopen_recovers_last_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.index");

        let mut index = Index::open(&path, CAPACITY).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 10).unwrap();
        index.close().unwrap();

        let index = Index::open(&path, CAPACITY).unwrap();
        assert_eq!(index.entries(), 2);
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (1, 10));
    }

    #[test]
    fn index_drop_commits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.index");

        {
            let mut index = Index::open(&path, CAPACITY).unwrap();
            index.write(0, 0).unwrap();
            index.write(1, 21).unwrap();
            index.write(2, 42).unwrap();
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * ENTRY_WIDTH);
        let index = Index::open(&path, CAPACITY).unwrap();
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (2, 42));
    }

    #[test]
    fn index_full() {
        let dir = tempdir().unwrap();
        let mut index = Index::open(&dir.path().join("0.index"), ENTRY_WIDTH * 3).unwrap();

        for i in 0..3u32 {
            assert!(!index.is_full());
            index.write(i, u64::from(i) * 19).unwrap();
        }
        assert!(index.is_full());

        let result = index.write(3, 57);
        assert!(matches!(
            result,
            Err(StorageError::IndexFull { size: 36, capacity: 36 })
        ));
        assert_eq!(index.entries(), 3);
    }

    #[test]
    fn index_capacity_not_multiple_of_entry_width() {
        let dir = tempdir().unwrap();
        let mut index = Index::open(&dir.path().join("0.index"), 30).unwrap();

        index.write(0, 0).unwrap();
        index.write(1, 8).unwrap();
        assert!(index.is_full());
        assert!(index.write(2, 16).is_err());
    }

    #[test]
    fn index_rejects_tiny_capacity() {
        let dir = tempdir().unwrap();
        let result = Index::open(&dir.path().join("0.index"), ENTRY_WIDTH - 1);
        assert!(matches!(
            result,
            Err(StorageError::CapacityTooSmall { capacity: 11, required: 12 })
        ));
    }

    #[test]
    fn index_keeps_existing_entries_beyond_smaller_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.index");

        let mut index = Index::open(&path, CAPACITY).unwrap();
        for i in 0..4u32 {
            index.write(i, u64::from(i) * 10).unwrap();
        }
        index.close().unwrap();

        let index = Index::open(&path, ENTRY_WIDTH * 2).unwrap();
        assert_eq!(index.capacity(), ENTRY_WIDTH * 4);
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (3, 30));
        assert!(index.is_full());
    }

    #[test]
    fn index_recover_trims_preallocated_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.index");

        // Simulate an unclean shutdown: entries written, no commit.
        let mut index = Index::open(&path, CAPACITY).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 20).unwrap();
        index.flush().unwrap();
        std::mem::forget(index);

        let mut index = Index::open(&path, CAPACITY).unwrap();
        assert_eq!(index.size(), CAPACITY - CAPACITY % ENTRY_WIDTH);

        let dropped = index.recover(40).unwrap();
        assert_eq!(index.entries(), 2);
        assert_eq!(dropped, CAPACITY / ENTRY_WIDTH - 2);
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (1, 20));
    }

    #[test]
    fn index_recover_drops_entries_past_store_end() {
        let dir = tempdir().unwrap();
        let mut index = Index::open(&dir.path().join("0.index"), CAPACITY).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 20).unwrap();
        index.write(2, 40).unwrap();

        assert_eq!(index.recover(40).unwrap(), 1);
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (1, 20));

        assert_eq!(index.recover(0).unwrap(), 2);
        assert!(index.is_empty());
    }

    #[test]
    fn index_truncate_drops_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.index");
        let mut index = Index::open(&path, CAPACITY).unwrap();
        for i in 0..3u32 {
            index.write(i, u64::from(i) * 10).unwrap();
        }

        index.truncate(5).unwrap();
        assert_eq!(index.entries(), 3);

        index.truncate(2).unwrap();
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (1, 10));
        index.write(2, 25).unwrap();
        index.close().unwrap();

        let index = Index::open(&path, CAPACITY).unwrap();
        assert_eq!(index.read(IndexEntry::Last).unwrap(), (2, 25));
    }

    #[test]
    fn index_closed_rejects_use() {
        let dir = tempdir().unwrap();
        let mut index = Index::open(&dir.path().join("0.index"), CAPACITY).unwrap();
        index.commit().unwrap();

        assert!(matches!(index.write(0, 0), Err(StorageError::Closed)));
        assert!(matches!(index.read(IndexEntry::Last), Err(StorageError::Closed)));
        assert!(index.commit().is_ok());
    }
}
