//! A segment: one store and one index covering a contiguous offset range.

use crate::config::SegmentConfig;
use crate::dir::{index_path, store_path};
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use seglog_storage::{Index, IndexEntry, Store, LEN_WIDTH};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// One store file plus one index file covering `[base_offset, next_offset)`.
///
/// A segment is *maxed* once its store or index reaches the configured limit
/// (or the index cannot fit another entry); it then rejects appends and the
/// log rotates to a new segment.
#[derive(Debug)]
pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Opens or creates the segment at `base_offset` in `dir`.
    ///
    /// The next offset is recovered from the last index entry. Left behind by
    /// an unclean shutdown, index entries past the end of the store and a
    /// torn final record are dropped, and store bytes past the last indexed
    /// record are cut off, so the two files agree again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentCorruption`] if the store holds bytes but
    /// the index file is missing or empty, or an error if either file cannot
    /// be opened, mapped or repaired.
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> CoreResult<Self> {
        let store = Store::open(&store_path(dir, base_offset))?;
        let mut index = Index::open(&index_path(dir, base_offset), config.max_index_bytes)?;

        if index.is_empty() && store.size() > 0 {
            return Err(CoreError::segment_corruption(format!(
                "segment {base_offset} has {} store bytes but no index entries",
                store.size()
            )));
        }

        let mut dropped = index.recover(store.size())?;
        let indexed_end = match index.read(IndexEntry::Last) {
            Ok((_, position)) => match store.read(position) {
                Ok(payload) => position + LEN_WIDTH + payload.len() as u64,
                Err(err) if err.is_eof() => {
                    index.truncate(index.entries() - 1)?;
                    dropped += 1;
                    position
                }
                Err(err) => return Err(err.into()),
            },
            Err(err) if err.is_eof() => 0,
            Err(err) => return Err(err.into()),
        };

        if dropped > 0 {
            warn!(
                base_offset,
                dropped,
                entries = index.entries(),
                "trimmed unwritten index entries"
            );
        }

        let store_size = store.size();
        if store_size > indexed_end {
            warn!(
                base_offset,
                discarded = store_size - indexed_end,
                "discarding unindexed store bytes"
            );
            store.truncate(indexed_end)?;
        }

        let next_offset = match index.read(IndexEntry::Last) {
            Ok((relative, _)) => base_offset
                .checked_add(u64::from(relative) + 1)
                .ok_or_else(|| {
                    CoreError::segment_corruption(format!(
                        "segment {base_offset} entry {relative} is past the last offset"
                    ))
                })?,
            Err(err) if err.is_eof() => base_offset,
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            store: Arc::new(store),
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends a record, returning the offset assigned to it.
    ///
    /// If the store write succeeds but the index write fails, the stored
    /// bytes are cut off again and the next offset is not advanced.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentMaxed`] if the segment is maxed,
    /// [`CoreError::OffsetOverflow`] once no offset is left after this one,
    /// or a storage error if a write fails.
    pub fn append(&mut self, mut record: Record) -> CoreResult<u64> {
        if self.is_maxed() {
            return Err(self.maxed_error());
        }

        let offset = self.next_offset;
        let next_offset = offset
            .checked_add(1)
            .ok_or(CoreError::OffsetOverflow { offset })?;
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| self.maxed_error())?;

        record.offset = offset;
        let (_, position) = self.store.append(&record.encode())?;

        if let Err(err) = self.index.write(relative, position) {
            warn!(
                base_offset = self.base_offset,
                offset,
                position,
                error = %err,
                "record stored but not indexed; discarding it"
            );
            if let Err(cut) = self.store.truncate(position) {
                warn!(base_offset = self.base_offset, error = %cut, "failed to discard record");
            }
            return Err(err.into());
        }

        self.next_offset = next_offset;
        Ok(offset)
    }

    /// Reads the record at an absolute offset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OffsetOutOfRange`] if the offset is not covered by
    /// this segment.
    pub fn read(&self, offset: u64) -> CoreResult<Record> {
        if !self.contains(offset) {
            return Err(CoreError::out_of_range(offset));
        }

        let relative = u32::try_from(offset - self.base_offset)
            .map_err(|_| CoreError::out_of_range(offset))?;

        let (_, position) = self.index.read(IndexEntry::At(relative))?;
        let payload = self.store.read(position)?;

        Record::decode(&payload)
    }

    /// Returns true if the store or index reached its limit.
    #[must_use]
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// Returns true if `offset` lies in `[base_offset, next_offset)`.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// Returns the first offset covered by this segment.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the offset the next append will be assigned.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Returns true if no record has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    /// Returns the logical store size in bytes.
    #[must_use]
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// Returns the logical index size in bytes.
    #[must_use]
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    /// Returns a shared handle to the store, for raw sequential reads.
    pub(crate) fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Pushes buffered store bytes and the index mapping to the file system.
    pub fn flush(&self) -> CoreResult<()> {
        self.store.flush()?;
        self.index.flush()?;
        Ok(())
    }

    /// Closes the index, which truncates it to its logical size, then the
    /// store.
    pub fn close(self) -> CoreResult<()> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Closes the segment and deletes both of its files.
    pub fn remove(self) -> CoreResult<()> {
        let index_path = self.index.path().to_path_buf();
        let store_path = self.store.path().to_path_buf();

        self.close()?;
        fs::remove_file(index_path)?;
        fs::remove_file(store_path)?;
        Ok(())
    }

    fn maxed_error(&self) -> CoreError {
        CoreError::SegmentMaxed {
            base_offset: self.base_offset,
            next_offset: self.next_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seglog_storage::ENTRY_WIDTH;
    use tempfile::tempdir;

    fn config(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 16,
        }
    }

    #[test]
    fn segment_append_until_index_maxed() {
        let dir = tempdir().unwrap();
        let value = b"hello world".to_vec();

        let mut segment = Segment::open(dir.path(), 16, config(1024, ENTRY_WIDTH * 3)).unwrap();
        assert_eq!(segment.base_offset(), 16);
        assert_eq!(segment.next_offset(), 16);
        assert!(!segment.is_maxed());

        for i in 0..3u64 {
            let offset = segment.append(Record::new(value.clone())).unwrap();
            assert_eq!(offset, 16 + i);

            let record = segment.read(offset).unwrap();
            assert_eq!(record.offset, offset);
            assert_eq!(record.value, value);
        }

        // maxed index
        assert!(segment.is_maxed());
        let result = segment.append(Record::new(value.clone()));
        assert!(matches!(
            result,
            Err(CoreError::SegmentMaxed {
                base_offset: 16,
                next_offset: 19
            })
        ));
        segment.close().unwrap();

        // maxed store
        let segment = Segment::open(dir.path(), 16, config(value.len() as u64 * 3, 1024)).unwrap();
        assert!(segment.is_maxed());
        assert_eq!(segment.next_offset(), 19);

        segment.remove().unwrap();
        assert!(!store_path(dir.path(), 16).exists());
        assert!(!index_path(dir.path(), 16).exists());

        let segment = Segment::open(dir.path(), 16, config(value.len() as u64 * 3, 1024)).unwrap();
        assert!(!segment.is_maxed());
        assert!(segment.is_empty());
    }

    #[test]
    fn segment_reopen_continues_offsets() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 5, config(1024, 1024)).unwrap();
        segment.append(Record::new(b"a".to_vec())).unwrap();
        segment.append(Record::new(b"b".to_vec())).unwrap();
        segment.close().unwrap();

        let mut segment = Segment::open(dir.path(), 5, config(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 7);
        assert_eq!(segment.read(6).unwrap().value, b"b");
        assert_eq!(segment.append(Record::new(b"c".to_vec())).unwrap(), 7);
    }

    #[test]
    fn segment_overwrites_caller_offset() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();

        let record = Record {
            offset: 999,
            value: b"v".to_vec(),
        };
        assert_eq!(segment.append(record).unwrap(), 0);
        assert_eq!(segment.read(0).unwrap().offset, 0);
    }

    #[test]
    fn segment_read_outside_range() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 10, config(1024, 1024)).unwrap();
        segment.append(Record::new(b"x".to_vec())).unwrap();

        assert!(matches!(
            segment.read(9),
            Err(CoreError::OffsetOutOfRange { offset: 9 })
        ));
        assert!(matches!(
            segment.read(11),
            Err(CoreError::OffsetOutOfRange { offset: 11 })
        ));
    }

    #[test]
    fn segment_maxed_by_store_bytes() {
        let dir = tempdir().unwrap();
        // one record is 8 (length) + 8 (offset) + 4 (value) = 20 bytes
        let mut segment = Segment::open(dir.path(), 0, config(40, 1024)).unwrap();

        segment.append(Record::new(b"abcd".to_vec())).unwrap();
        assert!(!segment.is_maxed());
        assert_eq!(segment.store_size(), 20);

        segment.append(Record::new(b"abcd".to_vec())).unwrap();
        assert!(segment.is_maxed());
        assert_eq!(segment.index_size(), ENTRY_WIDTH * 2);
    }

    #[test]
    fn segment_recovers_after_unclean_shutdown() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        for value in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
            segment.append(Record::new(value)).unwrap();
        }
        segment.flush().unwrap();
        std::mem::forget(segment);

        let segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 3);
        assert_eq!(segment.read(2).unwrap().value, b"three");
    }

    #[test]
    fn segment_drops_torn_final_record() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        segment.append(Record::new(b"whole".to_vec())).unwrap();
        segment.append(Record::new(b"torn record".to_vec())).unwrap();
        segment.close().unwrap();

        // cut the second frame short
        let path = store_path(dir.path(), 0);
        let len = fs::metadata(&path).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 4)
            .unwrap();

        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 1);
        assert_eq!(segment.store_size(), 8 + 8 + 5);
        assert_eq!(segment.read(0).unwrap().value, b"whole");

        assert_eq!(segment.append(Record::new(b"again".to_vec())).unwrap(), 1);
        assert_eq!(segment.read(1).unwrap().value, b"again");
    }

    #[test]
    fn segment_refuses_store_without_index() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        segment.append(Record::new(b"kept".to_vec())).unwrap();
        let store_size = segment.store_size();
        segment.close().unwrap();
        fs::remove_file(index_path(dir.path(), 0)).unwrap();

        let result = Segment::open(dir.path(), 0, config(1024, 1024));
        assert!(matches!(result, Err(CoreError::SegmentCorruption { .. })));
        assert_eq!(
            fs::metadata(store_path(dir.path(), 0)).unwrap().len(),
            store_size
        );
    }

    #[test]
    fn segment_stops_at_last_offset() {
        let dir = tempdir().unwrap();
        let base = u64::MAX - 1;
        let mut segment = Segment::open(dir.path(), base, config(1024, 1024)).unwrap();

        assert_eq!(segment.append(Record::new(b"last".to_vec())).unwrap(), base);
        assert_eq!(segment.next_offset(), u64::MAX);

        let result = segment.append(Record::new(b"overflow".to_vec()));
        assert!(matches!(
            result,
            Err(CoreError::OffsetOverflow { offset: u64::MAX })
        ));
        assert_eq!(segment.next_offset(), u64::MAX);
        assert_eq!(segment.read(base).unwrap().value, b"last");
        segment.close().unwrap();

        let segment = Segment::open(dir.path(), base, config(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), u64::MAX);
    }

    #[test]
    fn segment_discards_unindexed_store_bytes() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        segment.append(Record::new(b"indexed".to_vec())).unwrap();
        let indexed_size = segment.store_size();
        segment.close().unwrap();

        // a payload that reached the store but never the index
        let store = Store::open(&store_path(dir.path(), 0)).unwrap();
        store.append(&Record::new(b"orphan".to_vec()).encode()).unwrap();
        store.close().unwrap();

        let segment = Segment::open(dir.path(), 0, config(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 1);
        assert_eq!(segment.store_size(), indexed_size);
        assert_eq!(
            fs::metadata(store_path(dir.path(), 0)).unwrap().len(),
            indexed_size
        );
    }
}
