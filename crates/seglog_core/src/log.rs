//! The segmented commit log.

use crate::config::Config;
use crate::dir::scan_base_offsets;
use crate::error::{CoreError, CoreResult};
use crate::reader::FullReader;
use crate::record::Record;
use crate::segment::Segment;
use crate::CommitLog;
use parking_lot::RwLock;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An ordered, gapless, offset-addressed sequence of records split across
/// segments in one directory.
///
/// The last segment is the *active* one; it takes every append. When it is
/// maxed the log rotates: a new segment starting at the next offset becomes
/// active and the old one is only read from.
///
/// # Thread Safety
///
/// One readers-writer lock guards the segment list for the full duration of
/// every operation. Appends, truncation, reset and close are exclusive; reads
/// and offset queries are shared. Appends are totally ordered and a read that
/// starts after an append returns sees it.
///
/// # Example
///
/// ```no_run
/// use seglog_core::{CommitLog, Config, Log, Record};
///
/// let log = Log::open("data/log", Config::default())?;
/// let offset = log.append(Record::new(b"hello".to_vec()))?;
/// assert_eq!(log.read(offset)?.value, b"hello");
/// log.close()?;
/// # Ok::<(), seglog_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    /// Ordered by base offset; empty once the log is closed.
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Opens the log in `dir`, creating the directory if needed.
    ///
    /// Every segment found on disk is reopened in offset order. An empty
    /// directory gets one segment at the configured initial offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory cannot
    /// be listed, or a segment fails to open.
    pub fn open(dir: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let config = config.validated()?;
        let dir = dir.as_ref().to_path_buf();

        let segments = setup(&dir, &config)?;

        Ok(Self {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Returns the lowest offset still held by the log.
    pub fn lowest_offset(&self) -> CoreResult<u64> {
        let segments = self.segments.read();
        let first = segments.first().ok_or(CoreError::Closed)?;
        Ok(first.base_offset())
    }

    /// Returns the highest offset assigned so far.
    ///
    /// For a log without records this is one below the initial offset (or 0).
    pub fn highest_offset(&self) -> CoreResult<u64> {
        let segments = self.segments.read();
        let last = segments.last().ok_or(CoreError::Closed)?;
        Ok(last.next_offset().saturating_sub(1))
    }

    /// Removes every segment whose records all lie at or below `lowest`.
    ///
    /// If that includes the active segment, a fresh empty segment starting at
    /// its next offset takes its place, so offsets keep increasing.
    pub fn truncate(&self, lowest: u64) -> CoreResult<()> {
        let mut segments = self.segments.write();
        if segments.is_empty() {
            return Err(CoreError::Closed);
        }

        let threshold = lowest.saturating_add(1);
        let mut removed = 0;

        while let Some(first) = segments.first() {
            if first.next_offset() > threshold {
                break;
            }

            if segments.len() == 1 {
                if first.is_empty() {
                    break;
                }
                let fresh = Segment::open(&self.dir, first.next_offset(), self.config.segment)?;
                let active = std::mem::replace(&mut segments[0], fresh);
                active.remove()?;
                removed += 1;
                break;
            }

            segments.remove(0).remove()?;
            removed += 1;
        }

        info!(lowest, removed, remaining = segments.len(), "truncated log");
        Ok(())
    }

    /// Deletes all on-disk state and starts over with a single segment at
    /// the initial offset.
    pub fn reset(&self) -> CoreResult<()> {
        let mut segments = self.segments.write();

        for segment in segments.drain(..) {
            segment.close()?;
        }
        fs::remove_dir_all(&self.dir)?;

        *segments = setup(&self.dir, &self.config)?;
        info!(dir = %self.dir.display(), "reset log");
        Ok(())
    }

    /// Closes every segment in order.
    ///
    /// Each index is committed and truncated to its logical size. Further
    /// operations fail with [`CoreError::Closed`]; closing again is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        let mut segments = self.segments.write();

        for segment in segments.drain(..) {
            segment.close()?;
        }

        debug!(dir = %self.dir.display(), "closed log");
        Ok(())
    }

    /// Closes the log and deletes its directory.
    pub fn remove(&self) -> CoreResult<()> {
        self.close()?;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Pushes the active segment's buffered bytes and index mapping to the
    /// file system. Rotated segments are flushed when they are retired.
    pub fn flush(&self) -> CoreResult<()> {
        let segments = self.segments.write();
        let active = segments.last().ok_or(CoreError::Closed)?;
        active.flush()
    }

    /// Returns a reader over the raw store bytes of every current segment.
    pub fn full_reader(&self) -> CoreResult<FullReader> {
        let segments = self.segments.read();
        if segments.is_empty() {
            return Err(CoreError::Closed);
        }

        Ok(FullReader::new(
            segments.iter().map(Segment::store).collect(),
        ))
    }

    /// Returns the number of open segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Returns the offset range `[base, next)` of every segment, in order.
    #[must_use]
    pub fn segment_ranges(&self) -> Vec<Range<u64>> {
        self.segments
            .read()
            .iter()
            .map(|segment| segment.base_offset()..segment.next_offset())
            .collect()
    }

    /// Returns the log directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the configuration in effect, with defaults applied.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Retires the active segment and starts a new one at `base_offset`.
    fn rotate(&self, segments: &mut Vec<Segment>, base_offset: u64) -> CoreResult<()> {
        if let Some(retired) = segments.last() {
            retired.flush()?;
        }

        let segment = Segment::open(&self.dir, base_offset, self.config.segment)?;
        segments.push(segment);

        debug!(base_offset, segments = segments.len(), "rotated to new segment");
        Ok(())
    }
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> CoreResult<u64> {
        let mut segments = self.segments.write();

        let active = segments.last().ok_or(CoreError::Closed)?;
        if active.is_maxed() {
            let next = active.next_offset();
            self.rotate(&mut segments, next)?;
        }

        let active = segments.last_mut().ok_or(CoreError::Closed)?;
        let offset = active.append(record)?;

        if active.is_maxed() {
            let next = active.next_offset();
            if let Err(err) = self.rotate(&mut segments, next) {
                warn!(offset, error = %err, "rotation failed; retrying on next append");
            }
        }

        Ok(offset)
    }

    fn read(&self, offset: u64) -> CoreResult<Record> {
        let segments = self.segments.read();
        if segments.is_empty() {
            return Err(CoreError::Closed);
        }

        let candidates = segments.partition_point(|segment| segment.base_offset() <= offset);
        let segment = candidates
            .checked_sub(1)
            .map(|i| &segments[i])
            .filter(|segment| segment.contains(offset))
            .ok_or_else(|| CoreError::out_of_range(offset))?;

        segment.read(offset)
    }
}

/// Opens every segment in `dir`, or a first one at the initial offset.
fn setup(dir: &Path, config: &Config) -> CoreResult<Vec<Segment>> {
    fs::create_dir_all(dir)?;

    let mut segments: Vec<Segment> = Vec::new();
    for base_offset in scan_base_offsets(dir)? {
        let segment = Segment::open(dir, base_offset, config.segment)?;

        if let Some(previous) = segments.last() {
            if previous.next_offset() > segment.base_offset() {
                return Err(CoreError::segment_corruption(format!(
                    "segment {} ends at {} past the start of segment {}",
                    previous.base_offset(),
                    previous.next_offset(),
                    segment.base_offset()
                )));
            }
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        let initial = config.segment.initial_offset;
        segments.push(Segment::open(dir, initial, config.segment)?);
    }

    info!(
        dir = %dir.display(),
        segments = segments.len(),
        "opened log"
    );
    Ok(segments)
}
