//! Length-prefixed payload store.

use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Width of the big-endian length prefix written in front of every payload.
pub const LEN_WIDTH: u64 = 8;

/// A file-backed, append-only store of variable-length payloads.
///
/// Every payload is framed on disk as:
///
/// ```text
/// | length (8, big-endian) | payload (length) |
/// ```
///
/// The *position* of a payload is the byte offset of its length prefix.
///
/// # Thread Safety
///
/// Appends and reads serialize on one internal mutex. Appends go through a
/// buffered writer; every read flushes that buffer first so that payloads
/// appended but not yet flushed are visible.
///
/// # Example
///
/// ```no_run
/// use seglog_storage::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new("0.store")).unwrap();
/// let (_, pos) = store.append(b"hello world").unwrap();
/// assert_eq!(store.read(pos).unwrap(), b"hello world");
/// ```
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    /// `None` once the store is closed.
    writer: Option<BufWriter<File>>,
    /// Logical size, including bytes still sitting in the write buffer.
    size: u64,
}

impl StoreInner {
    /// Flushes pending appends and returns the file for positioned reads.
    fn flushed_file(&mut self) -> StorageResult<&mut File> {
        let writer = self.writer.as_mut().ok_or(StorageError::Closed)?;
        writer.flush()?;
        Ok(writer.get_mut())
    }

    /// Drops everything past `position` after a failed append.
    ///
    /// Earlier appends still sitting in the write buffer are written out
    /// through a fresh handle, and any part of the failed frame that reached
    /// the file is cut off. On error the store is left closed.
    fn rewind(&mut self, path: &Path, position: u64) -> StorageResult<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let (_, buffered) = writer.into_parts();
        let buffered = buffered.unwrap_or_default();

        let mut file = OpenOptions::new().read(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();

        if on_disk > position {
            file.set_len(position)?;
        } else {
            let pending = usize::try_from(position - on_disk)
                .ok()
                .and_then(|missing| buffered.get(..missing))
                .ok_or_else(|| {
                    StorageError::Corrupted(format!(
                        "{} buffered bytes cannot fill the store from {on_disk} to {position}",
                        buffered.len()
                    ))
                })?;
            file.write_all(pending)?;
        }

        self.writer = Some(BufWriter::new(file));
        self.size = position;
        Ok(())
    }
}

fn write_frame(writer: &mut BufWriter<File>, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(payload.len() as u64).to_be_bytes())?;
    writer.write_all(payload)
}

impl Store {
    /// Opens or creates the store file at `path` in append mode.
    ///
    /// The logical size starts at the current file length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner {
                writer: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    /// Appends one framed payload.
    ///
    /// Returns `(bytes_written, position)`, where `position` is the store size
    /// before this write and `bytes_written` includes the length prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the write fails. A failed
    /// write leaves no partial frame behind: the store is rewound to
    /// `position`, or closed if even that fails.
    pub fn append(&self, payload: &[u8]) -> StorageResult<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;

        let writer = inner.writer.as_mut().ok_or(StorageError::Closed)?;
        if let Err(err) = write_frame(writer, payload) {
            if let Err(rewind_err) = inner.rewind(&self.path, position) {
                warn!(
                    path = %self.path.display(),
                    position,
                    error = %rewind_err,
                    "failed to discard partial append; store closed"
                );
            }
            return Err(err.into());
        }

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;

        Ok((written, position))
    }

    /// Reads the payload whose length prefix starts at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if the frame extends beyond the
    /// logical size, or an I/O error if the read fails.
    pub fn read(&self, position: u64) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let size = inner.size;

        if position.saturating_add(LEN_WIDTH) > size {
            return Err(StorageError::ReadPastEnd {
                offset: position,
                len: LEN_WIDTH,
                size,
            });
        }

        let file = inner.flushed_file()?;

        let mut len_bytes = [0u8; LEN_WIDTH as usize];
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_be_bytes(len_bytes);

        let start = position + LEN_WIDTH;
        if start.saturating_add(len) > size {
            return Err(StorageError::ReadPastEnd {
                offset: start,
                len,
                size,
            });
        }

        let len = usize::try_from(len).map_err(|_| {
            StorageError::Corrupted(format!("payload length {len} at {position} too large"))
        })?;

        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload)?;

        Ok(payload)
    }

    /// Reads raw store bytes starting at `offset` into `buf`.
    ///
    /// Flushes the write buffer first. Returns the number of bytes read, which
    /// is `0` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the read fails.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        let mut inner = self.inner.lock();
        let file = inner.flushed_file()?;

        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }

    /// Pushes buffered appends to the operating system.
    pub fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.flushed_file()?;
        Ok(())
    }

    /// Flushes buffered appends and syncs the file to disk.
    pub fn sync(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.flushed_file()?.sync_all()?;
        Ok(())
    }

    /// Cuts the store back to `size` bytes, discarding everything after.
    ///
    /// Used to drop a torn or unindexed tail; a `size` beyond the current
    /// size is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the file cannot be resized.
    pub fn truncate(&self, size: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if size >= inner.size {
            return Ok(());
        }

        inner.flushed_file()?.set_len(size)?;
        inner.size = size;
        Ok(())
    }

    /// Flushes the write buffer and releases the file handle.
    ///
    /// Closing an already closed store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();

        let Some(mut writer) = inner.writer.take() else {
            return Ok(());
        };
        writer.flush()?;

        Ok(())
    }

    /// Returns the logical size of the store in bytes.
    ///
    /// This is the position the next append will write at.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns true once [`Store::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().writer.is_none()
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
