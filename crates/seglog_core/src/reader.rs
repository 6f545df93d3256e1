//! Sequential reader over the raw bytes of every segment store.

use seglog_storage::{StorageError, Store};
use std::io::{self, Read};
use std::sync::Arc;

/// Streams the raw store bytes of every segment, in segment order.
///
/// The bytes are the framed store contents (`| length (8) | record |`
/// repeated), not decoded records; the stream is meant for copying a whole
/// log, e.g. as a snapshot.
///
/// The reader holds shared handles to the stores it was created with. Bytes
/// appended to those stores after creation are included; segments created
/// afterwards are not. Reading from a store whose segment has since been
/// closed or removed fails.
#[derive(Debug)]
pub struct FullReader {
    stores: Vec<Arc<Store>>,
    current: usize,
    position: u64,
}

impl FullReader {
    pub(crate) fn new(stores: Vec<Arc<Store>>) -> Self {
        Self {
            stores,
            current: 0,
            position: 0,
        }
    }
}

impl Read for FullReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while let Some(store) = self.stores.get(self.current) {
            let n = store.read_at(buf, self.position).map_err(into_io_error)?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }

            self.current += 1;
            self.position = 0;
        }

        Ok(0)
    }
}

fn into_io_error(err: StorageError) -> io::Error {
    match err {
        StorageError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}
