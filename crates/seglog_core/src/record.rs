//! Log record type and its store encoding.

use crate::error::{CoreError, CoreResult};

/// A record in the log.
///
/// The offset is assigned by the log when the record is appended; whatever
/// the caller put there is overwritten.
///
/// ## Encoding
///
/// ```text
/// | offset (8, big-endian) | value (N) |
/// ```
///
/// The store adds its own length prefix around the encoded record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    /// Offset assigned at append time.
    pub offset: u64,
    /// Opaque payload.
    pub value: Vec<u8>,
}

impl Record {
    /// Size of the encoded offset field.
    const OFFSET_SIZE: usize = 8;

    /// Creates a record with the given value and no assigned offset.
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            offset: 0,
            value: value.into(),
        }
    }

    /// Encodes the record to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    /// Decodes a record from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedRecord`] if `data` is shorter than the
    /// offset field.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::OFFSET_SIZE {
            return Err(CoreError::malformed_record(format!(
                "record too short: {} bytes",
                data.len()
            )));
        }

        let (offset, value) = data.split_at(Self::OFFSET_SIZE);
        let mut offset_bytes = [0u8; Self::OFFSET_SIZE];
        offset_bytes.copy_from_slice(offset);

        Ok(Self {
            offset: u64::from_be_bytes(offset_bytes),
            value: value.to_vec(),
        })
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::OFFSET_SIZE + self.value.len()
    }
}

impl From<Vec<u8>> for Record {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for Record {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}
