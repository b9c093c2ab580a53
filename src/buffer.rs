//! Memory limited record buffer.

use std::io;

use rayon;
use serde::Serialize;

/// Default buffer memory limit: 100 MiB.
pub const DEFAULT_MEMORY_LIMIT: u64 = 100 * 1024 * 1024;

/// Buffer limited by the estimated size of the records it holds.
/// A record is estimated by the length of its JSON representation.
pub struct RecordBuffer<T> {
    limit: u64,
    current_size: u64,
    inner: Vec<T>,
}

impl<T> RecordBuffer<T> {
    /// Creates an empty buffer that is full once `limit` bytes are accounted.
    pub fn new(limit: u64) -> Self {
        RecordBuffer {
            limit,
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new record accounting `size` bytes for it.
    pub fn push(&mut self, item: T, size: u64) {
        self.current_size += size;
        self.inner.push(item);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks if the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.limit
    }

    /// Accounted size of the buffered records in bytes.
    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Takes the buffered records out as a new buffer with the same limit, leaving this one empty.
    pub fn take(&mut self) -> Self {
        let limit = self.limit;
        std::mem::replace(self, RecordBuffer::new(limit))
    }
}

impl<T> IntoIterator for RecordBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<T: Send> rayon::slice::ParallelSliceMut<T> for RecordBuffer<T> {
    fn as_parallel_slice_mut(&mut self) -> &mut [T] {
        self.inner.as_mut_slice()
    }
}

struct ByteCounter(u64);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Returns the length of the record's JSON representation without materializing it.
pub fn serialized_size<T: Serialize + ?Sized>(record: &T) -> Result<u64, serde_json::Error> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, record)?;

    return Ok(counter.0);
}
