//! Map-reduce errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

use crate::chunk::ChunkError;

/// Two keys could not be ordered relative to each other.
/// Usually means that the job emits keys of inconsistent shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingError {
    message: String,
}

impl OrderingError {
    /// Creates an ordering error describing the incomparable pair.
    pub fn new(left: impl Display, right: impl Display) -> Self {
        OrderingError {
            message: format!("unable to compare {} with {}", left, right),
        }
    }
}

impl Error for OrderingError {}

impl Display for OrderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Map-reduce error. `E` is the error type of the job (see [`crate::Job`]).
#[derive(Debug)]
pub enum MapReduceError<E> {
    /// File limit below 2 passed to a merge, shuffle or reduce.
    InvalidFileLimit(usize),
    /// Keys are not mutually comparable.
    Ordering(OrderingError),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Record serialization error.
    SerializationError(serde_json::Error),
    /// Record deserialization error.
    DeserializationError(serde_json::Error),
    /// Error raised by the job implementation or by a caller supplied callback.
    Job(E),
}

impl<E> Error for MapReduceError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            MapReduceError::InvalidFileLimit(_) => return None,
            MapReduceError::Ordering(err) => err,
            MapReduceError::TempDir(err) => err,
            MapReduceError::ThreadPoolBuildError(err) => err,
            MapReduceError::IO(err) => err,
            MapReduceError::SerializationError(err) => err,
            MapReduceError::DeserializationError(err) => err,
            MapReduceError::Job(err) => err,
        })
    }
}

impl<E: Error> Display for MapReduceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            MapReduceError::InvalidFileLimit(limit) => write!(f, "file limit must be >= 2, got {}", limit),
            MapReduceError::Ordering(err) => write!(f, "key ordering error: {}", err),
            MapReduceError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            MapReduceError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            MapReduceError::IO(err) => write!(f, "I/O operation failed: {}", err),
            MapReduceError::SerializationError(err) => write!(f, "record serialization error: {}", err),
            MapReduceError::DeserializationError(err) => write!(f, "record deserialization error: {}", err),
            MapReduceError::Job(err) => write!(f, "job error: {}", err),
        }
    }
}

impl<E: Error> From<ChunkError> for MapReduceError<E> {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::IO(err) => MapReduceError::IO(err),
            ChunkError::SerializationError(err) => MapReduceError::SerializationError(err),
            ChunkError::DeserializationError(err) => MapReduceError::DeserializationError(err),
        }
    }
}

impl<E: Error> From<OrderingError> for MapReduceError<E> {
    fn from(err: OrderingError) -> Self {
        MapReduceError::Ordering(err)
    }
}
