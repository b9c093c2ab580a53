//! Reduce phase.

use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log;

use crate::error::MapReduceError;
use crate::job::Job;
use crate::mapper::init_tmp_directory;
use crate::merger::{ChunkSource, Merger};
use crate::temp::TempResource;

type ReduceError<J> = MapReduceError<<J as Job>::Error>;

/// Reducer builder. Provides methods for [`Reducer`] initialization.
pub struct ReducerBuilder<J: Job> {
    /// Map-reduce job.
    job: J,
    /// Directory to be used to store chunks.
    tmp_dir: Option<Box<Path>>,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl<J: Job> ReducerBuilder<J> {
    /// Creates an instance of a builder with default parameters.
    pub fn new(job: J) -> Self {
        ReducerBuilder {
            job,
            tmp_dir: None,
            rw_buf_size: None,
        }
    }

    /// Builds a [`Reducer`] instance using provided configuration.
    pub fn build(self) -> Result<Reducer<J>, ReduceError<J>> {
        Reducer::new(self.job, self.tmp_dir.as_deref(), self.rw_buf_size)
    }

    /// Sets directory to be used to store chunks.
    pub fn with_tmp_dir(mut self, path: &Path) -> ReducerBuilder<J> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ReducerBuilder<J> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

/// Reducer.
///
/// Collects sorted chunk files, usually the partition files produced by [`crate::Mapper::shuffle`],
/// and merges them into a single sorted stream reducing records with equal keys.
pub struct Reducer<J: Job> {
    job: J,
    tmp_dir: tempfile::TempDir,
    rw_buf_size: Option<usize>,
    chunks: Mutex<Vec<TempResource>>,
}

impl<J: Job> Reducer<J> {
    /// Creates a new reducer instance.
    ///
    /// # Arguments
    /// * `job` - Map-reduce job
    /// * `tmp_path` - Directory to be used to store chunks. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `rw_buf_size` - Chunks file read/write buffer size.
    pub fn new(job: J, tmp_path: Option<&Path>, rw_buf_size: Option<usize>) -> Result<Self, ReduceError<J>> {
        return Ok(Reducer {
            job,
            rw_buf_size,
            tmp_dir: init_tmp_directory::<J::Error>(tmp_path)?,
            chunks: Mutex::new(Vec::new()),
        });
    }

    /// Registers a new empty chunk and returns its path.
    /// The caller fills the file with records sorted by key before reducing. Safe to call concurrently.
    pub fn add_chunk(&self) -> Result<PathBuf, ReduceError<J>> {
        let chunk = TempResource::new_in(self.tmp_dir.path()).map_err(MapReduceError::TempDir)?;
        let path = chunk.path().to_path_buf();

        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        chunks.push(chunk);
        log::debug!("chunk {} added (total: {})", path.display(), chunks.len());

        return Ok(path);
    }

    /// Number of registered chunks.
    pub fn chunks_count(&self) -> usize {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Merges the registered chunks into a sorted stream of reduced records.
    ///
    /// The reducer hands all its chunks over to the returned stream, which removes them once dropped.
    /// Chunks whose files no longer exist are skipped. On an invalid `file_limit` nothing is consumed.
    pub fn reduced(
        &mut self,
        file_limit: usize,
    ) -> Result<impl Iterator<Item = Result<(J::Key, J::Value), ReduceError<J>>> + '_, ReduceError<J>> {
        let merger = Merger::new::<J::Error>(file_limit, self.tmp_dir.path())?.with_rw_buf_size(self.rw_buf_size);

        let chunks = mem::take(self.chunks.get_mut().unwrap_or_else(PoisonError::into_inner));
        log::info!("reducing {} chunks (file limit: {})", chunks.len(), file_limit);

        let sources = chunks
            .into_iter()
            .filter(|chunk| chunk.path().exists())
            .map(ChunkSource::Owned);

        let job = &self.job;
        let records = merger.merge(sources, move |key: &J::Key, first: &J::Value, second: &J::Value| {
            job.reduce(key, first, second)
        })?;

        return Ok(records);
    }

    /// Merges the registered chunks passing every reduced record to `callback` in ascending key order.
    /// All chunks are removed when the call returns, whether it succeeds or not.
    pub fn reduce<F>(&mut self, file_limit: usize, mut callback: F) -> Result<(), ReduceError<J>>
    where
        F: FnMut(J::Key, J::Value) -> Result<(), J::Error>,
    {
        for record in self.reduced(file_limit)? {
            let (key, value) = record?;
            callback(key, value).map_err(MapReduceError::Job)?;
        }

        return Ok(());
    }
}

impl<J: Job> fmt::Debug for Reducer<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer")
            .field("tmp_dir", &self.tmp_dir.path())
            .field("chunks", &self.chunks_count())
            .finish()
    }
}
