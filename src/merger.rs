//! Bounded k-way merger.

use std::collections::VecDeque;
use std::error::Error;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::chunk::{write_chunk, ChunkReader};
use crate::error::MapReduceError;
use crate::ordering::SortKey;
use crate::queue::OrderedQueue;
use crate::reduce::GroupReducer;
use crate::temp::TempResource;

/// K-way merger implementation.
/// Merges multiple sorted inputs into a single sorted output holding at most one record per input in memory.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of records,
/// *n* is the number of chunks (inputs).
pub struct KWayMerger<K, V, E, C> {
    queue: OrderedQueue<K, (V, usize)>,
    chunks: Vec<C>,
    initiated: bool,

    error_type: PhantomData<fn() -> E>,
}

impl<K, V, E, C> KWayMerger<K, V, E, C>
where
    K: SortKey,
    E: Error,
    C: Iterator<Item = Result<(K, V), MapReduceError<E>>>,
{
    /// Creates an instance of a k-way merger using chunks as inputs.
    /// Chunk records should be sorted in ascending order otherwise the result is undefined.
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoIterator<IntoIter = C, Item = C::Item>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let queue = OrderedQueue::with_capacity(chunks.len());

        return KWayMerger {
            queue,
            chunks,
            initiated: false,
            error_type: PhantomData,
        };
    }

    fn push_next(&mut self, idx: usize) -> Result<(), MapReduceError<E>> {
        if let Some(record) = self.chunks[idx].next() {
            let (key, value) = record?;
            self.queue.push((value, idx), key)?;
        }

        return Ok(());
    }
}

impl<K, V, E, C> Iterator for KWayMerger<K, V, E, C>
where
    K: SortKey,
    E: Error,
    C: Iterator<Item = Result<(K, V), MapReduceError<E>>>,
{
    type Item = Result<(K, V), MapReduceError<E>>;

    /// Returns the next record from the inputs in ascending key order.
    fn next(&mut self) -> Option<Self::Item> {
        // a single chunk is already sorted
        if self.chunks.len() == 1 {
            return self.chunks[0].next();
        }

        if !self.initiated {
            self.initiated = true;
            for idx in 0..self.chunks.len() {
                if let Err(err) = self.push_next(idx) {
                    return Some(Err(err));
                }
            }
        }

        let (key, (value, idx)) = match self.queue.pop_entry() {
            Ok(entry) => entry?,
            Err(err) => return Some(Err(err.into())),
        };

        if let Err(err) = self.push_next(idx) {
            return Some(Err(err));
        }

        return Some(Ok((key, value)));
    }
}

/// Merge source.
pub enum ChunkSource {
    /// Chunk owned by the caller. The merger only reads it.
    Borrowed(PathBuf),
    /// Chunk handed over to the merger. It is deleted once the merge no longer needs it.
    Owned(TempResource),
}

impl ChunkSource {
    pub fn path(&self) -> &Path {
        match self {
            ChunkSource::Borrowed(path) => path,
            ChunkSource::Owned(resource) => resource.path(),
        }
    }
}

type ChunkMerger<K, V, E> = KWayMerger<K, V, E, ChunkReader<(K, V), MapReduceError<E>>>;

/// Merged and reduced record stream returned by [`Merger::merge`].
/// Owned sources and intermediate chunks are removed when the stream is dropped, whether or not it was consumed.
pub struct Merged<K, V, E, R> {
    // declared first so the readers are closed before the sources are removed
    records: GroupReducer<ChunkMerger<K, V, E>, K, V, E, R>,
    sources: Vec<ChunkSource>,
}

impl<K, V, E, R> Iterator for Merged<K, V, E, R>
where
    K: SortKey + DeserializeOwned,
    V: DeserializeOwned,
    E: Error,
    R: Fn(&K, &V, &V) -> Option<Result<V, E>>,
{
    type Item = Result<(K, V), MapReduceError<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

/// Merges sorted chunk files keeping at most `file_limit` of them open at a time.
///
/// When there are more chunks than the limit, groups of `file_limit` chunks are merged into intermediate chunks
/// until the remaining chunks fit into a single pass. Every pass applies the group reduction, so intermediate chunks
/// are already reduced.
pub struct Merger {
    file_limit: usize,
    tmp_dir: PathBuf,
    rw_buf_size: Option<usize>,
}

impl Merger {
    /// Creates a merger storing intermediate chunks in `tmp_dir`.
    /// Fails if `file_limit` is less than 2.
    pub fn new<E: Error>(file_limit: usize, tmp_dir: &Path) -> Result<Self, MapReduceError<E>> {
        if file_limit < 2 {
            return Err(MapReduceError::InvalidFileLimit(file_limit));
        }

        return Ok(Merger {
            file_limit,
            tmp_dir: tmp_dir.to_path_buf(),
            rw_buf_size: None,
        });
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: Option<usize>) -> Self {
        self.rw_buf_size = buf_size;
        return self;
    }

    pub fn file_limit(&self) -> usize {
        self.file_limit
    }

    /// Merges the sources into a single sorted stream, folding adjacent records with equal keys using `reduce`.
    pub fn merge<K, V, E, R, I>(&self, sources: I, reduce: R) -> Result<Merged<K, V, E, R>, MapReduceError<E>>
    where
        K: SortKey + Serialize + DeserializeOwned,
        V: Serialize + DeserializeOwned,
        E: Error,
        R: Fn(&K, &V, &V) -> Option<Result<V, E>>,
        I: IntoIterator<Item = ChunkSource>,
    {
        let mut sources = VecDeque::from_iter(sources);
        let mut pass = 0;

        while sources.len() > self.file_limit {
            pass += 1;
            let group = Vec::from_iter(sources.drain(..self.file_limit));
            let intermediate = TempResource::new_in(&self.tmp_dir).map_err(MapReduceError::TempDir)?;

            log::debug!(
                "merging {} chunks into intermediate chunk (pass: {}, remaining: {})",
                group.len(),
                pass,
                sources.len()
            );

            let records = GroupReducer::new(self.open::<K, V, E>(&group)?, &reduce);
            write_chunk(intermediate.path(), records, self.rw_buf_size)?;

            drop(group);
            sources.push_back(ChunkSource::Owned(intermediate));
        }

        let sources = Vec::from(sources);
        log::debug!("merging {} chunks", sources.len());

        return Ok(Merged {
            records: GroupReducer::new(self.open(&sources)?, reduce),
            sources,
        });
    }

    fn open<K, V, E>(&self, sources: &[ChunkSource]) -> Result<ChunkMerger<K, V, E>, MapReduceError<E>>
    where
        K: SortKey + DeserializeOwned,
        V: DeserializeOwned,
        E: Error,
    {
        let mut readers = Vec::with_capacity(sources.len());
        for source in sources {
            readers.push(ChunkReader::open(source.path(), self.rw_buf_size)?);
        }

        return Ok(KWayMerger::new(readers));
    }
}
