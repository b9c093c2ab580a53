//! Map phase.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log;
use rayon::slice::ParallelSliceMut;

use crate::buffer::{serialized_size, RecordBuffer, DEFAULT_MEMORY_LIMIT};
use crate::chunk::{write_chunk, ChunkWriter};
use crate::error::MapReduceError;
use crate::job::{Job, MapJob};
use crate::merger::{ChunkSource, Merger};
use crate::ordering::par_sort_records;
use crate::partitioner::{HashPartitioner, Partitioner};
use crate::reduce::GroupReducer;
use crate::temp::TempResource;

/// Record key tagged with its partition. Orders by partition first, then by key.
pub type PartitionedKey<K> = (u32, K);

type MapError<J> = MapReduceError<<J as Job>::Error>;

/// Partition files produced by [`Mapper::shuffle`].
/// Every file holds the sorted and reduced records of one partition in the chunk format.
#[derive(Debug, Default)]
pub struct PartitionMap {
    partitions: BTreeMap<u32, TempResource>,
}

impl PartitionMap {
    /// Returns the file of the partition, if the partition received any record.
    pub fn get(&self, partition: u32) -> Option<&Path> {
        self.partitions.get(&partition).map(TempResource::path)
    }

    /// Iterates over partitions and their files in ascending partition order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.partitions
            .iter()
            .map(|(partition, resource)| (*partition, resource.path()))
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    fn insert(&mut self, partition: u32, resource: TempResource) {
        self.partitions.insert(partition, resource);
    }

    fn release(self) {
        for resource in self.partitions.into_values() {
            resource.release();
        }
    }
}

/// Mapper builder. Provides methods for [`Mapper`] initialization.
pub struct MapperBuilder<J, P = HashPartitioner>
where
    J: MapJob,
    P: Partitioner<J::Key>,
{
    /// Map-reduce job.
    job: J,
    /// Key partitioner.
    partitioner: P,
    /// Buffer size in bytes that triggers a spill.
    memory_limit: u64,
    /// Number of threads to be used to sort spilled data in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl<J: MapJob> MapperBuilder<J> {
    /// Creates an instance of a builder with default parameters.
    pub fn new(job: J) -> Self {
        MapperBuilder {
            job,
            partitioner: HashPartitioner::default(),
            memory_limit: DEFAULT_MEMORY_LIMIT,
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
        }
    }
}

impl<J, P> MapperBuilder<J, P>
where
    J: MapJob,
    P: Partitioner<J::Key>,
{
    /// Builds a [`Mapper`] instance using provided configuration.
    pub fn build(self) -> Result<Mapper<J, P>, MapError<J>> {
        Mapper::new(
            self.job,
            self.partitioner,
            self.memory_limit,
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
        )
    }

    /// Sets key partitioner.
    pub fn with_partitioner<Q: Partitioner<J::Key>>(self, partitioner: Q) -> MapperBuilder<J, Q> {
        MapperBuilder {
            job: self.job,
            partitioner,
            memory_limit: self.memory_limit,
            threads_number: self.threads_number,
            tmp_dir: self.tmp_dir,
            rw_buf_size: self.rw_buf_size,
        }
    }

    /// Sets buffer size in bytes. The buffer is spilled to disk when the estimated size of buffered records
    /// reaches the limit.
    pub fn with_memory_limit(mut self, memory_limit: u64) -> MapperBuilder<J, P> {
        self.memory_limit = memory_limit;
        return self;
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> MapperBuilder<J, P> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> MapperBuilder<J, P> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> MapperBuilder<J, P> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

struct MapperState<K, V> {
    buffer: RecordBuffer<(PartitionedKey<K>, V)>,
    chunks: Vec<TempResource>,
}

/// Mapper.
///
/// Passes input items to the job, partitions and buffers the emitted records and spills them to sorted chunk files
/// whenever the buffer reaches the memory limit. [`Mapper::shuffle`] merges the chunks into one file per partition.
///
/// `map` may be called concurrently from multiple threads; `shuffle` takes exclusive access, so it can only run
/// once all producers are done.
pub struct Mapper<J, P = HashPartitioner>
where
    J: MapJob,
    P: Partitioner<J::Key>,
{
    /// Map-reduce job.
    job: J,
    /// Key partitioner.
    partitioner: P,
    /// Spill sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store chunks and partition files.
    tmp_dir: tempfile::TempDir,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,

    state: Mutex<MapperState<J::Key, J::Value>>,
}

impl<J, P> Mapper<J, P>
where
    J: MapJob,
    P: Partitioner<J::Key>,
{
    /// Creates a new mapper instance.
    ///
    /// # Arguments
    /// * `job` - Map-reduce job
    /// * `partitioner` - Key partitioner
    /// * `memory_limit` - Buffer size in bytes that triggers a spill
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `rw_buf_size` - Chunks file read/write buffer size.
    pub fn new(
        job: J,
        partitioner: P,
        memory_limit: u64,
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, MapError<J>> {
        return Ok(Mapper {
            job,
            partitioner,
            rw_buf_size,
            thread_pool: init_thread_pool::<J::Error>(threads_number)?,
            tmp_dir: init_tmp_directory::<J::Error>(tmp_path)?,
            state: Mutex::new(MapperState {
                buffer: RecordBuffer::new(memory_limit),
                chunks: Vec::new(),
            }),
        });
    }

    /// Passes the input to the job and buffers the emitted records.
    /// Errors raised by the job are returned as [`MapReduceError::Job`].
    pub fn map(&self, input: J::Input) -> Result<(), MapError<J>> {
        let mut failure = None;

        self.job
            .map(input, &mut |key, value| {
                if failure.is_none() {
                    if let Err(err) = self.push(key, value) {
                        failure = Some(err);
                    }
                }
            })
            .map_err(MapReduceError::Job)?;

        return match failure {
            Some(err) => Err(err),
            None => Ok(()),
        };
    }

    /// Merges the spilled chunks and splits the result into partition files, reducing records on the way.
    /// `callback` receives the partition files, which are removed once it returns. All chunks are removed as well,
    /// whether the shuffle succeeds or not.
    ///
    /// # Arguments
    /// * `file_limit` - Maximum number of chunk files open at the same time, at least 2
    /// * `callback` - Partition files consumer
    pub fn shuffle<F, R>(&mut self, file_limit: usize, callback: F) -> Result<R, MapError<J>>
    where
        F: FnOnce(&PartitionMap) -> Result<R, J::Error>,
    {
        let merger = Merger::new::<J::Error>(file_limit, self.tmp_dir.path())?.with_rw_buf_size(self.rw_buf_size);

        let mut state = self.lock_state();
        let records = state.buffer.take();
        let mut chunks = mem::take(&mut state.chunks);
        drop(state);

        let flushed = if records.is_empty() {
            Ok(())
        } else {
            self.spill(records).map(|chunk| chunks.push(chunk))
        };

        let mut partitions = PartitionMap::default();
        let result = flushed.and_then(|()| {
            let sources = chunks
                .iter()
                .map(|chunk| ChunkSource::Borrowed(chunk.path().to_path_buf()));
            let records = merger.merge(
                sources,
                |key: &PartitionedKey<J::Key>, first: &J::Value, second: &J::Value| {
                    self.job.reduce(&key.1, first, second)
                },
            )?;
            self.split_partitions(records, &mut partitions)?;

            callback(&partitions).map_err(MapReduceError::Job)
        });

        for chunk in chunks {
            chunk.release();
        }
        partitions.release();

        return result;
    }

    fn lock_state(&self) -> MutexGuard<'_, MapperState<J::Key, J::Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, key: J::Key, value: J::Value) -> Result<(), MapError<J>> {
        let partition = self
            .partitioner
            .partition(&key)
            .map_err(MapReduceError::SerializationError)?;
        let record = ((partition, key), value);
        let size = serialized_size(&record).map_err(MapReduceError::SerializationError)?;

        let records = {
            let mut state = self.lock_state();
            state.buffer.push(record, size);
            if !state.buffer.is_full() {
                return Ok(());
            }
            state.buffer.take()
        };

        // the lock is not held while sorting: a caller waiting on the pool may run another map on this thread
        let chunk = self.spill(records)?;
        self.lock_state().chunks.push(chunk);

        return Ok(());
    }

    /// Sorts, reduces and saves the records taken out of the buffer.
    /// The records are consumed even if the spill fails.
    fn spill(
        &self,
        mut records: RecordBuffer<(PartitionedKey<J::Key>, J::Value)>,
    ) -> Result<TempResource, MapError<J>> {
        log::debug!(
            "sorting chunk data ({} records, {} bytes) ...",
            records.len(),
            records.mem_size()
        );
        self.thread_pool
            .install(|| par_sort_records(records.as_parallel_slice_mut()))?;

        log::debug!("saving chunk data");
        let chunk = TempResource::new_in(self.tmp_dir.path()).map_err(MapReduceError::TempDir)?;
        let records = GroupReducer::new(
            records.into_iter().map(Ok),
            |key: &PartitionedKey<J::Key>, first: &J::Value, second: &J::Value| self.job.reduce(&key.1, first, second),
        );
        write_chunk(chunk.path(), records, self.rw_buf_size)?;

        return Ok(chunk);
    }

    fn split_partitions<I>(&self, records: I, partitions: &mut PartitionMap) -> Result<(), MapError<J>>
    where
        I: Iterator<Item = Result<(PartitionedKey<J::Key>, J::Value), MapError<J>>>,
    {
        let mut current: Option<(u32, ChunkWriter)> = None;
        let mut count: u64 = 0;

        // records are sorted by partition first, so each partition is a contiguous run
        for record in records {
            let ((partition, key), value) = record?;

            if current.as_ref().map(|(current_partition, _)| *current_partition) != Some(partition) {
                if let Some((_, writer)) = current.take() {
                    writer.finish()?;
                }
                let resource = TempResource::new_in(self.tmp_dir.path()).map_err(MapReduceError::TempDir)?;
                let writer = ChunkWriter::create(resource.path(), self.rw_buf_size)?;
                partitions.insert(partition, resource);
                current = Some((partition, writer));
            }

            if let Some((_, writer)) = current.as_mut() {
                writer.write(&(key, value))?;
                count += 1;
            }
        }

        if let Some((_, writer)) = current.take() {
            writer.finish()?;
        }
        log::debug!("split {} records into {} partitions", count, partitions.len());

        return Ok(());
    }
}

impl<J, P> fmt::Debug for Mapper<J, P>
where
    J: MapJob,
    P: Partitioner<J::Key>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("tmp_dir", &self.tmp_dir.path())
            .field("threads", &self.thread_pool.current_num_threads())
            .finish()
    }
}

pub(crate) fn init_thread_pool<E>(threads_number: Option<usize>) -> Result<rayon::ThreadPool, MapReduceError<E>> {
    let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

    if let Some(threads_number) = threads_number {
        log::info!("initializing thread-pool (threads: {})", threads_number);
        thread_pool_builder = thread_pool_builder.num_threads(threads_number);
    } else {
        log::info!("initializing thread-pool (threads: default)");
    }
    let thread_pool = thread_pool_builder
        .build()
        .map_err(|err| MapReduceError::ThreadPoolBuildError(err))?;

    return Ok(thread_pool);
}

pub(crate) fn init_tmp_directory<E>(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, MapReduceError<E>> {
    let tmp_dir = if let Some(tmp_path) = tmp_path {
        tempfile::tempdir_in(tmp_path)
    } else {
        tempfile::tempdir()
    }
    .map_err(|err| MapReduceError::TempDir(err))?;

    log::info!("using {} as a temporary directory", tmp_dir.path().display());

    return Ok(tmp_dir);
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use rayon::prelude::*;
    use rstest::*;
    use serde_json::{json, Value};

    use super::{Mapper, MapperBuilder, PartitionMap};
    use crate::error::MapReduceError;
    use crate::job::{Job, MapJob};
    use crate::partitioner::{HashPartitioner, Partitioner};

    /// Emits the input records as is, summing numeric values of equal keys if `reduce` is set.
    struct EmitJob {
        reduce: bool,
    }

    impl Job for EmitJob {
        type Key = Value;
        type Value = Value;
        type Error = io::Error;

        fn reduce(&self, _key: &Value, first: &Value, second: &Value) -> Option<Result<Value, io::Error>> {
            if !self.reduce {
                return None;
            }
            match (first.as_i64(), second.as_i64()) {
                (Some(first), Some(second)) => Some(Ok(json!(first + second))),
                _ => Some(Err(io::Error::new(io::ErrorKind::InvalidData, "not a number"))),
            }
        }
    }

    impl MapJob for EmitJob {
        type Input = Vec<(Value, Value)>;

        fn map(&self, input: Self::Input, emit: &mut dyn FnMut(Value, Value)) -> Result<(), io::Error> {
            for (key, value) in input {
                if key.is_null() {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "null key"));
                }
                emit(key, value);
            }
            Ok(())
        }
    }

    /// Assigns partitions from a fixed table.
    struct FixedPartitioner(BTreeMap<String, u32>);

    impl Partitioner<Value> for FixedPartitioner {
        fn partition(&self, key: &Value) -> Result<u32, serde_json::Error> {
            Ok(key.as_str().and_then(|key| self.0.get(key)).copied().unwrap_or(0))
        }
    }

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn records(keys: &[&str], values: &[Value]) -> Vec<(Value, Value)> {
        Vec::from_iter(keys.iter().zip(values).map(|(key, value)| (json!(key), value.clone())))
    }

    fn letters() -> Vec<Value> {
        Vec::from_iter(["a", "b", "c", "d", "e"].iter().map(|letter| json!(letter.repeat(10))))
    }

    fn chunk_contents<J: MapJob, P: Partitioner<J::Key>>(mapper: &Mapper<J, P>) -> Vec<String> {
        let state = mapper.lock_state();
        Vec::from_iter(state.chunks.iter().map(|chunk| fs::read_to_string(chunk.path()).unwrap()))
    }

    fn read_partitions(partitions: &PartitionMap) -> Result<Vec<(u32, String)>, io::Error> {
        partitions
            .iter()
            .map(|(partition, path)| Ok((partition, fs::read_to_string(path)?)))
            .collect()
    }

    fn dir_entries(path: &Path) -> usize {
        fs::read_dir(path).unwrap().count()
    }

    #[rstest]
    fn test_spill_on_memory_limit(tmp_dir: tempfile::TempDir) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_partitioner(HashPartitioner::new(1))
            .with_memory_limit(25)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        // every record is 18 bytes long, e.g. [[0,"k1"],"aaaaa"]
        let values = Vec::from_iter(["a", "b", "c", "d", "e"].iter().map(|letter| json!(letter.repeat(5))));
        mapper
            .map(records(&["k1", "k2", "k3", "k4", "k5"], &values))
            .unwrap();

        assert_eq!(
            chunk_contents(&mapper),
            vec![
                "[[0,\"k1\"],\"aaaaa\"]\n[[0,\"k2\"],\"bbbbb\"]\n",
                "[[0,\"k3\"],\"ccccc\"]\n[[0,\"k4\"],\"ddddd\"]\n",
            ]
        );
        assert_eq!(mapper.lock_state().buffer.len(), 1);
        assert_eq!(mapper.lock_state().buffer.mem_size(), 18);

        let count = mapper.shuffle(2, |partitions| Ok(partitions.len())).unwrap();
        assert_eq!(count, 1);
    }

    #[rstest]
    fn test_spill_sorts_and_reduces(tmp_dir: tempfile::TempDir) {
        let mapper = MapperBuilder::new(EmitJob { reduce: true })
            .with_partitioner(HashPartitioner::new(1))
            .with_memory_limit(56)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        // every record is 14 bytes long, e.g. [[0,"key3"],1]
        mapper
            .map(records(&["key3", "key1", "key2", "key1"], &[json!(1), json!(1), json!(1), json!(1)]))
            .unwrap();

        assert_eq!(
            chunk_contents(&mapper),
            vec!["[[0,\"key1\"],2]\n[[0,\"key2\"],1]\n[[0,\"key3\"],1]\n"]
        );
    }

    #[rstest]
    fn test_shuffle_with_fixed_partitions(tmp_dir: tempfile::TempDir) {
        let partitioner = FixedPartitioner(BTreeMap::from_iter(
            [("key1", 3), ("key2", 2), ("key3", 0), ("key4", 2), ("key5", 3)]
                .into_iter()
                .map(|(key, partition)| (key.to_string(), partition)),
        ));
        let mut mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_partitioner(partitioner)
            .with_memory_limit(50)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        mapper
            .map(records(&["key1", "key2", "key3", "key4", "key5"], &letters()))
            .unwrap();
        assert_eq!(chunk_contents(&mapper).len(), 2);

        let mut paths: Vec<PathBuf> = Vec::new();
        let result = mapper
            .shuffle(32, |partitions| {
                paths.extend(partitions.iter().map(|(_, path)| path.to_path_buf()));
                read_partitions(partitions)
            })
            .unwrap();

        assert_eq!(
            result,
            vec![
                (0, "[\"key3\",\"cccccccccc\"]\n".to_string()),
                (2, "[\"key2\",\"bbbbbbbbbb\"]\n[\"key4\",\"dddddddddd\"]\n".to_string()),
                (3, "[\"key1\",\"aaaaaaaaaa\"]\n[\"key5\",\"eeeeeeeeee\"]\n".to_string()),
            ]
        );
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|path| !path.exists()));
        assert_eq!(dir_entries(mapper.tmp_dir.path()), 0);
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    fn test_shuffle_with_hash_partitions(tmp_dir: tempfile::TempDir, #[case] file_limit: usize) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_partitioner(HashPartitioner::new(4))
            .with_memory_limit(1)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        mapper
            .map(records(&["key1", "key2", "key3", "key4", "key5"], &letters()))
            .unwrap();
        assert_eq!(chunk_contents(&mapper).len(), 5);

        let result = mapper.shuffle(file_limit, read_partitions).unwrap();

        assert_eq!(
            result,
            vec![
                (0, "[\"key5\",\"eeeeeeeeee\"]\n".to_string()),
                (1, "[\"key1\",\"aaaaaaaaaa\"]\n[\"key4\",\"dddddddddd\"]\n".to_string()),
                (2, "[\"key2\",\"bbbbbbbbbb\"]\n[\"key3\",\"cccccccccc\"]\n".to_string()),
            ]
        );
    }

    #[rstest]
    fn test_shuffle_reduces_partitions(tmp_dir: tempfile::TempDir) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: true })
            .with_partitioner(HashPartitioner::new(8))
            .with_memory_limit(20)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let keys = ["key3", "key1", "key2", "key1", "key3", "key1"];
        mapper.map(records(&keys, &vec![json!(1); keys.len()])).unwrap();

        let result = mapper.shuffle(2, read_partitions).unwrap();

        assert_eq!(
            result,
            vec![
                (1, "[\"key1\",3]\n".to_string()),
                (2, "[\"key2\",1]\n".to_string()),
                (6, "[\"key3\",2]\n".to_string()),
            ]
        );
    }

    #[rstest]
    fn test_shuffle_without_records(tmp_dir: tempfile::TempDir) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let empty = mapper.shuffle(2, |partitions| Ok(partitions.is_empty())).unwrap();
        assert!(empty);
    }

    #[rstest]
    fn test_shuffle_cleans_up_on_callback_error(tmp_dir: tempfile::TempDir) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_memory_limit(1)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        mapper
            .map(records(&["key1", "key2", "key3", "key4", "key5"], &letters()))
            .unwrap();
        let chunk_paths = Vec::from_iter(mapper.lock_state().chunks.iter().map(|chunk| chunk.path().to_path_buf()));
        assert_eq!(chunk_paths.len(), 5);

        let mut partition_paths: Vec<PathBuf> = Vec::new();
        let result: Result<(), _> = mapper.shuffle(2, |partitions| {
            partition_paths.extend(partitions.iter().map(|(_, path)| path.to_path_buf()));
            Err(io::Error::new(io::ErrorKind::Other, "upload failed"))
        });

        assert!(matches!(result, Err(MapReduceError::Job(_))));
        assert!(!partition_paths.is_empty());
        assert!(chunk_paths.iter().chain(&partition_paths).all(|path| !path.exists()));
        assert_eq!(dir_entries(mapper.tmp_dir.path()), 0);
    }

    #[rstest]
    fn test_shuffle_invalid_file_limit(tmp_dir: tempfile::TempDir) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_memory_limit(1)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        mapper
            .map(records(&["key1", "key2", "key3"], &letters()))
            .unwrap();
        let spilled = chunk_contents(&mapper);

        let result = mapper.shuffle(1, |_| Ok(()));

        assert!(matches!(result, Err(MapReduceError::InvalidFileLimit(1))));
        assert_eq!(chunk_contents(&mapper), spilled);
        assert_eq!(mapper.lock_state().buffer.len(), 0);
        assert_eq!(dir_entries(mapper.tmp_dir.path()), 3);
    }

    #[rstest]
    fn test_map_error_is_propagated(tmp_dir: tempfile::TempDir) {
        let mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let result = mapper.map(vec![(json!("key1"), json!(1)), (Value::Null, json!(2))]);

        assert!(matches!(result, Err(MapReduceError::Job(_))));
    }

    #[rstest]
    fn test_map_incomparable_keys(tmp_dir: tempfile::TempDir) {
        let mapper = MapperBuilder::new(EmitJob { reduce: false })
            .with_partitioner(HashPartitioner::new(1))
            .with_memory_limit(20)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let result = mapper.map(vec![(json!("key1"), json!(1)), (json!(1), json!(2))]);

        assert!(matches!(result, Err(MapReduceError::Ordering(_))));
        assert!(mapper.lock_state().buffer.is_empty());
        assert_eq!(mapper.lock_state().buffer.mem_size(), 0);
        assert!(mapper.lock_state().chunks.is_empty());
        assert_eq!(dir_entries(mapper.tmp_dir.path()), 0);

        mapper.map(vec![(json!("key2"), json!(3))]).unwrap();
        assert_eq!(mapper.lock_state().buffer.len(), 1);
    }

    #[rstest]
    #[case(1)]
    #[case(256)]
    fn test_concurrent_map(tmp_dir: tempfile::TempDir, #[case] memory_limit: u64) {
        let mut mapper = MapperBuilder::new(EmitJob { reduce: true })
            .with_memory_limit(memory_limit)
            .with_threads_number(2)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let workers = rayon::ThreadPoolBuilder::new().num_threads(8).build().unwrap();
        workers.install(|| {
            (0..400).into_par_iter().for_each(|i| {
                let key = json!(format!("key{}", i % 10));
                mapper.map(vec![(key, json!(1))]).unwrap();
            })
        });

        let totals = mapper
            .shuffle(4, |partitions| {
                let mut totals = BTreeMap::new();
                for (_, path) in partitions.iter() {
                    for line in fs::read_to_string(path)?.lines() {
                        let (key, count): (String, i64) = serde_json::from_str(line)?;
                        assert!(totals.insert(key, count).is_none());
                    }
                }
                Ok(totals)
            })
            .unwrap();

        assert_eq!(totals.len(), 10);
        assert!(totals.values().all(|count| *count == 40));
    }
}
