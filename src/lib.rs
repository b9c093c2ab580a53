//! `ext-mapreduce` is a single machine, memory bounded map-reduce engine.
//!
//! Map output is buffered in memory up to a configured limit, sorted and spilled to disk as chunk files.
//! A shuffle merges the chunks and splits the merged stream into one sorted file per partition.
//! A reducer later merges partition files (possibly coming from many mappers) into a single sorted stream
//! folding records with equal keys. Merging never keeps more than a configured number of files open at a time,
//! falling back to multiple passes over intermediate chunks when there are more inputs than the limit.
//!
//! # Overview
//!
//! `ext-mapreduce` supports the following features:
//!
//! * **Data agnostic:**
//!   keys and values are any types implementing `serde` serialization/deserialization, keys additionally
//!   implement [`SortKey`]. Chunks are stored as JSON lines.
//! * **Memory limit support:**
//!   the map buffer is bounded by the estimated serialized size of the buffered records.
//! * **File limit support:**
//!   k-way merges open at most `file_limit` chunk files at the same time.
//! * **Multithreading support:**
//!   `map` can be called from multiple threads, spilled data is sorted on a dedicated thread pool.
//! * **Cleanup guarantee:**
//!   every temporary file is removed once it is no longer needed, whether the operation succeeds or fails.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//!
//! use ext_mapreduce::{HashPartitioner, Job, MapJob, MapperBuilder, ReducerBuilder};
//!
//! struct WordCount;
//!
//! impl Job for WordCount {
//!     type Key = String;
//!     type Value = u64;
//!     type Error = io::Error;
//!
//!     fn reduce(&self, _word: &String, first: &u64, second: &u64) -> Option<Result<u64, io::Error>> {
//!         Some(Ok(first + second))
//!     }
//! }
//!
//! impl MapJob for WordCount {
//!     type Input = String;
//!
//!     fn map(&self, line: String, emit: &mut dyn FnMut(String, u64)) -> Result<(), io::Error> {
//!         line.split_whitespace().for_each(|word| emit(word.to_lowercase(), 1));
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     let mut mapper = MapperBuilder::new(WordCount)
//!         .with_partitioner(HashPartitioner::new(4))
//!         .with_memory_limit(1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     for line in fs::read_to_string("input.txt").unwrap().lines() {
//!         mapper.map(line.to_string()).unwrap();
//!     }
//!
//!     let mut reducer = ReducerBuilder::new(WordCount).build().unwrap();
//!     mapper
//!         .shuffle(16, |partitions| {
//!             for (_, path) in partitions.iter() {
//!                 fs::copy(path, reducer.add_chunk().unwrap())?;
//!             }
//!             Ok(())
//!         })
//!         .unwrap();
//!
//!     reducer
//!         .reduce(16, |word, count| {
//!             println!("{}: {}", word, count);
//!             Ok(())
//!         })
//!         .unwrap();
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod error;
pub mod job;
pub mod mapper;
pub mod merger;
pub mod ordering;
pub mod partitioner;
pub mod queue;
pub mod reduce;
pub mod reducer;
pub mod temp;

pub use error::{MapReduceError, OrderingError};
pub use job::{Job, MapJob};
pub use mapper::{Mapper, MapperBuilder, PartitionMap};
pub use merger::{ChunkSource, KWayMerger, Merged, Merger};
pub use ordering::{Ordered, SortKey};
pub use partitioner::{HashPartitioner, Partitioner};
pub use queue::OrderedQueue;
pub use reduce::GroupReducer;
pub use reducer::{Reducer, ReducerBuilder};
pub use temp::TempResource;
