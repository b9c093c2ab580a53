//! On-disk chunks.
//!
//! A chunk is a file holding one JSON serialized record per line, for instance `["key",1]` for a plain record or
//! `[[3,"key"],1]` for a partitioned one. The same format is used for mapper spills, partition files and reducer
//! inputs, so partition files can be moved between machines as is.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Chunk read/write error.
#[derive(Debug)]
pub enum ChunkError {
    /// Common I/O error.
    IO(io::Error),
    /// Record serialization error.
    SerializationError(serde_json::Error),
    /// Record deserialization error.
    DeserializationError(serde_json::Error),
}

impl Error for ChunkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            ChunkError::IO(err) => err,
            ChunkError::SerializationError(err) => err,
            ChunkError::DeserializationError(err) => err,
        })
    }
}

impl Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ChunkError::IO(err) => write!(f, "I/O operation failed: {}", err),
            ChunkError::SerializationError(err) => write!(f, "record serialization error: {}", err),
            ChunkError::DeserializationError(err) => write!(f, "record deserialization error: {}", err),
        }
    }
}

impl From<io::Error> for ChunkError {
    fn from(err: io::Error) -> Self {
        ChunkError::IO(err)
    }
}

/// Writes records to a chunk file, one JSON document per line.
pub struct ChunkWriter {
    writer: io::BufWriter<fs::File>,
    records: u64,
}

impl ChunkWriter {
    /// Creates a writer truncating the file at `path`.
    pub fn create(path: &Path, buf_size: Option<usize>) -> Result<Self, ChunkError> {
        let file = fs::File::create(path)?;
        let writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        return Ok(ChunkWriter { writer, records: 0 });
    }

    /// Appends a record.
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), ChunkError> {
        serde_json::to_writer(&mut self.writer, record).map_err(ChunkError::SerializationError)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;

        return Ok(());
    }

    /// Flushes buffered records to the file. Returns the number of records written.
    pub fn finish(mut self) -> Result<u64, ChunkError> {
        self.writer.flush()?;

        return Ok(self.records);
    }
}

/// Dumps records to a chunk file. Stops at the first failed record.
/// Returns the number of records written.
pub fn write_chunk<T, E, I>(path: &Path, records: I, buf_size: Option<usize>) -> Result<u64, E>
where
    T: Serialize,
    E: From<ChunkError>,
    I: IntoIterator<Item = Result<T, E>>,
{
    let mut writer = ChunkWriter::create(path, buf_size)?;
    for record in records {
        writer.write(&record?)?;
    }

    return Ok(writer.finish()?);
}

/// Reads records back from a chunk file. Blank lines are skipped.
pub struct ChunkReader<T, E = ChunkError> {
    reader: io::BufReader<fs::File>,
    line: String,

    item_type: PhantomData<T>,
    error_type: PhantomData<E>,
}

impl<T, E> ChunkReader<T, E> {
    /// Opens the chunk file at `path`.
    pub fn open(path: &Path, buf_size: Option<usize>) -> Result<Self, ChunkError> {
        let file = fs::File::open(path)?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(ChunkReader {
            reader,
            line: String::new(),
            item_type: PhantomData,
            error_type: PhantomData,
        });
    }
}

impl<T, E> Iterator for ChunkReader<T, E>
where
    T: DeserializeOwned,
    E: From<ChunkError>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) if self.line.trim().is_empty() => continue,
                Ok(_) => {
                    return Some(
                        serde_json::from_str(&self.line).map_err(|err| ChunkError::DeserializationError(err).into()),
                    )
                }
                Err(err) => return Some(Err(ChunkError::IO(err).into())),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;
    use serde_json::{json, Value};

    use super::{write_chunk, ChunkError, ChunkReader, ChunkWriter};
    use crate::temp::TempResource;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    #[rstest]
    fn test_chunk_format(tmp_dir: tempfile::TempDir) {
        let chunk = TempResource::new_in(tmp_dir.path()).unwrap();

        let mut writer = ChunkWriter::create(chunk.path(), None).unwrap();
        writer.write(&((3u32, "key1"), "aaaaaaaaaa")).unwrap();
        writer.write(&("key2", json!({"value": 1}))).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        assert_eq!(
            fs::read_to_string(chunk.path()).unwrap(),
            "[[3,\"key1\"],\"aaaaaaaaaa\"]\n[\"key2\",{\"value\":1}]\n"
        );
    }

    #[rstest]
    fn test_chunk_roundtrip(tmp_dir: tempfile::TempDir) {
        let chunk = TempResource::new_in(tmp_dir.path()).unwrap();
        let saved = Vec::from_iter((0..100).map(|i| (format!("key{:03}", i), i)));

        let written = write_chunk::<_, ChunkError, _>(chunk.path(), saved.clone().into_iter().map(Ok), Some(64)).unwrap();
        assert_eq!(written, 100);

        let reader: ChunkReader<(String, i32)> = ChunkReader::open(chunk.path(), Some(64)).unwrap();
        let restored: Result<Vec<_>, _> = reader.collect();

        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_reader_skips_blank_lines(tmp_dir: tempfile::TempDir) {
        let chunk = TempResource::new_in(tmp_dir.path()).unwrap();
        fs::write(chunk.path(), "[\"key1\",1]\n\n[\"key2\",2]").unwrap();

        let reader: ChunkReader<(Value, Value)> = ChunkReader::open(chunk.path(), None).unwrap();
        let restored: Result<Vec<_>, _> = reader.collect();

        assert_eq!(restored.unwrap(), vec![(json!("key1"), json!(1)), (json!("key2"), json!(2))]);
    }

    #[rstest]
    fn test_reader_malformed_line(tmp_dir: tempfile::TempDir) {
        let chunk = TempResource::new_in(tmp_dir.path()).unwrap();
        fs::write(chunk.path(), "[\"key1\",1]\nnot json\n").unwrap();

        let mut reader: ChunkReader<(String, i32)> = ChunkReader::open(chunk.path(), None).unwrap();

        assert_eq!(reader.next().unwrap().unwrap(), ("key1".to_string(), 1));
        assert!(matches!(reader.next(), Some(Err(ChunkError::DeserializationError(_)))));
    }
}
