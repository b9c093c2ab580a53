//! Job interface.

use std::error::Error;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ordering::SortKey;

/// Part of a map-reduce job shared by the map and the reduce phase: record types and the optional reduce step.
pub trait Job: Send + Sync {
    /// Record key.
    type Key: SortKey + Serialize + DeserializeOwned + Send;
    /// Record value.
    type Value: Serialize + DeserializeOwned + Send;
    /// Error raised by the job.
    type Error: Error;

    /// Folds two values sharing the same key into one.
    ///
    /// Returns `None` if the job has no reduce step, in which case records are only sorted and partitioned.
    /// The default implementation has no reduce step.
    fn reduce(
        &self,
        _key: &Self::Key,
        _first: &Self::Value,
        _second: &Self::Value,
    ) -> Option<Result<Self::Value, Self::Error>> {
        None
    }
}

/// Map phase of a job.
pub trait MapJob: Job {
    /// Input item passed to [`crate::Mapper::map`].
    type Input;

    /// Maps an input item calling `emit` for every produced record.
    fn map(&self, input: Self::Input, emit: &mut dyn FnMut(Self::Key, Self::Value)) -> Result<(), Self::Error>;
}
