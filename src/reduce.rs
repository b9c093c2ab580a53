//! Adjacent key reduction.

use std::cmp::Ordering;
use std::error::Error;
use std::marker::PhantomData;

use crate::error::MapReduceError;
use crate::ordering::SortKey;

/// Reduce function that never folds, turning a [`GroupReducer`] into a passthrough.
pub fn no_reduce<K, V, E>(_key: &K, _first: &V, _second: &V) -> Option<Result<V, E>> {
    None
}

/// Folds consecutive records sharing the same key into one record.
///
/// The input must be sorted by key. For every pair of adjacent records with equal keys, `reduce` is called with the
/// key, the accumulated value and the next value; the first record's key is kept. If `reduce` returns `None` the
/// records are passed through unchanged.
pub struct GroupReducer<I, K, V, E, R> {
    records: I,
    reduce: R,
    pending: Option<(K, V)>,

    error_type: PhantomData<fn() -> E>,
}

impl<I, K, V, E, R> GroupReducer<I, K, V, E, R>
where
    I: Iterator<Item = Result<(K, V), MapReduceError<E>>>,
    K: SortKey,
    E: Error,
    R: Fn(&K, &V, &V) -> Option<Result<V, E>>,
{
    pub fn new<C>(records: C, reduce: R) -> Self
    where
        C: IntoIterator<IntoIter = I, Item = I::Item>,
    {
        GroupReducer {
            records: records.into_iter(),
            reduce,
            pending: None,
            error_type: PhantomData,
        }
    }
}

impl<I, K, V, E, R> Iterator for GroupReducer<I, K, V, E, R>
where
    I: Iterator<Item = Result<(K, V), MapReduceError<E>>>,
    K: SortKey,
    E: Error,
    R: Fn(&K, &V, &V) -> Option<Result<V, E>>,
{
    type Item = Result<(K, V), MapReduceError<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.records.next() {
                None => return self.pending.take().map(Ok),
                Some(Err(err)) => return Some(Err(err)),
                Some(Ok(record)) => record,
            };

            let (pending_key, pending_value) = match self.pending.take() {
                None => {
                    self.pending = Some((key, value));
                    continue;
                }
                Some(pending) => pending,
            };

            let ordering = match pending_key.try_cmp(&key) {
                Ok(ordering) => ordering,
                Err(err) => return Some(Err(err.into())),
            };

            if ordering == Ordering::Equal {
                match (self.reduce)(&pending_key, &pending_value, &value) {
                    Some(Ok(reduced)) => {
                        self.pending = Some((pending_key, reduced));
                        continue;
                    }
                    Some(Err(err)) => return Some(Err(MapReduceError::Job(err))),
                    None => {}
                }
            }

            self.pending = Some((key, value));
            return Some(Ok((pending_key, pending_value)));
        }
    }
}
