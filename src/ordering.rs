//! Key ordering.
//!
//! Every key handled by the engine must be totally ordered. Statically typed keys get their order from [`Ord`],
//! dynamically shaped keys (like [`serde_json::Value`]) may fail to compare, which is reported as an
//! [`OrderingError`] instead of being silently misordered.

use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

use rayon::slice::ParallelSliceMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrderingError;

/// Total order capability required from record keys.
pub trait SortKey {
    /// Compares two keys. Returns an error if the keys are not mutually comparable.
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError>;
}

macro_rules! impl_sort_key_for_ord {
    ($($t:ty),*) => {
        $(
            impl SortKey for $t {
                fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
                    Ok(self.cmp(other))
                }
            }
        )*
    };
}

impl_sort_key_for_ord!(
    (), bool, char, str, String, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize
);

impl<T: SortKey> SortKey for Option<T> {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        match (self, other) {
            (Some(left), Some(right)) => left.try_cmp(right),
            (left, right) => Ok(left.is_some().cmp(&right.is_some())),
        }
    }
}

impl<T: SortKey> SortKey for Vec<T> {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        try_cmp_sequences(self.iter(), other.iter(), |left, right| left.try_cmp(right))
    }
}

impl<A: SortKey, B: SortKey> SortKey for (A, B) {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        match self.0.try_cmp(&other.0)? {
            Ordering::Equal => self.1.try_cmp(&other.1),
            ordering => Ok(ordering),
        }
    }
}

impl<A: SortKey, B: SortKey, C: SortKey> SortKey for (A, B, C) {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        match self.0.try_cmp(&other.0)? {
            Ordering::Equal => (&self.1, &self.2).try_cmp(&(&other.1, &other.2)),
            ordering => Ok(ordering),
        }
    }
}

impl<T: SortKey + ?Sized> SortKey for &T {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        (**self).try_cmp(*other)
    }
}

/// Wrapper making any [`Ord`] type usable as a key.
/// Serialized transparently, so the on-disk representation is the one of the inner value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ordered<T>(pub T);

impl<T: Ord> SortKey for Ordered<T> {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        Ok(self.0.cmp(&other.0))
    }
}

/// JSON values are ordered within the same kind only: numbers numerically, strings and arrays lexicographically,
/// objects lexicographically over their entries. Values of different kinds are incomparable.
impl SortKey for Value {
    fn try_cmp(&self, other: &Self) -> Result<Ordering, OrderingError> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Bool(left), Value::Bool(right)) => Ok(left.cmp(right)),
            (Value::String(left), Value::String(right)) => Ok(left.cmp(right)),
            (Value::Number(left), Value::Number(right)) => {
                let ordering = match (left.as_i64(), right.as_i64()) {
                    (Some(left), Some(right)) => Some(left.cmp(&right)),
                    _ => match (left.as_u64(), right.as_u64()) {
                        (Some(left), Some(right)) => Some(left.cmp(&right)),
                        _ => left.as_f64().zip(right.as_f64()).and_then(|(l, r)| l.partial_cmp(&r)),
                    },
                };
                ordering.ok_or_else(|| OrderingError::new(self, other))
            }
            (Value::Array(left), Value::Array(right)) => {
                try_cmp_sequences(left.iter(), right.iter(), |left, right| left.try_cmp(right))
            }
            (Value::Object(left), Value::Object(right)) => {
                try_cmp_sequences(left.iter(), right.iter(), |(lkey, lvalue), (rkey, rvalue)| {
                    match lkey.cmp(rkey) {
                        Ordering::Equal => lvalue.try_cmp(rvalue),
                        ordering => Ok(ordering),
                    }
                })
            }
            _ => Err(OrderingError::new(self, other)),
        }
    }
}

fn try_cmp_sequences<T, I, F>(mut left: I, mut right: I, compare: F) -> Result<Ordering, OrderingError>
where
    I: Iterator<Item = T>,
    F: Fn(T, T) -> Result<Ordering, OrderingError>,
{
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ok(Ordering::Equal),
            (None, Some(_)) => return Ok(Ordering::Less),
            (Some(_), None) => return Ok(Ordering::Greater),
            (Some(l), Some(r)) => match compare(l, r)? {
                Ordering::Equal => continue,
                ordering => return Ok(ordering),
            },
        }
    }
}

/// Sorts records by key in parallel on the current rayon pool. The sort is stable.
/// The first failed key comparison is reported, in which case the slice order is unspecified.
pub fn par_sort_records<K, V>(records: &mut [(K, V)]) -> Result<(), OrderingError>
where
    K: SortKey + Send,
    V: Send,
{
    let failure: Mutex<Option<OrderingError>> = Mutex::new(None);

    records.par_sort_by(|left, right| match left.0.try_cmp(&right.0) {
        Ok(ordering) => ordering,
        Err(err) => {
            failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(err);
            Ordering::Equal
        }
    });

    match failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
