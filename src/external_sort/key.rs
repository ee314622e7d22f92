use crate::external_sort::error::BoxError;

/// Maps a record to the totally ordered key it is sorted by.
///
/// Any `Fn(&T) -> K` closure is a key function that cannot fail. Wrap a
/// fallible closure in [`TryKey`] to surface its errors from `sort()`.
/// Composite keys are tuples, which compare lexicographically left to right.
pub trait KeyFn<T> {
    type Key: Ord;

    fn key_of(&self, record: &T) -> Result<Self::Key, BoxError>;
}

impl<T, K, F> KeyFn<T> for F
where
    F: Fn(&T) -> K,
    K: Ord,
{
    type Key = K;

    fn key_of(&self, record: &T) -> Result<K, BoxError> {
        Ok(self(record))
    }
}

/// Adapts a key function returning `Result` so its failures abort the sort.
#[derive(Debug, Clone, Copy)]
pub struct TryKey<F>(pub F);

impl<T, K, E, F> KeyFn<T> for TryKey<F>
where
    F: Fn(&T) -> Result<K, E>,
    K: Ord,
    E: Into<BoxError>,
{
    type Key = K;

    fn key_of(&self, record: &T) -> Result<K, BoxError> {
        (self.0)(record).map_err(Into::into)
    }
}
