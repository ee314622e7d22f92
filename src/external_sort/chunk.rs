use rayon::prelude::*;
use std::iter::Peekable;

use crate::external_sort::error::{BoxError, Result, SortError};
use crate::external_sort::key::KeyFn;

/// A sorted chunk: every record paired with the key it was ordered by.
pub type SortedChunk<K, T> = Vec<(K, T)>;

/// Groups the input into consecutive chunks of at most `capacity` records,
/// reading each input item exactly once.
pub struct Chunker<I: Iterator> {
    input: Peekable<I>,
    capacity: usize,
    chunks_produced: usize,
}

impl<T, I> Chunker<I>
where
    I: Iterator<Item = std::result::Result<T, BoxError>>,
{
    pub fn new(input: I, capacity: usize) -> Self {
        Self {
            input: input.peekable(),
            capacity,
            chunks_produced: 0,
        }
    }

    /// Next group of records, or `None` once the input is drained.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<T>>> {
        let mut chunk = Vec::with_capacity(self.capacity.min(4096));

        while chunk.len() < self.capacity {
            match self.input.next() {
                Some(Ok(record)) => chunk.push(record),
                Some(Err(e)) => return Err(SortError::InputConsumption(e)),
                None => break,
            }
        }

        if chunk.is_empty() {
            return Ok(None);
        }

        self.chunks_produced += 1;
        Ok(Some(chunk))
    }

    /// Whether another record is waiting. An input error counts as pending,
    /// so it surfaces from the next `next_chunk` call.
    pub fn has_more(&mut self) -> bool {
        self.input.peek().is_some()
    }

    pub fn chunks_produced(&self) -> usize {
        self.chunks_produced
    }
}

/// Sorts one chunk ascending by key. Keys are computed once per record; the
/// first key failure aborts the whole chunk.
pub fn sort_chunk<T, F>(
    records: Vec<T>,
    key_fn: &F,
    parallel: bool,
) -> Result<SortedChunk<F::Key, T>>
where
    F: KeyFn<T>,
    T: Send,
    F::Key: Send,
{
    let mut keyed = records
        .into_iter()
        .map(|record| -> Result<(F::Key, T)> {
            let key = key_fn.key_of(&record).map_err(SortError::KeyFunction)?;
            Ok((key, record))
        })
        .collect::<Result<Vec<_>>>()?;

    if parallel {
        keyed.par_sort_by(|a, b| a.0.cmp(&b.0));
    } else {
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
    }

    Ok(keyed)
}
