use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::external_sort::codec::SpillCodec;
use crate::external_sort::error::{Result, SortError};
use crate::external_sort::key::KeyFn;
use crate::external_sort::spill::{SpillFile, SpillProvider};

/// Ordered records of one chunk, either still in memory or spilled.
pub enum ChunkStream<'p, K, T, P: SpillProvider> {
    InMemory(std::vec::IntoIter<(K, T)>),
    Spilled(SpillFile<'p, P>),
}

impl<'p, K, T, P: SpillProvider> ChunkStream<'p, K, T, P> {
    pub fn is_spilled(&self) -> bool {
        matches!(self, ChunkStream::Spilled(_))
    }

    /// Advances the stream. Spilled records get their key recomputed.
    fn next_entry<F, C>(&mut self, key_fn: &F, codec: &C) -> Result<Option<(K, T)>>
    where
        F: KeyFn<T, Key = K>,
        C: SpillCodec<T>,
    {
        match self {
            ChunkStream::InMemory(records) => Ok(records.next()),
            ChunkStream::Spilled(file) => match file.read_next(codec)? {
                Some(record) => {
                    let key = key_fn.key_of(&record).map_err(SortError::KeyFunction)?;
                    Ok(Some((key, record)))
                }
                None => Ok(None),
            },
        }
    }
}

/// Current head of one stream in the merge heap.
struct HeapEntry<K, T> {
    key: K,
    record: T,
    chunk_idx: usize,
}

impl<K: Ord, T> PartialEq for HeapEntry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord, T> Eq for HeapEntry<K, T> {}

impl<K: Ord, T> PartialOrd for HeapEntry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equal keys resolve to the lower chunk index.
impl<K: Ord, T> Ord for HeapEntry<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.chunk_idx.cmp(&other.chunk_idx))
    }
}

/// K-way merge over individually sorted chunk streams.
///
/// Yields records lazily in ascending key order, holding one head record per
/// live stream. Exhausted streams are dropped as soon as they run dry. After
/// the first error the iterator releases every stream and yields nothing more.
pub struct MergeIter<'s, T, F, P, C>
where
    F: KeyFn<T>,
    P: SpillProvider,
{
    streams: Vec<Option<ChunkStream<'s, F::Key, T, P>>>,
    heap: BinaryHeap<Reverse<HeapEntry<F::Key, T>>>,
    key_fn: &'s F,
    codec: &'s C,
    failed: bool,
}

impl<'s, T, F, P, C> MergeIter<'s, T, F, P, C>
where
    F: KeyFn<T>,
    P: SpillProvider,
    C: SpillCodec<T>,
{
    pub fn new(
        streams: Vec<ChunkStream<'s, F::Key, T, P>>,
        key_fn: &'s F,
        codec: &'s C,
    ) -> Result<Self> {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(streams.len()),
            streams: streams.into_iter().map(Some).collect(),
            key_fn,
            codec,
            failed: false,
        };

        for chunk_idx in 0..merge.streams.len() {
            merge.advance(chunk_idx)?;
        }

        Ok(merge)
    }

    /// Streams that still hold unread records.
    pub fn live_streams(&self) -> usize {
        self.streams.iter().filter(|s| s.is_some()).count()
    }

    fn advance(&mut self, chunk_idx: usize) -> Result<()> {
        let Some(stream) = self.streams[chunk_idx].as_mut() else {
            return Ok(());
        };

        match stream.next_entry(self.key_fn, self.codec)? {
            Some((key, record)) => self.heap.push(Reverse(HeapEntry {
                key,
                record,
                chunk_idx,
            })),
            None => self.streams[chunk_idx] = None,
        }

        Ok(())
    }

    fn abort(&mut self) {
        self.failed = true;
        self.heap.clear();
        self.streams.clear();
    }
}

impl<T, F, P, C> Iterator for MergeIter<'_, T, F, P, C>
where
    F: KeyFn<T>,
    P: SpillProvider,
    C: SpillCodec<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let Reverse(entry) = self.heap.pop()?;

        if let Err(e) = self.advance(entry.chunk_idx) {
            self.abort();
            return Some(Err(e));
        }

        Some(Ok(entry.record))
    }
}
