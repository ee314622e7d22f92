use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::external_sort::chunk::{sort_chunk, Chunker};
use crate::external_sort::codec::{BincodeCodec, SpillCodec};
use crate::external_sort::config::SortConfig;
use crate::external_sort::error::{BoxError, Result, SortError};
use crate::external_sort::key::KeyFn;
use crate::external_sort::merger::{ChunkStream, MergeIter};
use crate::external_sort::spill::{spill_chunk, SpillProvider, TempFileProvider};
use crate::external_sort::SortStats;

type InputIter<'a, T> = Box<dyn Iterator<Item = std::result::Result<T, BoxError>> + 'a>;

enum SortState<T> {
    Unconsumed,
    Materializing,
    Cached(SortedView<T>),
}

/// Sorts a sequence by key, spilling sorted chunks to temporary storage when
/// the input outgrows one chunk.
///
/// Nothing happens until the first [`sort`](Sorter::sort). That call reads the
/// input once, caches the merged result and drops the input; every later call
/// returns the cached result.
pub struct Sorter<'a, T, F, P = TempFileProvider, C = BincodeCodec> {
    input: Option<InputIter<'a, T>>,
    key_fn: F,
    config: SortConfig,
    provider: P,
    codec: C,
    state: SortState<T>,
    stats: SortStats,
}

impl<'a, T: 'a, F: KeyFn<T>> Sorter<'a, T, F> {
    pub fn new<I>(input: I, chunk_capacity: usize, key_fn: F) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        Self::with_config(input, SortConfig::with_chunk_capacity(chunk_capacity), key_fn)
    }

    pub fn with_config<I>(input: I, config: SortConfig, key_fn: F) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        Self::from_boxed(Box::new(input.into_iter().map(Ok)), config, key_fn)
    }

    /// Input whose items may fail; a failed item aborts `sort()` with
    /// [`SortError::InputConsumption`].
    pub fn from_results<I, E>(input: I, config: SortConfig, key_fn: F) -> Result<Self>
    where
        I: IntoIterator<Item = std::result::Result<T, E>>,
        I::IntoIter: 'a,
        E: Into<BoxError> + 'a,
    {
        let input = input.into_iter().map(box_input_error::<T, E>);
        Self::from_boxed(Box::new(input), config, key_fn)
    }

    fn from_boxed(input: InputIter<'a, T>, config: SortConfig, key_fn: F) -> Result<Self> {
        config.validate()?;

        let provider = match &config.temp_directory {
            Some(dir) => TempFileProvider::in_directory(dir),
            None => TempFileProvider::new(),
        };

        Ok(Self {
            input: Some(input),
            key_fn,
            config,
            provider,
            codec: BincodeCodec,
            state: SortState::Unconsumed,
            stats: SortStats::default(),
        })
    }
}

fn box_input_error<T, E>(item: std::result::Result<T, E>) -> std::result::Result<T, BoxError>
where
    E: Into<BoxError>,
{
    item.map_err(Into::into)
}

impl<'a, T, F, P, C> Sorter<'a, T, F, P, C> {
    pub fn with_provider<Q: SpillProvider>(self, provider: Q) -> Sorter<'a, T, F, Q, C> {
        Sorter {
            input: self.input,
            key_fn: self.key_fn,
            config: self.config,
            provider,
            codec: self.codec,
            state: self.state,
            stats: self.stats,
        }
    }

    pub fn with_codec<D>(self, codec: D) -> Sorter<'a, T, F, P, D> {
        Sorter {
            input: self.input,
            key_fn: self.key_fn,
            config: self.config,
            provider: self.provider,
            codec,
            state: self.state,
            stats: self.stats,
        }
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Statistics of the materialization; all zero until `sort()` succeeds.
    pub fn stats(&self) -> &SortStats {
        &self.stats
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.state, SortState::Cached(_))
    }
}

impl<'a, T, F, P, C> Sorter<'a, T, F, P, C>
where
    T: Send,
    F: KeyFn<T>,
    F::Key: Send,
    P: SpillProvider,
    C: SpillCodec<T>,
{
    /// Sorted records, computed on the first call and cached afterwards.
    ///
    /// If the first call fails the instance is spent: the input has been
    /// partly consumed, so later calls return [`SortError::Aborted`].
    pub fn sort(&mut self) -> Result<SortedView<T>> {
        match &self.state {
            SortState::Cached(view) => return Ok(view.clone()),
            SortState::Materializing => return Err(SortError::Aborted),
            SortState::Unconsumed => {}
        }

        self.state = SortState::Materializing;
        let input = self.input.take().ok_or(SortError::Aborted)?;

        let (records, stats) = self.materialize(input)?;
        info!(
            "Sorted {} records in {} chunks ({} spilled, {} bytes) sort={}ms merge={}ms",
            stats.total_records,
            stats.chunks_created,
            stats.chunks_spilled,
            stats.bytes_spilled,
            stats.sort_time_ms,
            stats.merge_time_ms
        );

        let view = SortedView::new(records);
        self.stats = stats;
        self.state = SortState::Cached(view.clone());
        Ok(view)
    }

    fn materialize(&self, input: InputIter<'a, T>) -> Result<(Vec<T>, SortStats)> {
        let mut stats = SortStats::default();
        let sort_start = Instant::now();
        let io_buffer_size = self.config.io_buffer_size_bytes();

        let mut chunker = Chunker::new(input, self.config.chunk_capacity);
        let mut streams = Vec::new();

        while let Some(chunk) = chunker.next_chunk()? {
            stats.total_records += chunk.len();
            let sorted = sort_chunk(chunk, &self.key_fn, self.config.parallel_chunk_sort)?;

            if streams.is_empty() && !chunker.has_more() {
                streams.push(ChunkStream::InMemory(sorted.into_iter()));
                continue;
            }

            let spilled = spill_chunk(&self.provider, &self.codec, sorted, io_buffer_size)?;
            debug!(
                "Spilled chunk {}: {} records, {} bytes",
                streams.len(),
                spilled.records(),
                spilled.bytes()
            );
            stats.bytes_spilled += spilled.bytes();
            streams.push(ChunkStream::Spilled(spilled));
        }

        stats.chunks_created = chunker.chunks_produced();
        stats.chunks_spilled = streams.iter().filter(|s| s.is_spilled()).count();
        stats.sort_time_ms = sort_start.elapsed().as_millis() as u64;
        drop(chunker);

        let merge_start = Instant::now();
        let merge = MergeIter::new(streams, &self.key_fn, &self.codec)?;
        debug!("Merging {} chunk streams", merge.live_streams());
        let merged = merge.collect::<Result<Vec<T>>>()?;
        stats.merge_time_ms = merge_start.elapsed().as_millis() as u64;

        Ok((merged, stats))
    }
}

/// Immutable, cheaply cloneable view over a cached sorted result.
///
/// Every call to [`iter`](SortedView::iter) starts again from the first
/// record; clones share the same storage.
pub struct SortedView<T> {
    records: Arc<[T]>,
}

impl<T> SortedView<T> {
    fn new(records: Vec<T>) -> Self {
        Self {
            records: Arc::from(records),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.records.to_vec()
    }
}

impl<T> Clone for SortedView<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SortedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for SortedView<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T> AsRef<[T]> for SortedView<T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'v, T> IntoIterator for &'v SortedView<T> {
    type Item = &'v T;
    type IntoIter = std::slice::Iter<'v, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
