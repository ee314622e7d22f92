pub mod chunk;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod key;
pub mod merger;
pub mod processor;
pub mod spill;


pub use codec::{BincodeCodec, JsonLinesCodec, SpillCodec};
pub use config::SortConfig;
pub use error::{BoxError, SortError, SpillOp};
pub use key::{KeyFn, TryKey};
pub use processor::{SortedView, Sorter};
pub use spill::{SpillProvider, TempFileProvider};

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortStats {
    pub total_records: usize,
    pub chunks_created: usize,
    pub chunks_spilled: usize,
    pub bytes_spilled: u64,
    pub sort_time_ms: u64,
    pub merge_time_ms: u64,
}

/// Sorts `input` by `key_fn` in one call, spilling through anonymous temp
/// files once more than `chunk_capacity` records arrive.
pub fn sort_by_key<T, I, F>(
    input: I,
    chunk_capacity: usize,
    key_fn: F,
) -> error::Result<SortedView<T>>
where
    I: IntoIterator<Item = T>,
    T: Serialize + DeserializeOwned + Send,
    F: KeyFn<T>,
    F::Key: Send,
{
    let mut sorter = Sorter::new(input, chunk_capacity, key_fn)?;
    sorter.sort()
}
