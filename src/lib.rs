//! Sorting for sequences too large to sort comfortably in memory.
//!
//! Records are grouped into fixed-capacity chunks, each chunk is sorted by a
//! caller-supplied key and, when more than one chunk exists, spilled to a
//! temporary file. The spilled chunks are merged back into one ordered
//! result, computed once per [`Sorter`] and cached.
//!
//! ```
//! use offline_sort::Sorter;
//!
//! let mut sorter = Sorter::new(vec![5, 3, 4, 1, 2], 2, |v: &i32| *v)?;
//! let sorted = sorter.sort()?;
//! assert_eq!(sorted.as_slice(), &[1, 2, 3, 4, 5]);
//! # Ok::<(), offline_sort::SortError>(())
//! ```

// External sort pipeline: chunking, spilling and merging
pub mod external_sort;

// Logging setup and formatting helpers
pub mod utils;

// Re-export main types for convenience
pub use external_sort::{
    sort_by_key, BincodeCodec, BoxError, JsonLinesCodec, KeyFn, SortConfig, SortError, SortStats,
    SortedView, Sorter, SpillCodec, SpillOp, SpillProvider, TempFileProvider, TryKey,
};
