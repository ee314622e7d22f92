use std::fmt;
use std::io;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, SortError>;

/// Step of the spill lifecycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillOp {
    Open,
    Write,
    Rewind,
    Read,
    Close,
}

impl fmt::Display for SpillOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpillOp::Open => "opening",
            SpillOp::Write => "writing",
            SpillOp::Rewind => "rewinding",
            SpillOp::Read => "reading",
            SpillOp::Close => "closing",
        };
        f.write_str(name)
    }
}

/// Failures surfaced by [`Sorter::sort`](crate::Sorter::sort).
#[derive(Error, Debug)]
pub enum SortError {
    #[error("key function failed: {0}")]
    KeyFunction(#[source] BoxError),

    #[error("spill I/O failed while {op} a temporary chunk: {source}")]
    SpillIo {
        op: SpillOp,
        #[source]
        source: io::Error,
    },

    #[error("input sequence failed: {0}")]
    InputConsumption(#[source] BoxError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("an earlier sort on this instance failed; construct a new sorter")]
    Aborted,
}

impl SortError {
    pub(crate) fn spill(op: SpillOp) -> impl FnOnce(io::Error) -> SortError {
        move |source| SortError::SpillIo { op, source }
    }

    pub fn is_spill_io(&self) -> bool {
        matches!(self, SortError::SpillIo { .. })
    }
}
