//! Error types for loading and assembling indexer data.

use phase_oracle::ConfigError;

/// Failure to fetch a series chunk from the indexer.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("request for {series} [{start}, {end}) failed: {message}")]
    Transport {
        series: String,
        start: u64,
        end: u64,
        message: String,
    },

    #[error("indexer returned status {status} for {series}: {body}")]
    Status {
        series: String,
        status: u16,
        body: String,
    },

    #[error("giving up on {series} [{start}, {end}) after {attempts} attempts: {last}")]
    RetriesExhausted {
        series: String,
        start: u64,
        end: u64,
        attempts: u32,
        last: Box<LoaderError>,
    },

    #[error("could not decode {series}: {message}")]
    Decode { series: String, message: String },

    #[error("short read of {series} [{start}, {end}): expected {expected} values, got {got}")]
    ShortRead {
        series: String,
        start: u64,
        end: u64,
        expected: usize,
        got: usize,
    },
}

impl LoaderError {
    /// Whether another attempt at the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoaderError::Transport { .. } => true,
            LoaderError::Status { status, .. } => *status == 429 || *status >= 500,
            LoaderError::RetriesExhausted { .. }
            | LoaderError::Decode { .. }
            | LoaderError::ShortRead { .. } => false,
        }
    }
}

/// Parallel arrays that do not line up. Never recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    #[error("{series} has {got} values, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{series} references index {index} outside [{start}, {end})")]
    OutOfBounds {
        series: &'static str,
        index: u64,
        start: u64,
        end: u64,
    },

    #[error("{series} decreases at position {position}")]
    NonMonotonic {
        series: &'static str,
        position: usize,
    },

    #[error("no boundary for date index {date_index}; the indexer has not reached the next day")]
    MissingBoundary { date_index: u64 },
}

/// Anything that aborts a batch.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("misaligned data: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("invalid oracle configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid period: {0}")]
    Period(String),
}
