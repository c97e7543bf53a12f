//! Phase Oracle Scanner
//!
//! Runs the `phase-oracle` engine over real chain data served by a columnar
//! indexing service. This library provides:
//!
//! - Chunked, retrying range queries against the indexer's HTTP API
//! - Assembly of per-day transaction batches from positional series
//! - Period analysis: calibration statistics, blind phase search and the
//!   differential report
//! - Output handlers (stdout, file)
//!
//! # Architecture
//!
//! A period is processed one day at a time. For each day the loader fetches
//! the day's block and transaction boundaries, then every per-transaction,
//! per-output and per-input series over those ranges. [`ingest`] checks that
//! the series line up and links each output to its transaction. The
//! [`analyzer`] classifies each record against the day's OHLC price context,
//! accumulates the feature counters and merges the day's phase histogram
//! into the period's.
//!
//! Any failure aborts the whole period; no partial report is emitted.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod output;
pub mod series;

pub use analyzer::{DaySummary, PeriodAccumulator, PeriodAnalyzer, PeriodReport};
pub use config::{OutputMode, ScannerConfig};
pub use error::{AlignmentError, LoaderError, ScanError};
pub use ingest::{DayBatch, RawDay};
pub use loader::{HttpSeriesSource, RangeDataLoader, SeriesSource};
pub use series::Period;
