//! Price-phase inference from on-chain output amounts.
//!
//! People pay round amounts of their local currency (\$20, \$100, \$500), so
//! on any day the amounts they send in the asset cluster at
//! `round_value / price`. On a log10 scale that fixes the fractional part of
//! `log10(amount)` relative to the fractional part of `log10(price)`, whatever
//! the decade. This crate exploits that in two modes:
//!
//! - **Blind search** ([`search`]): with no price input, find the price phase
//!   that best explains the amount phases of a batch of outputs.
//! - **Calibration** ([`classify`], [`stats`], [`report`]): with a known daily
//!   price, label each output by how well its amount agrees with that price,
//!   then count its features per label to learn which kinds of outputs carry
//!   the signal.
//!
//! ## Key Concepts
//!
//! - **Log phase**: `frac(log10(amount))`, in `[0, 1)`. See [`decompose`].
//! - **Decade**: `floor(log10(amount))`.
//! - **Round values**: nice quantities of the asset (0.01, 1, 10 units) or of
//!   the currency (\$1, \$2.50, \$5...). See [`round`].
//! - **Accuracy category**: accurate, close, wrong decade or noise. See
//!   [`category`].
//!
//! Everything here is synchronous and free of I/O; data loading lives in the
//! scanner crate.

pub mod bins;
pub mod category;
pub mod classify;
pub mod config;
pub mod decompose;
pub mod features;
pub mod price;
pub mod record;
pub mod report;
pub mod round;
pub mod search;
pub mod stats;

pub use bins::{BinClassifier, BinClassifierCache, BinEntry};
pub use category::{AccuracyCategory, CategoryRules, Criterion, FitCandidate};
pub use classify::{AccuracyClassifier, Classification};
pub use config::{ConfigError, OracleConfig};
pub use decompose::{Decomposer, LogPhase};
pub use features::{Dimension, FeatureExtractor, FeatureVector};
pub use price::{ContextKey, PriceContext, RoundedPrice};
pub use record::{OutputRecord, OutputType, TxSummary};
pub use report::{differential, DifferentialReport};
pub use round::{PhaseTolerance, RoundDetector, RoundTables, SATS_PER_UNIT};
pub use search::{PhaseSearch, PhaseSearchResult};
pub use stats::{StatsAggregate, StatsSnapshot};
