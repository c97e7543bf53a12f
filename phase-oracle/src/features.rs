//! Categorical dimensions of an output and its transaction.
//!
//! Every dimension is a small fixed enumeration of buckets, so recording an
//! output in the statistics aggregator is one counter increment per
//! dimension.

use serde::{Deserialize, Serialize};

use crate::{
    classify::Classification,
    price::PriceContext,
    record::{OutputRecord, OutputType},
    round::{trailing_zeros, PhaseTolerance, RoundDetector, SATS_PER_UNIT},
};

/// Dimensions tracked per accuracy category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    OutputCount,
    InputCount,
    OutputType,
    AssetRound,
    CurrencyRound1Pct,
    CurrencyRound2Pct,
    CurrencyRound5Pct,
    CurrencyRound10Pct,
    RangeRound1Pct,
    RangeRound5Pct,
    Topology,
    SameDaySpend,
    DataCarrier,
    WitnessSize,
    AmountSize,
    Decade,
    ImpliedValue,
    TrailingZeros,
    TwoOutputIndex,
    TwoOutputSmaller,
    SiblingRoundness,
    ValueRatio,
    ValueSimilarity,
    ErrorDistance,
}

const COUNT_LABELS: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10+"];
const BOOL_LABELS: &[&str] = &["no", "yes"];
const OUTPUT_TYPE_LABELS: &[&str] = &[
    "p2pk65", "p2pk33", "p2pkh", "p2ms", "p2sh", "opreturn", "p2wpkh", "p2wsh", "p2tr", "p2a",
    "empty", "unknown",
];
const TOPOLOGY_LABELS: &[&str] = &[
    "coinbase",
    "1-to-1",
    "1-to-2",
    "1-to-many",
    "many-to-1",
    "many-to-2",
    "many-to-many",
];
const WITNESS_LABELS: &[&str] = &["none", "1-99", "100-249", "250-499", "500-999", "1000+"];
const WITNESS_THRESHOLDS: &[f64] = &[1.0, 100.0, 250.0, 500.0, 1_000.0];
const AMOUNT_LABELS: &[&str] = &[
    "<10k", "10k-100k", "100k-1M", "1M-10M", "10M-100M", "100M-1B", "1B+",
];
const AMOUNT_THRESHOLDS: &[f64] = &[1e4, 1e5, 1e6, 1e7, 1e8, 1e9];
const DECADE_LABELS: &[&str] = &[
    "<=3", "4", "5", "6", "7", "8", "9", "10", "11", "12", ">=13",
];
const VALUE_LABELS: &[&str] = &[
    "<1", "1-10", "10-100", "100-1k", "1k-10k", "10k-100k", "100k+",
];
const VALUE_THRESHOLDS: &[f64] = &[1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0];
const ZEROS_LABELS: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8+"];
const INDEX_LABELS: &[&str] = &["n/a", "0", "1"];
const SMALLER_LABELS: &[&str] = &["n/a", "smaller", "larger", "equal"];
const SIBLING_LABELS: &[&str] = &["n/a", "neither", "this_only", "sibling_only", "both"];
const RATIO_LABELS: &[&str] = &["<1%", "1-10%", "10-50%", "50-90%", "90-99%", "99%+"];
const RATIO_THRESHOLDS: &[f64] = &[0.01, 0.10, 0.50, 0.90, 0.99];
const SIMILARITY_LABELS: &[&str] = &[
    "n/a",
    "identical",
    "within_1pct",
    "within_10pct",
    "within_2x",
    "dissimilar",
];
const ERROR_LABELS: &[&str] = &["0", "<5%", "5-15%", "15-30%", "30-50%", "50-100%", "100%+"];
const ERROR_THRESHOLDS: &[f64] = &[0.05, 0.15, 0.30, 0.50, 1.0];

/// Number of tracked dimensions.
pub const DIMENSION_COUNT: usize = 24;

impl Dimension {
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::OutputCount,
        Dimension::InputCount,
        Dimension::OutputType,
        Dimension::AssetRound,
        Dimension::CurrencyRound1Pct,
        Dimension::CurrencyRound2Pct,
        Dimension::CurrencyRound5Pct,
        Dimension::CurrencyRound10Pct,
        Dimension::RangeRound1Pct,
        Dimension::RangeRound5Pct,
        Dimension::Topology,
        Dimension::SameDaySpend,
        Dimension::DataCarrier,
        Dimension::WitnessSize,
        Dimension::AmountSize,
        Dimension::Decade,
        Dimension::ImpliedValue,
        Dimension::TrailingZeros,
        Dimension::TwoOutputIndex,
        Dimension::TwoOutputSmaller,
        Dimension::SiblingRoundness,
        Dimension::ValueRatio,
        Dimension::ValueSimilarity,
        Dimension::ErrorDistance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::OutputCount => "output_count",
            Dimension::InputCount => "input_count",
            Dimension::OutputType => "output_type",
            Dimension::AssetRound => "asset_round",
            Dimension::CurrencyRound1Pct => "currency_round_1pct",
            Dimension::CurrencyRound2Pct => "currency_round_2pct",
            Dimension::CurrencyRound5Pct => "currency_round_5pct",
            Dimension::CurrencyRound10Pct => "currency_round_10pct",
            Dimension::RangeRound1Pct => "range_round_1pct",
            Dimension::RangeRound5Pct => "range_round_5pct",
            Dimension::Topology => "topology",
            Dimension::SameDaySpend => "same_day_spend",
            Dimension::DataCarrier => "data_carrier",
            Dimension::WitnessSize => "witness_size",
            Dimension::AmountSize => "amount_size",
            Dimension::Decade => "decade",
            Dimension::ImpliedValue => "implied_value",
            Dimension::TrailingZeros => "trailing_zeros",
            Dimension::TwoOutputIndex => "two_output_index",
            Dimension::TwoOutputSmaller => "two_output_smaller",
            Dimension::SiblingRoundness => "sibling_roundness",
            Dimension::ValueRatio => "value_ratio",
            Dimension::ValueSimilarity => "value_similarity",
            Dimension::ErrorDistance => "error_distance",
        }
    }

    /// Bucket labels, indexed by bucket.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Dimension::OutputCount | Dimension::InputCount => COUNT_LABELS,
            Dimension::OutputType => OUTPUT_TYPE_LABELS,
            Dimension::AssetRound
            | Dimension::CurrencyRound1Pct
            | Dimension::CurrencyRound2Pct
            | Dimension::CurrencyRound5Pct
            | Dimension::CurrencyRound10Pct
            | Dimension::RangeRound1Pct
            | Dimension::RangeRound5Pct
            | Dimension::SameDaySpend
            | Dimension::DataCarrier => BOOL_LABELS,
            Dimension::Topology => TOPOLOGY_LABELS,
            Dimension::WitnessSize => WITNESS_LABELS,
            Dimension::AmountSize => AMOUNT_LABELS,
            Dimension::Decade => DECADE_LABELS,
            Dimension::ImpliedValue => VALUE_LABELS,
            Dimension::TrailingZeros => ZEROS_LABELS,
            Dimension::TwoOutputIndex => INDEX_LABELS,
            Dimension::TwoOutputSmaller => SMALLER_LABELS,
            Dimension::SiblingRoundness => SIBLING_LABELS,
            Dimension::ValueRatio => RATIO_LABELS,
            Dimension::ValueSimilarity => SIMILARITY_LABELS,
            Dimension::ErrorDistance => ERROR_LABELS,
        }
    }

    pub fn cardinality(self) -> usize {
        self.labels().len()
    }
}

/// Bucket of every dimension for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureVector {
    buckets: [u8; DIMENSION_COUNT],
}

impl FeatureVector {
    pub fn bucket(&self, dimension: Dimension) -> usize {
        self.buckets[dimension.index()] as usize
    }

    pub fn label(&self, dimension: Dimension) -> &'static str {
        dimension.labels()[self.bucket(dimension)]
    }

    /// `(dimension, bucket)` pairs in [`Dimension::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, usize)> + '_ {
        Dimension::ALL
            .iter()
            .map(move |&d| (d, self.buckets[d.index()] as usize))
    }

    fn set(&mut self, dimension: Dimension, bucket: usize) {
        debug_assert!(bucket < dimension.cardinality(), "{:?} bucket {}", dimension, bucket);
        self.buckets[dimension.index()] = bucket.min(dimension.cardinality() - 1) as u8;
    }
}

fn bucket_by(value: f64, thresholds: &[f64]) -> usize {
    thresholds.partition_point(|&t| t <= value)
}

fn count_bucket(n: u32) -> usize {
    (n as usize).min(COUNT_LABELS.len() - 1)
}

fn topology(record: &OutputRecord) -> usize {
    if record.tx.is_coinbase {
        return 0;
    }
    let many_in = record.tx.input_count > 1;
    let offset = if many_in { 4 } else { 1 };
    offset
        + match record.tx.output_count {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        }
}

fn similarity(a: u64, b: u64) -> usize {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
        return 1;
    }
    if lo == 0 {
        return 5;
    }
    let ratio = hi as f64 / lo as f64;
    if ratio <= 1.01 {
        2
    } else if ratio <= 1.10 {
        3
    } else if ratio <= 2.0 {
        4
    } else {
        5
    }
}

/// Computes [`FeatureVector`]s using the round-value detectors.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor<'a> {
    detector: RoundDetector<'a>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(detector: RoundDetector<'a>) -> Self {
        Self { detector }
    }

    fn is_round(&self, amount: u64) -> bool {
        self.detector.asset_round(amount)
            || self.detector.currency_round(amount, PhaseTolerance::TwoPercent)
    }

    pub fn extract(
        &self,
        record: &OutputRecord,
        context: &PriceContext,
        classification: &Classification,
    ) -> FeatureVector {
        let mut f = FeatureVector {
            buckets: [0; DIMENSION_COUNT],
        };
        let amount = record.amount;
        let tx = &record.tx;
        let d = &self.detector;

        f.set(Dimension::OutputCount, count_bucket(tx.output_count));
        f.set(Dimension::InputCount, count_bucket(tx.input_count));
        f.set(Dimension::OutputType, record.output_type.index());
        f.set(Dimension::AssetRound, d.asset_round(amount) as usize);
        for (dimension, tolerance) in [
            (Dimension::CurrencyRound1Pct, PhaseTolerance::OnePercent),
            (Dimension::CurrencyRound2Pct, PhaseTolerance::TwoPercent),
            (Dimension::CurrencyRound5Pct, PhaseTolerance::FivePercent),
            (Dimension::CurrencyRound10Pct, PhaseTolerance::TenPercent),
        ] {
            f.set(dimension, d.currency_round(amount, tolerance) as usize);
        }
        f.set(
            Dimension::RangeRound1Pct,
            d.currency_round_in_range(amount, context, 0.01) as usize,
        );
        f.set(
            Dimension::RangeRound5Pct,
            d.currency_round_in_range(amount, context, 0.05) as usize,
        );
        f.set(Dimension::Topology, topology(record));
        f.set(Dimension::SameDaySpend, tx.spends_same_day as usize);
        f.set(Dimension::DataCarrier, tx.has_data_carrier as usize);
        f.set(
            Dimension::WitnessSize,
            bucket_by(tx.witness_size() as f64, WITNESS_THRESHOLDS),
        );
        f.set(
            Dimension::AmountSize,
            bucket_by(amount as f64, AMOUNT_THRESHOLDS),
        );
        f.set(
            Dimension::Decade,
            (classification.log_phase.decade.clamp(3, 13) - 3) as usize,
        );
        let value = amount as f64 / SATS_PER_UNIT as f64 * context.reference();
        f.set(Dimension::ImpliedValue, bucket_by(value, VALUE_THRESHOLDS));
        f.set(
            Dimension::TrailingZeros,
            (trailing_zeros(amount) as usize).min(ZEROS_LABELS.len() - 1),
        );

        let ratio = if tx.total_value == 0 {
            0.0
        } else {
            amount as f64 / tx.total_value as f64
        };
        f.set(Dimension::ValueRatio, bucket_by(ratio, RATIO_THRESHOLDS));

        if let Some(sibling) = record.sibling_amount.filter(|_| record.is_two_output()) {
            f.set(Dimension::TwoOutputIndex, 1 + (record.vout as usize).min(1));
            f.set(
                Dimension::TwoOutputSmaller,
                match amount.cmp(&sibling) {
                    std::cmp::Ordering::Less => 1,
                    std::cmp::Ordering::Greater => 2,
                    std::cmp::Ordering::Equal => 3,
                },
            );
            f.set(
                Dimension::SiblingRoundness,
                match (self.is_round(amount), self.is_round(sibling)) {
                    (false, false) => 1,
                    (true, false) => 2,
                    (false, true) => 3,
                    (true, true) => 4,
                },
            );
            f.set(Dimension::ValueSimilarity, similarity(amount, sibling));
        }

        let error_bucket = if classification.error <= 0.0 {
            0
        } else {
            1 + bucket_by(classification.error, ERROR_THRESHOLDS)
        };
        f.set(Dimension::ErrorDistance, error_bucket);

        f
    }
}

/// Output type labels line up with [`OutputType::ALL`].
pub fn output_type_label(output_type: OutputType) -> &'static str {
    OUTPUT_TYPE_LABELS[output_type.index()]
}
