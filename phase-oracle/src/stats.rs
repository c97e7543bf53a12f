//! Per-category counters over every feature dimension.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    category::AccuracyCategory,
    features::{Dimension, FeatureVector},
};

/// Counters for one accuracy category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounters {
    total: u64,
    /// `counts[dimension][bucket]`.
    counts: Vec<Vec<u64>>,
}

impl CategoryCounters {
    fn new() -> Self {
        Self {
            total: 0,
            counts: Dimension::ALL
                .iter()
                .map(|d| vec![0; d.cardinality()])
                .collect(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, dimension: Dimension, bucket: usize) -> u64 {
        self.counts[dimension.index()]
            .get(bucket)
            .copied()
            .unwrap_or(0)
    }

    pub fn buckets(&self, dimension: Dimension) -> &[u64] {
        &self.counts[dimension.index()]
    }

    fn record(&mut self, features: &FeatureVector) {
        self.total += 1;
        for (dimension, bucket) in features.iter() {
            self.counts[dimension.index()][bucket] += 1;
        }
    }

    fn merge(&mut self, other: &CategoryCounters) {
        self.total += other.total;
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
    }
}

/// One row of a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub label: String,
    pub count: u64,
    /// Share of the category total, in percent.
    pub percent: f64,
}

/// Streaming statistics for a batch of classified outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsAggregate {
    categories: Vec<CategoryCounters>,
    /// Outputs that could not be classified.
    skipped: u64,
}

impl Default for StatsAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregate {
    pub fn new() -> Self {
        Self {
            categories: AccuracyCategory::ALL
                .iter()
                .map(|_| CategoryCounters::new())
                .collect(),
            skipped: 0,
        }
    }

    /// Count one classified output.
    pub fn record(&mut self, category: AccuracyCategory, features: &FeatureVector) {
        self.categories[category.index()].record(features);
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Fold another aggregate into this one.
    pub fn merge(&mut self, other: &StatsAggregate) {
        for (mine, theirs) in self.categories.iter_mut().zip(&other.categories) {
            mine.merge(theirs);
        }
        self.skipped += other.skipped;
    }

    pub fn category(&self, category: AccuracyCategory) -> &CategoryCounters {
        &self.categories[category.index()]
    }

    pub fn total(&self, category: AccuracyCategory) -> u64 {
        self.category(category).total()
    }

    /// Classified outputs across every category.
    pub fn classified(&self) -> u64 {
        self.categories.iter().map(|c| c.total).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn count(&self, category: AccuracyCategory, dimension: Dimension, bucket: usize) -> u64 {
        self.category(category).count(dimension, bucket)
    }

    /// Share of `category` falling in each bucket of `dimension`, in percent.
    pub fn shares(&self, category: AccuracyCategory, dimension: Dimension) -> Vec<f64> {
        let counters = self.category(category);
        let total = counters.total;
        counters
            .buckets(dimension)
            .iter()
            .map(|&c| {
                if total == 0 {
                    0.0
                } else {
                    c as f64 * 100.0 / total as f64
                }
            })
            .collect()
    }

    pub fn distribution(
        &self,
        category: AccuracyCategory,
        dimension: Dimension,
    ) -> Vec<DistributionRow> {
        let counters = self.category(category);
        dimension
            .labels()
            .iter()
            .zip(counters.buckets(dimension))
            .zip(self.shares(category, dimension))
            .map(|((label, &count), percent)| DistributionRow {
                label: label.to_string(),
                count,
                percent,
            })
            .collect()
    }

    /// Nested `category -> dimension -> label -> count` view for output.
    pub fn snapshot(&self) -> StatsSnapshot {
        let categories = AccuracyCategory::ALL
            .iter()
            .map(|&category| {
                let counters = self.category(category);
                let dimensions = Dimension::ALL
                    .iter()
                    .map(|&d| {
                        let buckets = d
                            .labels()
                            .iter()
                            .zip(counters.buckets(d))
                            .map(|(label, &count)| (label.to_string(), count))
                            .collect();
                        (d.name().to_string(), buckets)
                    })
                    .collect();
                (
                    category.as_str().to_string(),
                    CategorySnapshot {
                        total: counters.total,
                        dimensions,
                    },
                )
            })
            .collect();
        StatsSnapshot {
            skipped: self.skipped,
            categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub total: u64,
    pub dimensions: BTreeMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub skipped: u64,
    pub categories: BTreeMap<String, CategorySnapshot>,
}
