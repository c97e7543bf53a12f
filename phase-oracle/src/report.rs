//! Differential comparison of two accuracy categories.
//!
//! For every dimension, compare the bucket shares of a baseline category with
//! those of a contrast category. Dimensions are ranked by the largest share
//! difference, which surfaces the features that best separate the two
//! populations (e.g. accurate outputs against noise).

use serde::{Deserialize, Serialize};

use crate::{category::AccuracyCategory, features::Dimension, stats::StatsAggregate};

/// Share difference for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRow {
    pub label: String,
    pub baseline_percent: f64,
    pub contrast_percent: f64,
    /// `baseline_percent - contrast_percent`.
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDiff {
    pub dimension: Dimension,
    pub max_abs_delta: f64,
    pub rows: Vec<DiffRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialReport {
    pub baseline: AccuracyCategory,
    pub contrast: AccuracyCategory,
    pub baseline_total: u64,
    pub contrast_total: u64,
    /// Sorted by `max_abs_delta`, largest first.
    pub dimensions: Vec<DimensionDiff>,
}

impl DifferentialReport {
    /// The `n` buckets with the largest absolute delta across all dimensions.
    pub fn strongest(&self, n: usize) -> Vec<(Dimension, &DiffRow)> {
        let mut rows: Vec<(Dimension, &DiffRow)> = self
            .dimensions
            .iter()
            .flat_map(|d| d.rows.iter().map(move |r| (d.dimension, r)))
            .collect();
        rows.sort_by(|a, b| b.1.delta.abs().total_cmp(&a.1.delta.abs()));
        rows.truncate(n);
        rows
    }
}

/// Compare `baseline` against `contrast` over every dimension.
pub fn differential(
    stats: &StatsAggregate,
    baseline: AccuracyCategory,
    contrast: AccuracyCategory,
) -> DifferentialReport {
    let mut dimensions: Vec<DimensionDiff> = Dimension::ALL
        .iter()
        .map(|&dimension| {
            let a = stats.shares(baseline, dimension);
            let b = stats.shares(contrast, dimension);
            let rows: Vec<DiffRow> = dimension
                .labels()
                .iter()
                .zip(a.iter().zip(&b))
                .map(|(label, (&x, &y))| DiffRow {
                    label: label.to_string(),
                    baseline_percent: x,
                    contrast_percent: y,
                    delta: x - y,
                })
                .collect();
            let max_abs_delta = rows.iter().map(|r| r.delta.abs()).fold(0.0, f64::max);
            DimensionDiff {
                dimension,
                max_abs_delta,
                rows,
            }
        })
        .collect();

    // Stable sort keeps dimension order among ties.
    dimensions.sort_by(|a, b| b.max_abs_delta.total_cmp(&a.max_abs_delta));

    DifferentialReport {
        baseline,
        contrast,
        baseline_total: stats.total(baseline),
        contrast_total: stats.total(contrast),
        dimensions,
    }
}
