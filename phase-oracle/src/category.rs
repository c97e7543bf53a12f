//! Accuracy categories and the ordered rule table that assigns them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{config::AccuracyThresholds, price::PriceContext};

/// Outcome of validating an amount against a known price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyCategory {
    Accurate,
    Close,
    WrongDecade,
    Noise,
}

impl AccuracyCategory {
    pub const ALL: [AccuracyCategory; 4] = [
        AccuracyCategory::Accurate,
        AccuracyCategory::Close,
        AccuracyCategory::WrongDecade,
        AccuracyCategory::Noise,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccuracyCategory::Accurate => "accurate",
            AccuracyCategory::Close => "close",
            AccuracyCategory::WrongDecade => "wrong_decade",
            AccuracyCategory::Noise => "noise",
        }
    }
}

impl fmt::Display for AccuracyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a rule may look at for one bin.
#[derive(Debug, Clone, Copy)]
pub struct FitCandidate {
    /// Best-fit implied price.
    pub implied_price: f64,
    /// Decade of the best-fit implied price.
    pub decade: i32,
    /// Decade of the reference price (naively rounded down).
    pub reference_decade: i32,
}

/// Window test applied by a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Relative error against the reference price is at most this.
    RelativeError(f64),
    /// Implied price lies in `[low × (1 - m), high × (1 + m)]`.
    WidenedRange(f64),
    /// Best-fit decade differs from the reference decade.
    DecadeMismatch,
    /// Always matches.
    Otherwise,
}

impl Criterion {
    fn matches(&self, context: &PriceContext, fit: &FitCandidate) -> bool {
        match *self {
            Criterion::RelativeError(max) => {
                let reference = context.reference();
                ((fit.implied_price - reference) / reference).abs() <= max
            }
            Criterion::WidenedRange(margin) => {
                let (low, high) = context.bounds();
                fit.implied_price >= low * (1.0 - margin)
                    && fit.implied_price <= high * (1.0 + margin)
            }
            Criterion::DecadeMismatch => fit.decade != fit.reference_decade,
            Criterion::Otherwise => true,
        }
    }
}

/// Rule list evaluated in priority order; the first match wins.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRules {
    rules: Vec<(Criterion, AccuracyCategory)>,
}

impl CategoryRules {
    /// Rules for a single reference price.
    pub fn point(thresholds: &AccuracyThresholds) -> Self {
        Self {
            rules: vec![
                (
                    Criterion::RelativeError(thresholds.point_accurate),
                    AccuracyCategory::Accurate,
                ),
                (
                    Criterion::RelativeError(thresholds.point_close),
                    AccuracyCategory::Close,
                ),
                (Criterion::DecadeMismatch, AccuracyCategory::WrongDecade),
                (Criterion::Otherwise, AccuracyCategory::Noise),
            ],
        }
    }

    /// Rules for a daily `[low, high]` range.
    pub fn range(thresholds: &AccuracyThresholds) -> Self {
        Self {
            rules: vec![
                (
                    Criterion::WidenedRange(thresholds.range_accurate_margin),
                    AccuracyCategory::Accurate,
                ),
                (
                    Criterion::WidenedRange(thresholds.range_close_margin),
                    AccuracyCategory::Close,
                ),
                (Criterion::DecadeMismatch, AccuracyCategory::WrongDecade),
                (Criterion::Otherwise, AccuracyCategory::Noise),
            ],
        }
    }

    /// Rules matching the shape of `context`.
    pub fn for_context(context: &PriceContext, thresholds: &AccuracyThresholds) -> Self {
        match context {
            PriceContext::Point { .. } => Self::point(thresholds),
            PriceContext::Range { .. } => Self::range(thresholds),
        }
    }

    pub fn rules(&self) -> &[(Criterion, AccuracyCategory)] {
        &self.rules
    }

    pub fn categorize(&self, context: &PriceContext, fit: &FitCandidate) -> AccuracyCategory {
        self.rules
            .iter()
            .find(|(criterion, _)| criterion.matches(context, fit))
            .map(|&(_, category)| category)
            .unwrap_or(AccuracyCategory::Noise)
    }
}
