//! Per-context bin classifiers.
//!
//! Classifying an output means finding the round-currency mantissa and decade
//! under which its phase implies a price nearest the day's reference, then
//! applying the category rules. The answer depends only on the phase bin and
//! the price context, so it is computed once per bin per context and cached;
//! classifying an output afterwards is a single table lookup.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    category::{AccuracyCategory, CategoryRules, FitCandidate},
    config::OracleConfig,
    decompose::wrap_phase,
    price::{ContextKey, PriceContext},
    round::RoundTables,
};

/// Classification of one phase bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinEntry {
    pub category: AccuracyCategory,
    /// Best-fit implied price for outputs in this bin.
    pub implied_price: f64,
    /// Decade of the best-fit implied price.
    pub decade: i32,
}

/// Lookup from phase bin to accuracy category for one price context.
#[derive(Debug, Clone, PartialEq)]
pub struct BinClassifier {
    context: PriceContext,
    entries: Vec<BinEntry>,
}

impl BinClassifier {
    /// Build the table for every bin at the configured resolution.
    ///
    /// Returns `None` for a context without a finite, positive reference.
    pub fn build(
        context: &PriceContext,
        config: &OracleConfig,
        tables: &RoundTables,
    ) -> Option<Self> {
        if !context.is_valid() || !(context.reference() > 0.0) {
            return None;
        }
        let resolution = config.calibration.bin_resolution.max(1);
        let window = config.calibration.decade_window;
        let rules = CategoryRules::for_context(context, &config.thresholds);

        let reference = context.reference();
        let reference_log = reference.log10();
        if !reference_log.is_finite() {
            return None;
        }
        let reference_decade = reference_log.floor() as i32;

        let entries = (0..resolution)
            .map(|bin| {
                let phase = (bin as f64 + 0.5) / resolution as f64;
                let (implied_price, decade) = best_fit(
                    phase,
                    tables.classifier_phases(),
                    reference_log,
                    reference_decade,
                    window,
                );
                let fit = FitCandidate {
                    implied_price,
                    decade,
                    reference_decade,
                };
                BinEntry {
                    category: rules.categorize(context, &fit),
                    implied_price,
                    decade,
                }
            })
            .collect();

        Some(Self {
            context: *context,
            entries,
        })
    }

    pub fn context(&self) -> &PriceContext {
        &self.context
    }

    pub fn resolution(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, bin: usize) -> Option<&BinEntry> {
        self.entries.get(bin)
    }

    pub fn category(&self, bin: usize) -> Option<AccuracyCategory> {
        self.entry(bin).map(|e| e.category)
    }

    pub fn entries(&self) -> &[BinEntry] {
        &self.entries
    }

    /// Number of bins assigned to each category, in [`AccuracyCategory::ALL`] order.
    pub fn category_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for entry in &self.entries {
            counts[entry.category.index()] += 1;
        }
        counts
    }
}

/// Implied price nearest the reference over every mantissa and every decade
/// in the window. Ties keep the first candidate found.
fn best_fit(
    phase: f64,
    mantissa_phases: &[f64],
    reference_log: f64,
    reference_decade: i32,
    window: i32,
) -> (f64, i32) {
    let mut best = (f64::NAN, reference_decade);
    let mut best_distance = f64::INFINITY;
    let decades =
        reference_decade.saturating_sub(window)..=reference_decade.saturating_add(window);
    for &mantissa in mantissa_phases {
        let price_phase = wrap_phase(mantissa - phase);
        for decade in decades.clone() {
            let log = decade as f64 + price_phase;
            let distance = (log - reference_log).abs();
            if distance < best_distance {
                best_distance = distance;
                best = (10f64.powf(log), decade);
            }
        }
    }
    best
}

/// Bin classifiers keyed by rounded price context, built on first use.
#[derive(Debug, Default)]
pub struct BinClassifierCache {
    classifiers: HashMap<ContextKey, BinClassifier>,
    hits: u64,
    misses: u64,
}

impl BinClassifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier for `context`, building it on a miss.
    ///
    /// The table is built from the rounded context so that every context
    /// sharing a key sees exactly the same table. `None` when the context
    /// cannot carry a table.
    pub fn get_or_build(
        &mut self,
        context: &PriceContext,
        config: &OracleConfig,
        tables: &RoundTables,
    ) -> Option<&BinClassifier> {
        let key = context.key();
        if self.classifiers.contains_key(&key) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let classifier = BinClassifier::build(&key.to_context(), config, tables)?;
            tracing::debug!(
                "Built bin classifier for {:?}: {:?} bins per category",
                key,
                classifier.category_counts()
            );
            self.classifiers.insert(key, classifier);
        }
        self.classifiers.get(&key)
    }

    pub fn get(&self, context: &PriceContext) -> Option<&BinClassifier> {
        self.classifiers.get(&context.key())
    }

    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Drop every cached classifier.
    pub fn clear(&mut self) {
        self.classifiers.clear();
    }
}
