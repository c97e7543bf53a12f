//! Calibration-mode accuracy classification.
//!
//! Given amounts and the day's known price context, assign each amount an
//! [`AccuracyCategory`] by looking up its phase bin in the context's cached
//! [`BinClassifier`]. Amounts outside the decomposable range, below the dust
//! floor, or without a price context are skipped rather than labelled.

use serde::Serialize;

use crate::{
    bins::{BinClassifier, BinClassifierCache},
    category::AccuracyCategory,
    config::OracleConfig,
    decompose::{Decomposer, LogPhase},
    price::PriceContext,
    round::{RoundTables, SATS_PER_UNIT},
};

/// Result of classifying one amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub category: AccuracyCategory,
    pub log_phase: LogPhase,
    /// Phase bin at the calibration resolution.
    pub bin: usize,
    /// Best-fit implied price of the bin.
    pub implied_price: f64,
    /// Zero when the implied price lies in the day's range, otherwise the
    /// relative distance to the nearer bound. Diagnostic only.
    pub error: f64,
}

/// Classifies amounts against known prices, caching one table per context.
#[derive(Debug)]
pub struct AccuracyClassifier<'a> {
    config: OracleConfig,
    tables: &'a RoundTables,
    decomposer: Decomposer,
    cache: BinClassifierCache,
}

impl<'a> AccuracyClassifier<'a> {
    pub fn new(config: OracleConfig, tables: &'a RoundTables) -> Self {
        Self {
            decomposer: Decomposer::from_config(&config.decomposer),
            config,
            tables,
            cache: BinClassifierCache::new(),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn decomposer(&self) -> &Decomposer {
        &self.decomposer
    }

    pub fn cache(&self) -> &BinClassifierCache {
        &self.cache
    }

    /// Classifier for a context, building it if this is the first use.
    pub fn classifier_for(&mut self, context: &PriceContext) -> Option<&BinClassifier> {
        self.cache.get_or_build(context, &self.config, self.tables)
    }

    /// Classify one amount; `None` means the amount is excluded.
    pub fn classify(&mut self, amount: u64, context: Option<&PriceContext>) -> Option<Classification> {
        let context = context.filter(|c| c.is_valid())?;
        let log_phase = self.decomposer.decompose(amount)?;

        let value = amount as f64 / SATS_PER_UNIT as f64 * context.reference();
        if value < self.config.calibration.dust_value_floor {
            return None;
        }

        let bin = log_phase.bin(self.config.calibration.bin_resolution);
        let entry = *self
            .cache
            .get_or_build(context, &self.config, self.tables)?
            .entry(bin)?;

        Some(Classification {
            category: entry.category,
            log_phase,
            bin,
            implied_price: entry.implied_price,
            error: context.error_distance(entry.implied_price),
        })
    }

    /// Classify a batch of amounts sharing one context.
    pub fn classify_all(
        &mut self,
        amounts: &[u64],
        context: Option<&PriceContext>,
    ) -> Vec<Option<Classification>> {
        amounts
            .iter()
            .map(|&amount| self.classify(amount, context))
            .collect()
    }

    /// Drop cached classifiers once a batch is finished.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> AccuracyClassifier<'static> {
        AccuracyClassifier::new(OracleConfig::default(), RoundTables::shared())
    }

    #[test]
    fn test_missing_context_is_skipped() {
        let mut c = classifier();
        assert!(c.classify(100_000_000, None).is_none());
        let invalid = PriceContext::range(0.0, 0.0);
        assert!(c.classify(100_000_000, Some(&invalid)).is_none());
        assert!(c.cache().is_empty());
    }

    #[test]
    fn test_undefined_amount_is_skipped() {
        let mut c = classifier();
        let ctx = PriceContext::point(50_000.0);
        assert!(c.classify(999, Some(&ctx)).is_none());
        assert!(c.classify(20_000_000_000_000, Some(&ctx)).is_none());
    }

    #[test]
    fn test_dust_is_skipped() {
        let mut c = classifier();
        let ctx = PriceContext::point(50_000.0);
        // $5
        assert!(c.classify(10_000, Some(&ctx)).is_none());
        // $20
        assert!(c.classify(40_000, Some(&ctx)).is_some());
    }

    #[test]
    fn test_error_distance_zero_inside_range() {
        let mut c = classifier();
        let ctx = PriceContext::range(9_000.0, 11_000.0);
        let hit = c.classify(1_000_000, Some(&ctx)).unwrap();
        assert_eq!(hit.category, AccuracyCategory::Accurate);
        assert_eq!(hit.error, 0.0);

        let close = c.classify(833_333, Some(&ctx)).unwrap();
        assert_eq!(close.category, AccuracyCategory::Close);
        assert!(close.error > 0.0 && close.error < 0.15);
    }

    #[test]
    fn test_cache_reused_across_amounts() {
        let mut c = classifier();
        let ctx = PriceContext::range(9_000.0, 11_000.0);
        let results = c.classify_all(&[1_000_000, 2_000_000, 5_000_000, 500], Some(&ctx));
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 3);
        assert_eq!(c.cache().len(), 1);
        assert_eq!(c.cache().stats(), (2, 1));

        c.reset_cache();
        assert!(c.cache().is_empty());
    }

    #[test]
    fn test_sub_dollar_contexts() {
        let mut c = classifier();

        // 10,000 coins at $0.06-$0.08 is still a regular, classifiable output.
        let cents = PriceContext::range(0.06, 0.08);
        let result = c.classify(1_000_000_000_000, Some(&cents)).unwrap();
        assert_eq!(result.log_phase.decade, 12);
        assert!(result.implied_price > 0.01 && result.implied_price < 1.0);

        // $500 at $0.65
        let ctx = PriceContext::range(0.62, 0.68);
        let result = c.classify(76_923_076_923, Some(&ctx)).unwrap();
        assert_eq!(result.category, AccuracyCategory::Accurate);
        assert_eq!(result.error, 0.0);
        assert!((result.implied_price - 0.65).abs() / 0.65 < 0.05);
        assert_eq!(c.cache().len(), 2);
    }
}
