//! Period analysis pipeline.
//!
//! One period (usually a calendar month) is processed day by day: each day is
//! fully loaded and assembled, then every record is classified against the
//! day's price and aggregated, and the day's amounts are searched blind. The
//! period report is produced only after the last day, so a failed fetch or
//! alignment check leaves no partial result behind.

use std::collections::BTreeMap;

use phase_oracle::{
    differential, AccuracyCategory, AccuracyClassifier, Decomposer, DifferentialReport,
    FeatureExtractor, OracleConfig, PhaseSearch, PhaseSearchResult, PriceContext, RoundDetector,
    RoundTables, StatsAggregate, StatsSnapshot,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ScanError,
    ingest::{load_day, DayBatch},
    loader::{RangeDataLoader, SeriesSource},
    series::Period,
};

/// Categories compared by the differential report.
pub const DIFFERENTIAL_BASELINE: AccuracyCategory = AccuracyCategory::Accurate;
pub const DIFFERENTIAL_CONTRAST: AccuracyCategory = AccuracyCategory::Noise;

/// Per-day line of a period report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: String,
    pub outputs: u64,
    pub classified: u64,
    pub skipped: u64,
    pub coinbase_outputs_skipped: u64,
    pub context: Option<PriceContext>,
    pub detected_phase: f64,
    pub match_count: u64,
    /// Blind estimate placed in the decade nearest the day's reference price.
    pub implied_price: Option<f64>,
}

/// Everything learned about one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub period: String,
    pub first_day: String,
    pub last_day: String,
    pub days: u64,
    pub days_without_price: u64,
    pub outputs: u64,
    pub classified: u64,
    pub skipped: u64,
    pub category_totals: BTreeMap<String, u64>,
    /// Blind search over every output of the period.
    pub phase_search: PhaseSearchResult,
    /// Mean of the daily reference prices.
    pub reference_price: Option<f64>,
    pub implied_price: Option<f64>,
    pub daily: Vec<DaySummary>,
    pub statistics: StatsSnapshot,
    pub differential: DifferentialReport,
    /// Timestamp of report creation (RFC 3339)
    pub generated_at: String,
}

impl PeriodReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Synchronous accumulator fed one assembled day at a time.
pub struct PeriodAccumulator<'a> {
    classifier: AccuracyClassifier<'a>,
    extractor: FeatureExtractor<'a>,
    search: PhaseSearch,
    decomposer: Decomposer,
    stats: StatsAggregate,
    blind: PhaseSearchResult,
    daily: Vec<DaySummary>,
    reference_sum: f64,
    priced_days: u64,
}

impl<'a> PeriodAccumulator<'a> {
    pub fn new(config: OracleConfig, tables: &'a RoundTables) -> Self {
        let search = PhaseSearch::from_config(&config.search, tables);
        Self {
            classifier: AccuracyClassifier::new(config, tables),
            extractor: FeatureExtractor::new(RoundDetector::from_config(tables, &config)),
            blind: PhaseSearchResult::no_signal(search.resolution()),
            search,
            decomposer: Decomposer::from_config(&config.decomposer),
            stats: StatsAggregate::new(),
            daily: Vec::new(),
            reference_sum: 0.0,
            priced_days: 0,
        }
    }

    pub fn stats(&self) -> &StatsAggregate {
        &self.stats
    }

    /// Classify, aggregate and search one day.
    pub fn add_day(&mut self, batch: &DayBatch) -> DaySummary {
        let context = batch.context.filter(|c| c.is_valid());
        match &context {
            Some(ctx) => {
                self.reference_sum += ctx.reference();
                self.priced_days += 1;
            }
            None => tracing::warn!("No price for {}; outputs excluded from calibration", batch.date),
        }

        // Classify the whole day before touching the shared counters.
        let mut day_stats = StatsAggregate::new();
        for record in &batch.records {
            let classified = context.as_ref().and_then(|ctx| {
                self.classifier
                    .classify(record.amount, Some(ctx))
                    .map(|c| (ctx, c))
            });
            match classified {
                Some((ctx, c)) => {
                    day_stats.record(c.category, &self.extractor.extract(record, ctx, &c))
                }
                None => day_stats.record_skipped(),
            }
        }
        self.stats.merge(&day_stats);

        let day_search = self.search.search(&batch.amounts(), &self.decomposer);
        self.blind.merge(&day_search);

        let summary = DaySummary {
            date: batch.date.to_string(),
            outputs: batch.records.len() as u64,
            classified: day_stats.classified(),
            skipped: day_stats.skipped(),
            coinbase_outputs_skipped: batch.coinbase_outputs_skipped,
            context,
            detected_phase: day_search.detected_phase,
            match_count: day_search.match_count,
            implied_price: context.and_then(|ctx| day_search.price_near(ctx.reference())),
        };
        tracing::info!(
            "{}: {} outputs, {} classified, {} skipped, phase {:.2}",
            summary.date,
            summary.outputs,
            summary.classified,
            summary.skipped,
            summary.detected_phase
        );

        let (hits, misses) = self.classifier.cache().stats();
        tracing::debug!("Bin classifier cache: {} hits, {} misses", hits, misses);
        self.daily.push(summary.clone());
        summary
    }

    /// Final report for `period`.
    pub fn finish(mut self, period: &Period) -> PeriodReport {
        self.classifier.reset_cache();

        let reference_price =
            (self.priced_days > 0).then(|| self.reference_sum / self.priced_days as f64);
        let implied_price = reference_price.and_then(|r| self.blind.price_near(r));
        let category_totals = AccuracyCategory::ALL
            .iter()
            .map(|&c| (c.as_str().to_string(), self.stats.total(c)))
            .collect();

        PeriodReport {
            period: period.label(),
            first_day: period.start().to_string(),
            last_day: period.last().to_string(),
            days: self.daily.len() as u64,
            days_without_price: self.daily.iter().filter(|d| d.context.is_none()).count() as u64,
            outputs: self.daily.iter().map(|d| d.outputs).sum(),
            classified: self.stats.classified(),
            skipped: self.stats.skipped(),
            category_totals,
            phase_search: self.blind,
            reference_price,
            implied_price,
            daily: self.daily,
            statistics: self.stats.snapshot(),
            differential: differential(&self.stats, DIFFERENTIAL_BASELINE, DIFFERENTIAL_CONTRAST),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Loads and analyzes periods through a [`RangeDataLoader`].
pub struct PeriodAnalyzer<'a, S> {
    loader: &'a RangeDataLoader<S>,
    config: OracleConfig,
    include_coinbase: bool,
}

impl<'a, S: SeriesSource> PeriodAnalyzer<'a, S> {
    pub fn new(loader: &'a RangeDataLoader<S>, config: OracleConfig, include_coinbase: bool) -> Self {
        Self {
            loader,
            config,
            include_coinbase,
        }
    }

    pub async fn analyze(&self, period: &Period) -> Result<PeriodReport, ScanError> {
        self.config.validate()?;
        tracing::info!(
            "Analyzing {} ({} days from {})",
            period.label(),
            period.len_days(),
            period.start()
        );

        let mut accumulator = PeriodAccumulator::new(self.config, RoundTables::shared());
        for date_index in period.date_indices() {
            let batch = load_day(self.loader, date_index, self.include_coinbase).await?;
            accumulator.add_day(&batch);
        }

        let report = accumulator.finish(period);
        tracing::info!(
            "Finished {}: {} outputs, {} classified, detected phase {:.2} ({} matches)",
            report.period,
            report.outputs,
            report.classified,
            report.phase_search.detected_phase,
            report.phase_search.match_count
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::RawDay;
    use phase_oracle::OutputType;

    fn day(date_index: u64, ohlc: Option<[f64; 4]>) -> DayBatch {
        // One 1-in/2-out payment: $100 and change at roughly $60k.
        RawDay {
            date_index,
            ohlc,
            tx_first_output: vec![10, 12],
            tx_first_input: vec![20, 21],
            base_sizes: vec![140],
            total_sizes: vec![250],
            values: vec![166_667, 4_833_333],
            output_types: vec![OutputType::P2wpkh, OutputType::P2tr],
            spent_outputs: vec![Some(3)],
        }
        .assemble(false)
        .unwrap()
    }

    #[test]
    fn test_identical_days_double_the_period() {
        let ohlc = Some([60_000.0, 60_000.0, 60_000.0, 60_000.0]);
        let tables = RoundTables::shared();

        let mut one = PeriodAccumulator::new(OracleConfig::default(), tables);
        let summary = one.add_day(&day(5_500, ohlc));
        assert_eq!(summary.outputs, 2);
        assert_eq!(summary.classified + summary.skipped, 2);

        let mut two = PeriodAccumulator::new(OracleConfig::default(), tables);
        two.add_day(&day(5_500, ohlc));
        two.add_day(&day(5_501, ohlc));

        assert_eq!(two.stats().classified(), 2 * one.stats().classified());
        let period = Period::days(
            crate::series::index_date(5_500).unwrap(),
            crate::series::index_date(5_501).unwrap(),
        )
        .unwrap();
        let (a, b) = (one.finish(&period), two.finish(&period));
        assert_eq!(b.phase_search.sample_size, 2 * a.phase_search.sample_size);
        assert_eq!(b.phase_search.detected_phase, a.phase_search.detected_phase);
        assert_eq!(b.reference_price, Some(60_000.0));
    }

    #[test]
    fn test_unpriced_day_is_searched_but_not_classified() {
        let mut acc = PeriodAccumulator::new(OracleConfig::default(), RoundTables::shared());
        let summary = acc.add_day(&day(5_500, None));
        assert_eq!(summary.classified, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.implied_price, None);

        let period = Period::days(
            crate::series::index_date(5_500).unwrap(),
            crate::series::index_date(5_500).unwrap(),
        )
        .unwrap();
        let report = acc.finish(&period);
        assert_eq!(report.days_without_price, 1);
        assert_eq!(report.reference_price, None);
        assert_eq!(report.phase_search.sample_size, 2);
    }
}
