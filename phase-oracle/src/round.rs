//! Round-value detectors.
//!
//! Three independent predicates over a raw amount:
//!
//! - **asset-round**: the amount is a nice quantity of the asset itself
//!   (0.01, 0.5, 1, 10 units...). Binary search over a sorted table.
//! - **currency-round (price independent)**: the amount's phase at 200 bins
//!   per decade sits near the log10 offset of a round currency value. Only the
//!   fractional part matters, so no price is needed. Lookup is a precomputed
//!   per-tolerance bin mask.
//! - **currency-round (price range)**: at the day's price range, the amount is
//!   worth a round currency value from a fixed table.
//!
//! All tables are built once by [`RoundTables::build`] and shared read-only.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::{
    config::OracleConfig,
    decompose::{phase_bin, Decomposer, LogPhase},
    price::PriceContext,
};

/// Smallest units per whole unit of the asset.
pub const SATS_PER_UNIT: u64 = 100_000_000;

/// Resolution at which the price-independent detector works.
pub const PHASE_BINS: usize = 200;

/// Round currency values whose log10 offsets anchor the phase detectors and
/// the blind search.
pub const CURRENCY_ANCHOR_VALUES: [f64; 11] =
    [1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

/// Mantissas assumed by the bin classifier when turning a phase into an
/// implied price.
pub const CLASSIFIER_MANTISSAS: [f64; 4] = [1.0, 2.0, 2.5, 5.0];

/// Multipliers of the asset-round table.
pub const ASSET_ROUND_MULTIPLIERS: [u64; 6] = [1, 10, 20, 30, 50, 100];

/// Powers of ten (in whole units) covered by the asset-round table.
const ASSET_ROUND_EXPONENTS: std::ops::RangeInclusive<i32> = -3..=1;

/// Mantissas of the price-range detector's round-value table.
const ROUND_VALUE_STEPS: [f64; 3] = [1.0, 2.0, 5.0];

/// Largest value in the price-range detector's table.
const ROUND_VALUE_MAX: f64 = 100_000.0;

/// Tolerance levels of the price-independent detector, expressed in bins at
/// [`PHASE_BINS`] resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseTolerance {
    OnePercent,
    TwoPercent,
    FivePercent,
    TenPercent,
}

impl PhaseTolerance {
    pub const ALL: [PhaseTolerance; 4] = [
        PhaseTolerance::OnePercent,
        PhaseTolerance::TwoPercent,
        PhaseTolerance::FivePercent,
        PhaseTolerance::TenPercent,
    ];

    /// Half-width of the match window in bins.
    pub fn bins(self) -> usize {
        match self {
            PhaseTolerance::OnePercent => 2,
            PhaseTolerance::TwoPercent => 4,
            PhaseTolerance::FivePercent => 10,
            PhaseTolerance::TenPercent => 20,
        }
    }

    fn index(self) -> usize {
        match self {
            PhaseTolerance::OnePercent => 0,
            PhaseTolerance::TwoPercent => 1,
            PhaseTolerance::FivePercent => 2,
            PhaseTolerance::TenPercent => 3,
        }
    }
}

lazy_static! {
    static ref SHARED_TABLES: RoundTables = RoundTables::build();
}

/// Immutable lookup tables behind the round-value detectors.
#[derive(Debug, Clone)]
pub struct RoundTables {
    /// Asset-round amounts in smallest units, sorted and deduplicated.
    asset_values: Vec<u64>,

    /// Phases of [`CURRENCY_ANCHOR_VALUES`].
    anchor_phases: Vec<f64>,

    /// Phases of [`CLASSIFIER_MANTISSAS`].
    classifier_phases: Vec<f64>,

    /// One mask per [`PhaseTolerance`]: `mask[bin]` is true when the bin lies
    /// within the tolerance window of any anchor.
    phase_masks: [[bool; PHASE_BINS]; 4],

    /// Round currency values ($1 ... $100,000 in 1/2/5 steps), ascending.
    round_values: Vec<f64>,
}

impl RoundTables {
    /// Build every table from the constants above.
    pub fn build() -> Self {
        let mut asset_values = Vec::new();
        for exp in ASSET_ROUND_EXPONENTS {
            let unit = if exp >= 0 {
                SATS_PER_UNIT * 10u64.pow(exp as u32)
            } else {
                SATS_PER_UNIT / 10u64.pow((-exp) as u32)
            };
            for m in ASSET_ROUND_MULTIPLIERS {
                asset_values.push(m * unit);
            }
        }
        asset_values.sort_unstable();
        asset_values.dedup();

        let anchor_phases = phases_of(&CURRENCY_ANCHOR_VALUES);
        let classifier_phases = phases_of(&CLASSIFIER_MANTISSAS);

        let anchor_bins: Vec<usize> = anchor_phases
            .iter()
            .map(|&p| phase_bin(p, PHASE_BINS))
            .collect();
        let mut phase_masks = [[false; PHASE_BINS]; 4];
        for tolerance in PhaseTolerance::ALL {
            let width = tolerance.bins();
            let mask = &mut phase_masks[tolerance.index()];
            for (bin, slot) in mask.iter_mut().enumerate() {
                *slot = anchor_bins.iter().any(|&a| {
                    let d = bin.abs_diff(a);
                    d.min(PHASE_BINS - d) <= width
                });
            }
        }

        let mut round_values = Vec::new();
        let mut scale = 1.0;
        'outer: loop {
            for step in ROUND_VALUE_STEPS {
                let v = step * scale;
                if v > ROUND_VALUE_MAX {
                    break 'outer;
                }
                round_values.push(v);
            }
            scale *= 10.0;
        }

        Self {
            asset_values,
            anchor_phases,
            classifier_phases,
            phase_masks,
            round_values,
        }
    }

    /// Process-wide tables, built on first use.
    pub fn shared() -> &'static RoundTables {
        &SHARED_TABLES
    }

    pub fn asset_values(&self) -> &[u64] {
        &self.asset_values
    }

    /// Phases of the round-currency anchors, in table order.
    pub fn anchor_phases(&self) -> &[f64] {
        &self.anchor_phases
    }

    pub fn classifier_phases(&self) -> &[f64] {
        &self.classifier_phases
    }

    pub fn round_values(&self) -> &[f64] {
        &self.round_values
    }

    /// Whether `amount` is within `rel_tol` of a tabled asset-round value.
    pub fn is_asset_round(&self, amount: u64, rel_tol: f64) -> bool {
        let idx = self.asset_values.partition_point(|&v| v < amount);
        let near = |v: u64| (amount.abs_diff(v) as f64) <= rel_tol * v as f64;
        self.asset_values.get(idx).is_some_and(|&v| near(v))
            || idx
                .checked_sub(1)
                .and_then(|i| self.asset_values.get(i))
                .is_some_and(|&v| near(v))
    }

    /// Whether a phase falls in the tolerance window of a round-currency anchor.
    pub fn is_currency_round_phase(&self, phase: f64, tolerance: PhaseTolerance) -> bool {
        self.phase_masks[tolerance.index()][phase_bin(phase, PHASE_BINS)]
    }

    /// Round currency value that `units` of the asset plausibly represent on a
    /// day priced in `[low, high]`.
    ///
    /// The candidate is the tabled value nearest (on a log scale) to the value
    /// implied at the range midpoint; it matches when that implied value is
    /// within `rel_tol` of it.
    pub fn round_value_in_range(&self, units: f64, low: f64, high: f64, rel_tol: f64) -> Option<f64> {
        if !(units > 0.0 && low > 0.0 && high >= low) {
            return None;
        }
        let value_at_mid = units * (low + high) / 2.0;
        let idx = self.round_values.partition_point(|&v| v < value_at_mid);

        let above = self.round_values.get(idx).copied();
        let below = idx.checked_sub(1).and_then(|i| self.round_values.get(i)).copied();
        let log_distance = |v: f64| (v / value_at_mid).log10().abs();
        let nearest = match (below, above) {
            (Some(b), Some(a)) if log_distance(b) <= log_distance(a) => b,
            (_, Some(a)) => a,
            (Some(b), None) => b,
            (None, None) => return None,
        };

        ((value_at_mid / nearest - 1.0).abs() <= rel_tol).then_some(nearest)
    }
}

fn phases_of(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|&v| LogPhase::of(v))
        .map(|lp| lp.phase)
        .collect()
}

/// Number of trailing decimal zeros of an amount in smallest units.
///
/// Zero has no meaningful roundness and reports 0.
pub fn trailing_zeros(mut amount: u64) -> u32 {
    if amount == 0 {
        return 0;
    }
    let mut zeros = 0;
    while amount % 10 == 0 {
        amount /= 10;
        zeros += 1;
    }
    zeros
}

/// Amount-level detectors that honour the decomposable range.
///
/// Amounts outside the decomposer's range are never round.
#[derive(Debug, Clone, Copy)]
pub struct RoundDetector<'a> {
    tables: &'a RoundTables,
    decomposer: Decomposer,
    asset_tolerance: f64,
}

impl<'a> RoundDetector<'a> {
    pub fn new(tables: &'a RoundTables, decomposer: Decomposer, asset_tolerance: f64) -> Self {
        Self {
            tables,
            decomposer,
            asset_tolerance,
        }
    }

    pub fn from_config(tables: &'a RoundTables, config: &OracleConfig) -> Self {
        Self::new(
            tables,
            Decomposer::from_config(&config.decomposer),
            config.rounding.asset_tolerance,
        )
    }

    pub fn tables(&self) -> &'a RoundTables {
        self.tables
    }

    pub fn asset_round(&self, amount: u64) -> bool {
        self.decomposer.is_defined(amount)
            && self.tables.is_asset_round(amount, self.asset_tolerance)
    }

    pub fn currency_round(&self, amount: u64, tolerance: PhaseTolerance) -> bool {
        self.decomposer
            .decompose(amount)
            .is_some_and(|lp| self.tables.is_currency_round_phase(lp.phase, tolerance))
    }

    /// Price-range dependent check; a point context is treated as `low == high`.
    pub fn currency_round_in_range(
        &self,
        amount: u64,
        context: &PriceContext,
        rel_tol: f64,
    ) -> bool {
        if !self.decomposer.is_defined(amount) {
            return false;
        }
        let (low, high) = context.bounds();
        let units = amount as f64 / SATS_PER_UNIT as f64;
        self.tables
            .round_value_in_range(units, low, high, rel_tol)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detector(tables: &RoundTables) -> RoundDetector<'_> {
        RoundDetector::from_config(tables, &OracleConfig::default())
    }

    #[test]
    fn test_asset_table_bounds() {
        let tables = RoundTables::shared();
        assert_eq!(tables.asset_values().first(), Some(&100_000));
        assert_eq!(tables.asset_values().last(), Some(&100_000_000_000));
        assert!(tables.asset_values().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_asset_round_examples() {
        let tables = RoundTables::shared();
        let d = detector(tables);
        assert!(d.asset_round(100_000_000));
        assert!(d.asset_round(50_000_000));
        assert!(d.asset_round(3_000_000));
        assert!(!d.asset_round(10_000));
        assert!(!d.asset_round(123_456_789));
        // within 0.1%
        assert!(d.asset_round(100_050_000));
        assert!(!d.asset_round(100_200_000));
    }

    #[test]
    fn test_round_values_table() {
        let tables = RoundTables::shared();
        let values = tables.round_values();
        assert_eq!(values.len(), 16);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[values.len() - 1], 100_000.0);
    }

    #[test]
    fn test_currency_round_phase_wraps() {
        let tables = RoundTables::shared();
        // bin 199 neighbours the $1 anchor at bin 0
        let phase = 199.5 / PHASE_BINS as f64;
        assert!(tables.is_currency_round_phase(phase, PhaseTolerance::OnePercent));
        // between the $1.5 (bin 35) and $2 (bin 60) anchors
        let phase = 48.5 / PHASE_BINS as f64;
        assert!(!tables.is_currency_round_phase(phase, PhaseTolerance::FivePercent));
        assert!(tables.is_currency_round_phase(phase, PhaseTolerance::TenPercent));
    }

    #[test]
    fn test_currency_round_rejects_undefined() {
        let tables = RoundTables::shared();
        let d = detector(tables);
        // 100 sats has phase 0 but is below the floor
        assert!(!d.currency_round(100, PhaseTolerance::TenPercent));
        assert!(d.currency_round(100_000, PhaseTolerance::OnePercent));
    }

    #[test]
    fn test_round_value_in_range() {
        let tables = RoundTables::shared();
        // 0.002 units at ~$50,000 is $100
        let hit = tables.round_value_in_range(0.002, 49_000.0, 51_000.0, 0.01);
        assert_eq!(hit, Some(100.0));
        // 0.0023 units at ~$50,000 is $115, implying $43,478 for $100
        assert_eq!(tables.round_value_in_range(0.0023, 49_000.0, 51_000.0, 0.01), None);
        assert_eq!(tables.round_value_in_range(0.0, 49_000.0, 51_000.0, 0.01), None);
    }

    #[test]
    fn test_range_round_tolerance_is_relative_to_the_value() {
        let tables = RoundTables::shared();
        let d = detector(tables);
        let ctx = PriceContext::range(9_000.0, 11_000.0);
        // $104.90 at the $10,000 midpoint, almost 5% above $100
        assert!(!d.currency_round_in_range(1_049_000, &ctx, 0.01));
        assert!(d.currency_round_in_range(1_049_000, &ctx, 0.05));
        // $100.50 at the midpoint
        assert!(d.currency_round_in_range(1_005_000, &ctx, 0.01));
        // $107 stays unmatched at 5% even though $100 implies a price in the range
        assert!(!d.currency_round_in_range(1_070_000, &ctx, 0.05));
        assert_eq!(tables.round_value_in_range(0.0104, 9_000.0, 11_000.0, 0.05), Some(100.0));
        assert_eq!(tables.round_value_in_range(0.0104, 9_000.0, 11_000.0, 0.01), None);
    }

    #[test]
    fn test_currency_round_in_range_point_context() {
        let tables = RoundTables::shared();
        let d = detector(tables);
        let ctx = PriceContext::point(50_000.0);
        assert!(d.currency_round_in_range(200_000, &ctx, 0.01));
        assert!(!d.currency_round_in_range(230_000, &ctx, 0.01));
    }

    #[test]
    fn test_trailing_zeros() {
        assert_eq!(trailing_zeros(0), 0);
        assert_eq!(trailing_zeros(123), 0);
        assert_eq!(trailing_zeros(1_000), 3);
        assert_eq!(trailing_zeros(120_000), 4);
    }

    proptest! {
        #[test]
        fn prop_tabled_values_are_round(idx in 0usize..24) {
            let tables = RoundTables::shared();
            let values = tables.asset_values();
            let v = values[idx % values.len()];
            prop_assert!(tables.is_asset_round(v, 0.001));
        }

        #[test]
        fn prop_far_values_are_not_round(amount in 1_000u64..1_000_000_000_000u64) {
            let tables = RoundTables::shared();
            let far = tables
                .asset_values()
                .iter()
                .all(|&v| amount.abs_diff(v) as f64 > 0.001 * v as f64);
            if far {
                prop_assert!(!tables.is_asset_round(amount, 0.001));
            }
        }

        #[test]
        fn prop_currency_round_is_decade_invariant(amount in 1_000u64..1_000_000_000_000u64) {
            // Only the phase matters, so shifting a decade (which is what a
            // different price does to the implied decade) never changes it.
            let tables = RoundTables::shared();
            let d = detector(tables);
            for t in PhaseTolerance::ALL {
                prop_assert_eq!(d.currency_round(amount, t), d.currency_round(amount * 10, t));
            }
        }

        #[test]
        fn prop_wider_tolerance_is_superset(amount in 1_000u64..10_000_000_000_000u64) {
            let tables = RoundTables::shared();
            let d = detector(tables);
            let hits: Vec<bool> = PhaseTolerance::ALL
                .iter()
                .map(|&t| d.currency_round(amount, t))
                .collect();
            for w in hits.windows(2) {
                prop_assert!(!w[0] || w[1]);
            }
        }
    }
}
