//! Blind phase search.
//!
//! For a candidate price phase `p`, a payment of a round currency value with
//! anchor phase `a` has an amount phase of `(a - p) mod 1`. Each candidate on
//! a fixed grid is scored by how many observed amounts land within the
//! tolerance of any expected amount phase, and the best-scoring candidate is
//! the detected price phase.
//!
//! The anchor set is not uniformly spaced, so there is no closed form; the
//! grid is scanned exhaustively. Observed phases are sorted once and every
//! candidate is scored with binary searches over the merged match windows,
//! which keeps each amount counted at most once per candidate.

use serde::{Deserialize, Serialize};

use crate::{
    config::SearchConfig,
    decompose::{wrap_phase, Decomposer, LogPhase},
    round::RoundTables,
};

/// Outcome of one blind search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSearchResult {
    /// Best-scoring candidate price phase, in `[0, 1)`.
    pub detected_phase: f64,
    /// Number of amounts matched at the detected phase.
    pub match_count: u64,
    /// Score of every candidate, in grid order.
    pub histogram: Vec<u64>,
    /// Number of decomposable amounts searched.
    pub sample_size: u64,
}

impl PhaseSearchResult {
    /// Zero-confidence result for an empty or fully out-of-range sample.
    pub fn no_signal(resolution: usize) -> Self {
        Self {
            detected_phase: 0.0,
            match_count: 0,
            histogram: vec![0; resolution],
            sample_size: 0,
        }
    }

    /// Result for a precomputed score histogram; the first maximal candidate
    /// wins.
    pub fn from_histogram(histogram: Vec<u64>, sample_size: u64) -> Self {
        let mut best = 0;
        for (i, &score) in histogram.iter().enumerate() {
            if score > histogram[best] {
                best = i;
            }
        }
        Self {
            detected_phase: best as f64 / histogram.len().max(1) as f64,
            match_count: histogram.get(best).copied().unwrap_or(0),
            sample_size,
            histogram,
        }
    }

    /// Fold in the result of a disjoint sample searched on the same grid.
    ///
    /// Every amount is scored independently, so the merged histogram equals
    /// the histogram of the combined sample.
    ///
    /// # Panics
    ///
    /// If the two results were searched at different resolutions.
    pub fn merge(&mut self, other: &PhaseSearchResult) {
        assert_eq!(
            self.histogram.len(),
            other.histogram.len(),
            "cannot merge phase searches of different resolutions"
        );
        for (a, b) in self.histogram.iter_mut().zip(&other.histogram) {
            *a += b;
        }
        let histogram = std::mem::take(&mut self.histogram);
        *self = Self::from_histogram(histogram, self.sample_size + other.sample_size);
    }

    pub fn has_signal(&self) -> bool {
        self.match_count > 0
    }

    /// Fraction of the sample matched at the detected phase.
    pub fn match_ratio(&self) -> f64 {
        if self.sample_size == 0 {
            0.0
        } else {
            self.match_count as f64 / self.sample_size as f64
        }
    }

    /// Price implied by the detected phase in a given decade.
    pub fn price_in_decade(&self, decade: i32) -> f64 {
        10f64.powf(decade as f64 + self.detected_phase)
    }

    /// Price implied by the detected phase in the decade closest to a rough
    /// reference (e.g. yesterday's estimate).
    pub fn price_near(&self, reference: f64) -> Option<f64> {
        if !self.has_signal() {
            return None;
        }
        let reference = LogPhase::of(reference)?;
        let reference_log = reference.decade as f64 + reference.phase;
        let decade = (reference_log - self.detected_phase).round() as i32;
        Some(self.price_in_decade(decade))
    }
}

/// Matched-filter search over candidate price phases.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSearch {
    resolution: usize,
    tolerance: f64,
    anchors: Vec<f64>,
}

impl PhaseSearch {
    pub fn new(resolution: usize, tolerance: f64, anchors: Vec<f64>) -> Self {
        Self {
            resolution: resolution.max(1),
            tolerance: tolerance.clamp(0.0, 0.5),
            anchors,
        }
    }

    /// Search using the round-currency anchors of `tables`.
    pub fn from_config(config: &SearchConfig, tables: &RoundTables) -> Self {
        Self::new(
            config.resolution,
            config.tolerance,
            tables.anchor_phases().to_vec(),
        )
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Candidate phase at grid index `i`.
    pub fn candidate(&self, i: usize) -> f64 {
        i as f64 / self.resolution as f64
    }

    /// Search raw amounts; amounts the decomposer rejects are skipped.
    pub fn search(&self, amounts: &[u64], decomposer: &Decomposer) -> PhaseSearchResult {
        let phases: Vec<f64> = amounts
            .iter()
            .filter_map(|&a| decomposer.decompose(a))
            .map(|lp| lp.phase)
            .collect();
        self.search_phases(phases)
    }

    /// Search already-decomposed phases.
    pub fn search_phases(&self, mut phases: Vec<f64>) -> PhaseSearchResult {
        if phases.is_empty() {
            return PhaseSearchResult::no_signal(self.resolution);
        }
        phases.sort_unstable_by(f64::total_cmp);

        let histogram: Vec<u64> = (0..self.resolution)
            .map(|i| self.score_sorted(&phases, self.candidate(i)))
            .collect();

        PhaseSearchResult::from_histogram(histogram, phases.len() as u64)
    }

    /// Number of phases in `sorted` (ascending) within tolerance of any
    /// expected amount phase for candidate price phase `candidate`.
    pub fn score_sorted(&self, sorted: &[f64], candidate: f64) -> u64 {
        if self.tolerance >= 0.5 {
            return sorted.len() as u64;
        }

        let mut windows: Vec<(f64, f64)> = Vec::with_capacity(self.anchors.len() * 2);
        for &anchor in &self.anchors {
            let center = wrap_phase(anchor - candidate);
            let lo = center - self.tolerance;
            let hi = center + self.tolerance;
            if lo < 0.0 {
                windows.push((lo + 1.0, 1.0));
                windows.push((0.0, hi));
            } else if hi >= 1.0 {
                windows.push((lo, 1.0));
                windows.push((0.0, hi - 1.0));
            } else {
                windows.push((lo, hi));
            }
        }
        windows.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(windows.len());
        for (lo, hi) in windows {
            match merged.last_mut() {
                Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
                _ => merged.push((lo, hi)),
            }
        }

        merged
            .iter()
            .map(|&(lo, hi)| {
                let start = sorted.partition_point(|&x| x < lo);
                let end = sorted.partition_point(|&x| x <= hi);
                end.saturating_sub(start) as u64
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::RoundTables;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn search(tolerance: f64) -> PhaseSearch {
        PhaseSearch::new(100, tolerance, RoundTables::shared().anchor_phases().to_vec())
    }

    fn shifted_amounts(price_phase: f64, decade: i32) -> Vec<u64> {
        RoundTables::shared()
            .anchor_phases()
            .iter()
            .map(|&a| 10f64.powf(decade as f64 + wrap_phase(a - price_phase)).round() as u64)
            .collect()
    }

    #[test]
    fn test_empty_input_is_no_signal() {
        let result = search(0.02).search(&[], &Decomposer::default());
        assert_eq!(result.detected_phase, 0.0);
        assert_eq!(result.match_count, 0);
        assert!(!result.has_signal());
        assert_eq!(result.histogram.len(), 100);
        assert_eq!(result.price_near(50_000.0), None);
    }

    #[test]
    fn test_out_of_range_input_is_no_signal() {
        let result = search(0.02).search(&[0, 5, 999, u64::MAX], &Decomposer::default());
        assert_eq!(result, PhaseSearchResult::no_signal(100));
    }

    #[test]
    fn test_recovers_injected_phase() {
        let amounts = shifted_amounts(0.37, 8);
        let result = search(0.004).search(&amounts, &Decomposer::default());
        assert!((result.detected_phase - 0.37).abs() < 1e-9);
        assert_eq!(result.match_count, amounts.len() as u64);
        assert_eq!(result.sample_size, amounts.len() as u64);
    }

    #[test]
    #[should_panic(expected = "different resolutions")]
    fn test_merge_rejects_other_resolution() {
        let mut coarse = PhaseSearchResult::no_signal(100);
        coarse.merge(&PhaseSearchResult::no_signal(200));
    }

    #[test]
    fn test_default_tolerance_plateau_is_first_found() {
        let amounts = shifted_amounts(0.37, 8);
        let result = search(0.02).search(&amounts, &Decomposer::default());
        assert_eq!(result.match_count, amounts.len() as u64);
        assert!(result.detected_phase <= 0.37 + 1e-9);
        assert!(0.37 - result.detected_phase <= 0.02 + 1e-9);
    }

    #[test]
    fn test_recovers_phase_under_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut amounts = Vec::new();
        for _ in 0..50 {
            amounts.extend(shifted_amounts(0.62, rng.gen_range(5..10)));
        }
        for _ in 0..200 {
            amounts.push(rng.gen_range(10_000..10_000_000_000));
        }
        let result = search(0.005).search(&amounts, &Decomposer::default());
        assert!((result.detected_phase - 0.62).abs() < 0.011);
        assert!(result.match_count >= 550);
    }

    #[test]
    fn test_wraparound_window() {
        // An amount just below a power of ten matches the $1 anchor at p = 0.
        let s = PhaseSearch::new(100, 0.01, vec![0.0]);
        assert_eq!(s.score_sorted(&[0.995], 0.0), 1);
        assert_eq!(s.score_sorted(&[0.005], 0.0), 1);
        assert_eq!(s.score_sorted(&[0.5], 0.0), 0);
    }

    #[test]
    fn test_overlapping_windows_count_once() {
        let s = PhaseSearch::new(10, 0.1, vec![0.30, 0.35]);
        assert_eq!(s.score_sorted(&[0.32], 0.0), 1);
    }

    #[test]
    fn test_merge_equals_combined_search() {
        let s = search(0.01);
        let first = shifted_amounts(0.21, 6);
        let second = shifted_amounts(0.21, 9);
        let mut merged = s.search(&first, &Decomposer::default());
        merged.merge(&s.search(&second, &Decomposer::default()));

        let all: Vec<u64> = first.iter().chain(&second).copied().collect();
        assert_eq!(merged, s.search(&all, &Decomposer::default()));

        let mut empty = PhaseSearchResult::no_signal(100);
        empty.merge(&merged);
        assert_eq!(empty, merged);
    }

    #[test]
    fn test_price_near() {
        let result = PhaseSearchResult {
            detected_phase: 0.7,
            match_count: 10,
            histogram: vec![],
            sample_size: 10,
        };
        let price = result.price_near(40_000.0).unwrap();
        assert!((price - 50_118.7).abs() < 1.0);
        let price = result.price_near(4_000.0).unwrap();
        assert!((price - 5_011.87).abs() < 0.1);
    }

    proptest! {
        #[test]
        fn prop_wider_tolerance_never_scores_less(
            phases in proptest::collection::vec(0.0f64..1.0, 0..200),
            candidate in 0usize..100,
            narrow in 0.0f64..0.25,
            extra in 0.0f64..0.25,
        ) {
            let mut sorted = phases;
            sorted.sort_by(f64::total_cmp);
            let anchors = RoundTables::shared().anchor_phases().to_vec();
            let a = PhaseSearch::new(100, narrow, anchors.clone());
            let b = PhaseSearch::new(100, narrow + extra, anchors);
            let p = a.candidate(candidate);
            prop_assert!(b.score_sorted(&sorted, p) >= a.score_sorted(&sorted, p));
        }

        #[test]
        fn prop_score_never_exceeds_sample(
            phases in proptest::collection::vec(0.0f64..1.0, 0..200),
            candidate in 0.0f64..1.0,
        ) {
            let mut sorted = phases;
            sorted.sort_by(f64::total_cmp);
            let s = search(0.05);
            prop_assert!(s.score_sorted(&sorted, candidate) <= sorted.len() as u64);
        }
    }
}
