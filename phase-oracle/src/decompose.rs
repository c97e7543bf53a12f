//! Log-phase / decade decomposition of amounts.
//!
//! An amount `A` is split into `log10(A) = decade + phase` with
//! `phase ∈ [0, 1)`. Humans round payments to nice currency values, so the
//! phase of a payment's amount in the asset's smallest unit sits at a fixed
//! offset from the phase of the exchange rate.

use serde::{Deserialize, Serialize};

use crate::config::DecomposerConfig;

/// Position of a positive value on a log10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogPhase {
    /// Fractional part of log10, in `[0, 1)`.
    pub phase: f64,
    /// Integer part of log10.
    pub decade: i32,
}

impl LogPhase {
    /// Decompose any positive, finite value.
    ///
    /// Returns `None` for zero, negative and non-finite inputs.
    pub fn of(value: f64) -> Option<Self> {
        if !(value.is_finite() && value > 0.0) {
            return None;
        }
        let log = value.log10();
        let decade = log.floor();
        let mut phase = log - decade;
        let mut decade = decade as i32;
        // log - floor(log) can round up to exactly 1.0 for values just below a power of ten
        if phase >= 1.0 {
            phase -= 1.0;
            decade += 1;
        }
        Some(Self { phase, decade })
    }

    /// Reconstruct `10^(decade + phase)`.
    pub fn value(&self) -> f64 {
        10f64.powf(self.decade as f64 + self.phase)
    }

    /// Phase bin at the given number of bins per decade.
    pub fn bin(&self, resolution: usize) -> usize {
        phase_bin(self.phase, resolution)
    }
}

/// Bin index of a phase at `resolution` bins per decade.
pub fn phase_bin(phase: f64, resolution: usize) -> usize {
    let bin = (phase * resolution as f64).floor();
    if bin <= 0.0 {
        0
    } else {
        (bin as usize).min(resolution.saturating_sub(1))
    }
}

/// Wrap any real number into `[0, 1)`.
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(1.0);
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shortest distance between two phases on the unit circle.
pub fn phase_distance(a: f64, b: f64) -> f64 {
    let d = wrap_phase(a - b);
    d.min(1.0 - d)
}

/// Decomposes amounts that fall inside a configured valid range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposer {
    floor: u64,
    ceiling: u64,
}

impl Decomposer {
    /// Create a decomposer accepting amounts in `[floor, ceiling]`.
    pub fn new(floor: u64, ceiling: u64) -> Self {
        Self {
            floor: floor.max(1),
            ceiling,
        }
    }

    pub fn from_config(config: &DecomposerConfig) -> Self {
        Self::new(config.floor, config.ceiling)
    }

    /// Whether an amount is inside the decomposable range.
    pub fn is_defined(&self, amount: u64) -> bool {
        amount >= self.floor && amount <= self.ceiling
    }

    /// Decompose an amount, or `None` if it lies outside `[floor, ceiling]`.
    pub fn decompose(&self, amount: u64) -> Option<LogPhase> {
        if !self.is_defined(amount) {
            return None;
        }
        LogPhase::of(amount as f64)
    }

    pub fn floor(&self) -> u64 {
        self.floor
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::from_config(&DecomposerConfig::default())
    }
}
