//! Tunable constants for decomposition, classification and search.
//!
//! The tolerance values shipped as defaults were chosen empirically against
//! historical data; they are exposed here so they can be recalibrated against
//! other datasets without touching the algorithms.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a configuration is internally inconsistent.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The decomposition floor is above the ceiling.
    #[error("amount floor {floor} must be <= ceiling {ceiling}")]
    InvertedAmountRange { floor: u64, ceiling: u64 },

    /// A floor of zero would allow log10(0).
    #[error("amount floor must be at least 1")]
    ZeroFloor,

    /// A resolution parameter is out of its supported range.
    #[error("{name} must be between 1 and {max}, got {value}")]
    Resolution {
        name: &'static str,
        value: usize,
        max: usize,
    },

    /// A tolerance or threshold is negative, NaN or otherwise unusable.
    #[error("{name} is out of range: {value}")]
    Threshold { name: &'static str, value: f64 },
}

/// Valid range for amount decomposition (in the asset's smallest unit).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DecomposerConfig {
    /// Amounts below this are too small to carry signal.
    #[serde(default = "default_floor")]
    pub floor: u64,

    /// Amounts above this are treated as unrealistic outliers.
    #[serde(default = "default_ceiling")]
    pub ceiling: u64,
}

/// Thresholds separating the accuracy categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccuracyThresholds {
    /// Point mode: maximum relative error for "accurate".
    #[serde(default = "default_point_accurate")]
    pub point_accurate: f64,

    /// Point mode: maximum relative error for "close".
    #[serde(default = "default_point_close")]
    pub point_close: f64,

    /// Range mode: implied price within `[low × (1 - m), high × (1 + m)]` is "accurate".
    #[serde(default = "default_range_accurate_margin")]
    pub range_accurate_margin: f64,

    /// Range mode: implied price within `[low × (1 - m), high × (1 + m)]` is "close".
    #[serde(default = "default_range_close_margin")]
    pub range_close_margin: f64,
}

/// Parameters of the bin classifier used in calibration mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CalibrationConfig {
    /// Number of phase bins per decade.
    #[serde(default = "default_bin_resolution")]
    pub bin_resolution: usize,

    /// Decades searched on either side of the reference price.
    #[serde(default = "default_decade_window")]
    pub decade_window: i32,

    /// Records worth less than this (in currency units, at the reference
    /// price) are excluded from calibration. Zero disables the filter.
    #[serde(default = "default_dust_value_floor")]
    pub dust_value_floor: f64,
}

/// Parameters of the blind phase search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Number of candidate price phases scanned over `[0, 1)`.
    #[serde(default = "default_search_resolution")]
    pub resolution: usize,

    /// Match tolerance in phase units.
    ///
    /// On clean data every candidate within `tolerance` of the true price
    /// phase reaches the same score and the lowest of them is reported, so
    /// the detected phase may sit up to `tolerance` below the true one.
    #[serde(default = "default_search_tolerance")]
    pub tolerance: f64,
}

/// Tolerances of the round-value detectors that are not bin based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoundingConfig {
    /// Relative tolerance of the asset-round detector.
    #[serde(default = "default_asset_tolerance")]
    pub asset_tolerance: f64,
}

/// Complete oracle configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct OracleConfig {
    #[serde(default)]
    pub decomposer: DecomposerConfig,

    #[serde(default)]
    pub thresholds: AccuracyThresholds,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub rounding: RoundingConfig,
}

fn default_floor() -> u64 {
    1_000
}

fn default_ceiling() -> u64 {
    10_000_000_000_000
}

fn default_point_accurate() -> f64 {
    0.15
}

fn default_point_close() -> f64 {
    0.30
}

fn default_range_accurate_margin() -> f64 {
    0.05
}

fn default_range_close_margin() -> f64 {
    0.15
}

fn default_bin_resolution() -> usize {
    100
}

fn default_decade_window() -> i32 {
    4
}

fn default_dust_value_floor() -> f64 {
    10.0
}

fn default_search_resolution() -> usize {
    100
}

fn default_search_tolerance() -> f64 {
    0.02
}

fn default_asset_tolerance() -> f64 {
    0.001
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            ceiling: default_ceiling(),
        }
    }
}

impl Default for AccuracyThresholds {
    fn default() -> Self {
        Self {
            point_accurate: default_point_accurate(),
            point_close: default_point_close(),
            range_accurate_margin: default_range_accurate_margin(),
            range_close_margin: default_range_close_margin(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            bin_resolution: default_bin_resolution(),
            decade_window: default_decade_window(),
            dust_value_floor: default_dust_value_floor(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            resolution: default_search_resolution(),
            tolerance: default_search_tolerance(),
        }
    }
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            asset_tolerance: default_asset_tolerance(),
        }
    }
}

/// Largest supported resolution for bins and search grids.
pub const MAX_RESOLUTION: usize = 100_000;

fn check_fraction(name: &'static str, value: f64, max: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0 && value <= max) {
        return Err(ConfigError::Threshold { name, value });
    }
    Ok(())
}

fn check_resolution(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_RESOLUTION {
        return Err(ConfigError::Resolution {
            name,
            value,
            max: MAX_RESOLUTION,
        });
    }
    Ok(())
}

impl OracleConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decomposer;
        if d.floor == 0 {
            return Err(ConfigError::ZeroFloor);
        }
        if d.floor > d.ceiling {
            return Err(ConfigError::InvertedAmountRange {
                floor: d.floor,
                ceiling: d.ceiling,
            });
        }

        let t = &self.thresholds;
        check_fraction("thresholds.point_accurate", t.point_accurate, 1.0)?;
        check_fraction("thresholds.point_close", t.point_close, 1.0)?;
        check_fraction(
            "thresholds.range_accurate_margin",
            t.range_accurate_margin,
            1.0,
        )?;
        check_fraction("thresholds.range_close_margin", t.range_close_margin, 1.0)?;
        if t.point_close < t.point_accurate {
            return Err(ConfigError::Threshold {
                name: "thresholds.point_close",
                value: t.point_close,
            });
        }
        if t.range_close_margin < t.range_accurate_margin {
            return Err(ConfigError::Threshold {
                name: "thresholds.range_close_margin",
                value: t.range_close_margin,
            });
        }

        let c = &self.calibration;
        check_resolution("calibration.bin_resolution", c.bin_resolution)?;
        if !(0..=12).contains(&c.decade_window) {
            return Err(ConfigError::Threshold {
                name: "calibration.decade_window",
                value: c.decade_window as f64,
            });
        }
        check_fraction("calibration.dust_value_floor", c.dust_value_floor, f64::MAX)?;

        check_resolution("search.resolution", self.search.resolution)?;
        check_fraction("search.tolerance", self.search.tolerance, 0.5)?;

        check_fraction("rounding.asset_tolerance", self.rounding.asset_tolerance, 0.5)?;

        Ok(())
    }
}
