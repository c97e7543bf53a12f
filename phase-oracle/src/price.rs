//! Price contexts used in calibration mode.

use serde::{Deserialize, Serialize};

/// Known price for a calendar day: a single reference price or a daily range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PriceContext {
    Point { price: f64 },
    Range { low: f64, high: f64 },
}

/// Significant digits kept by a [`ContextKey`].
pub const KEY_SIGNIFICANT_DIGITS: i32 = 4;

/// A price rounded to [`KEY_SIGNIFICANT_DIGITS`] significant digits:
/// `mantissa × 10^exponent`. Non-positive or non-finite prices map to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundedPrice {
    exponent: i32,
    mantissa: u32,
}

impl RoundedPrice {
    pub const ZERO: RoundedPrice = RoundedPrice {
        exponent: 0,
        mantissa: 0,
    };

    pub fn new(price: f64) -> Self {
        if !(price.is_finite() && price > 0.0) {
            return Self::ZERO;
        }
        let digits = KEY_SIGNIFICANT_DIGITS - 1;
        let mut exponent = price.log10().floor() as i32 - digits;
        let mut mantissa = (price / 10f64.powi(exponent)).round() as u32;
        if mantissa >= 10u32.pow(digits as u32 + 1) {
            mantissa /= 10;
            exponent += 1;
        }
        Self { exponent, mantissa }
    }

    pub fn value(self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent)
    }
}

/// Cache key of a [`PriceContext`]. Prices are rounded to a fixed relative
/// precision so that float noise does not fragment the classifier cache at
/// any price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextKey {
    Point(RoundedPrice),
    Range(RoundedPrice, RoundedPrice),
}

impl ContextKey {
    /// The rounded context this key stands for.
    pub fn to_context(self) -> PriceContext {
        match self {
            ContextKey::Point(price) => PriceContext::point(price.value()),
            ContextKey::Range(low, high) => PriceContext::range(low.value(), high.value()),
        }
    }
}

impl PriceContext {
    pub fn point(price: f64) -> Self {
        PriceContext::Point { price }
    }

    pub fn range(low: f64, high: f64) -> Self {
        PriceContext::Range { low, high }
    }

    /// Build a range context from an `[open, high, low, close]` quartet.
    ///
    /// Returns `None` when the quartet has no usable positive range.
    pub fn from_ohlc(ohlc: [f64; 4]) -> Option<Self> {
        let [_, high, low, _] = ohlc;
        let ctx = Self::range(low, high);
        ctx.is_valid().then_some(ctx)
    }

    /// `(low, high)`; a point context has `low == high`.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            PriceContext::Point { price } => (price, price),
            PriceContext::Range { low, high } => (low, high),
        }
    }

    /// Reference price: the point itself or the range midpoint.
    pub fn reference(&self) -> f64 {
        let (low, high) = self.bounds();
        (low + high) / 2.0
    }

    pub fn is_valid(&self) -> bool {
        let (low, high) = self.bounds();
        low.is_finite() && high.is_finite() && low > 0.0 && high >= low
    }

    pub fn key(&self) -> ContextKey {
        match *self {
            PriceContext::Point { price } => ContextKey::Point(RoundedPrice::new(price)),
            PriceContext::Range { low, high } => {
                ContextKey::Range(RoundedPrice::new(low), RoundedPrice::new(high))
            }
        }
    }

    /// Relative distance of `price` outside `[low, high]`; zero inside.
    pub fn error_distance(&self, price: f64) -> f64 {
        let (low, high) = self.bounds();
        if price < low {
            (low - price) / low
        } else if price > high {
            (price - high) / high
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ohlc() {
        let ctx = PriceContext::from_ohlc([10_000.0, 11_000.0, 9_000.0, 10_500.0]).unwrap();
        assert_eq!(ctx.bounds(), (9_000.0, 11_000.0));
        assert_eq!(ctx.reference(), 10_000.0);
        assert!(PriceContext::from_ohlc([0.0, 0.0, 0.0, 0.0]).is_none());
        assert!(PriceContext::from_ohlc([1.0, 5.0, 9.0, 1.0]).is_none());
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= b.abs() * 1e-12, "{} != {}", a, b);
    }

    #[test]
    fn test_key_rounds() {
        assert_eq!(
            PriceContext::range(9_000.2, 10_999.7).key(),
            PriceContext::range(9_000.0, 11_000.0).key()
        );
        let (low, high) = PriceContext::range(9_000.2, 10_999.7)
            .key()
            .to_context()
            .bounds();
        assert_close(low, 9_000.0);
        assert_close(high, 11_000.0);
        assert_close(PriceContext::point(50_004.0).key().to_context().reference(), 50_000.0);
    }

    #[test]
    fn test_key_keeps_sub_dollar_prices() {
        let ctx = PriceContext::range(0.06, 0.08);
        assert_ne!(ctx.key(), PriceContext::range(0.0, 0.0).key());
        let (low, high) = ctx.key().to_context().bounds();
        assert_close(low, 0.06);
        assert_close(high, 0.08);

        assert_ne!(
            PriceContext::range(0.62, 0.68).key(),
            PriceContext::range(1.0, 1.0).key()
        );
        assert_close(PriceContext::point(0.0008).key().to_context().reference(), 0.0008);
    }

    #[test]
    fn test_rounded_price() {
        assert_close(RoundedPrice::new(123_456.0).value(), 123_500.0);
        assert_close(RoundedPrice::new(9_999.6).value(), 10_000.0);
        assert_close(RoundedPrice::new(0.012_345_6).value(), 0.012_35);
        assert_eq!(RoundedPrice::new(0.0), RoundedPrice::ZERO);
        assert_eq!(RoundedPrice::new(-3.0), RoundedPrice::ZERO);
        assert_eq!(RoundedPrice::new(f64::NAN), RoundedPrice::ZERO);
        assert!(RoundedPrice::new(9_000.0) < RoundedPrice::new(11_000.0));
    }

    #[test]
    fn test_error_distance() {
        let ctx = PriceContext::range(9_000.0, 11_000.0);
        assert_eq!(ctx.error_distance(10_000.0), 0.0);
        assert!((ctx.error_distance(8_100.0) - 0.1).abs() < 1e-12);
        assert!((ctx.error_distance(13_200.0) - 0.2).abs() < 1e-12);
    }
}
