//! Indexer series names and calendar helpers.
//!
//! Every series is a positional array: element `i` belongs to entity `i` of
//! the series' index space (date, height, transaction, input or output).

use chrono::{Datelike, Duration, NaiveDate};
use std::ops::Range;

use crate::error::ScanError;

pub const DATE_TO_FIRST_HEIGHT: &str = "dateindex-to-first-height";
pub const DATE_TO_OHLC: &str = "dateindex-to-ohlc";
pub const HEIGHT_TO_FIRST_TX: &str = "height-to-first-txindex";
pub const TX_TO_FIRST_OUTPUT: &str = "txindex-to-first-txoutindex";
pub const TX_TO_FIRST_INPUT: &str = "txindex-to-first-txinindex";
pub const TX_TO_BASE_SIZE: &str = "txindex-to-base-size";
pub const TX_TO_TOTAL_SIZE: &str = "txindex-to-total-size";
pub const OUTPUT_TO_VALUE: &str = "txoutindex-to-value";
pub const OUTPUT_TO_TYPE: &str = "txoutindex-to-outputtype";
pub const INPUT_TO_OUTPUT: &str = "txinindex-to-txoutindex";

/// Day of date index 0.
pub fn genesis_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2009, 1, 3).unwrap_or(NaiveDate::MIN)
}

/// Date index of a calendar day, `None` before genesis.
pub fn date_index(date: NaiveDate) -> Option<u64> {
    u64::try_from((date - genesis_date()).num_days()).ok()
}

/// Calendar day of a date index.
pub fn index_date(index: u64) -> Option<NaiveDate> {
    let days = i64::try_from(index).ok()?;
    genesis_date().checked_add_signed(Duration::try_days(days)?)
}

/// Half-open range of calendar days analyzed as one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    start: NaiveDate,
    end: NaiveDate,
}

impl Period {
    /// Days `from..=to`.
    pub fn days(from: NaiveDate, to: NaiveDate) -> Result<Self, ScanError> {
        if to < from {
            return Err(ScanError::Period(format!("{} is before {}", to, from)));
        }
        if date_index(from).is_none() {
            return Err(ScanError::Period(format!(
                "{} is before genesis ({})",
                from,
                genesis_date()
            )));
        }
        let end = to
            .succ_opt()
            .ok_or_else(|| ScanError::Period(format!("{} has no successor", to)))?;
        Ok(Self { start: from, end })
    }

    /// Every day of a calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, ScanError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| ScanError::Period(format!("no such month {}-{:02}", year, month)))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| ScanError::Period(format!("no month after {}-{:02}", year, month)))?;
        let last = next
            .pred_opt()
            .ok_or_else(|| ScanError::Period(format!("no last day in {}-{:02}", year, month)))?;
        // The genesis month starts on the 3rd.
        Self::days(start.max(genesis_date()), last)
    }

    /// Parse `YYYY-MM`.
    pub fn parse_month(text: &str) -> Result<Self, ScanError> {
        let invalid = || ScanError::Period(format!("expected YYYY-MM, got {:?}", text));
        let (year, month) = text.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::month(year, month)
    }

    /// Parse `YYYY-MM-DD`.
    pub fn parse_date(text: &str) -> Result<NaiveDate, ScanError> {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| ScanError::Period(format!("bad date {:?}: {}", text, e)))
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the period (inclusive).
    pub fn last(&self) -> NaiveDate {
        self.end.pred_opt().unwrap_or(self.start)
    }

    pub fn len_days(&self) -> u64 {
        (self.end - self.start).num_days().max(0) as u64
    }

    /// Date indices covered by the period.
    pub fn date_indices(&self) -> Range<u64> {
        let start = date_index(self.start).unwrap_or(0);
        start..start + self.len_days()
    }

    /// `YYYY-MM` for a whole calendar month, `FROM_TO` otherwise.
    pub fn label(&self) -> String {
        let whole_month = self.start.day() == 1
            && self.end.day() == 1
            && self.len_days() >= 28
            && self.len_days() <= 31;
        if whole_month {
            format!("{}-{:02}", self.start.year(), self.start.month())
        } else {
            format!("{}_{}", self.start, self.last())
        }
    }
}
