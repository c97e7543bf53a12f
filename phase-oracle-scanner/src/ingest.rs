//! Day ingestion: fetch a day's columns and join them into output records.
//!
//! A day spans the heights `[first_height[d], first_height[d + 1])`. The
//! per-transaction first-output and first-input arrays are fetched with one
//! extra trailing element so that every transaction, including the last, has
//! an explicit end boundary. All joins are positional; any length or bound
//! violation aborts the day.

use chrono::NaiveDate;
use phase_oracle::{OutputRecord, OutputType, PriceContext, TxSummary};

use crate::{
    error::{AlignmentError, LoaderError, ScanError},
    loader::{RangeDataLoader, SeriesSource},
    series::{self, genesis_date, index_date},
};

/// Columns fetched for one day, before any joins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDay {
    pub date_index: u64,
    pub ohlc: Option<[f64; 4]>,
    /// First output of each transaction, plus the end boundary.
    pub tx_first_output: Vec<u64>,
    /// First input of each transaction, plus the end boundary.
    pub tx_first_input: Vec<u64>,
    pub base_sizes: Vec<u32>,
    pub total_sizes: Vec<u32>,
    pub values: Vec<u64>,
    pub output_types: Vec<OutputType>,
    /// Output spent by each input; `None` for a coinbase input.
    pub spent_outputs: Vec<Option<u64>>,
}

/// Output records of one day with its price context.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBatch {
    pub date_index: u64,
    pub date: NaiveDate,
    pub context: Option<PriceContext>,
    pub records: Vec<OutputRecord>,
    pub transactions: u64,
    pub coinbase_outputs_skipped: u64,
}

impl DayBatch {
    pub fn amounts(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.amount).collect()
    }
}

fn check_len(series: &'static str, expected: usize, got: usize) -> Result<(), AlignmentError> {
    if expected != got {
        return Err(AlignmentError::LengthMismatch {
            series,
            expected,
            got,
        });
    }
    Ok(())
}

fn check_monotonic(series: &'static str, values: &[u64]) -> Result<(), AlignmentError> {
    match values.windows(2).position(|w| w[1] < w[0]) {
        Some(position) => Err(AlignmentError::NonMonotonic {
            series,
            position: position + 1,
        }),
        None => Ok(()),
    }
}

impl RawDay {
    /// Join the columns into per-output records.
    pub fn assemble(&self, include_coinbase: bool) -> Result<DayBatch, AlignmentError> {
        let fo = &self.tx_first_output;
        let fi = &self.tx_first_input;
        if fo.is_empty() {
            return Err(AlignmentError::LengthMismatch {
                series: series::TX_TO_FIRST_OUTPUT,
                expected: 1,
                got: 0,
            });
        }
        let tx_count = fo.len() - 1;
        check_len(series::TX_TO_FIRST_INPUT, fo.len(), fi.len())?;
        check_len(series::TX_TO_BASE_SIZE, tx_count, self.base_sizes.len())?;
        check_len(series::TX_TO_TOTAL_SIZE, tx_count, self.total_sizes.len())?;
        check_monotonic(series::TX_TO_FIRST_OUTPUT, fo)?;
        check_monotonic(series::TX_TO_FIRST_INPUT, fi)?;

        let (out_start, out_end) = (fo[0], fo[tx_count]);
        let (in_start, in_end) = (fi[0], fi[tx_count]);
        let output_len = (out_end - out_start) as usize;
        check_len(series::OUTPUT_TO_VALUE, output_len, self.values.len())?;
        check_len(series::OUTPUT_TO_TYPE, output_len, self.output_types.len())?;
        check_len(
            series::INPUT_TO_OUTPUT,
            (in_end - in_start) as usize,
            self.spent_outputs.len(),
        )?;

        let tx_starts = &fo[..tx_count];
        let mut records = Vec::with_capacity(output_len);
        let mut coinbase_outputs_skipped = 0;

        for tx in 0..tx_count {
            let outputs = (fo[tx] - out_start) as usize..(fo[tx + 1] - out_start) as usize;
            let inputs = (fi[tx] - in_start) as usize..(fi[tx + 1] - in_start) as usize;

            let mut is_coinbase = false;
            let mut spends_same_day = false;
            for link in &self.spent_outputs[inputs.clone()] {
                let Some(spent) = *link else {
                    is_coinbase = true;
                    continue;
                };
                if spent >= out_end {
                    return Err(AlignmentError::OutOfBounds {
                        series: series::INPUT_TO_OUTPUT,
                        index: spent,
                        start: 0,
                        end: out_end,
                    });
                }
                if spent < out_start {
                    continue;
                }
                // Owning transaction of the spent output.
                let owner = tx_starts.partition_point(|&first| first <= spent) - 1;
                if owner >= tx {
                    return Err(AlignmentError::OutOfBounds {
                        series: series::INPUT_TO_OUTPUT,
                        index: spent,
                        start: out_start,
                        end: fo[tx],
                    });
                }
                spends_same_day = true;
            }

            if is_coinbase && !include_coinbase {
                coinbase_outputs_skipped += outputs.len() as u64;
                continue;
            }

            let values = &self.values[outputs.clone()];
            let types = &self.output_types[outputs.clone()];
            let summary = TxSummary {
                input_count: inputs.len() as u32,
                output_count: outputs.len() as u32,
                base_size: self.base_sizes[tx],
                total_size: self.total_sizes[tx],
                spends_same_day,
                has_data_carrier: types.iter().any(|t| t.is_data_carrier()),
                is_coinbase,
                total_value: values.iter().fold(0u64, |acc, &v| acc.saturating_add(v)),
            };

            for (vout, (&amount, &output_type)) in values.iter().zip(types).enumerate() {
                let sibling_amount = (values.len() == 2).then(|| values[1 - vout]);
                records.push(OutputRecord {
                    amount,
                    output_type,
                    vout: vout as u32,
                    tx: summary,
                    sibling_amount,
                });
            }
        }

        Ok(DayBatch {
            date_index: self.date_index,
            date: index_date(self.date_index).unwrap_or_else(genesis_date),
            context: self.ohlc.and_then(PriceContext::from_ohlc),
            records,
            transactions: tx_count as u64,
            coinbase_outputs_skipped,
        })
    }
}

/// Fetch every column for date index `date_index`.
pub async fn fetch_raw_day<S: SeriesSource>(
    loader: &RangeDataLoader<S>,
    date_index: u64,
) -> Result<RawDay, ScanError> {
    let heights: Vec<u64> = loader
        .fetch_array(series::DATE_TO_FIRST_HEIGHT, date_index, date_index + 2)
        .await
        .map_err(|e| match e {
            LoaderError::ShortRead { .. } => {
                ScanError::Alignment(AlignmentError::MissingBoundary { date_index })
            }
            other => other.into(),
        })?;
    let (first_height, end_height) = (heights[0], heights[1]);
    if end_height < first_height {
        return Err(AlignmentError::NonMonotonic {
            series: series::DATE_TO_FIRST_HEIGHT,
            position: 1,
        }
        .into());
    }

    let first_tx: u64 = loader
        .fetch_value(series::HEIGHT_TO_FIRST_TX, first_height)
        .await?;
    let end_tx: u64 = loader
        .fetch_value(series::HEIGHT_TO_FIRST_TX, end_height)
        .await?;
    if end_tx < first_tx {
        return Err(AlignmentError::NonMonotonic {
            series: series::HEIGHT_TO_FIRST_TX,
            position: 1,
        }
        .into());
    }

    let tx_first_output: Vec<u64> = loader
        .fetch_array(series::TX_TO_FIRST_OUTPUT, first_tx, end_tx + 1)
        .await?;
    let tx_first_input: Vec<u64> = loader
        .fetch_array(series::TX_TO_FIRST_INPUT, first_tx, end_tx + 1)
        .await?;
    let base_sizes = loader
        .fetch_array(series::TX_TO_BASE_SIZE, first_tx, end_tx)
        .await?;
    let total_sizes = loader
        .fetch_array(series::TX_TO_TOTAL_SIZE, first_tx, end_tx)
        .await?;

    let (out_start, out_end) = boundary(&tx_first_output, series::TX_TO_FIRST_OUTPUT)?;
    let (in_start, in_end) = boundary(&tx_first_input, series::TX_TO_FIRST_INPUT)?;
    let values = loader
        .fetch_array(series::OUTPUT_TO_VALUE, out_start, out_end)
        .await?;
    let output_types = loader
        .fetch_array(series::OUTPUT_TO_TYPE, out_start, out_end)
        .await?;
    let spent_outputs = loader
        .fetch_array(series::INPUT_TO_OUTPUT, in_start, in_end)
        .await?;

    let mut ohlc: Vec<Option<[f64; 4]>> = loader
        .fetch_array(series::DATE_TO_OHLC, date_index, date_index + 1)
        .await?;

    Ok(RawDay {
        date_index,
        ohlc: ohlc.pop().flatten(),
        tx_first_output,
        tx_first_input,
        base_sizes,
        total_sizes,
        values,
        output_types,
        spent_outputs,
    })
}

fn boundary(values: &[u64], series: &'static str) -> Result<(u64, u64), AlignmentError> {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if last >= first => Ok((first, last)),
        (Some(_), Some(_)) => Err(AlignmentError::NonMonotonic {
            series,
            position: values.len() - 1,
        }),
        _ => Err(AlignmentError::LengthMismatch {
            series,
            expected: 1,
            got: 0,
        }),
    }
}

/// Fetch and assemble one day.
pub async fn load_day<S: SeriesSource>(
    loader: &RangeDataLoader<S>,
    date_index: u64,
    include_coinbase: bool,
) -> Result<DayBatch, ScanError> {
    let raw = fetch_raw_day(loader, date_index).await?;
    Ok(raw.assemble(include_coinbase)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three transactions: a coinbase, a 1-in/2-out payment spending an
    /// earlier day's output, and a 2-in/1-out spend of the payment's change.
    fn raw_day() -> RawDay {
        RawDay {
            date_index: 5_000,
            ohlc: Some([30_000.0, 31_000.0, 29_000.0, 30_500.0]),
            tx_first_output: vec![100, 101, 103, 104],
            tx_first_input: vec![50, 51, 52, 54],
            base_sizes: vec![120, 150, 300],
            total_sizes: vec![200, 260, 520],
            values: vec![625_000_000, 3_000_000, 47_000_000, 49_990_000],
            output_types: vec![
                OutputType::P2wpkh,
                OutputType::P2wpkh,
                OutputType::P2tr,
                OutputType::P2wsh,
            ],
            spent_outputs: vec![None, Some(42), Some(102), Some(77)],
        }
    }

    #[test]
    fn test_assemble_joins_columns() {
        let batch = raw_day().assemble(true).unwrap();
        assert_eq!(batch.transactions, 3);
        assert_eq!(batch.records.len(), 4);
        assert_eq!(batch.context, Some(PriceContext::range(29_000.0, 31_000.0)));
        assert_eq!(batch.date, index_date(5_000).unwrap());

        let coinbase = &batch.records[0];
        assert!(coinbase.tx.is_coinbase);

        let payment = &batch.records[1];
        assert_eq!(payment.tx.input_count, 1);
        assert_eq!(payment.tx.output_count, 2);
        assert_eq!(payment.vout, 0);
        assert_eq!(payment.sibling_amount, Some(47_000_000));
        assert_eq!(payment.tx.total_value, 50_000_000);
        assert_eq!(payment.tx.witness_size(), 110);
        assert!(!payment.tx.spends_same_day);
        assert_eq!(batch.records[2].sibling_amount, Some(3_000_000));
        assert_eq!(batch.records[2].vout, 1);

        let spend = &batch.records[3];
        assert_eq!(spend.tx.input_count, 2);
        assert!(spend.tx.spends_same_day);
        assert_eq!(spend.sibling_amount, None);
    }

    #[test]
    fn test_coinbase_excluded_by_default() {
        let batch = raw_day().assemble(false).unwrap();
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.coinbase_outputs_skipped, 1);
        assert!(batch.records.iter().all(|r| !r.tx.is_coinbase));
    }

    #[test]
    fn test_missing_price_is_none() {
        let mut raw = raw_day();
        raw.ohlc = None;
        assert_eq!(raw.assemble(false).unwrap().context, None);
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let mut raw = raw_day();
        raw.values.pop();
        assert_eq!(
            raw.assemble(false),
            Err(AlignmentError::LengthMismatch {
                series: series::OUTPUT_TO_VALUE,
                expected: 4,
                got: 3,
            })
        );

        let mut raw = raw_day();
        raw.total_sizes.push(1);
        assert!(matches!(
            raw.assemble(false),
            Err(AlignmentError::LengthMismatch { series: series::TX_TO_TOTAL_SIZE, .. })
        ));
    }

    #[test]
    fn test_non_monotonic_boundaries() {
        let mut raw = raw_day();
        raw.tx_first_input = vec![50, 52, 51, 54];
        assert_eq!(
            raw.assemble(false),
            Err(AlignmentError::NonMonotonic {
                series: series::TX_TO_FIRST_INPUT,
                position: 2,
            })
        );
    }

    #[test]
    fn test_spend_of_future_output_is_out_of_bounds() {
        let mut raw = raw_day();
        raw.spent_outputs[1] = Some(103);
        assert!(matches!(
            raw.assemble(false),
            Err(AlignmentError::OutOfBounds { index: 103, .. })
        ));

        let mut raw = raw_day();
        raw.spent_outputs[1] = Some(9_999);
        assert!(matches!(
            raw.assemble(false),
            Err(AlignmentError::OutOfBounds { index: 9_999, .. })
        ));
    }

    #[test]
    fn test_empty_day() {
        let raw = RawDay {
            date_index: 2,
            tx_first_output: vec![10],
            tx_first_input: vec![7],
            ..Default::default()
        };
        let batch = raw.assemble(false).unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.transactions, 0);
    }
}
