//! Output records assembled from the indexer's parallel arrays.

use serde::{Deserialize, Serialize};

/// Script type of a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    P2pk65,
    P2pk33,
    P2pkh,
    P2ms,
    P2sh,
    OpReturn,
    P2wpkh,
    P2wsh,
    P2tr,
    P2a,
    Empty,
    #[serde(other)]
    Unknown,
}

impl OutputType {
    pub const ALL: [OutputType; 12] = [
        OutputType::P2pk65,
        OutputType::P2pk33,
        OutputType::P2pkh,
        OutputType::P2ms,
        OutputType::P2sh,
        OutputType::OpReturn,
        OutputType::P2wpkh,
        OutputType::P2wsh,
        OutputType::P2tr,
        OutputType::P2a,
        OutputType::Empty,
        OutputType::Unknown,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputType::P2pk65 => "p2pk65",
            OutputType::P2pk33 => "p2pk33",
            OutputType::P2pkh => "p2pkh",
            OutputType::P2ms => "p2ms",
            OutputType::P2sh => "p2sh",
            OutputType::OpReturn => "opreturn",
            OutputType::P2wpkh => "p2wpkh",
            OutputType::P2wsh => "p2wsh",
            OutputType::P2tr => "p2tr",
            OutputType::P2a => "p2a",
            OutputType::Empty => "empty",
            OutputType::Unknown => "unknown",
        }
    }

    /// Outputs that carry data rather than a payment.
    pub fn is_data_carrier(self) -> bool {
        matches!(self, OutputType::OpReturn)
    }
}

/// Facts about the transaction that owns an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxSummary {
    pub input_count: u32,
    pub output_count: u32,
    /// Size without witness data, in bytes.
    pub base_size: u32,
    /// Size including witness data, in bytes.
    pub total_size: u32,
    /// Spends at least one output created earlier on the same day.
    pub spends_same_day: bool,
    /// Has at least one data-carrier output.
    pub has_data_carrier: bool,
    pub is_coinbase: bool,
    /// Sum of all output amounts.
    pub total_value: u64,
}

impl TxSummary {
    pub fn witness_size(&self) -> u32 {
        self.total_size.saturating_sub(self.base_size)
    }
}

/// One transaction output joined with its transaction's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Amount in the asset's smallest unit.
    pub amount: u64,
    pub output_type: OutputType,
    /// Position of the output within its transaction.
    pub vout: u32,
    pub tx: TxSummary,
    /// Amount of the other output when the transaction has exactly two.
    pub sibling_amount: Option<u64>,
}

impl OutputRecord {
    pub fn is_two_output(&self) -> bool {
        self.tx.output_count == 2 && self.sibling_amount.is_some()
    }
}
