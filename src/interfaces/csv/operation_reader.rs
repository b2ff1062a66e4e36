use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Open,
    Deposit,
    Withdraw,
    Transfer,
}

/// One row of an operations batch.
///
/// `to` is only meaningful for transfers; `amount` carries the initial
/// balance for `open` rows.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OperationRecord {
    pub op: OpKind,
    pub account: String,
    pub to: Option<String>,
    // csv's `deserialize_any` would otherwise route the field through f64,
    // which drops the decimal scale (`100.0` -> `100`); parse from the raw
    // string so amounts round-trip exactly.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub amount: Option<Decimal>,
}

/// Reads ledger operations from a CSV source.
///
/// Wraps `csv::Reader` and provides an iterator over `Result<OperationRecord>`.
/// Handles whitespace trimming and flexible record lengths automatically.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes operations,
    /// so large batches stream without loading the whole file.
    pub fn operations(self) -> impl Iterator<Item = Result<OperationRecord, csv::Error>> {
        self.reader.into_deserialize()
    }
}
