use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Fund,
    Transfer,
}

/// One row of the batch input: either `fund, <user>, , , <amount>` or
/// `transfer, <sender>, <key>, <receiver>, <amount>`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Operation {
    pub op: OperationType,
    pub user: Uuid,
    pub key: Option<String>,
    pub counterparty: Option<Uuid>,
    pub amount: Decimal,
}

/// Reads operations from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding each row as a `Result<Operation>` for streaming processing.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn operations(self) -> impl Iterator<Item = Result<Operation, csv::Error>> {
        self.reader.into_deserialize()
    }
}
