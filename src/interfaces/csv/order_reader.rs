use crate::domain::order::{Order, OrderNumber, UserId};
use crate::error::{ReconcileError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of an order upload file: `user,number`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OrderRecord {
    pub user: UserId,
    pub number: OrderNumber,
}

impl From<OrderRecord> for Order {
    fn from(record: OrderRecord) -> Self {
        Order::new(record.number, record.user)
    }
}

/// Reads uploaded orders from a CSV source.
///
/// Wraps `csv::Reader` and yields `Result<Order>` lazily. Rows with a
/// malformed user id or an order number failing the Luhn check come back
/// as errors without ending the stream.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn orders(self) -> impl Iterator<Item = Result<Order>> {
        self.reader
            .into_deserialize::<OrderRecord>()
            .map(|result| result.map(Order::from).map_err(ReconcileError::from))
    }
}
