use crate::domain::account::AccountId;
use crate::domain::listing::ListingId;
use crate::domain::order::{OrderId, OrderStatus};
use crate::error::{OrderError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Registers a user with payouts enabled.
    Account,
    /// Publishes a listing owned by the actor.
    Listing,
    Create,
    Pay,
    Update,
    Receive,
    Cancel,
    Delete,
}

/// One row of a replay file. Columns a command does not use stay empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub command: CommandType,
    pub actor: AccountId,
    pub order: Option<OrderId>,
    pub listing: Option<ListingId>,
    pub customer: Option<AccountId>,
    pub amount: Option<Decimal>,
    pub status: Option<OrderStatus>,
}

/// Reads replay commands from a CSV source.
///
/// Whitespace around fields is trimmed and short rows are accepted, so
/// `pay, 2, 1` is as valid as a row carrying every column.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the commands in file order.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(OrderError::from))
    }
}
