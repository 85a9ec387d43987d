use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRow {
    id: u64,
    code: String,
    customer: u64,
    listing: u64,
    status: &'static str,
    total: Option<String>,
    payment_intent: Option<String>,
    cancelled_by: Option<u64>,
    deleted: bool,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.0,
            code: order.code(),
            customer: order.customer_id.0,
            listing: order.post_id.0,
            status: order.status.as_str(),
            total: order.total.map(|total| total.to_string()),
            payment_intent: order.payment_intent_id.clone(),
            cancelled_by: order.cancelled_by.map(|account| account.0),
            deleted: order.is_deleted,
        }
    }
}

/// Writes final order state as CSV.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per order, header first, and flushes the sink.
    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        if orders.is_empty() {
            self.writer.write_record([
                "id",
                "code",
                "customer",
                "listing",
                "status",
                "total",
                "payment_intent",
                "cancelled_by",
                "deleted",
            ])?;
        }
        for order in orders {
            self.writer.serialize(OrderRow::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
