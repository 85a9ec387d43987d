use super::account::AccountId;
use super::guard::Reason;
use super::listing::ListingId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly positive monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, Reason> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(Reason::InvalidAmount)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = Reason;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Lifecycle status of an order.
///
/// ```text
/// WAITING_FOR_PAYMENT -> PROCESSING -> DELIVERED -> RECEIVED
///         |                  |
///         +---> CANCELLED <--+
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    WaitingForPayment,
    Processing,
    Delivered,
    Received,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::WaitingForPayment,
        OrderStatus::Processing,
        OrderStatus::Delivered,
        OrderStatus::Received,
        OrderStatus::Cancelled,
    ];

    /// Statuses directly reachable from `self`.
    pub fn successors(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::WaitingForPayment => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Delivered, OrderStatus::Cancelled],
            OrderStatus::Delivered => &[OrderStatus::Received],
            OrderStatus::Received | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Whether the listing behind an order in this status is reserved.
    pub fn holds_listing(self) -> bool {
        !matches!(self, OrderStatus::Cancelled | OrderStatus::Received)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::WaitingForPayment => "waiting_for_payment",
            OrderStatus::Processing => "processing",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Received => "received",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the buyer pays. Only the card flow is wired into the lifecycle;
/// other methods are accepted by the parser and refused by the guard.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Credit,
    Cod,
}

impl PaymentMethod {
    /// Methods with a defined transition table.
    pub fn is_supported(self) -> bool {
        matches!(self, PaymentMethod::Credit)
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Credit => "Card payment",
            PaymentMethod::Cod => "Cash on delivery",
        }
    }
}

/// A validated order ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub customer_id: AccountId,
    pub post_id: ListingId,
    pub total: Amount,
    pub payment_method: PaymentMethod,
    pub payout_account: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
}

/// A buyer's commitment to purchase the item behind a listing.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: AccountId,
    pub post_id: ListingId,
    /// Absent only for records created before payment setup.
    pub total: Option<Amount>,
    pub payment_method: PaymentMethod,
    /// Processor reference of the authorized hold. Set exactly once.
    pub payment_intent_id: Option<String>,
    /// Seller's processor account the hold is captured into.
    pub payout_account: String,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub cancelled_by: Option<AccountId>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materializes a freshly created order. Every order starts out waiting for payment.
    pub fn from_new(id: OrderId, new: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id: new.customer_id,
            post_id: new.post_id,
            total: Some(new.total),
            payment_method: new.payment_method,
            payment_intent_id: None,
            payout_account: new.payout_account,
            status: OrderStatus::WaitingForPayment,
            customer_name: new.customer_name,
            customer_phone: new.customer_phone,
            customer_address: new.customer_address,
            cancelled_by: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-readable order code.
    pub fn code(&self) -> String {
        format!("ORD-{}", self.id)
    }

    /// Applies a status write the way every store does it.
    pub fn apply_status(
        &mut self,
        status: OrderStatus,
        cancelled_by: Option<AccountId>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        if cancelled_by.is_some() {
            self.cancelled_by = cancelled_by;
        }
        self.updated_at = now;
    }
}
