use super::account::{Account, AccountId};
use super::listing::{Listing, ListingId, ListingStatus};
use super::notification::{Email, Notification};
use super::order::{NewOrder, Order, OrderId, OrderStatus};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Returns the order unless it does not exist or was soft-deleted.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    async fn create(&self, order: NewOrder) -> Result<Order>;
    /// Writes `new` only if the stored status is still `expected`.
    ///
    /// Returns `false` (and writes nothing) when the order is missing or its
    /// status has moved on.
    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        cancelled_by: Option<AccountId>,
    ) -> Result<bool>;
    /// Records the gateway hold for an order. Returns `false` if one is already recorded.
    async fn attach_payment_intent(&self, id: OrderId, intent_id: &str) -> Result<bool>;
    async fn soft_delete(&self, id: OrderId) -> Result<bool>;
    /// Every stored order, soft-deleted ones included, sorted by id.
    async fn get_all(&self) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn get(&self, id: ListingId) -> Result<Option<Listing>>;
    async fn store(&self, listing: Listing) -> Result<()>;
    /// Sets `is_ordering`. Returns `true` only if the flag actually changed,
    /// so `set_ordering_flag(id, true)` doubles as an atomic reservation.
    async fn set_ordering_flag(&self, id: ListingId, ordering: bool) -> Result<bool>;
    async fn set_status(&self, id: ListingId, status: ListingStatus) -> Result<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: AccountId) -> Result<Option<Account>>;
    async fn store(&self, account: Account) -> Result<()>;
}

/// What the processor reports after converting a hold into a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedPayment {
    pub amount: Decimal,
    pub currency: String,
    pub destination: String,
}

/// Authorize/capture/cancel capability of the payment processor.
///
/// `capture` and `cancel_hold` must be idempotent: repeating either on an
/// intent that already reached that state succeeds with the original outcome.
/// The engine relies on this to retry after a deadline expired while the
/// processor was still working.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Places a hold of `amount` destined for `destination`. Returns the intent id.
    async fn authorize(
        &self,
        destination: &str,
        amount: Decimal,
        currency: &str,
    ) -> std::result::Result<String, GatewayError>;
    async fn capture(&self, intent_id: &str) -> std::result::Result<CapturedPayment, GatewayError>;
    async fn cancel_hold(&self, intent_id: &str) -> std::result::Result<(), GatewayError>;
    async fn is_payout_enabled(&self, account: &str) -> std::result::Result<bool, GatewayError>;
}

/// Fire-and-forget delivery of in-app notifications and emails.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
    async fn email(&self, email: Email) -> Result<()>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;
pub type ListingStoreBox = Box<dyn ListingStore>;
pub type AccountStoreBox = Box<dyn AccountStore>;
pub type NotificationDispatcherBox = Box<dyn NotificationDispatcher>;
/// Shared so that gateway calls can outlive the request that started them.
pub type PaymentGatewayHandle = Arc<dyn PaymentGateway>;
