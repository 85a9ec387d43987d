//! Typed input for each engine operation.
//!
//! Requests deserialize strictly (`deny_unknown_fields`, required ids are
//! not optional) and creation input is validated into a [`NewOrder`] before
//! the guard ever runs.

use crate::domain::account::AccountId;
use crate::domain::guard::Reason;
use crate::domain::listing::ListingId;
use crate::domain::order::{Amount, NewOrder, OrderId, OrderStatus, PaymentMethod};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A seller opens an order on one of their listings for a buyer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub post_id: Option<ListingId>,
    pub customer_id: Option<AccountId>,
    pub total: Option<Decimal>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Seller's processor account the buyer's payment is destined for.
    pub payout_account: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
}

impl CreateOrderRequest {
    pub fn validate(self) -> Result<NewOrder> {
        let customer_id = self.customer_id.ok_or(Reason::MissingCustomer)?;
        let post_id = self.post_id.ok_or(Reason::MissingListing)?;
        let payout_account = self
            .payout_account
            .map(|account| account.trim().to_string())
            .filter(|account| !account.is_empty())
            .ok_or(Reason::MissingPayoutAccount)?;
        let total = self.total.ok_or(Reason::TotalBelowMinimum)?;
        let total = Amount::new(total).map_err(|_| Reason::TotalBelowMinimum)?;

        Ok(NewOrder {
            customer_id,
            post_id,
            total,
            payment_method: self.payment_method,
            payout_account,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            customer_address: self.customer_address,
        })
    }
}

/// The buyer pays a waiting order by card.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizePaymentRequest {
    pub order_id: OrderId,
}

/// The seller moves an order along without extra side effects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// The buyer confirms the goods arrived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmReceiptRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelOrderRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteOrderRequest {
    pub order_id: OrderId,
}
