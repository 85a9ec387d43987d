use super::account::{Account, AccountId};
use super::listing::Listing;
use super::order::{Order, OrderId};
use super::ports::CapturedPayment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A seller opened an order for the buyer; card payment is expected.
    PaymentCredit,
    /// The buyer's card hold went through.
    PaymentAuthorized,
    DeliveredOrder,
    Received,
    CancelledOrder,
}

impl NotificationKind {
    /// In-app title shown to the recipient.
    pub fn title(self, order: &Order) -> String {
        match self {
            NotificationKind::PaymentCredit => {
                "You have a new order, pay by card to confirm it".to_string()
            }
            NotificationKind::PaymentAuthorized => {
                format!("The buyer has paid for order {}", order.code())
            }
            NotificationKind::DeliveredOrder => {
                format!("Order {} has been delivered", order.code())
            }
            NotificationKind::Received => {
                format!("The buyer confirmed receipt of order {}", order.code())
            }
            NotificationKind::CancelledOrder => {
                format!("Order {} has been cancelled. Open it to review", order.code())
            }
        }
    }
}

/// An in-app notification for one user.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Notification {
    pub order_id: OrderId,
    pub recipient: AccountId,
    pub kind: NotificationKind,
    pub title: String,
}

impl Notification {
    pub fn new(order: &Order, recipient: AccountId, kind: NotificationKind) -> Self {
        Self {
            order_id: order.id,
            recipient,
            kind,
            title: kind.title(order),
        }
    }
}

/// A plain-text email.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Email {
    pub address: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Sent to the buyer when a seller opens an order for them.
    pub fn order_confirmation(
        order: &Order,
        listing: &Listing,
        customer: &Account,
        seller: &Account,
        site_name: &str,
    ) -> Self {
        let total = order
            .total
            .map(|total| total.to_string())
            .unwrap_or_else(|| "-".to_string());
        let body = format!(
            "Order {code} for \"{title}\"\n\
             Seller: {seller} <{seller_email}>\n\
             Payment method: {method}\n\
             Total: {total}\n\
             Created at: {created}\n\
             Open your buying orders waiting for payment to complete the purchase.",
            code = order.code(),
            title = listing.title,
            seller = seller.display_name,
            seller_email = seller.email,
            method = order.payment_method.label(),
            created = order.created_at.format("%H:%M %d/%m/%Y"),
        );
        Self {
            address: customer.email.clone(),
            subject: format!("You have a new order from {site_name}"),
            body,
        }
    }

    /// Sent to the seller once the buyer's payment has been captured.
    pub fn payout(
        seller: &Account,
        listing: &Listing,
        capture: &CapturedPayment,
        site_name: &str,
    ) -> Self {
        Self {
            address: seller.email.clone(),
            subject: format!("You received money from an order at {site_name}"),
            body: format!(
                "You received {} {} for the listing \"{}\". The funds were transferred to payment account {}.",
                capture.amount.normalize(),
                capture.currency,
                listing.title,
                capture.destination,
            ),
        }
    }
}
