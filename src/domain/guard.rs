//! Authorization and business-rule checks for every lifecycle transition.
//!
//! Everything here is pure: the guard sees a snapshot of the order and the
//! parties involved and answers `Allowed` or `Denied(reason)`. The engine
//! runs it before touching the gateway or any store.

use super::account::{Account, AccountId};
use super::listing::{Listing, ListingStatus};
use super::order::{NewOrder, Order, OrderStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Which error family a denial belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Validation,
    Authorization,
    Conflict,
}

/// User-facing outcome of a failed check. Messages are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Reason {
    #[error("Missing buyer information")]
    MissingCustomer,
    #[error("Missing listing for the order")]
    MissingListing,
    #[error("Missing order reference")]
    MissingOrder,
    #[error("Missing target status")]
    MissingStatus,
    #[error("Missing payout account for the seller")]
    MissingPayoutAccount,
    #[error("Amount must be positive")]
    InvalidAmount,
    #[error("Order total is missing or below the minimum for card payment")]
    TotalBelowMinimum,
    #[error("Only card payment is supported")]
    UnsupportedPaymentMethod,
    #[error("You cannot order your own listing")]
    SelfOrder,
    #[error("The buyer's account has been deleted")]
    CustomerDeleted,
    #[error("Payout account is not linked to the marketplace; link it from your profile")]
    PayoutNotEnabled,

    #[error("You are not the owner of this listing")]
    NotListingOwner,
    #[error("You are not the buyer of this order")]
    NotCustomer,
    #[error("You do not have access to this order")]
    NotParty,

    #[error("An order already exists for this listing; cancel it before creating another")]
    ListingAlreadyOrdering,
    #[error("This listing is no longer available")]
    ListingClosed,
    #[error("This listing has already been published")]
    ListingAlreadyExists,
    #[error("This status can only be set through its dedicated operation")]
    StatusRequiresDedicatedFlow,
    #[error("The order status can no longer be changed")]
    StatusLocked,
    #[error("The requested status does not follow the order lifecycle")]
    IllegalTransition,
    #[error("The order is not waiting for payment")]
    NotAwaitingPayment,
    #[error("The order has not been delivered yet")]
    NotDelivered,
    #[error("Orders in this status cannot be cancelled")]
    NotCancellable,
    #[error("Payment has not been authorized for this order")]
    PaymentNotAuthorized,
    #[error("Payment has already been authorized for this order")]
    PaymentAlreadyAuthorized,
    #[error("Only received or cancelled orders can be deleted")]
    NotDeletable,
    #[error("The order changed while it was being updated; reload and retry")]
    StatusChanged,
    #[error("Another operation on this order is still in progress")]
    TransitionInProgress,
}

impl Reason {
    pub fn category(self) -> Category {
        use Reason::*;
        match self {
            MissingCustomer | MissingListing | MissingOrder | MissingStatus | MissingPayoutAccount
            | InvalidAmount | TotalBelowMinimum | UnsupportedPaymentMethod | SelfOrder | CustomerDeleted
            | PayoutNotEnabled => Category::Validation,
            NotListingOwner | NotCustomer | NotParty => Category::Authorization,
            ListingAlreadyOrdering | ListingClosed | ListingAlreadyExists
            | StatusRequiresDedicatedFlow | StatusLocked
            | IllegalTransition | NotAwaitingPayment | NotDelivered | NotCancellable
            | PaymentNotAuthorized | PaymentAlreadyAuthorized | NotDeletable | StatusChanged
            | TransitionInProgress => Category::Conflict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(Reason),
}

impl Decision {
    pub fn into_result(self) -> Result<(), Reason> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(reason),
        }
    }
}

impl From<Result<(), Reason>> for Decision {
    fn from(result: Result<(), Reason>) -> Self {
        match result {
            Ok(()) => Decision::Allowed,
            Err(reason) => Decision::Denied(reason),
        }
    }
}

/// A transition requested on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Seller-driven status write without extra side effects.
    UpdateStatus(OrderStatus),
    /// Buyer pays: `WAITING_FOR_PAYMENT -> PROCESSING` with a gateway hold.
    AuthorizePayment,
    /// Buyer confirms delivery: `DELIVERED -> RECEIVED` with capture.
    ConfirmReceipt,
    /// Either party cancels while funds are not captured.
    Cancel,
    /// Soft delete of a finished order.
    Delete,
}

/// An order with every cross-entity reference resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order: Order,
    pub listing: Listing,
    pub customer: Account,
    pub seller: Account,
}

impl OrderSnapshot {
    pub fn is_buyer(&self, actor: AccountId) -> bool {
        actor == self.order.customer_id
    }

    pub fn is_seller(&self, actor: AccountId) -> bool {
        actor == self.listing.poster_id
    }

    /// The other side of the order from `actor`'s point of view.
    pub fn counterparty(&self, actor: AccountId) -> AccountId {
        if self.is_seller(actor) {
            self.order.customer_id
        } else {
            self.listing.poster_id
        }
    }
}

/// Inputs for creating an order against a listing.
#[derive(Debug, Clone, Copy)]
pub struct CreationContext<'a> {
    pub listing: &'a Listing,
    pub customer: &'a Account,
    pub order: &'a NewOrder,
    pub minimum_total: Decimal,
    /// `None` until the gateway has been asked about the payout account.
    pub payout_enabled: Option<bool>,
}

fn require(condition: bool, reason: Reason) -> Result<(), Reason> {
    if condition { Ok(()) } else { Err(reason) }
}

/// Checks a seller's request to open an order for a buyer.
pub fn evaluate_creation(actor: AccountId, ctx: &CreationContext<'_>) -> Decision {
    check_creation(actor, ctx).into()
}

fn check_creation(actor: AccountId, ctx: &CreationContext<'_>) -> Result<(), Reason> {
    require(!ctx.listing.is_ordering, Reason::ListingAlreadyOrdering)?;
    require(
        ctx.listing.status == ListingStatus::Active,
        Reason::ListingClosed,
    )?;
    require(!ctx.customer.is_deleted, Reason::CustomerDeleted)?;
    require(ctx.listing.poster_id == actor, Reason::NotListingOwner)?;
    require(ctx.listing.poster_id != ctx.customer.id, Reason::SelfOrder)?;
    require(
        ctx.order.payment_method.is_supported(),
        Reason::UnsupportedPaymentMethod,
    )?;
    require(
        ctx.order.total.value() >= ctx.minimum_total,
        Reason::TotalBelowMinimum,
    )?;
    require(ctx.payout_enabled != Some(false), Reason::PayoutNotEnabled)
}

/// Checks `transition` on an existing order on behalf of `actor`.
pub fn evaluate(actor: AccountId, snapshot: &OrderSnapshot, transition: Transition) -> Decision {
    let outcome = match transition {
        Transition::UpdateStatus(target) => check_status_update(actor, snapshot, target),
        Transition::AuthorizePayment => check_authorization(actor, snapshot),
        Transition::ConfirmReceipt => check_receipt(actor, snapshot),
        Transition::Cancel => check_cancel(actor, snapshot),
        Transition::Delete => check_delete(actor, snapshot),
    };
    outcome.into()
}

/// Read access: only the two parties of an order may see it.
pub fn can_view(actor: AccountId, snapshot: &OrderSnapshot) -> Decision {
    require(
        snapshot.is_buyer(actor) || snapshot.is_seller(actor),
        Reason::NotParty,
    )
    .into()
}

fn check_status_update(
    actor: AccountId,
    snapshot: &OrderSnapshot,
    target: OrderStatus,
) -> Result<(), Reason> {
    require(
        !matches!(
            target,
            OrderStatus::Received | OrderStatus::WaitingForPayment
        ),
        Reason::StatusRequiresDedicatedFlow,
    )?;
    require(snapshot.is_seller(actor), Reason::NotListingOwner)?;
    require(!snapshot.customer.is_deleted, Reason::CustomerDeleted)?;

    let current = snapshot.order.status;
    require(
        matches!(
            current,
            OrderStatus::WaitingForPayment | OrderStatus::Processing
        ),
        Reason::StatusLocked,
    )?;
    if current == target {
        return Ok(());
    }
    match (current, target) {
        (_, OrderStatus::Cancelled) => check_cancel(actor, snapshot),
        // Reaching PROCESSING needs a payment hold, which only the buyer can place.
        (OrderStatus::WaitingForPayment, OrderStatus::Processing) => {
            Err(Reason::PaymentNotAuthorized)
        }
        (current, target) => require(current.can_transition_to(target), Reason::IllegalTransition),
    }
}

fn check_authorization(actor: AccountId, snapshot: &OrderSnapshot) -> Result<(), Reason> {
    let order = &snapshot.order;
    require(snapshot.is_buyer(actor), Reason::NotCustomer)?;
    require(
        order.status == OrderStatus::WaitingForPayment,
        Reason::NotAwaitingPayment,
    )?;
    require(
        order.payment_intent_id.is_none(),
        Reason::PaymentAlreadyAuthorized,
    )?;
    require(order.payment_method.is_supported(), Reason::UnsupportedPaymentMethod)?;
    require(order.total.is_some(), Reason::TotalBelowMinimum)?;
    require(!order.payout_account.is_empty(), Reason::MissingPayoutAccount)
}

fn check_receipt(actor: AccountId, snapshot: &OrderSnapshot) -> Result<(), Reason> {
    let order = &snapshot.order;
    require(snapshot.is_buyer(actor), Reason::NotCustomer)?;
    require(order.status == OrderStatus::Delivered, Reason::NotDelivered)?;
    require(
        order.payment_intent_id.is_some(),
        Reason::PaymentNotAuthorized,
    )
}

fn check_cancel(actor: AccountId, snapshot: &OrderSnapshot) -> Result<(), Reason> {
    let order = &snapshot.order;
    require(
        snapshot.is_buyer(actor) || snapshot.is_seller(actor),
        Reason::NotParty,
    )?;
    match order.status {
        OrderStatus::WaitingForPayment => Ok(()),
        OrderStatus::Processing => require(
            order.payment_intent_id.is_some(),
            Reason::PaymentNotAuthorized,
        ),
        _ => Err(Reason::NotCancellable),
    }
}

fn check_delete(actor: AccountId, snapshot: &OrderSnapshot) -> Result<(), Reason> {
    require(
        snapshot.is_buyer(actor) || snapshot.is_seller(actor),
        Reason::NotParty,
    )?;
    require(snapshot.order.status.is_terminal(), Reason::NotDeletable)
}
