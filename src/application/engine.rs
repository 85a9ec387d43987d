use crate::application::requests::{
    AuthorizePaymentRequest, CancelOrderRequest, ConfirmReceiptRequest, CreateOrderRequest,
    DeleteOrderRequest, UpdateStatusRequest,
};
use crate::config::EngineConfig;
use crate::domain::account::{Account, AccountId};
use crate::domain::guard::{self, CreationContext, Decision, OrderSnapshot, Reason, Transition};
use crate::domain::listing::{ListingId, ListingStatus};
use crate::domain::notification::{Email, Notification, NotificationKind};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{
    AccountStore, AccountStoreBox, ListingStore, ListingStoreBox, NotificationDispatcherBox,
    OrderStoreBox, PaymentGateway, PaymentGatewayHandle,
};
use crate::error::{Entity, GatewayError, GatewayOperation, OrderError, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, instrument, warn};

/// The collaborators the engine drives.
pub struct Collaborators {
    pub orders: OrderStoreBox,
    pub listings: ListingStoreBox,
    pub accounts: AccountStoreBox,
    pub gateway: PaymentGatewayHandle,
    pub notifier: NotificationDispatcherBox,
}

/// The order lifecycle engine.
///
/// Every operation follows the same sequence: resolve the order and its
/// parties, run the pure guard, perform the gateway call the transition
/// depends on, compare-and-swap the status, and only then fire listing
/// updates and notifications. Those last side effects are best-effort: their
/// failures are logged and never change the operation's result.
pub struct OrderLifecycleEngine {
    orders: OrderStoreBox,
    listings: ListingStoreBox,
    accounts: AccountStoreBox,
    gateway: PaymentGatewayHandle,
    notifier: NotificationDispatcherBox,
    config: EngineConfig,
    in_flight: Mutex<HashSet<OrderId>>,
}

/// Marks an order busy for as long as it lives.
struct InFlight<'a> {
    registry: &'a Mutex<HashSet<OrderId>>,
    order_id: OrderId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

impl OrderLifecycleEngine {
    /// Creates a new engine over explicitly provided collaborators.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            orders: collaborators.orders,
            listings: collaborators.listings,
            accounts: collaborators.accounts,
            gateway: collaborators.gateway,
            notifier: collaborators.notifier,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Listing collaborator, for callers that seed or inspect listings.
    pub fn listings(&self) -> &dyn ListingStore {
        self.listings.as_ref()
    }

    /// Account collaborator, for callers that seed or inspect accounts.
    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    /// Opens an order in `WAITING_FOR_PAYMENT` on the seller's listing.
    ///
    /// The listing is reserved (`is_ordering`) before the order is written, so
    /// two concurrent creations on one listing cannot both succeed.
    #[instrument(skip_all, fields(actor = %actor))]
    pub async fn create_order(&self, actor: AccountId, request: CreateOrderRequest) -> Result<Order> {
        let new_order = request.validate()?;
        let listing = self
            .listings
            .get(new_order.post_id)
            .await?
            .ok_or_else(|| OrderError::not_found(Entity::Listing, new_order.post_id.0))?;
        let (customer, seller) = tokio::try_join!(
            self.account(new_order.customer_id),
            self.account(listing.poster_id)
        )?;

        let mut ctx = CreationContext {
            listing: &listing,
            customer: &customer,
            order: &new_order,
            minimum_total: self.config.minimum_total,
            payout_enabled: None,
        };
        self.check(guard::evaluate_creation(actor, &ctx))?;

        let payout_account = new_order.payout_account.clone();
        let enabled = self
            .call_gateway(GatewayOperation::PayoutCheck, move |gateway| async move {
                gateway.is_payout_enabled(&payout_account).await
            })
            .await?;
        ctx.payout_enabled = Some(enabled);
        self.check(guard::evaluate_creation(actor, &ctx))?;

        if !self.listings.set_ordering_flag(listing.id, true).await? {
            return Err(Reason::ListingAlreadyOrdering.into());
        }
        let order = match self.orders.create(new_order).await {
            Ok(order) => order,
            Err(err) => {
                self.sync_ordering_flag(listing.id, false).await;
                return Err(err);
            }
        };
        info!(order_id = %order.id, listing_id = %listing.id, "order created");

        let notification = Notification::new(&order, customer.id, NotificationKind::PaymentCredit);
        let email = Email::order_confirmation(
            &order,
            &listing,
            &customer,
            &seller,
            &self.config.site_name,
        );
        tokio::join!(self.dispatch(notification), self.send_email(email));
        Ok(order)
    }

    /// Places the buyer's card hold and moves the order to `PROCESSING`.
    #[instrument(skip_all, fields(actor = %actor, order_id = %request.order_id))]
    pub async fn authorize_payment(
        &self,
        actor: AccountId,
        request: AuthorizePaymentRequest,
    ) -> Result<Order> {
        let order_id = request.order_id;
        let _in_flight = self.begin(order_id)?;
        let snapshot = self.snapshot(order_id).await?;
        self.check(guard::evaluate(actor, &snapshot, Transition::AuthorizePayment))?;

        let order = &snapshot.order;
        let amount = order.total.ok_or(Reason::TotalBelowMinimum)?.value();
        let destination = order.payout_account.clone();
        let currency = self.config.currency.clone();
        let releaser = Arc::clone(&self.gateway);
        let intent_id = self
            .call_gateway_or_else(
                GatewayOperation::Authorize,
                move |gateway| async move {
                    gateway.authorize(&destination, amount, &currency).await
                },
                move |late| {
                    tokio::spawn(release_late_hold(releaser, late).in_current_span());
                },
            )
            .await?;

        if !self.orders.attach_payment_intent(order_id, &intent_id).await? {
            self.release_hold(&intent_id).await;
            return Err(Reason::PaymentAlreadyAuthorized.into());
        }
        if !self
            .orders
            .compare_and_set_status(
                order_id,
                OrderStatus::WaitingForPayment,
                OrderStatus::Processing,
                None,
            )
            .await?
        {
            self.release_hold(&intent_id).await;
            return Err(Reason::StatusChanged.into());
        }
        info!(%intent_id, "payment authorized");

        let updated = self.reload(order_id).await?;
        let notification = Notification::new(
            &updated,
            snapshot.seller.id,
            NotificationKind::PaymentAuthorized,
        );
        self.dispatch(notification).await;
        Ok(updated)
    }

    /// Seller-driven status change.
    ///
    /// `RECEIVED` and `WAITING_FOR_PAYMENT` are refused here because their
    /// dedicated operations carry side effects a bare write would skip. A
    /// request for `CANCELLED` runs the full cancellation.
    #[instrument(skip_all, fields(actor = %actor, order_id = %request.order_id))]
    pub async fn update_status(&self, actor: AccountId, request: UpdateStatusRequest) -> Result<Order> {
        let order_id = request.order_id;
        let target = request.status;
        let _in_flight = self.begin(order_id)?;
        let snapshot = self.snapshot(order_id).await?;
        self.check(guard::evaluate(actor, &snapshot, Transition::UpdateStatus(target)))?;

        let current = snapshot.order.status;
        if target == OrderStatus::Cancelled && current != OrderStatus::Cancelled {
            return self.cancel_checked(actor, snapshot).await;
        }
        if target == current {
            debug!(status = %current, "status unchanged");
            return Ok(snapshot.order);
        }
        if !self
            .orders
            .compare_and_set_status(order_id, current, target, None)
            .await?
        {
            return Err(Reason::StatusChanged.into());
        }
        info!(from = %current, to = %target, "order status updated");

        let updated = self.reload(order_id).await?;
        if target == OrderStatus::Delivered {
            let notification = Notification::new(
                &updated,
                updated.customer_id,
                NotificationKind::DeliveredOrder,
            );
            self.dispatch(notification).await;
        }
        Ok(updated)
    }

    /// The buyer confirms delivery; the held payment is captured.
    ///
    /// Capture happens before the status write. If it fails the order stays
    /// `DELIVERED` and the request can be repeated.
    #[instrument(skip_all, fields(actor = %actor, order_id = %request.order_id))]
    pub async fn confirm_receipt(
        &self,
        actor: AccountId,
        request: ConfirmReceiptRequest,
    ) -> Result<Order> {
        let order_id = request.order_id;
        let _in_flight = self.begin(order_id)?;
        let snapshot = self.snapshot(order_id).await?;
        self.check(guard::evaluate(actor, &snapshot, Transition::ConfirmReceipt))?;

        let intent_id = snapshot
            .order
            .payment_intent_id
            .clone()
            .ok_or(Reason::PaymentNotAuthorized)?;
        let capture = self
            .call_gateway(GatewayOperation::Capture, move |gateway| async move {
                gateway.capture(&intent_id).await
            })
            .await?;

        if !self
            .orders
            .compare_and_set_status(order_id, OrderStatus::Delivered, OrderStatus::Received, None)
            .await?
        {
            error!("payment captured but the order left DELIVERED concurrently");
            return Err(Reason::StatusChanged.into());
        }
        info!(amount = %capture.amount, currency = %capture.currency, "payment captured, order received");

        let updated = self.reload(order_id).await?;
        let listing_id = snapshot.listing.id;
        let notification =
            Notification::new(&updated, snapshot.seller.id, NotificationKind::Received);
        let email = Email::payout(
            &snapshot.seller,
            &snapshot.listing,
            &capture,
            &self.config.site_name,
        );
        tokio::join!(
            self.close_listing(listing_id),
            self.dispatch(notification),
            self.send_email(email)
        );
        Ok(updated)
    }

    /// Either party cancels an order whose funds are not captured yet.
    #[instrument(skip_all, fields(actor = %actor, order_id = %request.order_id))]
    pub async fn cancel_order(&self, actor: AccountId, request: CancelOrderRequest) -> Result<Order> {
        let order_id = request.order_id;
        let _in_flight = self.begin(order_id)?;
        let snapshot = self.snapshot(order_id).await?;
        self.cancel_checked(actor, snapshot).await
    }

    /// Returns the order to one of its two parties.
    #[instrument(skip_all, fields(actor = %actor, order_id = %order_id))]
    pub async fn get_order(&self, actor: AccountId, order_id: OrderId) -> Result<Order> {
        let snapshot = self.snapshot(order_id).await?;
        self.check(guard::can_view(actor, &snapshot))?;
        Ok(snapshot.order)
    }

    /// Soft-deletes a received or cancelled order.
    #[instrument(skip_all, fields(actor = %actor, order_id = %request.order_id))]
    pub async fn delete_order(&self, actor: AccountId, request: DeleteOrderRequest) -> Result<()> {
        let order_id = request.order_id;
        let _in_flight = self.begin(order_id)?;
        let snapshot = self.snapshot(order_id).await?;
        self.check(guard::evaluate(actor, &snapshot, Transition::Delete))?;
        if !self.orders.soft_delete(order_id).await? {
            return Err(OrderError::not_found(Entity::Order, order_id.0));
        }
        info!("order deleted");
        Ok(())
    }

    /// Consumes the engine and returns every stored order.
    pub async fn into_orders(self) -> Result<Vec<Order>> {
        self.orders.get_all().await
    }

    async fn cancel_checked(&self, actor: AccountId, snapshot: OrderSnapshot) -> Result<Order> {
        self.check(guard::evaluate(actor, &snapshot, Transition::Cancel))?;
        let order_id = snapshot.order.id;
        let current = snapshot.order.status;

        if current == OrderStatus::Processing {
            let intent_id = snapshot
                .order
                .payment_intent_id
                .clone()
                .ok_or(Reason::PaymentNotAuthorized)?;
            self.call_gateway(GatewayOperation::CancelHold, move |gateway| async move {
                gateway.cancel_hold(&intent_id).await
            })
            .await?;
        }

        if !self
            .orders
            .compare_and_set_status(order_id, current, OrderStatus::Cancelled, Some(actor))
            .await?
        {
            if current == OrderStatus::Processing {
                error!("payment hold cancelled but the order left PROCESSING concurrently");
            }
            return Err(Reason::StatusChanged.into());
        }
        info!(from = %current, "order cancelled");

        let updated = self.reload(order_id).await?;
        let notification = Notification::new(
            &updated,
            snapshot.counterparty(actor),
            NotificationKind::CancelledOrder,
        );
        tokio::join!(
            self.sync_ordering_flag(snapshot.listing.id, false),
            self.dispatch(notification)
        );
        Ok(updated)
    }

    fn begin(&self, order_id: OrderId) -> Result<InFlight<'_>> {
        let mut busy = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(order_id) {
            debug!(%order_id, "transition already running");
            return Err(Reason::TransitionInProgress.into());
        }
        Ok(InFlight {
            registry: &self.in_flight,
            order_id,
        })
    }

    fn check(&self, decision: Decision) -> Result<()> {
        decision.into_result().map_err(|reason| {
            debug!(%reason, "transition denied");
            OrderError::from(reason)
        })
    }

    async fn account(&self, id: AccountId) -> Result<Account> {
        self.accounts
            .get(id)
            .await?
            .ok_or_else(|| OrderError::not_found(Entity::Account, id.0))
    }

    /// Loads an order and resolves its listing, buyer and seller.
    async fn snapshot(&self, order_id: OrderId) -> Result<OrderSnapshot> {
        let order = self.reload(order_id).await?;
        let listing = self
            .listings
            .get(order.post_id)
            .await?
            .ok_or_else(|| OrderError::not_found(Entity::Listing, order.post_id.0))?;
        let (customer, seller) = tokio::try_join!(
            self.account(order.customer_id),
            self.account(listing.poster_id)
        )?;
        Ok(OrderSnapshot {
            order,
            listing,
            customer,
            seller,
        })
    }

    async fn reload(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found(Entity::Order, order_id.0))
    }

    /// Runs a gateway call on its own task, bounded by the configured deadline.
    ///
    /// The task is detached rather than aborted when the deadline passes, so
    /// a capture or cancellation the processor already started runs to
    /// completion; the caller only sees a retryable timeout.
    async fn call_gateway<T, F, Fut>(&self, operation: GatewayOperation, call: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn PaymentGateway>) -> Fut,
        Fut: Future<Output = std::result::Result<T, GatewayError>> + Send + 'static,
        T: Send + 'static,
    {
        self.call_gateway_or_else(operation, call, drop).await
    }

    /// Like `call_gateway`, but hands the still-running task to `on_late`
    /// once the deadline passes.
    async fn call_gateway_or_else<T, F, Fut, L>(
        &self,
        operation: GatewayOperation,
        call: F,
        on_late: L,
    ) -> Result<T>
    where
        F: FnOnce(Arc<dyn PaymentGateway>) -> Fut,
        Fut: Future<Output = std::result::Result<T, GatewayError>> + Send + 'static,
        T: Send + 'static,
        L: FnOnce(JoinHandle<std::result::Result<T, GatewayError>>),
    {
        let deadline = self.config.gateway_timeout;
        let mut task = tokio::spawn(call(Arc::clone(&self.gateway)));
        let outcome = match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => return Err(OrderError::Internal(Box::new(join_error))),
            Err(_) => {
                on_late(task);
                Err(GatewayError::Timeout(deadline))
            }
        };
        outcome.map_err(|source| {
            error!(%operation, error = %source, "payment gateway call failed");
            OrderError::ExternalService { operation, source }
        })
    }

    /// Best-effort release of a hold that lost a race.
    async fn release_hold(&self, intent_id: &str) {
        let intent_id = intent_id.to_string();
        if let Err(err) = self
            .call_gateway(GatewayOperation::CancelHold, move |gateway| async move {
                gateway.cancel_hold(&intent_id).await
            })
            .await
        {
            warn!(error = %err, "failed to release orphaned payment hold");
        }
    }

    async fn sync_ordering_flag(&self, listing_id: ListingId, ordering: bool) {
        if let Err(err) = self.listings.set_ordering_flag(listing_id, ordering).await {
            warn!(%listing_id, ordering, error = %err, "failed to sync listing ordering flag");
        }
    }

    async fn close_listing(&self, listing_id: ListingId) {
        if let Err(err) = self.listings.set_status(listing_id, ListingStatus::Done).await {
            warn!(%listing_id, error = %err, "failed to mark listing done");
        }
        self.sync_ordering_flag(listing_id, false).await;
    }

    async fn dispatch(&self, notification: Notification) {
        let recipient = notification.recipient;
        let kind = notification.kind;
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(%recipient, ?kind, error = %err, "failed to dispatch notification");
        }
    }

    async fn send_email(&self, email: Email) {
        let address = email.address.clone();
        if let Err(err) = self.notifier.email(email).await {
            warn!(%address, error = %err, "failed to send email");
        }
    }
}

/// Voids a hold the processor granted after the buyer was told the
/// authorization timed out.
async fn release_late_hold(
    gateway: PaymentGatewayHandle,
    late: JoinHandle<std::result::Result<String, GatewayError>>,
) {
    let Ok(Ok(intent_id)) = late.await else {
        return;
    };
    match gateway.cancel_hold(&intent_id).await {
        Ok(()) => warn!(%intent_id, "released payment hold granted after the deadline"),
        Err(err) => {
            error!(%intent_id, error = %err, "failed to release payment hold granted after the deadline")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::Listing;
    use crate::domain::ports::OrderStore;
    use crate::infrastructure::gateway::{GatewayCall, HoldState, SimulatedPaymentGateway};
    use crate::infrastructure::in_memory::{
        InMemoryAccountStore, InMemoryListingStore, InMemoryOrderStore,
    };
    use crate::infrastructure::notifications::RecordingDispatcher;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const SELLER: AccountId = AccountId(1);
    const BUYER: AccountId = AccountId(2);
    const LISTING: ListingId = ListingId(10);

    struct Harness {
        engine: OrderLifecycleEngine,
        orders: InMemoryOrderStore,
        listings: InMemoryListingStore,
        accounts: InMemoryAccountStore,
        gateway: SimulatedPaymentGateway,
        outbox: RecordingDispatcher,
    }

    /// Order store whose status swaps always lose, as when another request
    /// moved the order first.
    struct LosingStatusSwaps(InMemoryOrderStore);

    #[async_trait::async_trait]
    impl OrderStore for LosingStatusSwaps {
        async fn get(&self, id: OrderId) -> Result<Option<Order>> {
            self.0.get(id).await
        }

        async fn create(&self, order: crate::domain::order::NewOrder) -> Result<Order> {
            self.0.create(order).await
        }

        async fn compare_and_set_status(
            &self,
            _id: OrderId,
            _expected: OrderStatus,
            _new: OrderStatus,
            _cancelled_by: Option<AccountId>,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn attach_payment_intent(&self, id: OrderId, intent_id: &str) -> Result<bool> {
            self.0.attach_payment_intent(id, intent_id).await
        }

        async fn soft_delete(&self, id: OrderId) -> Result<bool> {
            self.0.soft_delete(id).await
        }

        async fn get_all(&self) -> Result<Vec<Order>> {
            self.0.get_all().await
        }
    }

    async fn harness(config: EngineConfig) -> Harness {
        let orders = InMemoryOrderStore::new();
        let listings = InMemoryListingStore::new();
        let accounts = InMemoryAccountStore::new();
        let gateway = SimulatedPaymentGateway::new();
        let outbox = RecordingDispatcher::new();

        accounts
            .store(
                Account::new(SELLER, "Seller", "seller@example.com").with_payout_account("acct_1"),
            )
            .await
            .unwrap();
        accounts
            .store(Account::new(BUYER, "Buyer", "buyer@example.com"))
            .await
            .unwrap();
        listings
            .store(Listing::new(LISTING, SELLER, "Road bike"))
            .await
            .unwrap();
        gateway.enable_payouts("acct_1");

        let engine = OrderLifecycleEngine::new(
            Collaborators {
                orders: Box::new(orders.clone()),
                listings: Box::new(listings.clone()),
                accounts: Box::new(accounts.clone()),
                gateway: Arc::new(gateway.clone()),
                notifier: Box::new(outbox.clone()),
            },
            config,
        );
        Harness {
            engine,
            orders,
            listings,
            accounts,
            gateway,
            outbox,
        }
    }

    fn create_request() -> CreateOrderRequest {
        CreateOrderRequest {
            post_id: Some(LISTING),
            customer_id: Some(BUYER),
            total: Some(dec!(25000)),
            payout_account: Some("acct_1".to_string()),
            ..Default::default()
        }
    }

    async fn delivered_order(h: &Harness) -> Order {
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();
        h.engine
            .authorize_payment(BUYER, AuthorizePaymentRequest { order_id: order.id })
            .await
            .unwrap();
        h.engine
            .update_status(
                SELLER,
                UpdateStatusRequest {
                    order_id: order.id,
                    status: OrderStatus::Delivered,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_order_reserves_listing_and_notifies_buyer() {
        let h = harness(EngineConfig::default()).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();

        assert_eq!(order.status, OrderStatus::WaitingForPayment);
        assert!(h.listings.get(LISTING).await.unwrap().unwrap().is_ordering);
        let notifications = h.outbox.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].recipient, BUYER);
        assert_eq!(notifications[0].kind, NotificationKind::PaymentCredit);
        assert_eq!(h.outbox.emails()[0].address, "buyer@example.com");
    }

    #[tokio::test]
    async fn test_create_order_requires_payout_enabled() {
        let h = harness(EngineConfig::default()).await;
        let request = CreateOrderRequest {
            payout_account: Some("acct_unlinked".to_string()),
            ..create_request()
        };
        let err = h.engine.create_order(SELLER, request).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(Reason::PayoutNotEnabled)));
        assert!(!h.listings.get(LISTING).await.unwrap().unwrap().is_ordering);
        assert!(h.orders.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_lifecycle_captures_on_receipt() {
        let h = harness(EngineConfig::default()).await;
        let order = delivered_order(&h).await;
        let intent = order.payment_intent_id.clone().unwrap();

        let received = h
            .engine
            .confirm_receipt(BUYER, ConfirmReceiptRequest { order_id: order.id })
            .await
            .unwrap();

        assert_eq!(received.status, OrderStatus::Received);
        assert_eq!(h.gateway.hold(&intent).unwrap().state, HoldState::Captured);
        let listing = h.listings.get(LISTING).await.unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Done);
        assert!(!listing.is_ordering);
        assert!(
            h.outbox
                .emails()
                .iter()
                .any(|email| email.address == "seller@example.com")
        );
    }

    #[tokio::test]
    async fn test_failed_capture_keeps_order_delivered() {
        let h = harness(EngineConfig::default()).await;
        let order = delivered_order(&h).await;
        h.gateway.set_fail_captures(true);

        let err = h
            .engine
            .confirm_receipt(BUYER, ConfirmReceiptRequest { order_id: order.id })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::ExternalService {
                operation: GatewayOperation::Capture,
                ..
            }
        ));
        let stored = h.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);

        h.gateway.set_fail_captures(false);
        let received = h
            .engine
            .confirm_receipt(BUYER, ConfirmReceiptRequest { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(received.status, OrderStatus::Received);
    }

    #[tokio::test]
    async fn test_capture_timeout_is_retryable() {
        let config = EngineConfig {
            gateway_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let h = harness(config).await;
        let order = delivered_order(&h).await;
        let intent = order.payment_intent_id.clone().unwrap();

        h.gateway.set_latency(Duration::from_millis(200));
        let err = h
            .engine
            .confirm_receipt(BUYER, ConfirmReceiptRequest { order_id: order.id })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            h.orders.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Delivered
        );

        // The detached capture still completes at the processor.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.gateway.hold(&intent).unwrap().state, HoldState::Captured);

        h.gateway.set_latency(Duration::ZERO);
        let received = h
            .engine
            .confirm_receipt(BUYER, ConfirmReceiptRequest { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(received.status, OrderStatus::Received);
    }

    #[tokio::test]
    async fn test_authorization_timeout_releases_late_hold() {
        let config = EngineConfig {
            gateway_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let h = harness(config).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();

        h.gateway.set_latency(Duration::from_millis(200));
        let err = h
            .engine
            .authorize_payment(BUYER, AuthorizePaymentRequest { order_id: order.id })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            OrderError::ExternalService {
                operation: GatewayOperation::Authorize,
                ..
            }
        ));
        h.gateway.set_latency(Duration::ZERO);

        // The hold granted after the deadline is voided, not left on the card.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(
            h.gateway.hold("pi_000001").unwrap().state,
            HoldState::Cancelled
        );
        let stored = h.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::WaitingForPayment);
        assert_eq!(stored.payment_intent_id, None);

        let paid = h
            .engine
            .authorize_payment(BUYER, AuthorizePaymentRequest { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Processing);
        assert_eq!(paid.payment_intent_id.as_deref(), Some("pi_000002"));
        assert_eq!(
            h.gateway.hold("pi_000002").unwrap().state,
            HoldState::RequiresCapture
        );
    }

    #[tokio::test]
    async fn test_cancel_losing_status_swap_reports_conflict() {
        let h = harness(EngineConfig::default()).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();
        let paid = h
            .engine
            .authorize_payment(BUYER, AuthorizePaymentRequest { order_id: order.id })
            .await
            .unwrap();
        let intent = paid.payment_intent_id.clone().unwrap();

        let engine = OrderLifecycleEngine::new(
            Collaborators {
                orders: Box::new(LosingStatusSwaps(h.orders.clone())),
                listings: Box::new(h.listings.clone()),
                accounts: Box::new(h.accounts.clone()),
                gateway: Arc::new(h.gateway.clone()),
                notifier: Box::new(h.outbox.clone()),
            },
            EngineConfig::default(),
        );
        let err = engine
            .cancel_order(SELLER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Conflict(Reason::StatusChanged)));
        assert_eq!(h.gateway.hold(&intent).unwrap().state, HoldState::Cancelled);
        assert_eq!(
            h.orders.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Processing
        );
        assert!(h.listings.get(LISTING).await.unwrap().unwrap().is_ordering);
    }

    #[tokio::test]
    async fn test_cancel_processing_voids_hold_first() {
        let h = harness(EngineConfig::default()).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();
        let paid = h
            .engine
            .authorize_payment(BUYER, AuthorizePaymentRequest { order_id: order.id })
            .await
            .unwrap();
        let intent = paid.payment_intent_id.clone().unwrap();

        h.gateway.set_fail_cancels(true);
        let err = h
            .engine
            .cancel_order(SELLER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ExternalService { .. }));
        assert_eq!(
            h.orders.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Processing
        );
        assert!(h.listings.get(LISTING).await.unwrap().unwrap().is_ordering);

        h.gateway.set_fail_cancels(false);
        let cancelled = h
            .engine
            .cancel_order(SELLER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(SELLER));
        assert_eq!(h.gateway.hold(&intent).unwrap().state, HoldState::Cancelled);
        assert!(!h.listings.get(LISTING).await.unwrap().unwrap().is_ordering);
        let last = h.outbox.notifications().pop().unwrap();
        assert_eq!(last.recipient, BUYER);
        assert_eq!(last.kind, NotificationKind::CancelledOrder);
    }

    #[tokio::test]
    async fn test_update_to_cancelled_runs_cancellation() {
        let h = harness(EngineConfig::default()).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();

        let cancelled = h
            .engine
            .update_status(
                SELLER,
                UpdateStatusRequest {
                    order_id: order.id,
                    status: OrderStatus::Cancelled,
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(!h.listings.get(LISTING).await.unwrap().unwrap().is_ordering);
        assert!(
            !h.gateway
                .journal()
                .iter()
                .any(|call| matches!(call, GatewayCall::CancelHold(_)))
        );
    }

    #[tokio::test]
    async fn test_notification_failures_do_not_fail_transitions() {
        let h = harness(EngineConfig::default()).await;
        h.outbox.set_failing(true);

        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();
        let cancelled = h
            .engine
            .cancel_order(BUYER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(h.outbox.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_transition_blocks_second_request() {
        let h = harness(EngineConfig::default()).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();

        let guard = h.engine.begin(order.id).unwrap();
        let err = h
            .engine
            .cancel_order(BUYER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Conflict(Reason::TransitionInProgress)
        ));
        drop(guard);

        h.engine
            .cancel_order(BUYER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_and_delete_order() {
        let h = harness(EngineConfig::default()).await;
        let order = h.engine.create_order(SELLER, create_request()).await.unwrap();

        assert_eq!(h.engine.get_order(BUYER, order.id).await.unwrap().id, order.id);
        let err = h.engine.get_order(AccountId(99), order.id).await.unwrap_err();
        assert!(matches!(err, OrderError::Authorization(Reason::NotParty)));

        let err = h
            .engine
            .delete_order(SELLER, DeleteOrderRequest { order_id: order.id })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Conflict(Reason::NotDeletable)));

        h.engine
            .cancel_order(BUYER, CancelOrderRequest { order_id: order.id })
            .await
            .unwrap();
        h.engine
            .delete_order(SELLER, DeleteOrderRequest { order_id: order.id })
            .await
            .unwrap();
        let err = h.engine.get_order(BUYER, order.id).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotFound {
                entity: Entity::Order,
                ..
            }
        ));
    }
}
