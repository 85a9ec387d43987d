#![allow(dead_code)]

use marketplace_orders::application::engine::{Collaborators, OrderLifecycleEngine};
use marketplace_orders::application::requests::{
    AuthorizePaymentRequest, CreateOrderRequest, UpdateStatusRequest,
};
use marketplace_orders::config::EngineConfig;
use marketplace_orders::domain::account::{Account, AccountId};
use marketplace_orders::domain::listing::{Listing, ListingId};
use marketplace_orders::domain::order::{Order, OrderStatus};
use marketplace_orders::domain::ports::{AccountStore, ListingStore};
use marketplace_orders::infrastructure::gateway::SimulatedPaymentGateway;
use marketplace_orders::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryListingStore, InMemoryOrderStore,
};
use marketplace_orders::infrastructure::notifications::RecordingDispatcher;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const SELLER: AccountId = AccountId(1);
pub const BUYER: AccountId = AccountId(2);
pub const STRANGER: AccountId = AccountId(3);
pub const LISTING: ListingId = ListingId(10);
pub const SELLER_PAYOUT: &str = "acct_1";

/// A seeded marketplace: a seller with payouts enabled, a buyer, an
/// unrelated user and one active listing owned by the seller.
pub struct Marketplace {
    pub engine: Arc<OrderLifecycleEngine>,
    pub orders: InMemoryOrderStore,
    pub listings: InMemoryListingStore,
    pub accounts: InMemoryAccountStore,
    pub gateway: SimulatedPaymentGateway,
    pub outbox: RecordingDispatcher,
}

impl Marketplace {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let orders = InMemoryOrderStore::new();
        let listings = InMemoryListingStore::new();
        let accounts = InMemoryAccountStore::new();
        let gateway = SimulatedPaymentGateway::new();
        let outbox = RecordingDispatcher::new();

        accounts
            .store(
                Account::new(SELLER, "Seller", "seller@example.com")
                    .with_payout_account(SELLER_PAYOUT),
            )
            .await
            .unwrap();
        accounts
            .store(Account::new(BUYER, "Buyer", "buyer@example.com"))
            .await
            .unwrap();
        accounts
            .store(Account::new(STRANGER, "Stranger", "stranger@example.com"))
            .await
            .unwrap();
        listings
            .store(Listing::new(LISTING, SELLER, "Vintage camera"))
            .await
            .unwrap();
        gateway.enable_payouts(SELLER_PAYOUT);

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

        Self {
            engine: Arc::new(engine),
            orders,
            listings,
            accounts,
            gateway,
            outbox,
        }
    }

    pub async fn add_listing(&self, id: ListingId) {
        self.listings
            .store(Listing::new(id, SELLER, format!("Listing {id}")))
            .await
            .unwrap();
    }

    pub async fn listing(&self, id: ListingId) -> Listing {
        self.listings.get(id).await.unwrap().unwrap()
    }

    pub async fn create(&self, listing: ListingId) -> Order {
        self.engine
            .create_order(SELLER, create_request(listing))
            .await
            .unwrap()
    }

    /// An order the buyer has paid for.
    pub async fn processing(&self, listing: ListingId) -> Order {
        let order = self.create(listing).await;
        self.engine
            .authorize_payment(BUYER, AuthorizePaymentRequest { order_id: order.id })
            .await
            .unwrap()
    }

    /// A paid order the seller has marked delivered.
    pub async fn delivered(&self, listing: ListingId) -> Order {
        let order = self.processing(listing).await;
        self.engine
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
}

pub fn create_request(listing: ListingId) -> CreateOrderRequest {
    CreateOrderRequest {
        post_id: Some(listing),
        customer_id: Some(BUYER),
        total: Some(dec!(25000)),
        payout_account: Some(SELLER_PAYOUT.to_string()),
        customer_name: Some("Buyer".to_string()),
        customer_phone: Some("0900000000".to_string()),
        customer_address: Some("12 Market Street".to_string()),
        ..Default::default()
    }
}
