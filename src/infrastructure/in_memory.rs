use crate::domain::account::{Account, AccountId};
use crate::domain::listing::{Listing, ListingId, ListingStatus};
use crate::domain::order::{NewOrder, Order, OrderId, OrderStatus};
use crate::domain::ports::{AccountStore, ListingStore, OrderStore};
use crate::error::{Entity, OrderError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// A thread-safe in-memory store for orders.
///
/// Every conditional write (status compare-and-set, intent attachment) runs
/// under the write lock, so it is atomic with respect to other writers.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).filter(|order| !order.is_deleted).cloned())
    }

    async fn create(&self, order: NewOrder) -> Result<Order> {
        let id = OrderId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let order = Order::from_new(id, order, Utc::now());
        let mut orders = self.orders.write().await;
        orders.insert(id, order.clone());
        Ok(order)
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        cancelled_by: Option<AccountId>,
    ) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if !order.is_deleted && order.status == expected => {
                order.apply_status(new, cancelled_by, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_payment_intent(&self, id: OrderId, intent_id: &str) -> Result<bool> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .filter(|order| !order.is_deleted)
            .ok_or_else(|| OrderError::not_found(Entity::Order, id.0))?;
        if order.payment_intent_id.is_some() {
            return Ok(false);
        }
        order.payment_intent_id = Some(intent_id.to_string());
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn soft_delete(&self, id: OrderId) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if !order.is_deleted => {
                order.is_deleted = true;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by_key(|order| order.id);
        Ok(all)
    }
}

/// A thread-safe in-memory store for listings.
#[derive(Default, Clone)]
pub struct InMemoryListingStore {
    listings: Arc<RwLock<HashMap<ListingId, Listing>>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn get(&self, id: ListingId) -> Result<Option<Listing>> {
        let listings = self.listings.read().await;
        Ok(listings.get(&id).cloned())
    }

    async fn store(&self, listing: Listing) -> Result<()> {
        let mut listings = self.listings.write().await;
        listings.insert(listing.id, listing);
        Ok(())
    }

    async fn set_ordering_flag(&self, id: ListingId, ordering: bool) -> Result<bool> {
        let mut listings = self.listings.write().await;
        let listing = listings
            .get_mut(&id)
            .ok_or_else(|| OrderError::not_found(Entity::Listing, id.0))?;
        if listing.is_ordering == ordering {
            return Ok(false);
        }
        listing.is_ordering = ordering;
        Ok(true)
    }

    async fn set_status(&self, id: ListingId, status: ListingStatus) -> Result<()> {
        let mut listings = self.listings.write().await;
        let listing = listings
            .get_mut(&id)
            .ok_or_else(|| OrderError::not_found(Entity::Listing, id.0))?;
        listing.status = status;
        Ok(())
    }
}

/// A thread-safe in-memory store for user accounts.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn store(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id, account);
        Ok(())
    }
}
