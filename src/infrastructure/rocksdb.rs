use crate::domain::account::{Account, AccountId};
use crate::domain::listing::{Listing, ListingId, ListingStatus};
use crate::domain::order::{NewOrder, Order, OrderId, OrderStatus};
use crate::domain::ports::{AccountStore, ListingStore, OrderStore};
use crate::error::{Entity, OrderError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for storing listings.
pub const CF_LISTINGS: &str = "listings";
/// Column Family for storing accounts.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for store bookkeeping such as the order id sequence.
pub const CF_META: &str = "meta";

const NEXT_ORDER_ID: &[u8] = b"next_order_id";

/// A persistent store implementation using RocksDB.
///
/// Orders, listings and accounts live in separate Column Families, values
/// are JSON and keys are big-endian ids so iteration follows id order.
///
/// Conditional writes are read-modify-write sequences; they are serialized
/// through `write_lock`, which every clone shares together with the `DB`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_LISTINGS, CF_ACCOUNTS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            OrderError::Storage(format!("{name} column family not found"))
        })
    }

    fn read<T: DeserializeOwned>(&self, family: &str, key: [u8; 8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, family: &str, key: [u8; 8], value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        let bytes = serde_json::to_vec(value).map_err(|e| OrderError::Internal(Box::new(e)))?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn next_order_id(&self) -> Result<OrderId> {
        let cf = self.cf(CF_META)?;
        let last = match self.db.get_pinned_cf(cf, NEXT_ORDER_ID)? {
            Some(bytes) => {
                let raw = <[u8; 8]>::try_from(&bytes[..]).map_err(|_| {
                    OrderError::Storage("corrupt order id sequence".to_string())
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = last + 1;
        self.db.put_cf(cf, NEXT_ORDER_ID, next.to_be_bytes())?;
        Ok(OrderId(next))
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| OrderError::Internal(Box::new(e)))
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let order: Option<Order> = self.read(CF_ORDERS, id.0.to_be_bytes())?;
        Ok(order.filter(|order| !order.is_deleted))
    }

    async fn create(&self, order: NewOrder) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let id = self.next_order_id()?;
        let order = Order::from_new(id, order, Utc::now());
        self.write(CF_ORDERS, id.0.to_be_bytes(), &order)?;
        Ok(order)
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        cancelled_by: Option<AccountId>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = id.0.to_be_bytes();
        let Some(mut order) = self.read::<Order>(CF_ORDERS, key)? else {
            return Ok(false);
        };
        if order.is_deleted || order.status != expected {
            return Ok(false);
        }
        order.apply_status(new, cancelled_by, Utc::now());
        self.write(CF_ORDERS, key, &order)?;
        Ok(true)
    }

    async fn attach_payment_intent(&self, id: OrderId, intent_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = id.0.to_be_bytes();
        let mut order = self
            .read::<Order>(CF_ORDERS, key)?
            .filter(|order| !order.is_deleted)
            .ok_or_else(|| OrderError::not_found(Entity::Order, id.0))?;
        if order.payment_intent_id.is_some() {
            return Ok(false);
        }
        order.payment_intent_id = Some(intent_id.to_string());
        order.updated_at = Utc::now();
        self.write(CF_ORDERS, key, &order)?;
        Ok(true)
    }

    async fn soft_delete(&self, id: OrderId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = id.0.to_be_bytes();
        match self.read::<Order>(CF_ORDERS, key)? {
            Some(mut order) if !order.is_deleted => {
                order.is_deleted = true;
                order.updated_at = Utc::now();
                self.write(CF_ORDERS, key, &order)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(decode(&value)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl ListingStore for RocksDBStore {
    async fn get(&self, id: ListingId) -> Result<Option<Listing>> {
        self.read(CF_LISTINGS, id.0.to_be_bytes())
    }

    async fn store(&self, listing: Listing) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(CF_LISTINGS, listing.id.0.to_be_bytes(), &listing)
    }

    async fn set_ordering_flag(&self, id: ListingId, ordering: bool) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = id.0.to_be_bytes();
        let mut listing = self
            .read::<Listing>(CF_LISTINGS, key)?
            .ok_or_else(|| OrderError::not_found(Entity::Listing, id.0))?;
        if listing.is_ordering == ordering {
            return Ok(false);
        }
        listing.is_ordering = ordering;
        self.write(CF_LISTINGS, key, &listing)?;
        Ok(true)
    }

    async fn set_status(&self, id: ListingId, status: ListingStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = id.0.to_be_bytes();
        let mut listing = self
            .read::<Listing>(CF_LISTINGS, key)?
            .ok_or_else(|| OrderError::not_found(Entity::Listing, id.0))?;
        listing.status = status;
        self.write(CF_LISTINGS, key, &listing)
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        self.read(CF_ACCOUNTS, id.0.to_be_bytes())
    }

    async fn store(&self, account: Account) -> Result<()> {
        self.write(CF_ACCOUNTS, account.id.0.to_be_bytes(), &account)
    }
}
