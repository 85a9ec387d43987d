use crate::domain::guard::{Category, Reason};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Order,
    Listing,
    Account,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Order => "Order",
            Entity::Listing => "Listing",
            Entity::Account => "Account",
        })
    }
}

/// Payment processor call the engine was making.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    PayoutCheck,
    Authorize,
    Capture,
    CancelHold,
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GatewayOperation::PayoutCheck => "payout check",
            GatewayOperation::Authorize => "authorization",
            GatewayOperation::Capture => "capture",
            GatewayOperation::CancelHold => "hold cancellation",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("unknown payment intent {0}")]
    UnknownIntent(String),
    #[error("payment intent {intent} is {state}")]
    InvalidState { intent: String, state: String },
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
    #[error("payment processor did not answer within {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout(_))
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Validation error: {0}")]
    Validation(Reason),
    #[error("Authorization error: {0}")]
    Authorization(Reason),
    #[error("Conflict: {0}")]
    Conflict(Reason),
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },
    #[error("Payment gateway {operation} failed: {source}")]
    ExternalService {
        operation: GatewayOperation,
        #[source]
        source: GatewayError,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl OrderError {
    pub fn not_found(entity: Entity, id: u64) -> Self {
        OrderError::NotFound { entity, id }
    }

    /// The denial behind a validation, authorization or conflict error.
    pub fn reason(&self) -> Option<Reason> {
        match self {
            OrderError::Validation(reason)
            | OrderError::Authorization(reason)
            | OrderError::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::ExternalService { source, .. } => source.is_retryable(),
            OrderError::Conflict(reason) => matches!(
                reason,
                Reason::StatusChanged | Reason::TransitionInProgress
            ),
            _ => false,
        }
    }
}

impl From<Reason> for OrderError {
    fn from(reason: Reason) -> Self {
        match reason.category() {
            Category::Validation => OrderError::Validation(reason),
            Category::Authorization => OrderError::Authorization(reason),
            Category::Conflict => OrderError::Conflict(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
