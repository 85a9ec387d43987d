use super::account::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a listing (a seller's post).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub u64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    /// An order on the listing has been received and paid out.
    Done,
}

/// A seller's item for sale.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Listing {
    pub id: ListingId,
    pub poster_id: AccountId,
    pub title: String,
    /// Set while a non-cancelled, non-terminal order exists for this listing.
    pub is_ordering: bool,
    pub status: ListingStatus,
}

impl Listing {
    pub fn new(id: ListingId, poster_id: AccountId, title: impl Into<String>) -> Self {
        Self {
            id,
            poster_id,
            title: title.into(),
            is_ordering: false,
            status: ListingStatus::Active,
        }
    }
}
