use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a marketplace user, buyer or seller alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A marketplace user as seen by the order lifecycle.
///
/// Profile storage belongs to another service; the engine only needs the
/// contact address, the payout destination and the soft-delete flag.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub email: String,
    /// Payment-processor account that receives captured funds when this user sells.
    pub payout_account: Option<String>,
    pub is_deleted: bool,
}

impl Account {
    pub fn new(id: AccountId, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
            payout_account: None,
            is_deleted: false,
        }
    }

    pub fn with_payout_account(mut self, payout_account: impl Into<String>) -> Self {
        self.payout_account = Some(payout_account.into());
        self
    }

    /// Marks the account as removed. Accounts are never hard-deleted.
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }
}
