//! A payment processor simulator.
//!
//! Behaves like a card processor with manual capture: `authorize` places a
//! hold, `capture` converts it into a transfer to the destination account and
//! `cancel_hold` voids it. Failure switches and an artificial latency let
//! tests and replays exercise the engine's error paths.

use crate::domain::ports::{CapturedPayment, PaymentGateway};
use crate::error::GatewayError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    RequiresCapture,
    Captured,
    Cancelled,
}

impl HoldState {
    fn as_str(self) -> &'static str {
        match self {
            HoldState::RequiresCapture => "requires_capture",
            HoldState::Captured => "succeeded",
            HoldState::Cancelled => "canceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hold {
    pub amount: Decimal,
    pub currency: String,
    pub destination: String,
    pub state: HoldState,
}

/// Every call the gateway received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    PayoutCheck(String),
    Authorize { destination: String },
    Capture(String),
    CancelHold(String),
}

#[derive(Default)]
struct Ledger {
    holds: HashMap<String, Hold>,
    payout_accounts: HashSet<String>,
    journal: Vec<GatewayCall>,
    next_intent: u64,
    fail_captures: bool,
    fail_cancels: bool,
    decline_authorizations: bool,
    latency: Duration,
}

#[derive(Default, Clone)]
pub struct SimulatedPaymentGateway {
    ledger: Arc<Mutex<Ledger>>,
}

impl SimulatedPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks a connected account as able to receive transfers.
    pub fn enable_payouts(&self, account: impl Into<String>) {
        self.ledger().payout_accounts.insert(account.into());
    }

    pub fn set_fail_captures(&self, fail: bool) {
        self.ledger().fail_captures = fail;
    }

    pub fn set_fail_cancels(&self, fail: bool) {
        self.ledger().fail_cancels = fail;
    }

    pub fn set_decline_authorizations(&self, decline: bool) {
        self.ledger().decline_authorizations = decline;
    }

    /// Delay applied before every call takes effect.
    pub fn set_latency(&self, latency: Duration) {
        self.ledger().latency = latency;
    }

    pub fn journal(&self) -> Vec<GatewayCall> {
        self.ledger().journal.clone()
    }

    pub fn hold(&self, intent_id: &str) -> Option<Hold> {
        self.ledger().holds.get(intent_id).cloned()
    }

    async fn delay(&self) {
        let latency = self.ledger().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn invalid_state(intent_id: &str, state: HoldState) -> GatewayError {
    GatewayError::InvalidState {
        intent: intent_id.to_string(),
        state: state.as_str().to_string(),
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn authorize(
        &self,
        destination: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<String, GatewayError> {
        self.delay().await;
        let mut ledger = self.ledger();
        ledger.journal.push(GatewayCall::Authorize {
            destination: destination.to_string(),
        });
        if ledger.decline_authorizations {
            return Err(GatewayError::Declined("card_declined".to_string()));
        }
        if !ledger.payout_accounts.contains(destination) {
            return Err(GatewayError::Declined(format!(
                "destination {destination} cannot receive transfers"
            )));
        }
        ledger.next_intent += 1;
        let intent_id = format!("pi_{:06}", ledger.next_intent);
        ledger.holds.insert(
            intent_id.clone(),
            Hold {
                amount,
                currency: currency.to_string(),
                destination: destination.to_string(),
                state: HoldState::RequiresCapture,
            },
        );
        Ok(intent_id)
    }

    async fn capture(&self, intent_id: &str) -> Result<CapturedPayment, GatewayError> {
        self.delay().await;
        let mut ledger = self.ledger();
        ledger.journal.push(GatewayCall::Capture(intent_id.to_string()));
        if ledger.fail_captures {
            return Err(GatewayError::Unavailable("capture rejected".to_string()));
        }
        let hold = ledger
            .holds
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))?;
        match hold.state {
            HoldState::RequiresCapture | HoldState::Captured => {
                hold.state = HoldState::Captured;
                Ok(CapturedPayment {
                    amount: hold.amount,
                    currency: hold.currency.clone(),
                    destination: hold.destination.clone(),
                })
            }
            HoldState::Cancelled => Err(invalid_state(intent_id, hold.state)),
        }
    }

    async fn cancel_hold(&self, intent_id: &str) -> Result<(), GatewayError> {
        self.delay().await;
        let mut ledger = self.ledger();
        ledger
            .journal
            .push(GatewayCall::CancelHold(intent_id.to_string()));
        if ledger.fail_cancels {
            return Err(GatewayError::Unavailable("cancellation rejected".to_string()));
        }
        let hold = ledger
            .holds
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))?;
        match hold.state {
            HoldState::RequiresCapture | HoldState::Cancelled => {
                hold.state = HoldState::Cancelled;
                Ok(())
            }
            HoldState::Captured => Err(invalid_state(intent_id, hold.state)),
        }
    }

    async fn is_payout_enabled(&self, account: &str) -> Result<bool, GatewayError> {
        self.delay().await;
        let mut ledger = self.ledger();
        ledger
            .journal
            .push(GatewayCall::PayoutCheck(account.to_string()));
        Ok(ledger.payout_accounts.contains(account))
    }
}
