use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the order lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Smallest total accepted for a card-paid order.
    pub minimum_total: Decimal,
    /// Currency the payment hold is placed in.
    pub currency: String,
    /// Deadline for each payment gateway call.
    pub gateway_timeout: Duration,
    /// Marketplace name used in email subjects.
    pub site_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimum_total: dec!(20000),
            currency: "vnd".to_string(),
            gateway_timeout: Duration::from_secs(10),
            site_name: "Marketplace".to_string(),
        }
    }
}
