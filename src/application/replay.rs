use crate::application::engine::OrderLifecycleEngine;
use crate::application::requests::{
    AuthorizePaymentRequest, CancelOrderRequest, ConfirmReceiptRequest, CreateOrderRequest,
    DeleteOrderRequest, UpdateStatusRequest,
};
use crate::domain::account::Account;
use crate::domain::guard::Reason;
use crate::domain::listing::Listing;
use crate::domain::order::{Order, OrderId};
use crate::error::{Entity, OrderError, Result};
use crate::infrastructure::gateway::SimulatedPaymentGateway;
use crate::interfaces::csv::command_reader::{Command, CommandType};
use tracing::debug;

/// Drives the engine from replay commands.
///
/// Accounts registered through a replay get a generated email and a payout
/// account (`acct_<id>`) that the simulated processor accepts transfers for.
pub struct Replayer {
    engine: OrderLifecycleEngine,
    gateway: SimulatedPaymentGateway,
}

impl Replayer {
    pub fn new(engine: OrderLifecycleEngine, gateway: SimulatedPaymentGateway) -> Self {
        Self { engine, gateway }
    }

    pub fn engine(&self) -> &OrderLifecycleEngine {
        &self.engine
    }

    pub async fn apply(&self, command: Command) -> Result<()> {
        debug!(?command, "applying command");
        let actor = command.actor;
        match command.command {
            CommandType::Account => {
                let payout_account = format!("acct_{actor}");
                let account = Account::new(
                    actor,
                    format!("user{actor}"),
                    format!("user{actor}@example.com"),
                )
                .with_payout_account(payout_account.clone());
                self.engine.accounts().store(account).await?;
                self.gateway.enable_payouts(payout_account);
            }
            CommandType::Listing => {
                let id = command.listing.ok_or(Reason::MissingListing)?;
                if self.engine.listings().get(id).await?.is_some() {
                    return Err(Reason::ListingAlreadyExists.into());
                }
                let listing = Listing::new(id, actor, format!("Listing {id}"));
                self.engine.listings().store(listing).await?;
            }
            CommandType::Create => {
                let seller = self
                    .engine
                    .accounts()
                    .get(actor)
                    .await?
                    .ok_or_else(|| OrderError::not_found(Entity::Account, actor.0))?;
                let request = CreateOrderRequest {
                    post_id: command.listing,
                    customer_id: command.customer,
                    total: command.amount,
                    payout_account: seller.payout_account,
                    ..Default::default()
                };
                self.engine.create_order(actor, request).await?;
            }
            CommandType::Pay => {
                let order_id = order_id(&command)?;
                self.engine
                    .authorize_payment(actor, AuthorizePaymentRequest { order_id })
                    .await?;
            }
            CommandType::Update => {
                let order_id = order_id(&command)?;
                let status = command.status.ok_or(Reason::MissingStatus)?;
                self.engine
                    .update_status(actor, UpdateStatusRequest { order_id, status })
                    .await?;
            }
            CommandType::Receive => {
                let order_id = order_id(&command)?;
                self.engine
                    .confirm_receipt(actor, ConfirmReceiptRequest { order_id })
                    .await?;
            }
            CommandType::Cancel => {
                let order_id = order_id(&command)?;
                self.engine
                    .cancel_order(actor, CancelOrderRequest { order_id })
                    .await?;
            }
            CommandType::Delete => {
                let order_id = order_id(&command)?;
                self.engine
                    .delete_order(actor, DeleteOrderRequest { order_id })
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn into_orders(self) -> Result<Vec<Order>> {
        self.engine.into_orders().await
    }
}

fn order_id(command: &Command) -> Result<OrderId> {
    Ok(command.order.ok_or(Reason::MissingOrder)?)
}
