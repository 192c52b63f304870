use chrono::{DateTime, Utc};
use ethers::types::Address;
use std::sync::Arc;
use tracing::debug;

use crate::{
    error::AppResult,
    ledger::{models::Payment, Ledger},
};

/// One fetch of a sender's payments
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub sender: Address,
    pub payments: Vec<Payment>,
    pub fetched_at: DateTime<Utc>,
}

/// Sender-indexed view of the Ledger's payments.
///
/// Every fetch goes to the Ledger and its answer replaces whatever the caller
/// held before. Nothing is cached or merged here.
pub struct PaymentRegistryView {
    ledger: Arc<dyn Ledger>,
}

impl PaymentRegistryView {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Fetch the sender's payments. An empty list is a valid answer.
    pub async fn list_by_sender(&self, sender: Address) -> AppResult<RegistrySnapshot> {
        let payments = self.ledger.sender_payments(sender).await?;
        debug!("Ledger reports {} payment(s) for {:?}", payments.len(), sender);

        Ok(RegistrySnapshot {
            sender,
            payments,
            fetched_at: Utc::now(),
        })
    }
}
