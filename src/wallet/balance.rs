use chrono::Utc;
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    error::AppResult,
    ledger::{
        models::{BalanceSnapshot, Network},
        BalanceSource,
    },
};

/// Reads native balances. Every call hits the requested network; nothing is
/// cached across networks.
pub struct BalanceTracker {
    source: Arc<dyn BalanceSource>,
}

impl BalanceTracker {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self { source }
    }

    #[instrument(skip(self))]
    pub async fn get_balance(&self, address: Address, network: Network) -> AppResult<BalanceSnapshot> {
        let wei = self.source.balance_of(address, network).await?;
        debug!("Balance of {:?} on {}: {} wei", address, network, wei);

        Ok(BalanceSnapshot {
            network,
            wei,
            fetched_at: Utc::now(),
        })
    }
}
