use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    error::AppResult,
    ledger::{models::ScheduleCall, Ledger},
};

/// Gas budget used when the Ledger cannot simulate a schedule call.
///
/// Fixed and independent of network congestion.
pub const FALLBACK_GAS_LIMIT: u64 = 200_000;

/// Which branch produced a fee budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSource {
    Simulated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBudget {
    pub gas_limit: U256,
    pub source: FeeSource,
}

impl FeeBudget {
    pub fn fallback() -> Self {
        Self {
            gas_limit: U256::from(FALLBACK_GAS_LIMIT),
            source: FeeSource::Fallback,
        }
    }

    /// Simulate-or-fallback: a simulation result becomes the budget, any
    /// failure becomes `FALLBACK_GAS_LIMIT`.
    pub fn resolve(simulation: AppResult<U256>) -> Self {
        match simulation {
            Ok(gas_limit) => Self {
                gas_limit,
                source: FeeSource::Simulated,
            },
            Err(e) => {
                warn!(
                    "Gas estimation failed, using fallback limit {}: {}",
                    FALLBACK_GAS_LIMIT, e
                );
                Self::fallback()
            }
        }
    }
}

pub struct FeeEstimator {
    ledger: Arc<dyn Ledger>,
}

impl FeeEstimator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Budget for the exact `schedulePayment` call that will be submitted.
    /// Never fails.
    pub async fn estimate_schedule_fee(&self, from: Address, call: &ScheduleCall) -> FeeBudget {
        let budget = FeeBudget::resolve(self.ledger.estimate_schedule_gas(from, call).await);
        debug!("Fee budget for schedulePayment: {:?}", budget);
        budget
    }
}
