use ethers::types::U256;
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Breakdown of a cost that the wallet can cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Affordability {
    pub principal: U256,
    /// fee_budget * fee_price
    pub max_fee: U256,
    pub total: U256,
    pub balance: U256,
}

/// Can `balance` cover `principal + fee_budget * fee_price`?
///
/// Fails closed: an unknown fee price or an overflowing total is unaffordable.
/// Advisory only; the Ledger re-validates at execution.
pub fn check_affordable(
    balance: U256,
    principal: U256,
    fee_budget: U256,
    fee_price: Option<U256>,
) -> AppResult<Affordability> {
    let Some(fee_price) = fee_price else {
        warn!("Fee price unknown, treating transaction as unaffordable");
        return Err(AppError::InsufficientFunds {
            required: "unknown".to_string(),
            available: balance.to_string(),
        });
    };

    let total = fee_budget
        .checked_mul(fee_price)
        .and_then(|max_fee| principal.checked_add(max_fee).map(|total| (max_fee, total)));

    match total {
        Some((max_fee, total)) if total <= balance => Ok(Affordability {
            principal,
            max_fee,
            total,
            balance,
        }),
        Some((_, total)) => {
            warn!("Insufficient funds: {} > {}", total, balance);
            Err(AppError::InsufficientFunds {
                required: total.to_string(),
                available: balance.to_string(),
            })
        }
        None => Err(AppError::InsufficientFunds {
            required: "overflow".to_string(),
            available: balance.to_string(),
        }),
    }
}
