use chrono::{DateTime, Utc};
use ethers::types::{Address, TxHash, U256};
use ethers::utils::{format_ether, parse_ether};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Networks the dashboard can read balances from.
/// The Ledger itself is deployed on exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Sepolia,
    Rinkeby,
    Mainnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Sepolia => "sepolia",
            Network::Rinkeby => "rinkeby",
            Network::Mainnet => "mainnet",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Network::Sepolia => "Sepolia",
            Network::Rinkeby => "Rinkeby",
            Network::Mainnet => "Mainnet",
        }
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sepolia" => Ok(Network::Sepolia),
            "rinkeby" => Ok(Network::Rinkeby),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(AppError::Validation(format!("Unknown network: {}", other))),
        }
    }
}

/// A scheduled payment as reported by the Ledger. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub sender: Address,
    pub receiver: Address,
    /// Amount in wei
    pub amount: U256,
    /// Unix seconds
    pub scheduled_time: u64,
    pub note: String,
    pub claimed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Due,
    Claimed,
}

impl Payment {
    /// Status against the Ledger's clock, not the client's.
    pub fn status_at(&self, ledger_time: u64) -> PaymentStatus {
        if self.claimed {
            PaymentStatus::Claimed
        } else if ledger_time >= self.scheduled_time {
            PaymentStatus::Due
        } else {
            PaymentStatus::Pending
        }
    }
}

/// Frozen parameters of a `schedulePayment` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleCall {
    pub receiver: Address,
    pub amount: U256,
    pub note: String,
    pub scheduled_time: u64,
}

/// The two state-changing Ledger operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    SchedulePayment,
    ClaimPayment,
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerOperation::SchedulePayment => write!(f, "schedulePayment"),
            LedgerOperation::ClaimPayment => write!(f, "claimPayment"),
        }
    }
}

/// Events emitted by the contract, decoded from receipts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PaymentScheduled {
        sender: Address,
        receiver: Address,
        amount: U256,
        scheduled_time: u64,
        note: String,
    },
    PaymentClaimed {
        receiver: Address,
        amount: U256,
    },
}

/// Result of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub success: bool,
    pub events: Vec<LedgerEvent>,
}

impl TxOutcome {
    /// Total amount paid out by `PaymentClaimed` events in this receipt
    pub fn claimed_amount(&self) -> U256 {
        self.events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::PaymentClaimed { amount, .. } => Some(*amount),
                _ => None,
            })
            .fold(U256::zero(), |acc, a| acc.saturating_add(a))
    }
}

/// Balance snapshot with the network it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub network: Network,
    pub wei: U256,
    pub fetched_at: DateTime<Utc>,
}

/// Convert a user-entered ether amount into wei.
pub fn ether_to_wei(amount: &str) -> AppResult<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Amount cannot be empty".to_string()));
    }

    let decimal = Decimal::from_str(trimmed)
        .map_err(|_| AppError::Validation(format!("Invalid amount: {}", trimmed)))?;

    if decimal <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be greater than zero".to_string()));
    }
    if decimal.normalize().scale() > 18 {
        return Err(AppError::Validation(
            "Amount has more than 18 decimal places".to_string(),
        ));
    }

    parse_ether(decimal.normalize().to_string())
        .map_err(|e| AppError::Validation(format!("Invalid amount {}: {}", trimmed, e)))
}

/// Render wei as an ether decimal for display
pub fn wei_to_ether(wei: U256) -> AppResult<Decimal> {
    let text = format_ether(wei);
    Decimal::from_str(&text)
        .map(|d| d.normalize())
        .map_err(|e| AppError::Internal(format!("Cannot render {} wei as ether: {}", wei, e)))
}
