use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;
use uuid::Uuid;

use crate::ledger::models::{BalanceSnapshot, Network, Payment};

/// Session view state. Treated as a value: every change produces a new
/// context that replaces the old one whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionContext {
    pub session_id: Uuid,
    pub address: Option<Address>,
    pub network: Network,
    pub balance: Option<BalanceSnapshot>,
    pub payments: Vec<Payment>,
    pub payments_fetched_at: Option<DateTime<Utc>>,
}

impl TransactionContext {
    pub fn new(network: Network) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            address: None,
            network,
            balance: None,
            payments: Vec::new(),
            payments_fetched_at: None,
        }
    }

    /// A different account invalidates everything read for the previous one
    pub fn with_address(self, address: Address) -> Self {
        if self.address == Some(address) {
            return self;
        }
        Self {
            address: Some(address),
            balance: None,
            payments: Vec::new(),
            payments_fetched_at: None,
            ..self
        }
    }

    /// Switching networks drops the balance; payments are network-independent.
    pub fn with_network(self, network: Network) -> Self {
        if self.network == network {
            return self;
        }
        Self {
            network,
            balance: None,
            ..self
        }
    }

    /// Ignored when the snapshot was read from another network than the active one
    pub fn with_balance(self, balance: BalanceSnapshot) -> Self {
        if balance.network != self.network {
            return self;
        }
        Self {
            balance: Some(balance),
            ..self
        }
    }

    pub fn with_payments(self, payments: Vec<Payment>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            payments,
            payments_fetched_at: Some(fetched_at),
            ..self
        }
    }
}
