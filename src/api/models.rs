use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, U256};
use ethers::utils::{format_ether, to_checksum};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    execution::{TxAttempt, TxState},
    fees::FeeSource,
    ledger::models::{wei_to_ether, BalanceSnapshot, LedgerEvent, LedgerOperation, Payment, PaymentStatus},
    orchestrator::{ClaimReport, ScheduleReport, TransactionContext},
};

// ========== REQUEST MODELS ==========

/// Request to change the active network
#[derive(Debug, Deserialize)]
pub struct SwitchNetworkRequest {
    /// sepolia | rinkeby | mainnet
    pub network: String,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ledger_network: String,
    pub contract_address: String,
    pub notification_subscribers: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub network: String,
    pub network_label: String,
    pub balance_wei: String,
    pub balance_eth: String,
    pub fetched_at: DateTime<Utc>,
}

impl From<BalanceSnapshot> for BalanceResponse {
    fn from(snapshot: BalanceSnapshot) -> Self {
        Self {
            network: snapshot.network.as_str().to_string(),
            network_label: snapshot.network.label().to_string(),
            balance_wei: snapshot.wei.to_string(),
            balance_eth: ether(snapshot.wei),
            fetched_at: snapshot.fetched_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub sender: String,
    pub receiver: String,
    pub amount_wei: String,
    pub amount_eth: String,
    pub scheduled_time: u64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub note: String,
    pub claimed: bool,
    /// Against the Ledger clock; absent when the clock could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
}

impl PaymentResponse {
    pub fn new(payment: &Payment, ledger_time: Option<u64>) -> Self {
        Self {
            sender: checksum(payment.sender),
            receiver: checksum(payment.receiver),
            amount_wei: payment.amount.to_string(),
            amount_eth: ether(payment.amount),
            scheduled_time: payment.scheduled_time,
            scheduled_at: unix_to_datetime(payment.scheduled_time),
            note: payment.note.clone(),
            claimed: payment.claimed,
            status: ledger_time.map(|now| payment.status_at(now)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentsResponse {
    pub sender: String,
    pub ledger_time: Option<u64>,
    pub count: usize,
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub attempt_id: Uuid,
    pub operation: LedgerOperation,
    pub state: TxState,
    pub from: String,
    pub value_eth: String,
    pub gas_limit: Option<String>,
    pub fee_source: Option<FeeSource>,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub gas_used: Option<String>,
    pub events: Vec<LedgerEvent>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TxAttempt> for TransactionResponse {
    fn from(attempt: &TxAttempt) -> Self {
        let outcome = attempt.outcome.as_ref();
        Self {
            attempt_id: attempt.id,
            operation: attempt.operation,
            state: attempt.state,
            from: checksum(attempt.from),
            value_eth: ether(attempt.value),
            gas_limit: attempt.gas_limit.map(|g| g.to_string()),
            fee_source: attempt.fee_source,
            tx_hash: attempt.tx_hash.map(|h| format!("{:?}", h)),
            block_number: outcome.and_then(|o| o.block_number),
            gas_used: outcome.and_then(|o| o.gas_used).map(|g| g.to_string()),
            events: outcome.map(|o| o.events.clone()).unwrap_or_default(),
            error: attempt.error_message.clone(),
            created_at: attempt.created_at,
            updated_at: attempt.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub transaction: TransactionResponse,
    pub amount_eth: String,
    pub max_fee_eth: String,
    pub total_eth: String,
    pub balance_before_eth: String,
}

impl From<ScheduleReport> for ScheduleResponse {
    fn from(report: ScheduleReport) -> Self {
        Self {
            transaction: TransactionResponse::from(&report.attempt),
            amount_eth: ether(report.cost.principal),
            max_fee_eth: ether(report.cost.max_fee),
            total_eth: ether(report.cost.total),
            balance_before_eth: ether(report.cost.balance),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub transaction: TransactionResponse,
    pub claimed_wei: String,
    pub claimed_eth: String,
}

impl From<ClaimReport> for ClaimResponse {
    fn from(report: ClaimReport) -> Self {
        Self {
            transaction: TransactionResponse::from(&report.attempt),
            claimed_wei: report.claimed.to_string(),
            claimed_eth: ether(report.claimed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub address: Option<String>,
    pub network: String,
    pub ledger_network: String,
    pub balance: Option<BalanceResponse>,
    pub payments: Vec<PaymentResponse>,
    pub payments_fetched_at: Option<DateTime<Utc>>,
    pub last_transaction: Option<TransactionResponse>,
    /// Submitted transaction whose confirmation is still outstanding
    pub unresolved_tx_hash: Option<String>,
}

impl SessionResponse {
    pub fn new(
        ctx: TransactionContext,
        ledger_network: &str,
        last_attempt: Option<&TxAttempt>,
        unresolved: Option<ethers::types::TxHash>,
    ) -> Self {
        Self {
            session_id: ctx.session_id,
            address: ctx.address.map(checksum),
            network: ctx.network.as_str().to_string(),
            ledger_network: ledger_network.to_string(),
            balance: ctx.balance.map(BalanceResponse::from),
            payments: ctx
                .payments
                .iter()
                .map(|p| PaymentResponse::new(p, None))
                .collect(),
            payments_fetched_at: ctx.payments_fetched_at,
            last_transaction: last_attempt.map(TransactionResponse::from),
            unresolved_tx_hash: unresolved.map(|h| format!("{:?}", h)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerTimeResponse {
    pub ledger_time: u64,
    pub ledger_datetime: Option<DateTime<Utc>>,
}

impl LedgerTimeResponse {
    pub fn new(ledger_time: u64) -> Self {
        Self {
            ledger_time,
            ledger_datetime: unix_to_datetime(ledger_time),
        }
    }
}

// ========== HELPERS ==========

/// Wei rendered as ether with trailing zeros trimmed
pub fn ether(wei: U256) -> String {
    wei_to_ether(wei)
        .map(|d| d.to_string())
        .unwrap_or_else(|_| format_ether(wei))
}

fn checksum(address: Address) -> String {
    to_checksum(&address, None)
}

fn unix_to_datetime(seconds: u64) -> Option<DateTime<Utc>> {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
}
