pub mod evm;
pub mod models;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};

use crate::error::AppResult;
use models::{Network, Payment, ScheduleCall, TxOutcome};

/// The scheduled-payments contract, as seen by the client
///
/// All state-changing calls are sent with `from` set to the caller's address;
/// signing is the wallet behind the RPC endpoint's concern.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Network the contract lives on
    fn network(&self) -> Network;

    /// Simulate `schedulePayment` with `value = call.amount` and return the gas it would use
    async fn estimate_schedule_gas(&self, from: Address, call: &ScheduleCall) -> AppResult<U256>;

    /// Current gas price in wei
    async fn gas_price(&self) -> AppResult<U256>;

    /// Dry-run `claimPayment`. A revert here means nothing is due.
    async fn simulate_claim(&self, from: Address) -> AppResult<()>;

    async fn submit_schedule(
        &self,
        from: Address,
        call: &ScheduleCall,
        gas_limit: U256,
    ) -> AppResult<TxHash>;

    async fn submit_claim(&self, from: Address) -> AppResult<TxHash>;

    /// Wait until the transaction is mined
    async fn await_confirmation(&self, tx_hash: TxHash) -> AppResult<TxOutcome>;

    /// Non-blocking receipt lookup; `None` while still pending and
    /// `ExecutionError::Dropped` once the node no longer knows the transaction
    async fn transaction_outcome(&self, tx_hash: TxHash) -> AppResult<Option<TxOutcome>>;

    async fn sender_payments(&self, sender: Address) -> AppResult<Vec<Payment>>;

    /// The Ledger's notion of now, in unix seconds
    async fn current_time(&self) -> AppResult<u64>;
}

/// Native-currency balance lookup per network
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balance_of(&self, address: Address, network: Network) -> AppResult<U256>;
}
