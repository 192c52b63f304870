//! Ledger and balance access over JSON-RPC.

use async_trait::async_trait;
use ethers::{
    contract::{abigen, parse_log, ContractError},
    providers::{Http, Middleware, MiddlewareError, PendingTransaction, Provider},
    types::{Address, TransactionReceipt, TxHash, U256, U64},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::Config,
    error::{AppError, AppResult, ExecutionError},
    ledger::{
        models::{LedgerEvent, LedgerOperation, Network, Payment, ScheduleCall, TxOutcome},
        BalanceSource, Ledger,
    },
};

abigen!(
    ScheduledPayments,
    r#"[
        function schedulePayment(address _receiver, uint256 _amount, string _note, uint256 _scheduledTime) external payable
        function claimPayment() external
        struct Payment { address sender; address receiver; uint256 amount; uint256 scheduledTime; string note; bool claimed; }
        function getSenderPayments(address sender) external view returns (Payment[])
        function getCurrentTime() external view returns (uint256)
        event PaymentScheduled(address indexed sender, address indexed receiver, uint256 amount, uint256 scheduledTime, string note)
        event PaymentClaimed(address indexed receiver, uint256 amount)
    ]"#
);

type HttpProvider = Provider<Http>;

/// `ScheduledPayments.Payment` as returned by `getSenderPayments`
type RawPayment = (Address, Address, U256, U256, String, bool);

pub fn http_provider(url: &str) -> AppResult<HttpProvider> {
    Provider::<Http>::try_from(url)
        .map_err(|e| AppError::Config(format!("Invalid RPC url {}: {}", url, e)))
}

pub struct EvmLedger {
    network: Network,
    contract_address: Address,
    provider: Arc<HttpProvider>,
    contract: ScheduledPayments<HttpProvider>,
    confirmations: usize,
}

impl EvmLedger {
    pub fn new(
        network: Network,
        contract_address: Address,
        provider: Arc<HttpProvider>,
        confirmations: usize,
    ) -> Self {
        let contract = ScheduledPayments::new(contract_address, provider.clone());

        Self {
            network,
            contract_address,
            provider,
            contract,
            confirmations: confirmations.max(1),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let url = config.rpc_url(config.ledger_network).ok_or_else(|| {
            AppError::Config(format!(
                "No RPC url configured for ledger network {}",
                config.ledger_network
            ))
        })?;

        Ok(Self::new(
            config.ledger_network,
            config.contract_address,
            Arc::new(http_provider(url)?),
            config.confirmations,
        ))
    }

    /// Provider bound to the ledger network; also hosts the signing wallet
    pub fn provider(&self) -> Arc<HttpProvider> {
        self.provider.clone()
    }
}

/// Receipt → outcome, keeping only events emitted by the contract
fn outcome_from_receipt(contract_address: Address, receipt: TransactionReceipt) -> TxOutcome {
    let events = receipt
        .logs
        .iter()
        .filter(|log| log.address == contract_address)
        .filter_map(|log| match parse_log::<ScheduledPaymentsEvents>(log.clone()) {
            Ok(ScheduledPaymentsEvents::PaymentScheduledFilter(e)) => Some(LedgerEvent::PaymentScheduled {
                sender: e.sender,
                receiver: e.receiver,
                amount: e.amount,
                scheduled_time: u256_to_u64(e.scheduled_time).unwrap_or(u64::MAX),
                note: e.note,
            }),
            Ok(ScheduledPaymentsEvents::PaymentClaimedFilter(e)) => Some(LedgerEvent::PaymentClaimed {
                receiver: e.receiver,
                amount: e.amount,
            }),
            Err(e) => {
                debug!("Skipping undecodable log in {:?}: {}", receipt.transaction_hash, e);
                None
            }
        })
        .collect();

    TxOutcome {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.map(|b| b.as_u64()),
        gas_used: receipt.gas_used,
        success: receipt.status == Some(U64::from(1)),
        events,
    }
}

fn payments_from_raw(raw: Vec<RawPayment>) -> AppResult<Vec<Payment>> {
    raw.into_iter()
        .map(|(sender, receiver, amount, scheduled_time, note, claimed)| {
            Ok(Payment {
                sender,
                receiver,
                amount,
                scheduled_time: u256_to_u64(scheduled_time)?,
                note,
                claimed,
            })
        })
        .collect()
}

/// Classify a failed state-changing call. Reverts and JSON-RPC rejections are
/// the Ledger saying no; anything else is the transport.
fn rejection(operation: LedgerOperation, err: ContractError<HttpProvider>) -> AppError {
    let rpc_message = err
        .as_middleware_error()
        .and_then(|e| e.as_error_response())
        .map(|resp| resp.message.clone());

    if err.is_revert() || rpc_message.is_some() {
        let reason = err
            .decode_revert::<String>()
            .or(rpc_message)
            .map(|r| strip_revert_prefix(&r));
        return ExecutionError::SubmissionRejected { operation, reason }.into();
    }

    AppError::Network(format!("{} failed: {}", operation, err))
}

/// A reverted `claimPayment` dry-run means nothing is due
fn claim_simulation_failure(err: ContractError<HttpProvider>) -> AppError {
    let rpc_message = err
        .as_middleware_error()
        .and_then(|e| e.as_error_response())
        .map(|resp| resp.message.clone())
        .filter(|m| m.contains("revert"));

    if err.is_revert() || rpc_message.is_some() {
        let reason = err
            .decode_revert::<String>()
            .or(rpc_message)
            .map(|r| strip_revert_prefix(&r));
        return ExecutionError::NoClaimable { reason }.into();
    }
    read_failure("claimPayment simulation", err)
}

fn read_failure(what: &str, err: ContractError<HttpProvider>) -> AppError {
    AppError::Network(format!("{} failed: {}", what, err))
}

/// "execution reverted: Nothing to claim" -> "Nothing to claim"
fn strip_revert_prefix(message: &str) -> String {
    message
        .strip_prefix("execution reverted: ")
        .unwrap_or(message)
        .to_string()
}

fn u256_to_u64(value: U256) -> AppResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(AppError::Internal(format!("{} does not fit in u64", value)));
    }
    Ok(value.as_u64())
}

#[async_trait]
impl Ledger for EvmLedger {
    fn network(&self) -> Network {
        self.network
    }

    async fn estimate_schedule_gas(&self, from: Address, call: &ScheduleCall) -> AppResult<U256> {
        self.contract
            .schedule_payment(
                call.receiver,
                call.amount,
                call.note.clone(),
                U256::from(call.scheduled_time),
            )
            .from(from)
            .value(call.amount)
            .estimate_gas()
            .await
            .map_err(|e| ExecutionError::GasEstimationFailed(e.to_string()).into())
    }

    async fn gas_price(&self) -> AppResult<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn simulate_claim(&self, from: Address) -> AppResult<()> {
        self.contract
            .claim_payment()
            .from(from)
            .call()
            .await
            .map_err(claim_simulation_failure)
    }

    #[instrument(skip(self, call), fields(receiver = ?call.receiver, amount = %call.amount))]
    async fn submit_schedule(
        &self,
        from: Address,
        call: &ScheduleCall,
        gas_limit: U256,
    ) -> AppResult<TxHash> {
        let tx = self
            .contract
            .schedule_payment(
                call.receiver,
                call.amount,
                call.note.clone(),
                U256::from(call.scheduled_time),
            )
            .from(from)
            .value(call.amount)
            .gas(gas_limit);

        let pending = tx
            .send()
            .await
            .map_err(|e| rejection(LedgerOperation::SchedulePayment, e))?;
        let tx_hash = pending.tx_hash();

        info!("schedulePayment submitted: {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn submit_claim(&self, from: Address) -> AppResult<TxHash> {
        let tx = self.contract.claim_payment().from(from);

        let pending = tx
            .send()
            .await
            .map_err(|e| rejection(LedgerOperation::ClaimPayment, e))?;
        let tx_hash = pending.tx_hash();

        info!("claimPayment submitted: {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> AppResult<TxOutcome> {
        let receipt = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .confirmations(self.confirmations)
            .await?;

        match receipt {
            Some(receipt) => Ok(outcome_from_receipt(self.contract_address, receipt)),
            None => {
                warn!("Transaction {:?} dropped from the mempool", tx_hash);
                Err(ExecutionError::Dropped { tx_hash }.into())
            }
        }
    }

    async fn transaction_outcome(&self, tx_hash: TxHash) -> AppResult<Option<TxOutcome>> {
        if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
            return Ok(Some(outcome_from_receipt(self.contract_address, receipt)));
        }

        // No receipt and unknown to the node: evicted from the mempool.
        if self.provider.get_transaction(tx_hash).await?.is_none() {
            warn!("Transaction {:?} is no longer known to the node", tx_hash);
            return Err(ExecutionError::Dropped { tx_hash }.into());
        }
        Ok(None)
    }

    async fn sender_payments(&self, sender: Address) -> AppResult<Vec<Payment>> {
        let raw = self
            .contract
            .get_sender_payments(sender)
            .call()
            .await
            .map_err(|e| read_failure("getSenderPayments", e))?;

        payments_from_raw(raw)
    }

    async fn current_time(&self) -> AppResult<u64> {
        let now = self
            .contract
            .get_current_time()
            .call()
            .await
            .map_err(|e| read_failure("getCurrentTime", e))?;
        u256_to_u64(now)
    }
}

/// One HTTP provider per selectable network
pub struct RpcBalanceSource {
    providers: HashMap<Network, HttpProvider>,
}

impl RpcBalanceSource {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let mut providers = HashMap::new();
        for (network, url) in &config.rpc_urls {
            providers.insert(*network, http_provider(url)?);
        }
        Ok(Self { providers })
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn balance_of(&self, address: Address, network: Network) -> AppResult<U256> {
        let provider = self.providers.get(&network).ok_or_else(|| {
            AppError::Network(format!("No RPC endpoint configured for {}", network))
        })?;

        Ok(provider.get_balance(address, None).await?)
    }
}
