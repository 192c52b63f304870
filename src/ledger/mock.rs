//! In-memory Ledger for tests. State changes only happen when a transaction
//! is confirmed, mirroring the real contract.

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult, ExecutionError},
    ledger::{
        models::{LedgerEvent, LedgerOperation, Network, Payment, ScheduleCall, TxOutcome},
        BalanceSource, Ledger,
    },
    notifications::{Notifier, NotifyLevel},
};

pub const MOCK_GAS_USED: u64 = 50_000;

#[derive(Debug, Clone)]
enum Effect {
    Schedule { from: Address, call: ScheduleCall },
    Claim { from: Address },
}

struct State {
    balances: HashMap<(Address, Network), U256>,
    unreachable: HashSet<Network>,
    payments: Vec<Payment>,
    now: u64,
    gas_price: Option<U256>,
    estimate: Option<U256>,
    reject_reason: Option<Option<String>>,
    revert: bool,
    hold: bool,
    fail_reads: bool,
    next_tx: u64,
    pending: HashMap<TxHash, Effect>,
    mined: HashMap<TxHash, TxOutcome>,
    submissions: usize,
    estimates: usize,
    balance_reads: usize,
}

pub struct MockLedger {
    network: Network,
    state: Mutex<State>,
}

impl MockLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: Mutex::new(State {
                balances: HashMap::new(),
                unreachable: HashSet::new(),
                payments: Vec::new(),
                now: 1_700_000_000,
                gas_price: Some(U256::from(50) * U256::exp10(9)),
                estimate: Some(U256::from(65_000)),
                reject_reason: None,
                revert: false,
                hold: false,
                fail_reads: false,
                next_tx: 1,
                pending: HashMap::new(),
                mined: HashMap::new(),
                submissions: 0,
                estimates: 0,
                balance_reads: 0,
            }),
        }
    }

    pub fn set_balance(&self, address: Address, network: Network, wei: U256) {
        self.state.lock().balances.insert((address, network), wei);
    }

    pub fn balance(&self, address: Address, network: Network) -> U256 {
        self.state
            .lock()
            .balances
            .get(&(address, network))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_unreachable(&self, network: Network) {
        self.state.lock().unreachable.insert(network);
    }

    pub fn set_time(&self, now: u64) {
        self.state.lock().now = now;
    }

    pub fn set_gas_price(&self, price: Option<U256>) {
        self.state.lock().gas_price = price;
    }

    /// `None` makes every gas simulation fail
    pub fn set_estimate(&self, gas: Option<U256>) {
        self.state.lock().estimate = gas;
    }

    /// `Some(reason)` makes every submission fail with that reason
    pub fn reject_submissions(&self, reason: Option<&str>) {
        self.state.lock().reject_reason = reason.map(|r| Some(r.to_string()));
    }

    pub fn revert_on_execution(&self, revert: bool) {
        self.state.lock().revert = revert;
    }

    /// Keep submitted transactions unmined until `release_held`
    pub fn hold_confirmations(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Mine every held transaction
    pub fn release_held(&self) {
        let mut state = self.state.lock();
        state.hold = false;
        let held: Vec<(TxHash, Effect)> = state.pending.drain().collect();
        for (hash, effect) in held {
            let outcome = Self::apply(&mut state, self.network, hash, effect);
            state.mined.insert(hash, outcome);
        }
    }

    /// Evict every held transaction without mining it
    pub fn drop_held(&self) {
        let mut state = self.state.lock();
        state.hold = false;
        state.pending.clear();
    }

    pub fn insert_payment(&self, payment: Payment) {
        self.state.lock().payments.push(payment);
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state.lock().payments.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    pub fn estimate_count(&self) -> usize {
        self.state.lock().estimates
    }

    pub fn balance_read_count(&self) -> usize {
        self.state.lock().balance_reads
    }

    fn apply(state: &mut State, network: Network, tx_hash: TxHash, effect: Effect) -> TxOutcome {
        let gas_used = U256::from(MOCK_GAS_USED);

        if state.revert {
            return TxOutcome {
                tx_hash,
                block_number: Some(state.next_tx),
                gas_used: Some(gas_used),
                success: false,
                events: Vec::new(),
            };
        }

        let fee = gas_used * state.gas_price.unwrap_or_default();
        let events = match effect {
            Effect::Schedule { from, call } => {
                let balance = state.balances.entry((from, network)).or_default();
                *balance = balance.saturating_sub(call.amount).saturating_sub(fee);

                state.payments.push(Payment {
                    sender: from,
                    receiver: call.receiver,
                    amount: call.amount,
                    scheduled_time: call.scheduled_time,
                    note: call.note.clone(),
                    claimed: false,
                });

                vec![LedgerEvent::PaymentScheduled {
                    sender: from,
                    receiver: call.receiver,
                    amount: call.amount,
                    scheduled_time: call.scheduled_time,
                    note: call.note,
                }]
            }
            Effect::Claim { from } => {
                let now = state.now;
                let mut total = U256::zero();
                for payment in state.payments.iter_mut() {
                    if payment.receiver == from && !payment.claimed && payment.scheduled_time <= now {
                        payment.claimed = true;
                        total += payment.amount;
                    }
                }

                let balance = state.balances.entry((from, network)).or_default();
                *balance = balance.saturating_add(total).saturating_sub(fee);

                vec![LedgerEvent::PaymentClaimed {
                    receiver: from,
                    amount: total,
                }]
            }
        };

        TxOutcome {
            tx_hash,
            block_number: Some(state.next_tx),
            gas_used: Some(gas_used),
            success: true,
            events,
        }
    }

    fn submit(&self, operation: LedgerOperation, effect: Effect) -> AppResult<TxHash> {
        let mut state = self.state.lock();
        state.submissions += 1;

        if let Some(reason) = state.reject_reason.clone() {
            return Err(ExecutionError::SubmissionRejected { operation, reason }.into());
        }

        let hash = TxHash::from_low_u64_be(state.next_tx);
        state.next_tx += 1;
        state.pending.insert(hash, effect);
        Ok(hash)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn network(&self) -> Network {
        self.network
    }

    async fn estimate_schedule_gas(&self, _from: Address, _call: &ScheduleCall) -> AppResult<U256> {
        let mut state = self.state.lock();
        state.estimates += 1;
        state.estimate.ok_or_else(|| {
            ExecutionError::GasEstimationFailed("execution reverted".to_string()).into()
        })
    }

    async fn gas_price(&self) -> AppResult<U256> {
        self.state
            .lock()
            .gas_price
            .ok_or_else(|| AppError::Network("eth_gasPrice unavailable".to_string()))
    }

    async fn simulate_claim(&self, from: Address) -> AppResult<()> {
        let state = self.state.lock();
        let due = state
            .payments
            .iter()
            .any(|p| p.receiver == from && !p.claimed && p.scheduled_time <= state.now);

        if due {
            Ok(())
        } else {
            Err(ExecutionError::NoClaimable {
                reason: Some("No payments to claim".to_string()),
            }
            .into())
        }
    }

    async fn submit_schedule(
        &self,
        from: Address,
        call: &ScheduleCall,
        _gas_limit: U256,
    ) -> AppResult<TxHash> {
        self.submit(
            LedgerOperation::SchedulePayment,
            Effect::Schedule {
                from,
                call: call.clone(),
            },
        )
    }

    async fn submit_claim(&self, from: Address) -> AppResult<TxHash> {
        self.submit(LedgerOperation::ClaimPayment, Effect::Claim { from })
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> AppResult<TxOutcome> {
        let held = self.state.lock().hold;
        if held {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if let Some(outcome) = state.mined.get(&tx_hash) {
            return Ok(outcome.clone());
        }
        let effect = state
            .pending
            .remove(&tx_hash)
            .ok_or(ExecutionError::Dropped { tx_hash })?;
        let outcome = Self::apply(&mut state, self.network, tx_hash, effect);
        state.mined.insert(tx_hash, outcome.clone());
        Ok(outcome)
    }

    async fn transaction_outcome(&self, tx_hash: TxHash) -> AppResult<Option<TxOutcome>> {
        let state = self.state.lock();
        if let Some(outcome) = state.mined.get(&tx_hash) {
            return Ok(Some(outcome.clone()));
        }
        if state.pending.contains_key(&tx_hash) {
            return Ok(None);
        }
        Err(ExecutionError::Dropped { tx_hash }.into())
    }

    async fn sender_payments(&self, sender: Address) -> AppResult<Vec<Payment>> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(AppError::Network("getSenderPayments failed".to_string()));
        }
        Ok(state
            .payments
            .iter()
            .filter(|p| p.sender == sender)
            .cloned()
            .collect())
    }

    async fn current_time(&self) -> AppResult<u64> {
        Ok(self.state.lock().now)
    }
}

#[async_trait]
impl BalanceSource for MockLedger {
    async fn balance_of(&self, address: Address, network: Network) -> AppResult<U256> {
        let mut state = self.state.lock();
        state.balance_reads += 1;
        if state.unreachable.contains(&network) {
            return Err(AppError::Network(format!("{} endpoint unreachable", network)));
        }
        Ok(state
            .balances
            .get(&(address, network))
            .copied()
            .unwrap_or_default())
    }
}

/// Collects every notification for assertions
#[derive(Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<(NotifyLevel, String)>>,
}

impl RecordingNotifier {
    pub fn entries(&self) -> Vec<(NotifyLevel, String)> {
        self.entries.lock().clone()
    }

    pub fn last(&self) -> Option<(NotifyLevel, String)> {
        self.entries.lock().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}
