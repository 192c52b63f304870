pub mod context;
pub mod pending;

pub use context::TransactionContext;
pub use pending::PendingSchedule;

use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{AppError, AppResult, ExecutionError},
    execution::{FailedAttempt, Settled, TransactionSubmitter, TxAttempt, TxState},
    fees::{FeeBudget, FeeEstimator},
    ledger::{
        models::{wei_to_ether, BalanceSnapshot, LedgerOperation, Network, Payment, TxOutcome},
        BalanceSource, Ledger,
    },
    notifications::{Notifier, NotifyLevel},
    payments::PaymentRegistryView,
    risk::{check_affordable, Affordability},
    wallet::{parse_address, BalanceTracker, IdentityProvider},
};

/// Outcome of a confirmed schedule workflow
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub attempt: TxAttempt,
    pub fee: FeeBudget,
    pub cost: Affordability,
}

/// Outcome of a confirmed claim workflow
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReport {
    pub attempt: TxAttempt,
    /// Sum of `PaymentClaimed` amounts in the receipt, in wei
    pub claimed: U256,
}

/// Runs the user-facing workflows against one session.
///
/// The Ledger is deployed on exactly one network (`Ledger::network`). The
/// payment registry is indexed by sender only, so switching the active network
/// changes which balance is shown but never the payment list.
pub struct Orchestrator {
    identity: Arc<dyn IdentityProvider>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    balances: BalanceTracker,
    estimator: FeeEstimator,
    submitter: TransactionSubmitter,
    registry: PaymentRegistryView,
    context: RwLock<TransactionContext>,
    /// Held for the whole of a schedule or claim workflow
    write_gate: Mutex<()>,
    /// Submitted transaction we stopped watching before it was mined
    unresolved: parking_lot::Mutex<Option<(TxHash, LedgerOperation)>>,
    last_attempt: parking_lot::Mutex<Option<TxAttempt>>,
}

impl Orchestrator {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        ledger: Arc<dyn Ledger>,
        balance_source: Arc<dyn BalanceSource>,
        notifier: Arc<dyn Notifier>,
        default_network: Network,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            balances: BalanceTracker::new(balance_source),
            estimator: FeeEstimator::new(ledger.clone()),
            submitter: TransactionSubmitter::new(ledger.clone(), confirmation_timeout),
            registry: PaymentRegistryView::new(ledger.clone()),
            ledger,
            notifier,
            context: RwLock::new(TransactionContext::new(default_network)),
            write_gate: Mutex::new(()),
            unresolved: parking_lot::Mutex::new(None),
            last_attempt: parking_lot::Mutex::new(None),
        }
    }

    /// Snapshot of the session state
    pub async fn context(&self) -> TransactionContext {
        self.context.read().await.clone()
    }

    pub fn last_attempt(&self) -> Option<TxAttempt> {
        self.last_attempt.lock().clone()
    }

    pub fn unresolved_transaction(&self) -> Option<TxHash> {
        self.unresolved.lock().map(|(tx_hash, _)| tx_hash)
    }

    pub fn ledger_network(&self) -> Network {
        self.ledger.network()
    }

    pub async fn ledger_time(&self) -> AppResult<u64> {
        self.ledger.current_time().await
    }

    /// Resolve the active account and load its balance and payments
    pub async fn start_session(&self) -> AppResult<TransactionContext> {
        let address = match self.resolve_identity().await {
            Ok(address) => address,
            Err(e) => {
                self.notify_failure(&e);
                return Err(e);
            }
        };

        self.replace_context(|ctx| ctx.with_address(address)).await;
        info!("👛 Session started for {:?}", address);

        // Each read reports its own outcome.
        let (balance, payments) = tokio::join!(self.refresh_balance(), self.refresh_payments());
        if balance.is_err() || payments.is_err() {
            debug!("Session started with incomplete view state");
        }

        Ok(self.context().await)
    }

    pub async fn refresh_balance(&self) -> AppResult<BalanceSnapshot> {
        let result = self.load_balance().await;
        match &result {
            Ok(_) => self.notifier.notify(NotifyLevel::Success, "Balance updated"),
            Err(e) => self.notify_read_failure("Error fetching balance.", e),
        }
        result
    }

    pub async fn refresh_payments(&self) -> AppResult<Vec<Payment>> {
        let result = self.load_payments().await;
        match &result {
            Ok(payments) => self.notifier.notify(
                NotifyLevel::Info,
                &format!("Payments updated ({})", payments.len()),
            ),
            Err(e) => self.notify_read_failure("Error fetching payments.", e),
        }
        result
    }

    /// Make `network` active and read the balance there. Payments are not refetched.
    #[instrument(skip(self))]
    pub async fn switch_network(&self, network: Network) -> AppResult<BalanceSnapshot> {
        self.replace_context(|ctx| ctx.with_network(network)).await;
        info!("🔀 Active network is now {}", network);
        self.refresh_balance().await
    }

    pub async fn schedule_payment(&self, pending: PendingSchedule) -> AppResult<ScheduleReport> {
        let result = self.run_schedule(pending).await;
        match &result {
            Ok(_) => self.notify_confirmed(LedgerOperation::SchedulePayment, U256::zero()),
            Err(e) => self.notify_failure(e),
        }
        result
    }

    pub async fn claim_payment(&self) -> AppResult<ClaimReport> {
        let result = self.run_claim().await;
        match &result {
            Ok(report) => self.notify_confirmed(LedgerOperation::ClaimPayment, report.claimed),
            Err(e) => self.notify_failure(e),
        }
        result
    }

    async fn run_schedule(&self, pending: PendingSchedule) -> AppResult<ScheduleReport> {
        let call = pending.into_call()?;
        let from = self.active_address().await?;
        let _gate = self.acquire_write_gate().await?;

        let fee = self.estimator.estimate_schedule_fee(from, &call).await;

        // Fees are paid where the Ledger lives, whatever network is on screen.
        let balance = self.balances.get_balance(from, self.ledger.network()).await?;
        let fee_price = match self.ledger.gas_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Gas price unavailable: {}", e);
                None
            }
        };
        let cost = check_affordable(balance.wei, call.amount, fee.gas_limit, fee_price)?;

        let settled = self.track(self.submitter.schedule_payment(from, call, fee).await)?;
        self.refresh_after(LedgerOperation::SchedulePayment).await;

        Ok(ScheduleReport {
            attempt: settled.attempt,
            fee,
            cost,
        })
    }

    async fn run_claim(&self) -> AppResult<ClaimReport> {
        let from = self.active_address().await?;
        let _gate = self.acquire_write_gate().await?;

        let settled = self.track(self.submitter.claim_payment(from).await)?;
        let claimed = settled.outcome.claimed_amount();
        self.refresh_after(LedgerOperation::ClaimPayment).await;

        Ok(ClaimReport {
            attempt: settled.attempt,
            claimed,
        })
    }

    /// Bring the view state up to date after a confirmed write
    async fn refresh_after(&self, operation: LedgerOperation) {
        match operation {
            LedgerOperation::SchedulePayment => {
                if let Err(e) = self.load_payments().await {
                    self.notify_read_failure("Error fetching payments.", &e);
                }
            }
            LedgerOperation::ClaimPayment => {
                let (balance, payments) = tokio::join!(self.load_balance(), self.load_payments());
                if let Err(e) = balance {
                    self.notify_read_failure("Error fetching balance.", &e);
                }
                if let Err(e) = payments {
                    self.notify_read_failure("Error fetching payments.", &e);
                }
            }
        }
    }

    async fn resolve_identity(&self) -> AppResult<Address> {
        let raw = self
            .identity
            .active_address()
            .await?
            .ok_or(AppError::NoActiveAddress)?;
        parse_address(&raw)
    }

    async fn active_address(&self) -> AppResult<Address> {
        self.context
            .read()
            .await
            .address
            .ok_or(AppError::NoActiveAddress)
    }

    async fn load_balance(&self) -> AppResult<BalanceSnapshot> {
        let (address, network) = {
            let ctx = self.context.read().await;
            (ctx.address.ok_or(AppError::NoActiveAddress)?, ctx.network)
        };

        let snapshot = self.balances.get_balance(address, network).await?;
        self.replace_context(|ctx| ctx.with_balance(snapshot)).await;
        Ok(snapshot)
    }

    async fn load_payments(&self) -> AppResult<Vec<Payment>> {
        let address = self.active_address().await?;
        let snapshot = self.registry.list_by_sender(address).await?;

        let payments = snapshot.payments.clone();
        self.replace_context(|ctx| {
            if ctx.address == Some(snapshot.sender) {
                ctx.with_payments(snapshot.payments, snapshot.fetched_at)
            } else {
                ctx
            }
        })
        .await;
        Ok(payments)
    }

    /// Swap in a new context value; the only write path to session state.
    async fn replace_context<F>(&self, update: F)
    where
        F: FnOnce(TransactionContext) -> TransactionContext,
    {
        let mut ctx = self.context.write().await;
        let next = update(ctx.clone());
        *ctx = next;
    }

    /// One state-changing workflow at a time. A transaction we stopped
    /// watching still counts as in flight until the Ledger reports it mined
    /// or dropped.
    async fn acquire_write_gate(&self) -> AppResult<MutexGuard<'_, ()>> {
        let gate = self
            .write_gate
            .try_lock()
            .map_err(|_| ExecutionError::WorkflowInFlight { pending: None })?;

        self.settle_unresolved().await?;
        Ok(gate)
    }

    /// Report the fate of a transaction whose confirmation wait timed out
    async fn settle_unresolved(&self) -> AppResult<()> {
        let Some((tx_hash, operation)) = *self.unresolved.lock() else {
            return Ok(());
        };

        let outcome = match self.ledger.transaction_outcome(tx_hash).await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => {
                warn!("Transaction {:?} is still pending", tx_hash);
                return Err(ExecutionError::WorkflowInFlight {
                    pending: Some(tx_hash),
                }
                .into());
            }
            Err(e @ AppError::Execution(ExecutionError::Dropped { .. })) => Err(e),
            Err(e) => return Err(e),
        };

        *self.unresolved.lock() = None;
        self.settle_attempt(tx_hash, &outcome);

        match outcome {
            Ok(outcome) if outcome.success => {
                info!("Earlier transaction {:?} was mined", tx_hash);
                self.notify_confirmed(operation, outcome.claimed_amount());
                self.refresh_after(operation).await;
            }
            Ok(_) => {
                warn!("Earlier transaction {:?} reverted", tx_hash);
                self.notify_failure(
                    &ExecutionError::Reverted {
                        operation,
                        reason: None,
                    }
                    .into(),
                );
            }
            Err(e) => {
                warn!("Earlier transaction {:?} never made it into a block", tx_hash);
                self.notify_failure(&e);
            }
        }
        Ok(())
    }

    /// Move the remembered attempt for `tx_hash` to its terminal state
    fn settle_attempt(&self, tx_hash: TxHash, outcome: &AppResult<TxOutcome>) {
        let mut last = self.last_attempt.lock();
        if last.as_ref().and_then(|a| a.tx_hash) != Some(tx_hash) {
            return;
        }
        let Some(mut attempt) = last.take() else {
            return;
        };

        let next = match outcome {
            Ok(outcome) => {
                attempt.outcome = Some(outcome.clone());
                if outcome.success {
                    TxState::Confirmed
                } else {
                    TxState::Failed
                }
            }
            Err(e) => {
                attempt.error_message = Some(e.to_string());
                TxState::Failed
            }
        };
        *last = Some(attempt.advance(next).unwrap_or_else(|failed| failed.attempt));
    }

    fn track(&self, result: Result<Settled, FailedAttempt>) -> AppResult<Settled> {
        match result {
            Ok(settled) => {
                *self.last_attempt.lock() = Some(settled.attempt.clone());
                Ok(settled)
            }
            Err(failed) => {
                if failed.attempt.is_unresolved() {
                    *self.unresolved.lock() = failed
                        .attempt
                        .tx_hash
                        .map(|tx_hash| (tx_hash, failed.attempt.operation));
                }
                *self.last_attempt.lock() = Some(failed.attempt.clone());
                Err(failed.into())
            }
        }
    }

    fn notify_confirmed(&self, operation: LedgerOperation, claimed: U256) {
        let message = match operation {
            LedgerOperation::SchedulePayment => "Scheduled payment successfully.".to_string(),
            LedgerOperation::ClaimPayment => match wei_to_ether(claimed) {
                Ok(eth) => format!("Amount claimed successfully! ({} ETH)", eth),
                Err(_) => "Amount claimed successfully!".to_string(),
            },
        };
        self.notifier.notify(NotifyLevel::Success, &message);
    }

    fn notify_failure(&self, error: &AppError) {
        let level = match error {
            AppError::Execution(ExecutionError::ConfirmationTimeout { .. }) => NotifyLevel::Info,
            _ => NotifyLevel::Error,
        };
        self.notifier.notify(level, &error.user_message());
    }

    fn notify_read_failure(&self, message: &str, error: &AppError) {
        warn!("{} {}", message, error);
        match error {
            AppError::NoActiveAddress => self.notify_failure(error),
            _ => self.notifier.notify(NotifyLevel::Error, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeeSource;
    use crate::ledger::mock::{MockLedger, RecordingNotifier};
    use crate::wallet::StaticIdentity;

    const GWEI: u64 = 1_000_000_000;

    struct Harness {
        ledger: Arc<MockLedger>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: Orchestrator,
        user: Address,
    }

    fn milli_ether(milli: u64) -> U256 {
        U256::from(milli) * U256::exp10(15)
    }

    fn harness_with_timeout(timeout: Duration) -> Harness {
        let user = Address::repeat_byte(0xaa);
        let ledger = Arc::new(MockLedger::new(Network::Sepolia));
        ledger.set_gas_price(Some(U256::from(50 * GWEI)));
        ledger.set_balance(user, Network::Sepolia, milli_ether(1_000));

        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Orchestrator::new(
            Arc::new(StaticIdentity::new(Some(format!("{:?}", user)))),
            ledger.clone(),
            ledger.clone(),
            notifier.clone(),
            Network::Sepolia,
            timeout,
        );

        Harness {
            ledger,
            notifier,
            orchestrator,
            user,
        }
    }

    fn harness() -> Harness {
        harness_with_timeout(Duration::from_secs(5))
    }

    fn schedule_form(amount: &str) -> PendingSchedule {
        PendingSchedule {
            receiver: format!("{:?}", Address::repeat_byte(0xbb)),
            amount: amount.to_string(),
            note: "Invoice #42".to_string(),
            scheduled_at: "2030-01-01T00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_schedule_end_to_end() {
        let h = harness();
        // simulation unavailable: 200_000 gas * 50 gwei = 0.01 ETH budget
        h.ledger.set_estimate(None);
        h.orchestrator.start_session().await.unwrap();
        assert!(h.orchestrator.context().await.payments.is_empty());

        let report = h.orchestrator.schedule_payment(schedule_form("0.4")).await.unwrap();

        assert_eq!(report.fee.source, FeeSource::Fallback);
        assert_eq!(report.cost.max_fee, milli_ether(10));
        assert_eq!(report.cost.total, milli_ether(410));
        assert_eq!(report.attempt.state, TxState::Confirmed);

        let ctx = h.orchestrator.context().await;
        assert_eq!(ctx.payments.len(), 1);
        let payment = &ctx.payments[0];
        assert_eq!(payment.sender, h.user);
        assert_eq!(payment.receiver, Address::repeat_byte(0xbb));
        assert_eq!(payment.amount, milli_ether(400));
        assert_eq!(payment.note, "Invoice #42");
        assert_eq!(payment.scheduled_time, 1_893_456_000);
        assert!(!payment.claimed);

        assert_eq!(
            h.notifier.last(),
            Some((NotifyLevel::Success, "Scheduled payment successfully.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_schedule_uses_simulated_budget() {
        let h = harness();
        h.ledger.set_estimate(Some(U256::from(70_000)));
        h.orchestrator.start_session().await.unwrap();

        let report = h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap();
        assert_eq!(report.fee.source, FeeSource::Simulated);
        assert_eq!(report.attempt.gas_limit, Some(U256::from(70_000)));
        assert_eq!(h.ledger.estimate_count(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_submits_nothing() {
        let h = harness();
        h.ledger.set_estimate(None);
        h.ledger.set_balance(h.user, Network::Sepolia, milli_ether(405));
        h.orchestrator.start_session().await.unwrap();
        let before = h.orchestrator.context().await;

        let err = h.orchestrator.schedule_payment(schedule_form("0.4")).await.unwrap_err();

        assert!(matches!(err, AppError::InsufficientFunds { .. }));
        assert_eq!(h.ledger.submission_count(), 0);
        assert!(h.ledger.payments().is_empty());
        assert_eq!(h.orchestrator.context().await, before);
        assert_eq!(
            h.notifier.last(),
            Some((NotifyLevel::Error, "Insufficient funds for the transaction.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_gas_price_fails_closed() {
        let h = harness();
        h.orchestrator.start_session().await.unwrap();
        h.ledger.set_gas_price(None);

        let err = h.orchestrator.schedule_payment(schedule_form("0.001")).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { .. }));
        assert_eq!(h.ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_ledger_call() {
        let h = harness();
        h.orchestrator.start_session().await.unwrap();
        let reads = h.ledger.balance_read_count();

        let mut form = schedule_form("0.4");
        form.receiver = "0xBBB".to_string();
        let err = h.orchestrator.schedule_payment(form).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(h.ledger.estimate_count(), 0);
        assert_eq!(h.ledger.balance_read_count(), reads);
        assert_eq!(
            h.notifier.last(),
            Some((NotifyLevel::Error, "Validation error: Invalid receiver address.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_rejected_schedule_leaves_context_untouched() {
        let h = harness();
        h.orchestrator.start_session().await.unwrap();
        let before = h.orchestrator.context().await;
        h.ledger.reject_submissions(Some("execution reverted: Amount mismatch"));

        let err = h.orchestrator.schedule_payment(schedule_form("0.4")).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Execution(ExecutionError::SubmissionRejected { .. })
        ));
        assert_eq!(h.orchestrator.context().await, before);
        assert_eq!(h.orchestrator.last_attempt().unwrap().state, TxState::Failed);
        assert_eq!(
            h.notifier.last(),
            Some((NotifyLevel::Error, "execution reverted: Amount mismatch".to_string()))
        );
    }

    #[tokio::test]
    async fn test_claim_with_nothing_due() {
        let h = harness();
        h.orchestrator.start_session().await.unwrap();
        let before = h.orchestrator.context().await;

        let err = h.orchestrator.claim_payment().await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Execution(ExecutionError::NoClaimable { .. })
        ));
        assert_eq!(h.orchestrator.last_attempt().unwrap().state, TxState::Failed);
        assert_eq!(h.orchestrator.context().await, before);
        assert_eq!(h.ledger.submission_count(), 0);
        assert_eq!(h.notifier.last().unwrap().0, NotifyLevel::Error);
    }

    #[tokio::test]
    async fn test_claim_refreshes_balance_and_payments() {
        let h = harness();
        h.ledger.insert_payment(Payment {
            sender: Address::repeat_byte(0xcc),
            receiver: h.user,
            amount: milli_ether(250),
            scheduled_time: 1_600_000_000,
            note: "salary".to_string(),
            claimed: false,
        });
        h.orchestrator.start_session().await.unwrap();

        let report = h.orchestrator.claim_payment().await.unwrap();

        assert_eq!(report.claimed, milli_ether(250));
        assert_eq!(report.attempt.state, TxState::Confirmed);
        assert!(h.ledger.payments()[0].claimed);

        let ctx = h.orchestrator.context().await;
        let expected = h.ledger.balance(h.user, Network::Sepolia);
        assert_eq!(ctx.balance.unwrap().wei, expected);
        assert!(expected > milli_ether(1_000));
        assert_eq!(
            h.notifier.last(),
            Some((
                NotifyLevel::Success,
                "Amount claimed successfully! (0.25 ETH)".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_network_switch_keeps_registry() {
        let h = harness();
        h.ledger.set_balance(h.user, Network::Mainnet, milli_ether(3_000));
        h.orchestrator.start_session().await.unwrap();
        h.orchestrator.schedule_payment(schedule_form("0.2")).await.unwrap();
        let before = h.orchestrator.context().await;

        let balance = h.orchestrator.switch_network(Network::Mainnet).await.unwrap();

        let after = h.orchestrator.context().await;
        assert_eq!(balance.network, Network::Mainnet);
        assert_eq!(balance.wei, milli_ether(3_000));
        assert_eq!(after.network, Network::Mainnet);
        assert_eq!(after.balance, Some(balance));
        assert_eq!(after.payments, before.payments);
        assert_eq!(after.payments_fetched_at, before.payments_fetched_at);
    }

    #[tokio::test]
    async fn test_network_switch_to_unreachable_endpoint() {
        let h = harness();
        h.ledger.set_unreachable(Network::Rinkeby);
        h.orchestrator.start_session().await.unwrap();

        let err = h.orchestrator.switch_network(Network::Rinkeby).await.unwrap_err();

        assert!(matches!(err, AppError::Network(_)));
        let ctx = h.orchestrator.context().await;
        assert_eq!(ctx.network, Network::Rinkeby);
        assert!(ctx.balance.is_none());
        assert_eq!(
            h.notifier.last(),
            Some((NotifyLevel::Error, "Error fetching balance.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_balance_reads_are_idempotent() {
        let h = harness();
        h.orchestrator.start_session().await.unwrap();

        let first = h.orchestrator.refresh_balance().await.unwrap();
        let second = h.orchestrator.refresh_balance().await.unwrap();
        assert_eq!(first.wei, second.wei);
        assert_eq!(first.network, second.network);
    }

    #[tokio::test]
    async fn test_session_without_wallet() {
        let ledger = Arc::new(MockLedger::new(Network::Sepolia));
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Orchestrator::new(
            Arc::new(StaticIdentity::new(None)),
            ledger.clone(),
            ledger.clone(),
            notifier.clone(),
            Network::Sepolia,
            Duration::from_secs(1),
        );

        let err = orchestrator.start_session().await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveAddress));
        assert_eq!(
            notifier.last(),
            Some((
                NotifyLevel::Error,
                "No wallet address found. Please connect again.".to_string()
            ))
        );

        let err = orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveAddress));
        assert_eq!(ledger.estimate_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_rejected() {
        let h = harness_with_timeout(Duration::from_millis(300));
        h.orchestrator.start_session().await.unwrap();
        h.ledger.hold_confirmations(true);

        let (first, second) = tokio::join!(
            h.orchestrator.schedule_payment(schedule_form("0.1")),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                h.orchestrator.claim_payment().await
            }
        );

        assert!(matches!(
            second.unwrap_err(),
            AppError::Execution(ExecutionError::WorkflowInFlight { pending: None })
        ));
        assert!(matches!(
            first.unwrap_err(),
            AppError::Execution(ExecutionError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfirmed_transaction_blocks_until_mined() {
        let h = harness_with_timeout(Duration::from_millis(100));
        h.orchestrator.start_session().await.unwrap();
        h.ledger.hold_confirmations(true);

        let err = h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap_err();
        let tx_hash = match err {
            AppError::Execution(ExecutionError::ConfirmationTimeout { tx_hash }) => tx_hash,
            other => panic!("unexpected error: {:?}", other),
        };
        assert_eq!(h.orchestrator.unresolved_transaction(), Some(tx_hash));
        assert_eq!(h.orchestrator.last_attempt().unwrap().state, TxState::Submitted);
        assert_eq!(h.notifier.last().unwrap().0, NotifyLevel::Info);
        // stopping the wait did not touch the view state
        assert!(h.orchestrator.context().await.payments.is_empty());

        let err = h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Execution(ExecutionError::WorkflowInFlight { pending: Some(pending) }) if pending == tx_hash
        ));

        h.ledger.release_held();
        h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap();

        assert!(h.orchestrator.unresolved_transaction().is_none());
        assert_eq!(h.ledger.payments().len(), 2);
        assert_eq!(h.orchestrator.context().await.payments.len(), 2);
    }

    #[tokio::test]
    async fn test_late_confirmation_is_reported_and_refreshed() {
        let h = harness_with_timeout(Duration::from_millis(100));
        h.orchestrator.start_session().await.unwrap();
        h.ledger.hold_confirmations(true);
        h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap_err();
        h.ledger.release_held();

        // settling the earlier transaction happens before this one is priced
        let err = h.orchestrator.schedule_payment(schedule_form("5")).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { .. }));

        let ctx = h.orchestrator.context().await;
        assert_eq!(ctx.payments.len(), 1);
        assert_eq!(ctx.payments[0].amount, milli_ether(100));
        assert!(h.orchestrator.unresolved_transaction().is_none());
        assert!(h
            .notifier
            .entries()
            .contains(&(NotifyLevel::Success, "Scheduled payment successfully.".to_string())));

        let attempt = h.orchestrator.last_attempt().unwrap();
        assert_eq!(attempt.operation, LedgerOperation::SchedulePayment);
        assert_eq!(attempt.state, TxState::Confirmed);
        assert!(attempt.outcome.unwrap().success);
    }

    #[tokio::test]
    async fn test_late_claim_refreshes_balance() {
        let h = harness_with_timeout(Duration::from_millis(100));
        h.ledger.insert_payment(Payment {
            sender: Address::repeat_byte(0xcc),
            receiver: h.user,
            amount: milli_ether(250),
            scheduled_time: 1_800_000_000,
            note: "bonus".to_string(),
            claimed: false,
        });
        h.orchestrator.start_session().await.unwrap();

        // not due yet on the ledger clock
        let err = h.orchestrator.claim_payment().await.unwrap_err();
        assert!(matches!(err, AppError::Execution(ExecutionError::NoClaimable { .. })));
        assert_eq!(h.ledger.submission_count(), 0);

        h.ledger.set_time(1_800_000_000);
        h.ledger.hold_confirmations(true);
        h.orchestrator.claim_payment().await.unwrap_err();
        let before = h.orchestrator.context().await.balance.unwrap().wei;
        h.ledger.release_held();

        let err = h.orchestrator.claim_payment().await.unwrap_err();
        assert!(matches!(err, AppError::Execution(ExecutionError::NoClaimable { .. })));

        let ctx = h.orchestrator.context().await;
        let expected = h.ledger.balance(h.user, Network::Sepolia);
        assert_eq!(ctx.balance.unwrap().wei, expected);
        assert!(expected > before);
        assert!(h.notifier.entries().contains(&(
            NotifyLevel::Success,
            "Amount claimed successfully! (0.25 ETH)".to_string()
        )));
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_the_gate() {
        let h = harness_with_timeout(Duration::from_millis(100));
        h.orchestrator.start_session().await.unwrap();
        h.ledger.hold_confirmations(true);
        let err = h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap_err();
        let tx_hash = match err {
            AppError::Execution(ExecutionError::ConfirmationTimeout { tx_hash }) => tx_hash,
            other => panic!("unexpected error: {:?}", other),
        };
        h.ledger.drop_held();

        h.orchestrator.schedule_payment(schedule_form("0.2")).await.unwrap();

        assert!(h.orchestrator.unresolved_transaction().is_none());
        let payments = h.ledger.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, milli_ether(200));
        assert!(h
            .notifier
            .entries()
            .iter()
            .any(|(level, message)| *level == NotifyLevel::Error && message.contains("dropped")));
        assert_ne!(h.orchestrator.last_attempt().unwrap().tx_hash, Some(tx_hash));
    }

    #[tokio::test]
    async fn test_late_revert_is_reported() {
        let h = harness_with_timeout(Duration::from_millis(100));
        h.orchestrator.start_session().await.unwrap();
        h.ledger.hold_confirmations(true);
        h.ledger.revert_on_execution(true);
        h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap_err();
        h.ledger.release_held();
        h.ledger.revert_on_execution(false);

        h.orchestrator.schedule_payment(schedule_form("0.1")).await.unwrap();

        let entries = h.notifier.entries();
        assert!(entries.contains(&(
            NotifyLevel::Error,
            "Transaction failed. Please try again.".to_string()
        )));
        assert_eq!(h.ledger.payments().len(), 1);
    }
}
