use chrono::{DateTime, Utc};
use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, ExecutionError},
    fees::{FeeBudget, FeeSource},
    ledger::{
        models::{LedgerOperation, ScheduleCall, TxOutcome},
        Ledger,
    },
};

/// Lifecycle of one state-changing Ledger call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Idle,
    /// Inputs validated, fee budget resolved, parameters frozen
    Built,
    /// Handed to the Ledger; cannot be cancelled from here on
    Submitted,
    Confirmed,
    Failed,
}

impl TxState {
    pub fn can_transition_to(&self, next: TxState) -> bool {
        matches!(
            (self, next),
            (TxState::Idle, TxState::Built)
                | (TxState::Built, TxState::Submitted)
                | (TxState::Built, TxState::Failed)
                | (TxState::Submitted, TxState::Confirmed)
                | (TxState::Submitted, TxState::Failed)
        )
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxState::Idle => "idle",
            TxState::Built => "built",
            TxState::Submitted => "submitted",
            TxState::Confirmed => "confirmed",
            TxState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Record of one attempt at a Ledger operation
#[derive(Debug, Clone, Serialize)]
pub struct TxAttempt {
    pub id: Uuid,
    pub operation: LedgerOperation,
    pub state: TxState,
    pub from: Address,
    pub value: U256,
    pub gas_limit: Option<U256>,
    pub fee_source: Option<FeeSource>,
    pub tx_hash: Option<TxHash>,
    pub outcome: Option<TxOutcome>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A confirmed attempt
#[derive(Debug, Clone)]
pub struct Settled {
    pub attempt: TxAttempt,
    pub outcome: TxOutcome,
}

/// An attempt that did not confirm, with the reason.
///
/// `attempt.state` is `Failed`, or still `Submitted` when the client stopped
/// waiting for a transaction that may yet confirm.
#[derive(Debug)]
pub struct FailedAttempt {
    pub attempt: TxAttempt,
    pub error: AppError,
}

impl From<FailedAttempt> for AppError {
    fn from(failed: FailedAttempt) -> Self {
        failed.error
    }
}

impl TxAttempt {
    pub fn new(operation: LedgerOperation, from: Address) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            operation,
            state: TxState::Idle,
            from,
            value: U256::zero(),
            gas_limit: None,
            fee_source: None,
            tx_hash: None,
            outcome: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(mut self, next: TxState) -> Result<Self, FailedAttempt> {
        if !self.state.can_transition_to(next) {
            let error = ExecutionError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            };
            error!("{} attempt {}: {}", self.operation, self.id, error);
            return Err(FailedAttempt {
                attempt: self,
                error: error.into(),
            });
        }

        self.state = next;
        self.updated_at = Utc::now();
        Ok(self)
    }

    /// Move to `Failed` where the lifecycle allows it; a `Submitted` attempt
    /// whose confirmation was merely not observed stays `Submitted`.
    fn fail(mut self, error: AppError) -> FailedAttempt {
        let still_pending = self.state == TxState::Submitted && is_unobserved(&error);
        if !still_pending && self.state.can_transition_to(TxState::Failed) {
            self.state = TxState::Failed;
        }
        self.error_message = Some(error.to_string());
        self.updated_at = Utc::now();
        FailedAttempt {
            attempt: self,
            error,
        }
    }

    /// True when the transaction was handed over but its fate is unknown
    pub fn is_unresolved(&self) -> bool {
        self.state == TxState::Submitted
    }
}

/// Errors after which the transaction may still be mined
fn is_unobserved(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Execution(ExecutionError::ConfirmationTimeout { .. }) | AppError::Network(_)
    )
}

/// Builds, sends and watches `schedulePayment` / `claimPayment`
pub struct TransactionSubmitter {
    ledger: Arc<dyn Ledger>,
    confirmation_timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, confirmation_timeout: Duration) -> Self {
        Self {
            ledger,
            confirmation_timeout,
        }
    }

    /// Value-bearing schedule call with a pre-resolved fee budget
    #[instrument(skip(self, call, budget), fields(receiver = ?call.receiver))]
    pub async fn schedule_payment(
        &self,
        from: Address,
        call: ScheduleCall,
        budget: FeeBudget,
    ) -> Result<Settled, FailedAttempt> {
        let mut attempt = TxAttempt::new(LedgerOperation::SchedulePayment, from);
        attempt.value = call.amount;
        attempt.gas_limit = Some(budget.gas_limit);
        attempt.fee_source = Some(budget.source);
        let attempt = attempt.advance(TxState::Built)?;

        let submitted = self
            .ledger
            .submit_schedule(from, &call, budget.gas_limit)
            .await;
        self.watch(attempt, submitted).await
    }

    #[instrument(skip(self))]
    pub async fn claim_payment(&self, from: Address) -> Result<Settled, FailedAttempt> {
        let attempt = TxAttempt::new(LedgerOperation::ClaimPayment, from).advance(TxState::Built)?;

        // Nothing due shows up as a revert in simulation; don't spend gas on it.
        if let Err(e) = self.ledger.simulate_claim(from).await {
            warn!("claimPayment simulation failed: {}", e);
            return Err(attempt.fail(e));
        }

        let submitted = self.ledger.submit_claim(from).await;
        self.watch(attempt, submitted).await
    }

    async fn watch(
        &self,
        attempt: TxAttempt,
        submitted: Result<TxHash, AppError>,
    ) -> Result<Settled, FailedAttempt> {
        let tx_hash = match submitted {
            Ok(hash) => hash,
            Err(e) => {
                error!("{} rejected at submission: {}", attempt.operation, e);
                return Err(attempt.fail(e));
            }
        };

        let mut attempt = attempt;
        attempt.tx_hash = Some(tx_hash);
        let attempt = attempt.advance(TxState::Submitted)?;

        let confirmation =
            tokio::time::timeout(self.confirmation_timeout, self.ledger.await_confirmation(tx_hash))
                .await;

        match confirmation {
            Err(_) => {
                warn!(
                    "Gave up waiting for {:?} after {:?}",
                    tx_hash, self.confirmation_timeout
                );
                Err(attempt.fail(ExecutionError::ConfirmationTimeout { tx_hash }.into()))
            }
            Ok(Err(e)) => Err(attempt.fail(e)),
            Ok(Ok(outcome)) if outcome.success => {
                let mut attempt = attempt;
                attempt.outcome = Some(outcome.clone());
                let attempt = attempt.advance(TxState::Confirmed)?;
                info!("{} confirmed: {:?}", attempt.operation, tx_hash);
                Ok(Settled { attempt, outcome })
            }
            Ok(Ok(outcome)) => {
                let operation = attempt.operation;
                let mut attempt = attempt;
                attempt.outcome = Some(outcome);
                Err(attempt.fail(
                    ExecutionError::Reverted {
                        operation,
                        reason: None,
                    }
                    .into(),
                ))
            }
        }
    }
}
