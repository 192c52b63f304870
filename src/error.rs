use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ethers::providers::ProviderError;
use ethers::types::TxHash;
use ethers::utils::ConversionError;
use serde::Serialize;
use thiserror::Error;

use crate::ledger::models::LedgerOperation;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: required {required} wei, available {available} wei")]
    InsufficientFunds { required: String, available: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("No wallet address found. Please connect again.")]
    NoActiveAddress,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while pricing, submitting or confirming a Ledger transaction
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Absorbed by the fee estimator; never reaches a workflow caller
    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),

    #[error("{operation} rejected by the ledger: {}", .reason.as_deref().unwrap_or("no reason given"))]
    SubmissionRejected {
        operation: LedgerOperation,
        reason: Option<String>,
    },

    #[error("{operation} reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        operation: LedgerOperation,
        reason: Option<String>,
    },

    #[error("Nothing to claim: {}", .reason.as_deref().unwrap_or("no payments are due"))]
    NoClaimable { reason: Option<String> },

    #[error("Another transaction is still in flight{}", .pending.map(|h| format!(" ({:?})", h)).unwrap_or_default())]
    WorkflowInFlight { pending: Option<TxHash> },

    #[error("Stopped waiting for {tx_hash:?}; it may still confirm")]
    ConfirmationTimeout { tx_hash: TxHash },

    #[error("Transaction {tx_hash:?} was dropped before confirmation")]
    Dropped { tx_hash: TxHash },

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

impl ExecutionError {
    /// Ledger-supplied reason, if any
    pub fn ledger_reason(&self) -> Option<&str> {
        match self {
            ExecutionError::SubmissionRejected { reason, .. }
            | ExecutionError::Reverted { reason, .. }
            | ExecutionError::NoClaimable { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

impl AppError {
    /// Message shown to the user through the notifier
    pub fn user_message(&self) -> String {
        match self {
            AppError::Network(_) => {
                format!("{}. Please try again.", self)
            }
            AppError::Execution(e @ ExecutionError::Reverted { .. })
            | AppError::Execution(e @ ExecutionError::SubmissionRejected { .. }) => {
                match e.ledger_reason() {
                    Some(reason) => reason.to_string(),
                    None => "Transaction failed. Please try again.".to_string(),
                }
            }
            AppError::InsufficientFunds { .. } => {
                "Insufficient funds for the transaction.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
            AppError::InsufficientFunds { required, available } => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_FUNDS",
                Some(serde_json::json!({
                    "required_wei": required,
                    "available_wei": available,
                })),
            ),
            AppError::Network(_) => (StatusCode::SERVICE_UNAVAILABLE, "NETWORK_ERROR", None),
            AppError::NoActiveAddress => (StatusCode::UNAUTHORIZED, "NO_ACTIVE_ADDRESS", None),
            AppError::Execution(ExecutionError::NoClaimable { .. }) => {
                (StatusCode::CONFLICT, "NO_CLAIMABLE", None)
            }
            AppError::Execution(ExecutionError::WorkflowInFlight { pending }) => (
                StatusCode::CONFLICT,
                "WORKFLOW_IN_FLIGHT",
                pending.map(|h| serde_json::json!({ "tx_hash": format!("{:?}", h) })),
            ),
            AppError::Execution(ExecutionError::ConfirmationTimeout { tx_hash }) => (
                StatusCode::ACCEPTED,
                "CONFIRMATION_TIMEOUT",
                Some(serde_json::json!({ "tx_hash": format!("{:?}", tx_hash) })),
            ),
            AppError::Execution(ExecutionError::Reverted { operation, .. })
            | AppError::Execution(ExecutionError::SubmissionRejected { operation, .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "TRANSACTION_FAILED",
                Some(serde_json::json!({ "operation": operation.to_string() })),
            ),
            AppError::Execution(ExecutionError::Dropped { tx_hash }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "TRANSACTION_DROPPED",
                Some(serde_json::json!({ "tx_hash": format!("{:?}", tx_hash) })),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None),
        };

        let body = Json(ErrorResponse {
            error: self.user_message(),
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<ProviderError> for AppError {
    fn from(error: ProviderError) -> Self {
        AppError::Network(format!("RPC request failed: {}", error))
    }
}

impl From<ConversionError> for AppError {
    fn from(error: ConversionError) -> Self {
        AppError::Validation(format!("Unit conversion error: {}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
