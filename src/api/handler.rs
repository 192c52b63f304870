use axum::{extract::State, Json};
use chrono::Utc;
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::models::Network,
    notifications::BroadcastNotifier,
    orchestrator::{Orchestrator, PendingSchedule},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub notifier: Arc<BroadcastNotifier>,
    pub contract_address: Address,
}

/// Health check
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        ledger_network: state.orchestrator.ledger_network().as_str().to_string(),
        contract_address: to_checksum(&state.contract_address, None),
        notification_subscribers: state.notifier.subscriber_count(),
        timestamp: Utc::now(),
    })
}

/// Current session view state
/// GET /session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(session_response(&state).await)
}

/// Resolve the active account and load balance and payments
/// POST /session/start
pub async fn start_session(State(state): State<AppState>) -> AppResult<Json<SessionResponse>> {
    state.orchestrator.start_session().await?;
    Ok(Json(session_response(&state).await))
}

/// Change the active network and re-read the balance there
/// POST /network
pub async fn switch_network(
    State(state): State<AppState>,
    Json(request): Json<SwitchNetworkRequest>,
) -> AppResult<Json<BalanceResponse>> {
    let network: Network = request.network.parse()?;
    info!("🔀 Network switch requested: {}", network);

    let snapshot = state.orchestrator.switch_network(network).await?;
    Ok(Json(BalanceResponse::from(snapshot)))
}

/// POST /balance/refresh
pub async fn refresh_balance(State(state): State<AppState>) -> AppResult<Json<BalanceResponse>> {
    let snapshot = state.orchestrator.refresh_balance().await?;
    Ok(Json(BalanceResponse::from(snapshot)))
}

/// Sender's payments, annotated against the Ledger clock
/// GET /payments
pub async fn list_payments(State(state): State<AppState>) -> AppResult<Json<PaymentsResponse>> {
    let payments = state.orchestrator.refresh_payments().await?;

    let ledger_time = match state.orchestrator.ledger_time().await {
        Ok(now) => Some(now),
        Err(e) => {
            warn!("Ledger clock unavailable, payments returned without status: {}", e);
            None
        }
    };

    let sender = state
        .orchestrator
        .context()
        .await
        .address
        .ok_or(AppError::NoActiveAddress)?;

    Ok(Json(PaymentsResponse {
        sender: to_checksum(&sender, None),
        ledger_time,
        count: payments.len(),
        payments: payments
            .iter()
            .map(|p| PaymentResponse::new(p, ledger_time))
            .collect(),
    }))
}

/// Schedule a payment from the active account
/// POST /payments/schedule
pub async fn schedule_payment(
    State(state): State<AppState>,
    Json(request): Json<PendingSchedule>,
) -> AppResult<Json<ScheduleResponse>> {
    info!("📝 Scheduling {} ETH to {}", request.amount, request.receiver);

    let report = state.orchestrator.schedule_payment(request).await?;

    info!("✅ Payment scheduled in attempt {}", report.attempt.id);
    Ok(Json(ScheduleResponse::from(report)))
}

/// Claim every payment due to the active account
/// POST /payments/claim
pub async fn claim_payment(State(state): State<AppState>) -> AppResult<Json<ClaimResponse>> {
    let report = state.orchestrator.claim_payment().await?;

    info!("✅ Claimed {} wei in attempt {}", report.claimed, report.attempt.id);
    Ok(Json(ClaimResponse::from(report)))
}

/// GET /ledger/time
pub async fn get_ledger_time(State(state): State<AppState>) -> AppResult<Json<LedgerTimeResponse>> {
    let now = state.orchestrator.ledger_time().await?;
    Ok(Json(LedgerTimeResponse::new(now)))
}

async fn session_response(state: &AppState) -> SessionResponse {
    let orchestrator = &state.orchestrator;
    let last_attempt = orchestrator.last_attempt();

    SessionResponse::new(
        orchestrator.context().await,
        orchestrator.ledger_network().as_str(),
        last_attempt.as_ref(),
        orchestrator.unresolved_transaction(),
    )
}
