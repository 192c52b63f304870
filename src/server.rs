use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{
    handler::{
        claim_payment, get_ledger_time, get_session, health_check, list_payments,
        refresh_balance, schedule_payment, start_session, switch_network, AppState,
    },
    notifications::stream_notifications,
};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Session and view state
                .route("/session", get(get_session))
                .route("/session/start", post(start_session))
                .route("/network", post(switch_network))
                .route("/balance/refresh", post(refresh_balance))
                // Ledger reads
                .route("/payments", get(list_payments))
                .route("/ledger/time", get(get_ledger_time))
                // State-changing workflows
                .route("/payments/schedule", post(schedule_payment))
                .route("/payments/claim", post(claim_payment))
                // Workflow outcomes
                .route("/notifications", get(stream_notifications)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
