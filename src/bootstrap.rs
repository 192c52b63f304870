use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::evm::{EvmLedger, RpcBalanceSource},
    notifications::BroadcastNotifier,
    orchestrator::Orchestrator,
    wallet::{IdentityProvider, RpcWalletIdentity, StaticIdentity},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let ledger = Arc::new(EvmLedger::from_config(config)?);
    info!(
        "✅ Ledger contract {:?} on {}",
        config.contract_address, config.ledger_network
    );

    let balances = Arc::new(RpcBalanceSource::from_config(config)?);
    info!("✅ Balance endpoints configured for {} network(s)", config.rpc_urls.len());

    let identity: Arc<dyn IdentityProvider> = match &config.active_address {
        Some(address) => {
            info!("👛 Acting as configured address {}", address);
            Arc::new(StaticIdentity::new(Some(address.clone())))
        }
        None => {
            info!("👛 Acting as the RPC wallet's first account");
            Arc::new(RpcWalletIdentity::new(ledger.provider()))
        }
    };

    let notifier = Arc::new(BroadcastNotifier::new());

    let orchestrator = Arc::new(Orchestrator::new(
        identity,
        ledger,
        balances,
        notifier.clone(),
        config.default_network,
        config.confirmation_timeout,
    ));

    // A missing wallet is not fatal; clients can start the session later.
    if let Err(e) = orchestrator.start_session().await {
        warn!("⚠️  Session not started at boot: {}", e);
    }

    Ok(AppState {
        orchestrator,
        notifier,
        contract_address: config.contract_address,
    })
}
