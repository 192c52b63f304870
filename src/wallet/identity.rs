use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use std::sync::Arc;
use tracing::debug;

use crate::error::AppResult;

/// Resolves the account the session acts as
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` when no wallet is connected
    async fn active_address(&self) -> AppResult<Option<String>>;
}

/// A fixed, externally supplied address
pub struct StaticIdentity {
    address: Option<String>,
}

impl StaticIdentity {
    pub fn new(address: Option<String>) -> Self {
        Self { address }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn active_address(&self) -> AppResult<Option<String>> {
        Ok(self.address.clone())
    }
}

/// First account unlocked in the wallet behind the RPC endpoint (`eth_accounts`)
pub struct RpcWalletIdentity {
    provider: Arc<Provider<Http>>,
}

impl RpcWalletIdentity {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl IdentityProvider for RpcWalletIdentity {
    async fn active_address(&self) -> AppResult<Option<String>> {
        let accounts = self.provider.get_accounts().await?;
        debug!("RPC wallet exposes {} account(s)", accounts.len());
        Ok(accounts.first().map(|a| format!("{:?}", a)))
    }
}
