use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use config::ConfigError;
use ethers::types::Address;
use serde::Deserialize;

use crate::ledger::models::Network;

/// Address of the deployed scheduled-payments contract
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x598Bc2396fc1D197a3425690407077933C7a7399";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    pub contract_address: Address,
    /// Network the contract is deployed on
    pub ledger_network: Network,
    /// Network selected when a session starts
    pub default_network: Network,
    pub rpc_urls: HashMap<Network, String>,
    /// Fixed account to act as; when unset the RPC wallet's first account is used
    pub active_address: Option<String>,
    pub confirmation_timeout: Duration,
    pub confirmations: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut rpc_urls = HashMap::new();
        rpc_urls.insert(
            Network::Sepolia,
            std::env::var("SEPOLIA_RPC_URL")
                .unwrap_or_else(|_| "https://rpc.sepolia.org".to_string()),
        );
        rpc_urls.insert(
            Network::Rinkeby,
            std::env::var("RINKEBY_RPC_URL")
                .unwrap_or_else(|_| "https://rpc.ankr.com/eth_rinkeby".to_string()),
        );
        rpc_urls.insert(
            Network::Mainnet,
            std::env::var("MAINNET_RPC_URL")
                .unwrap_or_else(|_| "https://cloudflare-eth.com".to_string()),
        );

        let contract_address = std::env::var("MANDATES_CONTRACT_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_CONTRACT_ADDRESS.to_string());
        let contract_address = Address::from_str(&contract_address).map_err(|e| {
            ConfigError::Message(format!(
                "MANDATES_CONTRACT_ADDRESS is not an address: {}",
                e
            ))
        })?;

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            contract_address,
            ledger_network: network_var("LEDGER_NETWORK")?,
            default_network: network_var("DEFAULT_NETWORK")?,
            rpc_urls,
            active_address: std::env::var("ACTIVE_ADDRESS")
                .ok()
                .filter(|a| !a.trim().is_empty()),
            confirmation_timeout: Duration::from_secs(number_var(
                "CONFIRMATION_TIMEOUT_SECS",
                120,
            )?),
            confirmations: number_var("CONFIRMATIONS", 1)? as usize,
        })
    }

    pub fn rpc_url(&self, network: Network) -> Option<&str> {
        self.rpc_urls.get(&network).map(String::as_str)
    }
}

fn network_var(key: &str) -> Result<Network, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Network::from_str(&value)
            .map_err(|e| ConfigError::Message(format!("{}: {}", key, e))),
        Err(_) => Ok(Network::Sepolia),
    }
}

fn number_var(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::Message(format!("{} must be a number: {}", key, e))),
        Err(_) => Ok(default),
    }
}
