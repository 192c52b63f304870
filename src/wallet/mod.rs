pub mod balance;
pub mod identity;

pub use balance::BalanceTracker;
pub use identity::{IdentityProvider, RpcWalletIdentity, StaticIdentity};

use ethers::types::Address;
use ethers::utils::to_checksum;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Parse a `0x`-prefixed account identifier.
///
/// All-lowercase and all-uppercase hex are accepted as-is; mixed case must
/// carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> AppResult<Address> {
    let trimmed = input.trim();
    let invalid = || AppError::Validation(format!("Invalid address: {}", trimmed));

    let hex = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let address = Address::from_str(hex).map_err(|_| invalid())?;

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None) != trimmed {
        return Err(AppError::Validation(format!(
            "Address checksum mismatch: {}",
            trimmed
        )));
    }

    Ok(address)
}
