//! Lendkit Vault - Liquidity provider shares and seized-item custody
//!
//! The share ledger prices every mint and redemption with a constant
//! virtual offset on both sides of the ratio, so the very first deposit
//! cannot set an exchange rate that later depositors round against.

pub mod error;
pub mod ledger;
pub mod vault;

pub use error::VaultError;
pub use ledger::{ShareLedger, VIRTUAL_ASSETS, VIRTUAL_SHARES};
pub use vault::{CollateralVault, PoolView, VaultConfig, VaultState};
