//! Vault errors

use lendkit_core::{AccessDenied, ItemId, MathError, Principal};
use lendkit_reserve::ReserveError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Amount must be positive")]
    ZeroAmount,

    /// Deposit too small to mint a single share
    #[error("Deposit of {amount} mints zero shares")]
    ZeroShares { amount: u128 },

    /// Redemption too small to return a single base unit
    #[error("Redeeming {shares} shares returns zero assets")]
    ZeroRedeem { shares: u128 },

    #[error("First deposit {amount} below minimum {minimum}")]
    BelowMinimumDeposit { amount: u128, minimum: u128 },

    #[error("Insufficient shares for {holder}: available {available}, requested {requested}")]
    InsufficientShares {
        holder: Principal,
        available: u128,
        requested: u128,
    },

    #[error("Insufficient liquidity: available {available}, requested {requested}")]
    InsufficientLiquidity { available: u128, requested: u128 },

    #[error("Item already in vault custody: {0}")]
    AlreadyOwned(ItemId),

    #[error("Item not in vault custody: {0}")]
    ItemNotHeld(ItemId),

    #[error("Reserve error: {0}")]
    Reserve(#[from] ReserveError),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AccessDenied),

    #[error("Invalid vault config: {0}")]
    InvalidConfig(String),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] MathError),
}
