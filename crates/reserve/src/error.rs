//! Reserve errors

use lendkit_core::{AccessDenied, MathError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReserveError {
    #[error("Insufficient liquidity: available {available}, requested {requested}")]
    InsufficientLiquidity { available: u128, requested: u128 },

    #[error("Amount must be positive")]
    ZeroAmount,

    /// Amount too small to move a single scaled unit
    #[error("Amount {amount} is below one scaled debt unit")]
    AmountTooSmall { amount: u128 },

    #[error("Scaled debt {requested} exceeds outstanding {outstanding}")]
    ExceedsOutstanding { outstanding: u128, requested: u128 },

    #[error("Invalid reserve config: {0}")]
    InvalidConfig(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AccessDenied),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] MathError),
}
