//! Position errors

use lendkit_core::{AccessDenied, ItemId, MathError, PositionId, Principal};
use lendkit_oracle::OracleError;
use lendkit_reserve::ReserveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PositionError {
    #[error("Position not found: {0}")]
    PositionNotFound(PositionId),

    #[error("{caller} does not own {position}")]
    NotOwner {
        position: PositionId,
        caller: Principal,
    },

    /// Item belongs to a position or to the vault already
    #[error("Item already owned: {0}")]
    AlreadyOwned(ItemId),

    #[error("Item {item} is not collateral of {position}")]
    ItemNotInPosition { position: PositionId, item: ItemId },

    /// Borrow and withdraw are blocked while a liquidation ticket is open
    #[error("Position {0} is under liquidation")]
    PositionLocked(PositionId),

    #[error("Undercollateralized {position}: collateral {collateral_value}, debt {debt}, limit {limit}")]
    Undercollateralized {
        position: PositionId,
        collateral_value: u128,
        debt: u128,
        limit: u128,
    },

    #[error("Position {0} has no debt")]
    NothingToRepay(PositionId),

    #[error("Invalid risk parameters: {0}")]
    InvalidConfig(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Reserve error: {0}")]
    Reserve(#[from] ReserveError),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AccessDenied),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] MathError),
}
