//! Market errors

use lendkit_core::{AccessDenied, IdError, MathError};
use lendkit_events::EventError;
use lendkit_liquidation::LiquidationError;
use lendkit_oracle::OracleError;
use lendkit_positions::PositionError;
use lendkit_reserve::ReserveError;
use lendkit_vault::VaultError;
use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Reserve(#[from] ReserveError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Liquidation(#[from] LiquidationError),

    #[error(transparent)]
    Unauthorized(#[from] AccessDenied),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Asset mismatch: market lends {expected}, state holds {actual}")]
    AssetMismatch { expected: String, actual: String },

    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] MathError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse failure class across every component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InsufficientLiquidity,
    StalePrice,
    PriceTooFresh,
    Undercollateralized,
    AlreadyOwned,
    NotLiquidatable,
    SnapshotInvalidated,
    TicketExpired,
    ArithmeticOverflow,
    Unauthorized,
    NotFound,
    Rejected,
    Config,
    Storage,
}

impl MarketError {
    /// Retrying with a fresh `begin_liquidation` may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Liquidation(e) if e.is_recoverable())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Oracle(e) => oracle_kind(e),
            Self::Reserve(e) => reserve_kind(e),
            Self::Vault(e) => vault_kind(e),
            Self::Position(e) => position_kind(e),
            Self::Liquidation(e) => match e {
                LiquidationError::NotLiquidatable { .. } => ErrorKind::NotLiquidatable,
                LiquidationError::SnapshotInvalidated { .. } => ErrorKind::SnapshotInvalidated,
                LiquidationError::TicketExpired(_) => ErrorKind::TicketExpired,
                LiquidationError::TicketNotFound(_) => ErrorKind::NotFound,
                LiquidationError::TicketNotOpen { .. }
                | LiquidationError::TicketAlreadyOpen { .. }
                | LiquidationError::TicketNotExpired { .. } => ErrorKind::Rejected,
                LiquidationError::InvalidConfig(_) => ErrorKind::Config,
                LiquidationError::Position(e) => position_kind(e),
                LiquidationError::Oracle(e) => oracle_kind(e),
                LiquidationError::Reserve(e) => reserve_kind(e),
                LiquidationError::Vault(e) => vault_kind(e),
                LiquidationError::Unauthorized(_) => ErrorKind::Unauthorized,
                LiquidationError::ArithmeticOverflow(_) => ErrorKind::ArithmeticOverflow,
            },
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Event(_) | Self::Io(_) | Self::Serialization(_) | Self::InconsistentState(_) => {
                ErrorKind::Storage
            }
            Self::InvalidId(_) => ErrorKind::Rejected,
            Self::InvalidConfig(_) | Self::AssetMismatch { .. } => ErrorKind::Config,
            Self::ArithmeticOverflow(_) => ErrorKind::ArithmeticOverflow,
        }
    }
}

fn oracle_kind(e: &OracleError) -> ErrorKind {
    match e {
        OracleError::StalePrice { .. } => ErrorKind::StalePrice,
        OracleError::PriceTooFresh { .. } => ErrorKind::PriceTooFresh,
        OracleError::PriceNotFound { .. } => ErrorKind::NotFound,
        OracleError::Unauthorized(_) => ErrorKind::Unauthorized,
        OracleError::InvalidConfig(_) => ErrorKind::Config,
        OracleError::ArithmeticOverflow(_) => ErrorKind::ArithmeticOverflow,
        _ => ErrorKind::Rejected,
    }
}

fn reserve_kind(e: &ReserveError) -> ErrorKind {
    match e {
        ReserveError::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
        ReserveError::Unauthorized(_) => ErrorKind::Unauthorized,
        ReserveError::InvalidConfig(_) => ErrorKind::Config,
        ReserveError::ArithmeticOverflow(_) => ErrorKind::ArithmeticOverflow,
        _ => ErrorKind::Rejected,
    }
}

fn vault_kind(e: &VaultError) -> ErrorKind {
    match e {
        VaultError::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
        VaultError::AlreadyOwned(_) => ErrorKind::AlreadyOwned,
        VaultError::ItemNotHeld(_) => ErrorKind::NotFound,
        VaultError::Reserve(e) => reserve_kind(e),
        VaultError::Unauthorized(_) => ErrorKind::Unauthorized,
        VaultError::InvalidConfig(_) => ErrorKind::Config,
        VaultError::ArithmeticOverflow(_) => ErrorKind::ArithmeticOverflow,
        _ => ErrorKind::Rejected,
    }
}

fn position_kind(e: &PositionError) -> ErrorKind {
    match e {
        PositionError::PositionNotFound(_) => ErrorKind::NotFound,
        PositionError::AlreadyOwned(_) => ErrorKind::AlreadyOwned,
        PositionError::Undercollateralized { .. } => ErrorKind::Undercollateralized,
        PositionError::Oracle(e) => oracle_kind(e),
        PositionError::Reserve(e) => reserve_kind(e),
        PositionError::Unauthorized(_) | PositionError::NotOwner { .. } => ErrorKind::Unauthorized,
        PositionError::InvalidConfig(_) => ErrorKind::Config,
        PositionError::ArithmeticOverflow(_) => ErrorKind::ArithmeticOverflow,
        _ => ErrorKind::Rejected,
    }
}
