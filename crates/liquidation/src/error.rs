//! Liquidation errors

use chrono::{DateTime, Utc};
use lendkit_core::{AccessDenied, MathError, PositionId, TicketId};
use lendkit_oracle::OracleError;
use lendkit_positions::PositionError;
use lendkit_reserve::ReserveError;
use lendkit_vault::VaultError;
use thiserror::Error;

use crate::ticket::TicketState;

#[derive(Error, Debug)]
pub enum LiquidationError {
    #[error("Position {position} not liquidatable: collateral {collateral_value}, required {required}")]
    NotLiquidatable {
        position: PositionId,
        collateral_value: u128,
        required: u128,
    },

    /// Debt, collateral, index or prices moved since the ticket was opened.
    /// Recoverable by opening a new ticket.
    #[error("Snapshot invalidated for {ticket}: {reason}")]
    SnapshotInvalidated { ticket: TicketId, reason: String },

    #[error("Ticket expired: {0}")]
    TicketExpired(TicketId),

    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    #[error("Ticket {ticket} is {state}")]
    TicketNotOpen { ticket: TicketId, state: TicketState },

    #[error("Position {position} already has open ticket {ticket}")]
    TicketAlreadyOpen { position: PositionId, ticket: TicketId },

    #[error("Ticket {ticket} does not expire until {expires_at}")]
    TicketNotExpired {
        ticket: TicketId,
        expires_at: DateTime<Utc>,
    },

    #[error("Invalid liquidation config: {0}")]
    InvalidConfig(String),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Reserve error: {0}")]
    Reserve(#[from] ReserveError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AccessDenied),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] MathError),
}

impl LiquidationError {
    /// True when retrying from `begin_liquidation` may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SnapshotInvalidated { .. })
    }
}
