//! Persisted market state
//!
//! One table per component, each keyed by identifiers that are never
//! reused. Role grants live with the access-control collaborator and are
//! not part of it.

use lendkit_liquidation::TicketBook;
use lendkit_oracle::OracleState;
use lendkit_positions::PositionBook;
use lendkit_reserve::ReserveState;
use lendkit_vault::VaultState;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MarketError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub reserve: ReserveState,
    pub vault: VaultState,
    pub positions: PositionBook,
    pub oracle: OracleState,
    pub tickets: TicketBook,
}

impl MarketState {
    pub fn from_file(path: &Path) -> Result<Self, MarketError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a temporary file so a crash never leaves half a state
    pub fn to_file(&self, path: &Path) -> Result<(), MarketError> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
