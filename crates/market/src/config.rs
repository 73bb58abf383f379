//! Market configuration
//!
//! One JSON document groups every component's parameters. Missing fields
//! fall back to their defaults.

use lendkit_core::AssetId;
use lendkit_liquidation::LiquidationConfig;
use lendkit_oracle::OracleConfig;
use lendkit_positions::RiskParams;
use lendkit_reserve::ReserveConfig;
use lendkit_vault::VaultConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MarketError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// The single borrowable asset
    #[serde(default = "default_borrow_asset")]
    pub borrow_asset: AssetId,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub risk: RiskParams,

    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub reserve: ReserveConfig,

    #[serde(default)]
    pub liquidation: LiquidationConfig,
}

fn default_borrow_asset() -> AssetId {
    AssetId::usdc()
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            borrow_asset: default_borrow_asset(),
            oracle: OracleConfig::default(),
            risk: RiskParams::default(),
            vault: VaultConfig::default(),
            reserve: ReserveConfig::default(),
            liquidation: LiquidationConfig::default(),
        }
    }
}

impl MarketConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, MarketError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), MarketError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        self.oracle.validate()?;
        self.risk.validate()?;
        self.vault.validate()?;
        self.reserve.validate()?;
        self.liquidation.validate()?;

        let window = self.liquidation.ticket_ttl_secs;
        if window > self.oracle.max_price_age_secs {
            tracing::warn!(
                ticket_ttl_secs = window,
                max_price_age_secs = self.oracle.max_price_age_secs,
                "Ticket window outlives price freshness"
            );
        }
        Ok(())
    }
}
