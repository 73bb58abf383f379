//! Core oracle types

use chrono::{DateTime, Duration, Utc};
use lendkit_core::AssetId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::OracleError;

/// Oracle parameters (changeable by a governor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Minimum age before a quote may be consumed
    #[serde(default = "default_min_price_age_secs")]
    pub min_price_age_secs: u64,

    /// Maximum age accepted by market consumers
    #[serde(default = "default_max_price_age_secs")]
    pub max_price_age_secs: u64,

    /// Maximum relative move per accepted update (0.2 = 20%)
    #[serde(default = "default_max_deviation")]
    pub max_deviation: Decimal,
}

fn default_min_price_age_secs() -> u64 {
    12
}

fn default_max_price_age_secs() -> u64 {
    3_600
}

fn default_max_deviation() -> Decimal {
    Decimal::new(20, 2)
}

/// Largest age, in seconds, a `chrono::Duration` can carry
const MAX_AGE_SECS: u64 = i64::MAX as u64 / 1_000;

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            min_price_age_secs: default_min_price_age_secs(),
            max_price_age_secs: default_max_price_age_secs(),
            max_deviation: default_max_deviation(),
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.min_price_age_secs == 0 {
            return Err(OracleError::InvalidConfig(
                "min_price_age_secs must be positive".to_string(),
            ));
        }
        if self.max_price_age_secs > MAX_AGE_SECS {
            return Err(OracleError::InvalidConfig(format!(
                "max_price_age_secs out of range: {}",
                self.max_price_age_secs
            )));
        }
        if self.max_price_age_secs < self.min_price_age_secs {
            return Err(OracleError::InvalidConfig(format!(
                "max_price_age_secs ({}) below min_price_age_secs ({})",
                self.max_price_age_secs, self.min_price_age_secs
            )));
        }
        if self.max_deviation <= Decimal::ZERO {
            return Err(OracleError::InvalidConfig(
                "max_deviation must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_price_age(&self) -> Duration {
        Duration::seconds(self.min_price_age_secs.min(MAX_AGE_SECS) as i64)
    }

    pub fn max_price_age(&self) -> Duration {
        Duration::seconds(self.max_price_age_secs.min(MAX_AGE_SECS) as i64)
    }
}

/// An accepted price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub asset: AssetId,
    /// Value of one unit of `asset` in base units of the borrowable asset
    pub value: u128,
    /// When the oracle accepted the quote
    pub observed_at: DateTime<Utc>,
    /// Timestamp reported by the source
    pub source_timestamp: DateTime<Utc>,
    /// Oracle-wide version stamped at acceptance
    pub source_version: u64,
}

impl PriceQuote {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.observed_at)
    }
}

/// A set of quotes read in one step under a single oracle version
///
/// Every quote inside has `source_version <= version`, and any update
/// accepted after the snapshot carries a version strictly above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub version: u64,
    pub taken_at: DateTime<Utc>,
    pub quotes: BTreeMap<AssetId, PriceQuote>,
}

impl PriceSnapshot {
    pub fn quote(&self, asset: &AssetId) -> Option<&PriceQuote> {
        self.quotes.get(asset)
    }

    pub fn value_of(&self, asset: &AssetId) -> Option<u128> {
        self.quotes.get(asset).map(|q| q.value)
    }
}
