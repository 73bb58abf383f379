//! The price oracle component

use chrono::{DateTime, Duration, Utc};
use lendkit_core::math::mul_ratio_floor;
use lendkit_core::{AccessControl, AssetId, Caller, MathError, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OracleError;
use crate::types::{OracleConfig, PriceQuote, PriceSnapshot};

/// Persisted oracle record: the quote table and the version counter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleState {
    pub quotes: BTreeMap<AssetId, PriceQuote>,
    pub version: u64,
}

/// Price oracle
///
/// One global version counter is bumped on every accepted update and
/// stamped on the quote, so a single number is enough to tell whether any
/// of a set of assets moved since a snapshot.
#[derive(Debug, Clone)]
pub struct PriceOracle {
    config: OracleConfig,
    state: OracleState,
}

impl PriceOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        Self::from_state(config, OracleState::default())
    }

    pub fn from_state(config: OracleConfig, state: OracleState) -> Result<Self, OracleError> {
        config.validate()?;
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn state(&self) -> &OracleState {
        &self.state
    }

    /// Current oracle version (0 before any update)
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Raw quote without freshness checks (inspection only)
    pub fn quote(&self, asset: &AssetId) -> Option<&PriceQuote> {
        self.state.quotes.get(asset)
    }

    pub fn asset_version(&self, asset: &AssetId) -> Option<u64> {
        self.quote(asset).map(|q| q.source_version)
    }

    /// Assets among `assets` whose quote changed after `version`
    pub fn changed_since<'a>(
        &self,
        assets: impl IntoIterator<Item = &'a AssetId>,
        version: u64,
    ) -> Vec<AssetId> {
        assets
            .into_iter()
            .filter(|asset| self.asset_version(asset).is_some_and(|v| v > version))
            .cloned()
            .collect()
    }

    /// Replace the configuration (governor only)
    pub fn set_config(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        config: OracleConfig,
    ) -> Result<(), OracleError> {
        access.require(caller, Role::Governor)?;
        config.validate()?;
        tracing::info!(
            min_price_age_secs = config.min_price_age_secs,
            max_price_age_secs = config.max_price_age_secs,
            max_deviation = %config.max_deviation,
            "Oracle config updated"
        );
        self.config = config;
        Ok(())
    }

    /// Accept a price from an authorized feeder
    pub fn submit_price(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        asset: AssetId,
        value: u128,
        source_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, OracleError> {
        access.require(caller, Role::Feeder)?;
        self.accept(asset, value, source_timestamp, now, true)
    }

    /// Accept a price outside the deviation band (governor only)
    ///
    /// Used after a legitimate market move larger than the cap; all other
    /// ingress checks still apply and the version still advances.
    pub fn reset_price(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        asset: AssetId,
        value: u128,
        source_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, OracleError> {
        access.require(caller, Role::Governor)?;
        tracing::warn!(asset = %asset, value, "Governor price reset bypasses deviation cap");
        self.accept(asset, value, source_timestamp, now, false)
    }

    fn accept(
        &mut self,
        asset: AssetId,
        value: u128,
        source_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        enforce_deviation: bool,
    ) -> Result<PriceQuote, OracleError> {
        if value == 0 {
            return Err(OracleError::InvalidPrice {
                asset,
                reason: "value must be positive".to_string(),
            });
        }
        if source_timestamp > now {
            return Err(OracleError::InvalidPrice {
                asset,
                reason: format!("source timestamp {source_timestamp} is in the future"),
            });
        }

        if let Some(previous) = self.state.quotes.get(&asset) {
            if source_timestamp < previous.source_timestamp {
                return Err(OracleError::OutOfOrder {
                    asset,
                    previous: previous.source_timestamp,
                    submitted: source_timestamp,
                });
            }
            if now < previous.observed_at {
                return Err(OracleError::InvalidPrice {
                    asset,
                    reason: "acceptance time moved backwards".to_string(),
                });
            }
            if enforce_deviation {
                let allowed = mul_ratio_floor(previous.value, self.config.max_deviation)?;
                if previous.value.abs_diff(value) > allowed {
                    tracing::warn!(
                        asset = %asset,
                        previous = previous.value,
                        submitted = value,
                        "Price rejected: deviation cap"
                    );
                    return Err(OracleError::DeviationExceeded {
                        asset,
                        previous: previous.value,
                        submitted: value,
                        max_deviation: self.config.max_deviation,
                    });
                }
            }
        }

        let version = self
            .state
            .version
            .checked_add(1)
            .ok_or(MathError::Overflow)?;
        let quote = PriceQuote {
            asset: asset.clone(),
            value,
            observed_at: now,
            source_timestamp,
            source_version: version,
        };

        self.state.version = version;
        self.state.quotes.insert(asset, quote.clone());

        tracing::info!(asset = %quote.asset, value, version, "Price accepted");
        Ok(quote)
    }

    /// Read a quote inside the freshness window `[min_price_age, max_age]`
    pub fn read_price(
        &self,
        asset: &AssetId,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, OracleError> {
        let quote = self
            .state
            .quotes
            .get(asset)
            .ok_or_else(|| OracleError::PriceNotFound {
                asset: asset.clone(),
            })?;

        let age = quote.age(now);
        let min_age = self.config.min_price_age();
        if age < min_age {
            return Err(OracleError::PriceTooFresh {
                asset: asset.clone(),
                age_secs: age.num_seconds(),
                min_age_secs: min_age.num_seconds(),
            });
        }
        if age > max_age {
            return Err(OracleError::StalePrice {
                asset: asset.clone(),
                age_secs: age.num_seconds(),
                max_age_secs: max_age.num_seconds(),
            });
        }

        Ok(quote.clone())
    }

    /// Read every asset in one step with the configured maximum age
    pub fn snapshot<'a>(
        &self,
        assets: impl IntoIterator<Item = &'a AssetId>,
        now: DateTime<Utc>,
    ) -> Result<PriceSnapshot, OracleError> {
        let max_age = self.config.max_price_age();
        let mut quotes = BTreeMap::new();
        for asset in assets {
            if quotes.contains_key(asset) {
                continue;
            }
            let quote = self.read_price(asset, max_age, now)?;
            quotes.insert(asset.clone(), quote);
        }

        Ok(PriceSnapshot {
            version: self.state.version,
            taken_at: now,
            quotes,
        })
    }
}
