//! External price feeds
//!
//! A `PriceFeed` is where prices come from before they are submitted to the
//! oracle. Fetching is async; submission is not, so a relay never holds the
//! oracle across an await point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lendkit_core::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::OracleError;

/// A price as reported by a feed, before oracle acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPrice {
    pub asset: AssetId,
    pub value: u128,
    pub source_timestamp: DateTime<Utc>,
}

/// Price feed trait - interface for price sources
///
/// Implementations can be:
/// - StaticFeed: fixed prices for tests and simulations
/// - JsonFileFeed: prices dropped into a JSON file by an external process
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Feed name (for logging)
    fn name(&self) -> &str;

    /// Fetch the latest price for an asset
    async fn fetch(&self, asset: &AssetId) -> Result<FeedPrice, OracleError>;

    /// Fetch prices for multiple assets
    async fn fetch_many(&self, assets: &[AssetId]) -> Vec<Result<FeedPrice, OracleError>> {
        let mut results = Vec::with_capacity(assets.len());
        for asset in assets {
            results.push(self.fetch(asset).await);
        }
        results
    }
}

/// Static feed for testing
///
/// Stores fixed prices that can be updated programmatically.
#[derive(Debug, Default)]
pub struct StaticFeed {
    prices: RwLock<HashMap<AssetId, FeedPrice>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, asset: AssetId, value: u128, source_timestamp: DateTime<Utc>) {
        let price = FeedPrice {
            asset: asset.clone(),
            value,
            source_timestamp,
        };
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(asset, price);
    }

    pub fn remove_price(&self, asset: &AssetId) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.remove(asset);
    }
}

#[async_trait]
impl PriceFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, asset: &AssetId) -> Result<FeedPrice, OracleError> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices
            .get(asset)
            .cloned()
            .ok_or_else(|| OracleError::PriceNotFound {
                asset: asset.clone(),
            })
    }
}

/// Feed backed by a JSON file holding a list of `FeedPrice`
///
/// The file is re-read on every fetch so an external process can rewrite it.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<Vec<FeedPrice>, OracleError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| OracleError::ConnectionFailed { source: Box::new(e) })?;
        serde_json::from_str(&content).map_err(|e| OracleError::ConnectionFailed { source: Box::new(e) })
    }
}

#[async_trait]
impl PriceFeed for JsonFileFeed {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self, asset: &AssetId) -> Result<FeedPrice, OracleError> {
        self.load()
            .await?
            .into_iter()
            .filter(|p| &p.asset == asset)
            .max_by_key(|p| p.source_timestamp)
            .ok_or_else(|| OracleError::PriceNotFound {
                asset: asset.clone(),
            })
    }

    async fn fetch_many(&self, assets: &[AssetId]) -> Vec<Result<FeedPrice, OracleError>> {
        let all = match self.load().await {
            Ok(all) => all,
            Err(e) => {
                let reason = e.to_string();
                return assets
                    .iter()
                    .map(|_| {
                        Err(OracleError::ConnectionFailed {
                            source: reason.clone().into(),
                        })
                    })
                    .collect();
            }
        };

        assets
            .iter()
            .map(|asset| {
                all.iter()
                    .filter(|p| &p.asset == asset)
                    .max_by_key(|p| p.source_timestamp)
                    .cloned()
                    .ok_or_else(|| OracleError::PriceNotFound {
                        asset: asset.clone(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn asset(code: &str) -> AssetId {
        code.parse().unwrap()
    }

    #[tokio::test]
    async fn test_static_feed_set_and_remove() {
        let feed = StaticFeed::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(feed.fetch(&asset("PUNKS")).await.is_err());

        feed.set_price(asset("PUNKS"), 100, at);
        let price = feed.fetch(&asset("PUNKS")).await.unwrap();
        assert_eq!(price.value, 100);

        feed.remove_price(&asset("PUNKS"));
        let result = feed.fetch(&asset("PUNKS")).await;
        assert!(matches!(result, Err(OracleError::PriceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_json_file_feed_picks_latest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"asset":"PUNKS","value":100,"source_timestamp":"2025-01-01T00:00:00Z"}},
                {{"asset":"PUNKS","value":105,"source_timestamp":"2025-01-01T00:01:00Z"}},
                {{"asset":"APES","value":7,"source_timestamp":"2025-01-01T00:00:30Z"}}
            ]"#
        )
        .unwrap();

        let feed = JsonFileFeed::new(file.path());
        let prices = feed.fetch_many(&[asset("PUNKS"), asset("APES"), asset("CATS")]).await;

        assert_eq!(prices[0].as_ref().unwrap().value, 105);
        assert_eq!(prices[1].as_ref().unwrap().value, 7);
        assert!(matches!(prices[2], Err(OracleError::PriceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_json_file_feed_missing_file() {
        let feed = JsonFileFeed::new("/nonexistent/prices.json");
        let result = feed.fetch(&asset("PUNKS")).await;
        assert!(matches!(result, Err(OracleError::ConnectionFailed { .. })));
    }
}
