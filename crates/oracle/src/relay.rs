//! Feed relay - moves prices from a `PriceFeed` into the oracle

use lendkit_core::AssetId;
use std::fmt::Display;

use crate::feed::{FeedPrice, PriceFeed};

/// Outcome of one relay round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub accepted: Vec<AssetId>,
    pub rejected: Vec<(AssetId, String)>,
    pub unavailable: Vec<(AssetId, String)>,
}

impl RelayReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.unavailable.is_empty()
    }
}

/// Polls a feed for a fixed asset list
pub struct FeedRelay<F: PriceFeed> {
    feed: F,
    assets: Vec<AssetId>,
}

impl<F: PriceFeed> FeedRelay<F> {
    pub fn new(feed: F, assets: Vec<AssetId>) -> Self {
        Self { feed, assets }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    /// Fetch every tracked asset; failures are logged and reported
    pub async fn poll(&self) -> (Vec<FeedPrice>, Vec<(AssetId, String)>) {
        let mut prices = Vec::new();
        let mut unavailable = Vec::new();

        for (asset, result) in self
            .assets
            .iter()
            .zip(self.feed.fetch_many(&self.assets).await)
        {
            match result {
                Ok(price) => prices.push(price),
                Err(e) => {
                    tracing::warn!(feed = self.feed.name(), asset = %asset, error = %e, "Feed fetch failed");
                    unavailable.push((asset.clone(), e.to_string()));
                }
            }
        }

        (prices, unavailable)
    }

    /// Poll the feed, then hand each price to `submit` synchronously
    ///
    /// `submit` is the authorized ingress path (usually the market facade
    /// acting as a feeder). One rejected price does not stop the others.
    pub async fn run_once<E, S>(&self, mut submit: S) -> RelayReport
    where
        E: Display,
        S: FnMut(&FeedPrice) -> Result<(), E>,
    {
        let (prices, unavailable) = self.poll().await;
        let mut report = RelayReport {
            unavailable,
            ..Default::default()
        };

        for price in &prices {
            match submit(price) {
                Ok(()) => report.accepted.push(price.asset.clone()),
                Err(e) => {
                    tracing::warn!(asset = %price.asset, error = %e, "Relayed price rejected");
                    report.rejected.push((price.asset.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            feed = self.feed.name(),
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            unavailable = report.unavailable.len(),
            "Relay round complete"
        );
        report
    }
}
