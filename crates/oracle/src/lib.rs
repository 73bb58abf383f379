//! Lendkit Price Oracle
//!
//! Accepts prices from authorized feeders, bounds single-update deviation,
//! and serves quotes only inside a freshness window: a quote must be at
//! least `min_price_age` old (never consumed in the window it was accepted
//! in) and at most `max_age` old.

mod error;
mod feed;
mod oracle;
mod relay;
mod types;

pub use error::OracleError;
pub use feed::{FeedPrice, JsonFileFeed, PriceFeed, StaticFeed};
pub use oracle::{OracleState, PriceOracle};
pub use relay::{FeedRelay, RelayReport};
pub use types::{OracleConfig, PriceQuote, PriceSnapshot};
