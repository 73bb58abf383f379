//! Oracle error types

use chrono::{DateTime, Utc};
use lendkit_core::{AccessDenied, AssetId, MathError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Oracle-related errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AccessDenied),

    /// No quote has ever been accepted for the asset
    #[error("Price not found: {asset}")]
    PriceNotFound { asset: AssetId },

    /// Quote is older than the consumer's maximum age
    #[error("Stale price for {asset}: age {age_secs}s exceeds max {max_age_secs}s")]
    StalePrice {
        asset: AssetId,
        age_secs: i64,
        max_age_secs: i64,
    },

    /// Quote was accepted too recently to be consumed
    #[error("Price for {asset} too fresh: age {age_secs}s below minimum {min_age_secs}s")]
    PriceTooFresh {
        asset: AssetId,
        age_secs: i64,
        min_age_secs: i64,
    },

    /// Relative move against the last accepted value is above the cap
    #[error("Deviation too large for {asset}: {previous} -> {submitted} exceeds {max_deviation}")]
    DeviationExceeded {
        asset: AssetId,
        previous: u128,
        submitted: u128,
        max_deviation: Decimal,
    },

    #[error("Invalid price for {asset}: {reason}")]
    InvalidPrice { asset: AssetId, reason: String },

    #[error("Out-of-order source timestamp for {asset}: {submitted} is before {previous}")]
    OutOfOrder {
        asset: AssetId,
        previous: DateTime<Utc>,
        submitted: DateTime<Utc>,
    },

    #[error("Invalid oracle config: {0}")]
    InvalidConfig(String),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(#[from] MathError),

    /// External feed could not be reached or parsed
    #[error("Feed connection failed: {source}")]
    ConnectionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
