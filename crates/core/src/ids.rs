//! Identifiers - Stable keys for every record in the engine
//!
//! Integer ids (`PositionId`, `TicketId`) are allocated monotonically by the
//! owning component and never handed out twice. `AssetId` and `ItemId` are
//! content-derived and validated on construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of an asset code
const MAX_ASSET_LEN: usize = 16;

/// Errors that can occur when parsing identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Empty asset code")]
    EmptyAsset,

    #[error("Asset code too long (max 16 chars): {0}")]
    AssetTooLong(String),

    #[error("Invalid asset code format: {0}")]
    InvalidAsset(String),

    #[error("Invalid item id (expected ASSET#SERIAL): {0}")]
    InvalidItem(String),

    #[error("Empty principal")]
    EmptyPrincipal,
}

/// Asset code, e.g. `USDC` or `PUNKS`
///
/// Codes are trimmed and uppercased; only ASCII alphanumerics, `-` and `_`
/// are accepted.
///
/// # Example
/// ```
/// use lendkit_core::AssetId;
///
/// let asset: AssetId = "punks".parse().unwrap();
/// assert_eq!(asset.as_str(), "PUNKS");
/// assert!("".parse::<AssetId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    pub fn new(code: impl AsRef<str>) -> Result<Self, IdError> {
        code.as_ref().parse()
    }

    /// Default borrowable asset
    pub fn usdc() -> Self {
        Self("USDC".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AssetId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if s.is_empty() {
            return Err(IdError::EmptyAsset);
        }

        if s.len() > MAX_ASSET_LEN {
            return Err(IdError::AssetTooLong(s));
        }

        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IdError::InvalidAsset(s));
        }

        Ok(Self(s))
    }
}

impl TryFrom<String> for AssetId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AssetId> for String {
    fn from(asset: AssetId) -> Self {
        asset.0
    }
}

/// A discrete collateral item: one unit of a priced asset collection
///
/// Rendered as `ASSET#SERIAL`, which is also its serialized form so it can
/// key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    pub asset: AssetId,
    pub serial: u64,
}

impl ItemId {
    pub fn new(asset: AssetId, serial: u64) -> Self {
        Self { asset, serial }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.asset, self.serial)
    }
}

impl FromStr for ItemId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (asset, serial) = s
            .split_once('#')
            .ok_or_else(|| IdError::InvalidItem(s.to_string()))?;
        let serial = serial
            .trim()
            .parse()
            .map_err(|_| IdError::InvalidItem(s.to_string()))?;
        Ok(Self {
            asset: asset.parse()?,
            serial,
        })
    }
}

impl TryFrom<String> for ItemId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ItemId> for String {
    fn from(item: ItemId) -> Self {
        item.to_string()
    }
}

/// Identity of an actor (borrower, liquidity provider, feeder, governor)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl AsRef<str>) -> Result<Self, IdError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(IdError::EmptyPrincipal);
        }
        Ok(Self(name.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

/// Position arena key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POS-{}", self.0)
    }
}

/// Liquidation ticket arena key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TKT-{}", self.0)
    }
}
