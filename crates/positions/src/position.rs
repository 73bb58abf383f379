//! Position record and valuation

use lendkit_core::math::checked_add;
use lendkit_core::{AssetId, ItemId, PositionId, Principal};
use lendkit_oracle::{OracleError, PriceSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::PositionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: Principal,
    pub items: BTreeSet<ItemId>,
    /// Real debt is `scaled_debt * usage_index`
    pub scaled_debt: u128,
    /// Set while a liquidation ticket is open on this position
    pub liquidation_flag: bool,
}

impl Position {
    pub fn new(id: PositionId, owner: Principal, first_item: ItemId) -> Self {
        Self {
            id,
            owner,
            items: BTreeSet::from([first_item]),
            scaled_debt: 0,
            liquidation_flag: false,
        }
    }

    /// Distinct collateral assets, for snapshot reads
    pub fn assets(&self) -> BTreeSet<AssetId> {
        self.items.iter().map(|item| item.asset.clone()).collect()
    }

    /// Empty positions are removed from the book
    pub fn is_closed(&self) -> bool {
        self.items.is_empty() && self.scaled_debt == 0
    }
}

/// Collateral and debt of one position, priced under a single oracle version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    /// Oracle version of the snapshot used
    pub price_version: u64,
    pub collateral_value: u128,
    pub debt: u128,
    pub usage_index: u128,
}

impl Valuation {
    /// Sum item prices from one snapshot
    pub fn collateral_value<'a>(
        items: impl IntoIterator<Item = &'a ItemId>,
        snapshot: &PriceSnapshot,
    ) -> Result<u128, PositionError> {
        items.into_iter().try_fold(0u128, |total, item| {
            let price = snapshot
                .value_of(&item.asset)
                .ok_or_else(|| OracleError::PriceNotFound {
                    asset: item.asset.clone(),
                })?;
            Ok(checked_add(total, price)?)
        })
    }
}

/// Read-only risk report for a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub valuation: Valuation,
    /// Largest total debt allowed for new borrowing
    pub borrow_limit: u128,
    /// Collateral needed to stay clear of liquidation
    pub required_collateral: u128,
    pub liquidatable: bool,
}
