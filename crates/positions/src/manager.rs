//! Position manager

use chrono::{DateTime, Utc};
use lendkit_core::math::checked_add;
use lendkit_core::{AccessControl, Caller, ItemId, MathError, PositionId, Role};
use lendkit_oracle::{PriceOracle, PriceSnapshot};
use lendkit_reserve::{RepayOutcome, ReserveAccountant};
use lendkit_vault::CollateralVault;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PositionError;
use crate::params::RiskParams;
use crate::position::{Health, Position, Valuation};

/// Persisted position table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionBook {
    pub positions: BTreeMap<PositionId, Position>,
    /// Next id to hand out; ids are never reused
    pub next_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowOutcome {
    pub scaled: u128,
    /// Total debt of the position after the borrow
    pub debt: u128,
    pub valuation: Valuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub item: ItemId,
    /// Absent when the position carried no debt and no prices were needed
    pub valuation: Option<Valuation>,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepayReceipt {
    pub outcome: RepayOutcome,
    pub debt_remaining: u128,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    params: RiskParams,
    book: PositionBook,
    /// Item -> owning position, derived from the book
    owners: BTreeMap<ItemId, PositionId>,
}

impl PositionManager {
    pub fn new(params: RiskParams) -> Result<Self, PositionError> {
        Self::from_book(params, PositionBook::default())
    }

    /// Restore from a persisted book; rejects an item claimed twice
    pub fn from_book(params: RiskParams, book: PositionBook) -> Result<Self, PositionError> {
        params.validate()?;
        let mut owners = BTreeMap::new();
        for position in book.positions.values() {
            for item in &position.items {
                if owners.insert(item.clone(), position.id).is_some() {
                    return Err(PositionError::AlreadyOwned(item.clone()));
                }
            }
        }
        Ok(Self {
            params,
            book,
            owners,
        })
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.book.positions.get(&id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.book.positions.values()
    }

    pub fn owner_of(&self, item: &ItemId) -> Option<PositionId> {
        self.owners.get(item).copied()
    }

    /// Replace risk parameters (governor only)
    ///
    /// Open liquidation tickets keep the threshold they captured.
    pub fn set_params(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        params: RiskParams,
    ) -> Result<(), PositionError> {
        access.require(caller, Role::Governor)?;
        params.validate()?;
        tracing::info!(
            max_ltv = %params.max_ltv,
            liquidation_threshold = %params.liquidation_threshold,
            "Risk params updated"
        );
        self.params = params;
        Ok(())
    }

    fn get(&self, id: PositionId) -> Result<&Position, PositionError> {
        self.book
            .positions
            .get(&id)
            .ok_or(PositionError::PositionNotFound(id))
    }

    fn owned_by(&self, caller: &Caller, id: PositionId) -> Result<&Position, PositionError> {
        let position = self.get(id)?;
        if !caller.is(&position.owner) {
            return Err(PositionError::NotOwner {
                position: id,
                caller: caller.principal().clone(),
            });
        }
        Ok(position)
    }

    fn ensure_unowned(&self, item: &ItemId, vault: &CollateralVault) -> Result<(), PositionError> {
        if self.owners.contains_key(item) || vault.holds(item) {
            return Err(PositionError::AlreadyOwned(item.clone()));
        }
        Ok(())
    }

    /// Create a position holding `item`
    pub fn open_position(
        &mut self,
        caller: &Caller,
        item: ItemId,
        vault: &CollateralVault,
    ) -> Result<PositionId, PositionError> {
        self.ensure_unowned(&item, vault)?;

        let id = PositionId(self.book.next_id);
        self.book.next_id = self
            .book
            .next_id
            .checked_add(1)
            .ok_or(MathError::Overflow)?;

        let position = Position::new(id, caller.principal().clone(), item.clone());
        self.owners.insert(item.clone(), id);
        self.book.positions.insert(id, position);

        tracing::info!(position = %id, owner = %caller.principal(), item = %item, "Position opened");
        Ok(id)
    }

    /// Add an item to an existing position
    pub fn deposit_collateral(
        &mut self,
        caller: &Caller,
        id: PositionId,
        item: ItemId,
        vault: &CollateralVault,
    ) -> Result<(), PositionError> {
        self.owned_by(caller, id)?;
        self.ensure_unowned(&item, vault)?;

        if let Some(position) = self.book.positions.get_mut(&id) {
            position.items.insert(item.clone());
        }
        self.owners.insert(item.clone(), id);

        tracing::info!(position = %id, item = %item, "Collateral deposited");
        Ok(())
    }

    /// Return an item to the owner if the rest still covers the debt
    pub fn withdraw_collateral(
        &mut self,
        caller: &Caller,
        id: PositionId,
        item: &ItemId,
        reserve: &mut ReserveAccountant,
        oracle: &PriceOracle,
        now: DateTime<Utc>,
    ) -> Result<WithdrawOutcome, PositionError> {
        let position = self.owned_by(caller, id)?;
        if position.liquidation_flag {
            return Err(PositionError::PositionLocked(id));
        }
        if !position.items.contains(item) {
            return Err(PositionError::ItemNotInPosition {
                position: id,
                item: item.clone(),
            });
        }

        let mut staged = reserve.clone();
        staged.accrue(now)?;
        let debt = staged.debt_of(position.scaled_debt)?;

        let mut remaining = position.items.clone();
        remaining.remove(item);

        let valuation = if debt == 0 {
            None
        } else {
            let assets = remaining.iter().map(|i| i.asset.clone()).collect::<Vec<_>>();
            let snapshot = oracle.snapshot(&assets, now)?;
            let valuation = Valuation {
                price_version: snapshot.version,
                collateral_value: Valuation::collateral_value(&remaining, &snapshot)?,
                debt,
                usage_index: staged.usage_index(),
            };
            let required = self.params.required_collateral(debt)?;
            if valuation.collateral_value < required {
                tracing::warn!(
                    position = %id,
                    item = %item,
                    collateral = valuation.collateral_value,
                    required,
                    price_version = valuation.price_version,
                    "Withdraw rejected: undercollateralized"
                );
                return Err(PositionError::Undercollateralized {
                    position: id,
                    collateral_value: valuation.collateral_value,
                    debt,
                    limit: required,
                });
            }
            Some(valuation)
        };

        *reserve = staged;
        self.owners.remove(item);
        let closed = self.update(id, |position| {
            position.items.remove(item);
        });

        tracing::info!(position = %id, item = %item, closed, "Collateral withdrawn");
        Ok(WithdrawOutcome {
            item: item.clone(),
            valuation,
            closed,
        })
    }

    /// Borrow against the position's collateral
    pub fn borrow(
        &mut self,
        caller: &Caller,
        id: PositionId,
        amount: u128,
        reserve: &mut ReserveAccountant,
        oracle: &PriceOracle,
        now: DateTime<Utc>,
    ) -> Result<BorrowOutcome, PositionError> {
        let position = self.owned_by(caller, id)?;
        if position.liquidation_flag {
            return Err(PositionError::PositionLocked(id));
        }

        let snapshot = oracle.snapshot(&position.assets(), now)?;
        let collateral_value = Valuation::collateral_value(&position.items, &snapshot)?;

        let mut staged = reserve.clone();
        let scaled = staged.borrow(position.scaled_debt, amount, now)?;
        let new_scaled = checked_add(position.scaled_debt, scaled)?;
        let debt = staged.debt_of(new_scaled)?;
        let limit = self.params.borrow_limit(collateral_value)?;

        if debt > limit {
            tracing::warn!(
                position = %id,
                amount,
                debt,
                limit,
                price_version = snapshot.version,
                "Borrow rejected: undercollateralized"
            );
            return Err(PositionError::Undercollateralized {
                position: id,
                collateral_value,
                debt,
                limit,
            });
        }

        let valuation = Valuation {
            price_version: snapshot.version,
            collateral_value,
            debt,
            usage_index: staged.usage_index(),
        };
        *reserve = staged;
        self.update(id, |position| position.scaled_debt = new_scaled);

        tracing::info!(position = %id, amount, debt, price_version = snapshot.version, "Borrowed");
        Ok(BorrowOutcome {
            scaled,
            debt,
            valuation,
        })
    }

    /// Repay debt; allowed while a liquidation ticket is open
    pub fn repay(
        &mut self,
        caller: &Caller,
        id: PositionId,
        amount: u128,
        reserve: &mut ReserveAccountant,
        now: DateTime<Utc>,
    ) -> Result<RepayReceipt, PositionError> {
        let position = self.owned_by(caller, id)?;
        if position.scaled_debt == 0 {
            return Err(PositionError::NothingToRepay(id));
        }
        let outstanding = position.scaled_debt;

        let outcome = reserve.repay(outstanding, amount, now)?;
        let remaining = outstanding - outcome.scaled_burned;
        let debt_remaining = reserve.debt_of(remaining)?;
        let closed = self.update(id, |position| position.scaled_debt = remaining);

        tracing::info!(
            position = %id,
            paid = outcome.paid,
            refund = outcome.refund,
            debt_remaining,
            "Repaid"
        );
        Ok(RepayReceipt {
            outcome,
            debt_remaining,
            closed,
        })
    }

    /// Value a position under one snapshot and an already accrued reserve
    pub fn valuation(
        &self,
        id: PositionId,
        reserve: &ReserveAccountant,
        snapshot: &PriceSnapshot,
    ) -> Result<Valuation, PositionError> {
        let position = self.get(id)?;
        Ok(Valuation {
            price_version: snapshot.version,
            collateral_value: Valuation::collateral_value(&position.items, snapshot)?,
            debt: reserve.debt_of(position.scaled_debt)?,
            usage_index: reserve.usage_index(),
        })
    }

    /// Read-only risk report; interest is projected to `now` without writing
    pub fn health(
        &self,
        id: PositionId,
        reserve: &ReserveAccountant,
        oracle: &PriceOracle,
        now: DateTime<Utc>,
    ) -> Result<Health, PositionError> {
        let position = self.get(id)?;
        let mut projected = reserve.clone();
        projected.accrue(now)?;
        let snapshot = oracle.snapshot(&position.assets(), now)?;
        let valuation = self.valuation(id, &projected, &snapshot)?;
        let required_collateral = self.params.required_collateral(valuation.debt)?;

        Ok(Health {
            valuation,
            borrow_limit: self.params.borrow_limit(valuation.collateral_value)?,
            required_collateral,
            liquidatable: valuation.debt > 0 && valuation.collateral_value < required_collateral,
        })
    }

    /// Mark or clear an open liquidation on a position
    pub fn set_liquidation_flag(&mut self, id: PositionId, flag: bool) -> Result<(), PositionError> {
        let position = self
            .book
            .positions
            .get_mut(&id)
            .ok_or(PositionError::PositionNotFound(id))?;
        position.liquidation_flag = flag;
        Ok(())
    }

    /// Remove a position and release its items from the book
    ///
    /// Used when a liquidation commits: the items move to the vault and the
    /// debt is written off by the caller.
    pub fn seize(&mut self, id: PositionId) -> Result<Position, PositionError> {
        let position = self
            .book
            .positions
            .remove(&id)
            .ok_or(PositionError::PositionNotFound(id))?;
        for item in &position.items {
            self.owners.remove(item);
        }
        tracing::info!(position = %id, items = position.items.len(), "Position seized");
        Ok(position)
    }

    /// Apply `change` and drop the position if it ends up empty
    fn update(&mut self, id: PositionId, change: impl FnOnce(&mut Position)) -> bool {
        let Some(position) = self.book.positions.get_mut(&id) else {
            return false;
        };
        change(position);
        if position.is_closed() {
            self.book.positions.remove(&id);
            tracing::info!(position = %id, "Position closed");
            return true;
        }
        false
    }
}
