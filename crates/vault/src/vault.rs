//! Collateral vault
//!
//! Liquidity providers deposit the borrowable asset and receive shares; the
//! deposited funds become reserve liquidity. The vault is also the custodian
//! of collateral items seized in liquidations.

use chrono::{DateTime, Utc};
use lendkit_core::{AccessControl, Caller, ItemId, MathError, Principal, Role};
use lendkit_reserve::ReserveAccountant;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::VaultError;
use crate::ledger::ShareLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Smallest deposit accepted while the vault has no shares outstanding
    #[serde(default = "default_min_first_deposit")]
    pub min_first_deposit: u128,
}

fn default_min_first_deposit() -> u128 {
    1_000
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            min_first_deposit: default_min_first_deposit(),
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.min_first_deposit == 0 {
            return Err(VaultError::InvalidConfig(
                "min_first_deposit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persisted vault record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub ledger: ShareLedger,
    pub holders: BTreeMap<Principal, u128>,
    /// Seized collateral items held by the vault
    pub custody: BTreeSet<ItemId>,
}

/// Pool overview combining the share ledger with reserve figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolView {
    pub total_deposited: u128,
    pub total_shares: u128,
    pub available_liquidity: u128,
    /// Debt owed to the pool by borrowers
    pub receivable: u128,
    pub items_held: usize,
}

#[derive(Debug, Clone)]
pub struct CollateralVault {
    config: VaultConfig,
    state: VaultState,
}

impl CollateralVault {
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        Self::from_state(config, VaultState::default())
    }

    pub fn from_state(config: VaultConfig, state: VaultState) -> Result<Self, VaultError> {
        config.validate()?;
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn ledger(&self) -> &ShareLedger {
        &self.state.ledger
    }

    pub fn shares_of(&self, holder: &Principal) -> u128 {
        self.state.holders.get(holder).copied().unwrap_or(0)
    }

    pub fn holds(&self, item: &ItemId) -> bool {
        self.state.custody.contains(item)
    }

    pub fn custody(&self) -> impl Iterator<Item = &ItemId> {
        self.state.custody.iter()
    }

    pub fn pool_view(&self, reserve: &ReserveAccountant) -> PoolView {
        PoolView {
            total_deposited: self.state.ledger.total_deposited,
            total_shares: self.state.ledger.total_shares,
            available_liquidity: reserve.total_liquidity(),
            receivable: reserve.total_debt(),
            items_held: self.state.custody.len(),
        }
    }

    /// Deposit `amount` for the caller; returns shares minted
    pub fn deposit(
        &mut self,
        caller: &Caller,
        amount: u128,
        reserve: &mut ReserveAccountant,
        now: DateTime<Utc>,
    ) -> Result<u128, VaultError> {
        let ledger = &self.state.ledger;
        if ledger.is_empty() && amount < self.config.min_first_deposit {
            return Err(VaultError::BelowMinimumDeposit {
                amount,
                minimum: self.config.min_first_deposit,
            });
        }

        let (next_ledger, minted) = ledger.deposited(amount)?;
        let holder = caller.principal().clone();
        let balance = self
            .shares_of(&holder)
            .checked_add(minted)
            .ok_or(MathError::Overflow)?;

        // Last fallible step before commit
        reserve.supply(amount, now)?;

        self.state.ledger = next_ledger;
        self.state.holders.insert(holder.clone(), balance);

        tracing::info!(holder = %holder, amount, minted, "Vault deposit");
        Ok(minted)
    }

    /// Redeem `shares` of the caller; returns assets paid out
    pub fn withdraw(
        &mut self,
        caller: &Caller,
        shares: u128,
        reserve: &mut ReserveAccountant,
        now: DateTime<Utc>,
    ) -> Result<u128, VaultError> {
        let holder = caller.principal().clone();
        let available = self.shares_of(&holder);
        if shares > available {
            return Err(VaultError::InsufficientShares {
                holder,
                available,
                requested: shares,
            });
        }

        let (next_ledger, assets) = self.state.ledger.redeemed(shares)?;
        if assets > reserve.total_liquidity() {
            tracing::warn!(holder = %holder, assets, "Vault withdraw exceeds pool liquidity");
            return Err(VaultError::InsufficientLiquidity {
                available: reserve.total_liquidity(),
                requested: assets,
            });
        }

        reserve.withdraw_liquidity(assets, now)?;

        self.state.ledger = next_ledger;
        let remaining = available - shares;
        if remaining == 0 {
            self.state.holders.remove(&holder);
        } else {
            self.state.holders.insert(holder.clone(), remaining);
        }

        tracing::info!(holder = %holder, shares, assets, "Vault withdraw");
        Ok(assets)
    }

    /// Take seized items into custody
    ///
    /// All-or-nothing: if any item is already held, nothing is taken.
    pub fn take_custody(&mut self, items: &BTreeSet<ItemId>) -> Result<(), VaultError> {
        if let Some(held) = items.iter().find(|item| self.holds(item)) {
            return Err(VaultError::AlreadyOwned(held.clone()));
        }
        self.state.custody.extend(items.iter().cloned());
        tracing::info!(items = items.len(), "Vault took custody of seized items");
        Ok(())
    }

    /// Release a held item out of the engine (governor only)
    pub fn release_item(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        item: &ItemId,
    ) -> Result<(), VaultError> {
        access.require(caller, Role::Governor)?;
        if !self.state.custody.remove(item) {
            return Err(VaultError::ItemNotHeld(item.clone()));
        }
        tracing::info!(item = %item, by = %caller.principal(), "Vault released item");
        Ok(())
    }

    pub fn set_config(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        config: VaultConfig,
    ) -> Result<(), VaultError> {
        access.require(caller, Role::Governor)?;
        config.validate()?;
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::VIRTUAL_SHARES;
    use chrono::TimeZone;
    use lendkit_core::RoleTable;
    use lendkit_reserve::{ReserveConfig, ReserveError};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn caller(name: &str) -> Caller {
        Caller::new(Principal::new(name).unwrap())
    }

    fn item(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn setup() -> (CollateralVault, ReserveAccountant) {
        let vault = CollateralVault::new(VaultConfig::default()).unwrap();
        let reserve =
            ReserveAccountant::new("USDC".parse().unwrap(), &ReserveConfig::default(), t0()).unwrap();
        (vault, reserve)
    }

    #[test]
    fn test_deposit_supplies_reserve() {
        let (mut vault, mut reserve) = setup();
        let minted = vault.deposit(&caller("alice"), 5_000, &mut reserve, t0()).unwrap();

        assert_eq!(vault.shares_of(&Principal::new("alice").unwrap()), minted);
        assert_eq!(vault.ledger().total_deposited, 5_000);
        assert_eq!(reserve.total_liquidity(), 5_000);
    }

    #[test]
    fn test_first_deposit_floor() {
        let (mut vault, mut reserve) = setup();
        let result = vault.deposit(&caller("alice"), 999, &mut reserve, t0());
        assert_eq!(
            result,
            Err(VaultError::BelowMinimumDeposit {
                amount: 999,
                minimum: 1_000
            })
        );
        assert_eq!(reserve.total_liquidity(), 0);

        vault.deposit(&caller("alice"), 1_000, &mut reserve, t0()).unwrap();
        // Later deposits are not subject to the floor
        assert!(vault.deposit(&caller("bob"), 1, &mut reserve, t0()).is_ok());
    }

    #[test]
    fn test_withdraw_checks_holder_balance() {
        let (mut vault, mut reserve) = setup();
        let minted = vault.deposit(&caller("alice"), 5_000, &mut reserve, t0()).unwrap();

        let result = vault.withdraw(&caller("bob"), 1, &mut reserve, t0());
        assert!(matches!(result, Err(VaultError::InsufficientShares { .. })));

        let assets = vault.withdraw(&caller("alice"), minted, &mut reserve, t0()).unwrap();
        assert!(assets <= 5_000);
        assert_eq!(vault.shares_of(&Principal::new("alice").unwrap()), 0);
        assert!(vault.state().holders.is_empty());
    }

    #[test]
    fn test_withdraw_bounded_by_liquidity() {
        let (mut vault, mut reserve) = setup();
        let minted = vault.deposit(&caller("alice"), 5_000, &mut reserve, t0()).unwrap();
        reserve.borrow(0, 4_000, t0()).unwrap();

        let before = vault.state().clone();
        let result = vault.withdraw(&caller("alice"), minted, &mut reserve, t0());
        assert!(matches!(result, Err(VaultError::InsufficientLiquidity { .. })));
        assert_eq!(vault.state(), &before);
        assert_eq!(reserve.total_liquidity(), 1_000);
    }

    #[test]
    fn test_custody_and_release() {
        let roles = RoleTable::new().with(Principal::new("gov").unwrap(), Role::Governor);
        let (mut vault, _) = setup();
        let items: BTreeSet<ItemId> = [item("PUNKS#1"), item("PUNKS#2")].into_iter().collect();

        vault.take_custody(&items).unwrap();
        assert!(vault.holds(&item("PUNKS#1")));

        let again: BTreeSet<ItemId> = [item("PUNKS#3"), item("PUNKS#2")].into_iter().collect();
        assert_eq!(
            vault.take_custody(&again),
            Err(VaultError::AlreadyOwned(item("PUNKS#2")))
        );
        assert!(!vault.holds(&item("PUNKS#3")));

        assert!(matches!(
            vault.release_item(&roles, &caller("alice"), &item("PUNKS#1")),
            Err(VaultError::Unauthorized(_))
        ));
        vault.release_item(&roles, &caller("gov"), &item("PUNKS#1")).unwrap();
        assert!(!vault.holds(&item("PUNKS#1")));
        assert_eq!(
            vault.release_item(&roles, &caller("gov"), &item("PUNKS#1")),
            Err(VaultError::ItemNotHeld(item("PUNKS#1")))
        );
    }

    #[test]
    fn test_reserve_failure_leaves_vault_untouched() {
        let (mut vault, mut reserve) = setup();
        vault
            .deposit(&caller("alice"), u128::MAX / VIRTUAL_SHARES, &mut reserve, t0())
            .unwrap();
        let before = vault.state().clone();

        let result = vault.deposit(&caller("bob"), u128::MAX - 10, &mut reserve, t0());
        assert!(matches!(
            result,
            Err(VaultError::ArithmeticOverflow(_))
                | Err(VaultError::Reserve(ReserveError::ArithmeticOverflow(_)))
        ));
        assert_eq!(vault.state(), &before);
    }
}
