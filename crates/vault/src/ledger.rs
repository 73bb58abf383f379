//! Vault share ledger
//!
//! ```text
//! mint   = floor(amount * (totalShares + VIRTUAL_SHARES) / (totalDeposited + VIRTUAL_ASSETS))
//! redeem = floor(shares * (totalDeposited + VIRTUAL_ASSETS) / (totalShares + VIRTUAL_SHARES))
//! ```
//!
//! Both directions round toward the vault.

use lendkit_core::math::{checked_add, checked_sub, mul_div_floor, ray_to_decimal};
use lendkit_core::{MathError, RAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Virtual share supply added to every rate computation
pub const VIRTUAL_SHARES: u128 = 1_000_000;

/// Virtual asset balance added to every rate computation
pub const VIRTUAL_ASSETS: u128 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    pub total_deposited: u128,
    pub total_shares: u128,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.total_shares == 0
    }

    /// Shares minted for `amount` at the current rate
    pub fn preview_mint(&self, amount: u128) -> Result<u128, MathError> {
        mul_div_floor(
            amount,
            checked_add(self.total_shares, VIRTUAL_SHARES)?,
            checked_add(self.total_deposited, VIRTUAL_ASSETS)?,
        )
    }

    /// Assets returned for `shares` at the current rate
    pub fn preview_redeem(&self, shares: u128) -> Result<u128, MathError> {
        mul_div_floor(
            shares,
            checked_add(self.total_deposited, VIRTUAL_ASSETS)?,
            checked_add(self.total_shares, VIRTUAL_SHARES)?,
        )
    }

    /// Ledger after depositing `amount`, with the shares minted
    ///
    /// Rejected when the resulting totals could not carry the virtual offsets;
    /// every accepted ledger can still price a full redemption.
    pub fn deposited(&self, amount: u128) -> Result<(Self, u128), VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let minted = self.preview_mint(amount)?;
        if minted == 0 {
            return Err(VaultError::ZeroShares { amount });
        }
        let next = Self {
            total_deposited: checked_add(self.total_deposited, amount)?,
            total_shares: checked_add(self.total_shares, minted)?,
        };
        checked_add(next.total_shares, VIRTUAL_SHARES)?;
        checked_add(next.total_deposited, VIRTUAL_ASSETS)?;
        Ok((next, minted))
    }

    /// Ledger after redeeming `shares`, with the assets returned
    pub fn redeemed(&self, shares: u128) -> Result<(Self, u128), VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let assets = self.preview_redeem(shares)?;
        if assets == 0 {
            return Err(VaultError::ZeroRedeem { shares });
        }
        let next = Self {
            total_deposited: checked_sub(self.total_deposited, assets)?,
            total_shares: checked_sub(self.total_shares, shares)?,
        };
        Ok((next, assets))
    }

    /// Assets per share including the virtual offset (display only)
    pub fn exchange_rate(&self) -> Result<Decimal, MathError> {
        let rate = mul_div_floor(
            checked_add(self.total_deposited, VIRTUAL_ASSETS)?,
            RAY,
            checked_add(self.total_shares, VIRTUAL_SHARES)?,
        )?;
        Ok(ray_to_decimal(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_deposit_rate() {
        let ledger = ShareLedger::new();
        let (ledger, minted) = ledger.deposited(1_000).unwrap();
        assert_eq!(minted, 1_000 * VIRTUAL_SHARES);
        assert_eq!(ledger.total_deposited, 1_000);
        assert_eq!(ledger.total_shares, minted);
    }

    #[test]
    fn test_redeem_rounds_down() {
        let (ledger, minted) = ShareLedger::new().deposited(1_000).unwrap();
        let (after, assets) = ledger.redeemed(minted).unwrap();
        assert!(assets <= 1_000);
        assert_eq!(after.total_shares, 0);
        assert_eq!(after.total_deposited, 1_000 - assets);
    }

    #[test]
    fn test_zero_inputs_rejected() {
        let ledger = ShareLedger::new();
        assert_eq!(ledger.deposited(0), Err(VaultError::ZeroAmount));
        assert_eq!(ledger.redeemed(0), Err(VaultError::ZeroAmount));

        let (ledger, _) = ledger.deposited(1_000).unwrap();
        assert_eq!(ledger.redeemed(1), Err(VaultError::ZeroRedeem { shares: 1 }));
    }

    #[test]
    fn test_one_unit_then_large_deposit() {
        let (ledger, attacker) = ShareLedger::new().deposited(1).unwrap();
        let big = 1_000_000_000_000_000_000u128;
        let (ledger, victim) = ledger.deposited(big).unwrap();

        // The attacker redeems no more than they put in, the victim loses at most dust
        assert!(ledger.preview_redeem(attacker).unwrap() <= 1);
        assert!(ledger.preview_redeem(victim).unwrap() >= big - 1);
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        let cap = u128::MAX / VIRTUAL_SHARES;

        // Minting cap * VIRTUAL_SHARES leaves no room for the virtual supply
        assert!(matches!(
            ShareLedger::new().deposited(cap),
            Err(VaultError::ArithmeticOverflow(_))
        ));

        let (ledger, minted) = ShareLedger::new().deposited(cap - 1).unwrap();
        assert_eq!(ledger.preview_redeem(ledger.total_shares).unwrap(), cap - 1);
        let (after, assets) = ledger.redeemed(minted).unwrap();
        assert_eq!(assets, cap - 1);
        assert_eq!(after, ShareLedger::new());

        assert!(matches!(
            ledger.deposited(u128::MAX / 2),
            Err(VaultError::ArithmeticOverflow(_))
        ));
    }

    proptest! {
        /// 1 unit then N units: the first depositor redeems at most their deposit
        #[test]
        fn prop_inflation_bounded(first in 1u128..1_000, n in 1u128..1_000_000_000_000_000_000_000) {
            let (ledger, first_shares) = ShareLedger::new().deposited(first).unwrap();
            let (ledger, second_shares) = match ledger.deposited(n) {
                Ok(r) => r,
                Err(_) => return Ok(()),
            };
            let first_out = ledger.preview_redeem(first_shares).unwrap();
            let second_out = ledger.preview_redeem(second_shares).unwrap();
            prop_assert!(first_out <= first + 1);
            prop_assert!(second_out + 1 >= n);
        }

        /// No sequence of deposits and redemptions returns more than was put in
        #[test]
        fn prop_no_free_mint(
            ops in proptest::collection::vec((any::<bool>(), 1u128..1_000_000_000_000), 1..80)
        ) {
            let mut ledger = ShareLedger::new();
            let mut holders: Vec<u128> = Vec::new();
            let mut deposited = 0u128;
            let mut withdrawn = 0u128;

            for (i, (is_deposit, amount)) in ops.into_iter().enumerate() {
                if is_deposit || holders.iter().all(|s| *s == 0) {
                    if let Ok((next, minted)) = ledger.deposited(amount) {
                        ledger = next;
                        deposited += amount;
                        holders.push(minted);
                    }
                } else {
                    let idx = i % holders.len();
                    if holders[idx] == 0 {
                        continue;
                    }
                    let shares = (amount % holders[idx]).max(1);
                    if let Ok((next, assets)) = ledger.redeemed(shares) {
                        ledger = next;
                        withdrawn += assets;
                        holders[idx] -= shares;
                    }
                }
                prop_assert!(withdrawn <= deposited);
                prop_assert_eq!(ledger.total_deposited, deposited - withdrawn);
                prop_assert_eq!(ledger.total_shares, holders.iter().sum::<u128>());
            }
        }
    }
}
