//! Reserve accountant for one borrowable asset

use chrono::{DateTime, Duration, Utc};
use lendkit_core::math::{
    checked_add, checked_sub, mul_div_floor, ray_div_ceil, ray_div_floor, ray_mul_ceil,
    ray_mul_floor,
};
use lendkit_core::{AccessControl, AssetId, Caller, MathError, Role, RAY};
use serde::{Deserialize, Serialize};

use crate::error::ReserveError;
use crate::rate::{BorrowRateModel, ReserveConfig};

/// Persisted reserve record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    pub asset: AssetId,
    /// Liquidity available to borrow
    pub total_liquidity: u128,
    pub total_scaled_debt: u128,
    /// Tracked real debt owed to the pool (the receivable)
    pub total_debt: u128,
    /// Accrual multiplier in ray, starts at `RAY` and never decreases
    pub usage_index: u128,
    pub last_accrual_time: DateTime<Utc>,
    pub rate_model: BorrowRateModel,
}

/// Result of a repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepayOutcome {
    pub scaled_burned: u128,
    /// Amount actually applied to the debt
    pub paid: u128,
    /// Part of the offered amount above the outstanding debt
    pub refund: u128,
}

impl RepayOutcome {
    pub fn is_full(&self, outstanding_scaled: u128) -> bool {
        self.scaled_burned == outstanding_scaled
    }
}

#[derive(Debug, Clone)]
pub struct ReserveAccountant {
    state: ReserveState,
}

impl ReserveAccountant {
    pub fn new(asset: AssetId, config: &ReserveConfig, now: DateTime<Utc>) -> Result<Self, ReserveError> {
        config.validate()?;
        Ok(Self {
            state: ReserveState {
                asset,
                total_liquidity: 0,
                total_scaled_debt: 0,
                total_debt: 0,
                usage_index: RAY,
                last_accrual_time: now,
                rate_model: config.rate_model.clone(),
            },
        })
    }

    pub fn from_state(state: ReserveState) -> Result<Self, ReserveError> {
        state.rate_model.validate()?;
        if state.usage_index < RAY {
            return Err(ReserveError::InvalidConfig(format!(
                "usage_index {} below RAY",
                state.usage_index
            )));
        }
        Ok(Self { state })
    }

    pub fn state(&self) -> &ReserveState {
        &self.state
    }

    pub fn asset(&self) -> &AssetId {
        &self.state.asset
    }

    pub fn usage_index(&self) -> u128 {
        self.state.usage_index
    }

    pub fn total_liquidity(&self) -> u128 {
        self.state.total_liquidity
    }

    pub fn total_scaled_debt(&self) -> u128 {
        self.state.total_scaled_debt
    }

    pub fn total_debt(&self) -> u128 {
        self.state.total_debt
    }

    /// Share of pooled funds currently lent out, in ray
    pub fn utilization(&self) -> u128 {
        utilization_of(&self.state)
    }

    /// Real debt for a scaled balance at the current index (rounded up)
    pub fn debt_of(&self, scaled: u128) -> Result<u128, MathError> {
        ray_mul_ceil(scaled, self.state.usage_index)
    }

    /// Advance the usage index to `now`
    ///
    /// Returns the interest added to the receivable. Calling twice at the
    /// same instant changes nothing the second time.
    pub fn accrue(&mut self, now: DateTime<Utc>) -> Result<u128, ReserveError> {
        let next = accrued(&self.state, now)?;
        let interest = next.total_debt.saturating_sub(self.state.total_debt);
        if next.usage_index != self.state.usage_index {
            tracing::debug!(
                asset = %next.asset,
                index = next.usage_index,
                interest,
                "Reserve accrued"
            );
        }
        self.state = next;
        Ok(interest)
    }

    /// Lend `amount` to a borrower holding `outstanding_scaled`; returns the
    /// scaled debt created
    ///
    /// Mints the largest scaled amount whose debt stays within the prior debt
    /// plus `amount`, so a borrower never owes more than it received.
    pub fn borrow(
        &mut self,
        outstanding_scaled: u128,
        amount: u128,
        now: DateTime<Utc>,
    ) -> Result<u128, ReserveError> {
        if amount == 0 {
            return Err(ReserveError::ZeroAmount);
        }
        let mut next = accrued(&self.state, now)?;
        if amount > next.total_liquidity {
            return Err(ReserveError::InsufficientLiquidity {
                available: next.total_liquidity,
                requested: amount,
            });
        }

        let owed = checked_add(ray_mul_ceil(outstanding_scaled, next.usage_index)?, amount)?;
        let mut scaled = ray_div_ceil(amount, next.usage_index)?;
        let total = checked_add(outstanding_scaled, scaled)?;
        if ray_mul_ceil(total, next.usage_index)? > owed {
            scaled -= 1;
        }
        if scaled == 0 {
            return Err(ReserveError::AmountTooSmall { amount });
        }
        next.total_scaled_debt = checked_add(next.total_scaled_debt, scaled)?;
        next.total_debt = checked_add(next.total_debt, amount)?;
        next.total_liquidity -= amount;
        normalize(&mut next)?;

        self.state = next;
        tracing::info!(asset = %self.state.asset, amount, scaled, "Reserve borrow");
        Ok(scaled)
    }

    /// Repay against `outstanding_scaled` of one borrower
    ///
    /// Offering more than the outstanding debt retires it completely and the
    /// excess is reported as `refund`; nothing above the debt enters the pool.
    pub fn repay(
        &mut self,
        outstanding_scaled: u128,
        amount: u128,
        now: DateTime<Utc>,
    ) -> Result<RepayOutcome, ReserveError> {
        if amount == 0 {
            return Err(ReserveError::ZeroAmount);
        }
        let mut next = accrued(&self.state, now)?;
        if outstanding_scaled > next.total_scaled_debt {
            return Err(ReserveError::ExceedsOutstanding {
                outstanding: next.total_scaled_debt,
                requested: outstanding_scaled,
            });
        }

        let owed = ray_mul_ceil(outstanding_scaled, next.usage_index)?;
        let (scaled_burned, paid) = if amount >= owed {
            (outstanding_scaled, owed)
        } else {
            let burned = ray_div_floor(amount, next.usage_index)?;
            if burned == 0 {
                return Err(ReserveError::AmountTooSmall { amount });
            }
            (burned, amount)
        };

        next.total_scaled_debt -= scaled_burned;
        next.total_debt = next.total_debt.saturating_sub(paid);
        next.total_liquidity = checked_add(next.total_liquidity, paid)?;
        normalize(&mut next)?;

        self.state = next;
        let outcome = RepayOutcome {
            scaled_burned,
            paid,
            refund: amount - paid,
        };
        tracing::info!(
            asset = %self.state.asset,
            paid,
            scaled_burned,
            refund = outcome.refund,
            "Reserve repay"
        );
        Ok(outcome)
    }

    /// Write off debt settled by seized collateral
    ///
    /// Does not accrue: the caller has already checked that the index it
    /// priced the debt at is still current.
    pub fn burn(&mut self, scaled: u128, debt: u128) -> Result<(), ReserveError> {
        if scaled > self.state.total_scaled_debt {
            return Err(ReserveError::ExceedsOutstanding {
                outstanding: self.state.total_scaled_debt,
                requested: scaled,
            });
        }
        let mut next = self.state.clone();
        next.total_scaled_debt -= scaled;
        next.total_debt = checked_sub(next.total_debt, debt)?;
        normalize(&mut next)?;

        self.state = next;
        tracing::info!(asset = %self.state.asset, scaled, debt, "Reserve debt burned");
        Ok(())
    }

    /// Add lender funds to the pool
    pub fn supply(&mut self, amount: u128, now: DateTime<Utc>) -> Result<(), ReserveError> {
        if amount == 0 {
            return Err(ReserveError::ZeroAmount);
        }
        let mut next = accrued(&self.state, now)?;
        next.total_liquidity = checked_add(next.total_liquidity, amount)?;
        self.state = next;
        Ok(())
    }

    /// Take lender funds out of the pool
    pub fn withdraw_liquidity(&mut self, amount: u128, now: DateTime<Utc>) -> Result<(), ReserveError> {
        if amount == 0 {
            return Err(ReserveError::ZeroAmount);
        }
        let mut next = accrued(&self.state, now)?;
        if amount > next.total_liquidity {
            return Err(ReserveError::InsufficientLiquidity {
                available: next.total_liquidity,
                requested: amount,
            });
        }
        next.total_liquidity -= amount;
        self.state = next;
        Ok(())
    }

    /// Swap the rate model (governor only)
    ///
    /// Interest up to `now` is accrued at the old rate first.
    pub fn set_rate_model(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        model: BorrowRateModel,
        now: DateTime<Utc>,
    ) -> Result<(), ReserveError> {
        access.require(caller, Role::Governor)?;
        model.validate()?;
        let mut next = accrued(&self.state, now)?;
        next.rate_model = model;
        self.state = next;
        tracing::info!(asset = %self.state.asset, "Reserve rate model updated");
        Ok(())
    }
}

fn utilization_of(state: &ReserveState) -> u128 {
    let pooled = state.total_debt.saturating_add(state.total_liquidity);
    if pooled == 0 {
        return 0;
    }
    mul_div_floor(state.total_debt, RAY, pooled).unwrap_or(RAY)
}

/// State advanced to `now`; whole seconds only, the remainder carries over
fn accrued(state: &ReserveState, now: DateTime<Utc>) -> Result<ReserveState, ReserveError> {
    let mut next = state.clone();
    let elapsed = now.signed_duration_since(state.last_accrual_time).num_seconds();
    if elapsed > 0 {
        let rate = state.rate_model.rate_per_second(utilization_of(state))?;
        let growth = rate
            .checked_mul(elapsed as u128)
            .ok_or(MathError::Overflow)?;
        let factor = checked_add(RAY, growth)?;
        next.usage_index = ray_mul_floor(state.usage_index, factor)?;
        next.last_accrual_time = state.last_accrual_time + Duration::seconds(elapsed);
    }
    normalize(&mut next)?;
    Ok(next)
}

/// Keep the receivable at or above `ceil(scaled * index)`
fn normalize(state: &mut ReserveState) -> Result<(), MathError> {
    let floor = ray_mul_ceil(state.total_scaled_debt, state.usage_index)?;
    if state.total_debt < floor {
        state.total_debt = floor;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lendkit_core::{Principal, RoleTable};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn fixed(rate: rust_decimal::Decimal) -> ReserveConfig {
        ReserveConfig {
            rate_model: BorrowRateModel::Fixed { annual_rate: rate },
        }
    }

    fn reserve(rate: rust_decimal::Decimal) -> ReserveAccountant {
        ReserveAccountant::new("USDC".parse().unwrap(), &fixed(rate), t0()).unwrap()
    }

    /// `scaled * index` never exceeds the receivable by a rounding unit
    fn assert_debt_tracked(r: &ReserveAccountant) {
        let exact = ray_mul_floor(r.total_scaled_debt(), r.usage_index()).unwrap();
        assert!(exact <= r.total_debt() + 1, "{exact} > {} + 1", r.total_debt());
    }

    #[test]
    fn test_borrow_requires_liquidity() {
        let mut r = reserve(dec!(0));
        r.supply(100, t0()).unwrap();

        let result = r.borrow(0, 101, t0());
        assert_eq!(
            result,
            Err(ReserveError::InsufficientLiquidity {
                available: 100,
                requested: 101
            })
        );
        assert_eq!(r.total_liquidity(), 100);
        assert_eq!(r.total_scaled_debt(), 0);

        assert_eq!(r.borrow(0, 60, t0()).unwrap(), 60);
        assert_eq!(r.total_liquidity(), 40);
        assert_eq!(r.total_debt(), 60);
    }

    #[test]
    fn test_borrow_after_accrual_owes_only_amount() {
        let mut r = reserve(dec!(0.10));
        r.supply(1_000_000, t0()).unwrap();
        r.accrue(t0() + Duration::seconds(30)).unwrap();
        assert!(r.usage_index() > RAY);

        let later = t0() + Duration::seconds(30);
        let first = r.borrow(0, 50, later).unwrap();
        assert_eq!(r.debt_of(first).unwrap(), 50);
        assert_eq!(r.total_debt(), 50);

        let second = r.borrow(first, 40, later).unwrap();
        assert_eq!(r.debt_of(first + second).unwrap(), 90);
        assert_eq!(r.total_debt(), 90);
        assert_debt_tracked(&r);
    }

    #[test]
    fn test_borrow_dust_rejected_above_ray() {
        let mut r = reserve(dec!(1));
        r.supply(1_000, t0()).unwrap();
        let later = t0() + Duration::days(365);
        r.accrue(later).unwrap();

        let before = r.state().clone();
        assert_eq!(r.borrow(0, 1, later), Err(ReserveError::AmountTooSmall { amount: 1 }));
        assert_eq!(r.state(), &before);
    }

    #[test]
    fn test_accrue_idempotent_within_instant() {
        let mut r = reserve(dec!(0.10));
        r.supply(1_000_000, t0()).unwrap();
        r.borrow(0, 500_000, t0()).unwrap();

        let later = t0() + Duration::days(365);
        let interest = r.accrue(later).unwrap();
        let index = r.usage_index();
        assert!(interest > 0);
        assert!(index > RAY);

        assert_eq!(r.accrue(later).unwrap(), 0);
        assert_eq!(r.usage_index(), index);
        assert_debt_tracked(&r);
    }

    #[test]
    fn test_one_year_at_ten_percent() {
        let mut r = reserve(dec!(0.10));
        r.supply(1_000_000, t0()).unwrap();
        let scaled = r.borrow(0, 100_000, t0()).unwrap();

        r.accrue(t0() + Duration::days(365)).unwrap();
        // One accrual step: simple interest over the interval, rounded down per second
        let debt = r.debt_of(scaled).unwrap();
        assert!((109_999..=110_000).contains(&debt), "debt {debt}");
    }

    #[test]
    fn test_accrue_ignores_time_going_backwards() {
        let mut r = reserve(dec!(0.10));
        r.supply(1_000, t0()).unwrap();
        r.borrow(0, 500, t0()).unwrap();
        r.accrue(t0() + Duration::hours(1)).unwrap();
        let index = r.usage_index();

        r.accrue(t0()).unwrap();
        assert_eq!(r.usage_index(), index);
    }

    #[test]
    fn test_partial_and_full_repay() {
        let mut r = reserve(dec!(0.10));
        r.supply(1_000_000, t0()).unwrap();
        let scaled = r.borrow(0, 100_000, t0()).unwrap();
        let later = t0() + Duration::days(30);

        let partial = r.repay(scaled, 40_000, later).unwrap();
        assert_eq!(partial.paid, 40_000);
        assert_eq!(partial.refund, 0);
        assert!(!partial.is_full(scaled));
        let remaining = scaled - partial.scaled_burned;

        let owed = r.debt_of(remaining).unwrap();
        let full = r.repay(remaining, owed + 500, later).unwrap();
        assert!(full.is_full(remaining));
        assert_eq!(full.paid, owed);
        assert_eq!(full.refund, 500);
        assert_eq!(r.total_scaled_debt(), 0);
        assert_eq!(r.total_liquidity(), 1_000_000 - 100_000 + 40_000 + owed);
    }

    #[test]
    fn test_repay_dust_rejected() {
        let mut r = reserve(dec!(1));
        r.supply(1_000, t0()).unwrap();
        let scaled = r.borrow(0, 500, t0()).unwrap();
        r.accrue(t0() + Duration::days(365)).unwrap();

        let result = r.repay(scaled, 1, t0() + Duration::days(365));
        assert_eq!(result, Err(ReserveError::AmountTooSmall { amount: 1 }));
    }

    #[test]
    fn test_burn_reduces_receivable_exactly() {
        let mut r = reserve(dec!(0.10));
        r.supply(1_000, t0()).unwrap();
        let scaled = r.borrow(0, 500, t0()).unwrap();
        r.accrue(t0() + Duration::days(10)).unwrap();

        let debt = r.debt_of(scaled).unwrap();
        let before = r.total_debt();
        let liquidity = r.total_liquidity();
        r.burn(scaled, debt).unwrap();

        assert_eq!(r.total_debt(), before - debt);
        assert_eq!(r.total_scaled_debt(), 0);
        assert_eq!(r.total_liquidity(), liquidity);

        assert!(matches!(r.burn(1, 0), Err(ReserveError::ExceedsOutstanding { .. })));
    }

    #[test]
    fn test_withdraw_liquidity_bounded() {
        let mut r = reserve(dec!(0));
        r.supply(100, t0()).unwrap();
        r.borrow(0, 70, t0()).unwrap();
        assert!(matches!(
            r.withdraw_liquidity(31, t0()),
            Err(ReserveError::InsufficientLiquidity { .. })
        ));
        r.withdraw_liquidity(30, t0()).unwrap();
        assert_eq!(r.total_liquidity(), 0);
    }

    #[test]
    fn test_utilization() {
        let mut r = reserve(dec!(0));
        assert_eq!(r.utilization(), 0);
        r.supply(100, t0()).unwrap();
        r.borrow(0, 25, t0()).unwrap();
        assert_eq!(r.utilization(), RAY / 4);
    }

    #[test]
    fn test_set_rate_model_requires_governor() {
        let roles = RoleTable::new().with(Principal::new("gov").unwrap(), Role::Governor);
        let gov = Caller::new(Principal::new("gov").unwrap());
        let alice = Caller::new(Principal::new("alice").unwrap());
        let mut r = reserve(dec!(0.10));
        let model = BorrowRateModel::Fixed {
            annual_rate: dec!(0.2),
        };

        assert!(matches!(
            r.set_rate_model(&roles, &alice, model.clone(), t0()),
            Err(ReserveError::Unauthorized(_))
        ));
        r.set_rate_model(&roles, &gov, model.clone(), t0()).unwrap();
        assert_eq!(r.state().rate_model, model);
    }

    #[test]
    fn test_state_roundtrip_through_json() {
        let mut r = reserve(dec!(0.10));
        r.supply(u128::MAX / 4, t0()).unwrap();
        let json = serde_json::to_string(r.state()).unwrap();
        let state: ReserveState = serde_json::from_str(&json).unwrap();
        let restored = ReserveAccountant::from_state(state).unwrap();
        assert_eq!(restored.state(), r.state());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Supply(u128),
        Borrow(u128),
        Repay(u128),
        Wait(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u128..1_000_000_000_000).prop_map(Op::Supply),
            (1u128..1_000_000_000_000).prop_map(Op::Borrow),
            (1u128..1_000_000_000_000).prop_map(Op::Repay),
            (0i64..90 * 86_400).prop_map(Op::Wait),
        ]
    }

    proptest! {
        /// The index never decreases and the receivable always covers scaled debt
        #[test]
        fn prop_index_monotonic_and_debt_tracked(ops in proptest::collection::vec(op(), 1..60)) {
            let mut r = reserve(dec!(0.35));
            let mut now = t0();
            let mut outstanding = 0u128;

            for op in ops {
                let index = r.usage_index();
                let before = r.state().clone();
                let result = match op {
                    Op::Supply(a) => r.supply(a, now).map(|_| ()),
                    Op::Borrow(a) => r.borrow(outstanding, a, now).map(|s| outstanding += s),
                    Op::Repay(a) => r.repay(outstanding, a, now).map(|o| outstanding -= o.scaled_burned),
                    Op::Wait(secs) => {
                        now += Duration::seconds(secs);
                        r.accrue(now).map(|_| ())
                    }
                };
                if result.is_err() {
                    prop_assert_eq!(r.state(), &before);
                }
                prop_assert!(r.usage_index() >= index);
                prop_assert_eq!(r.total_scaled_debt(), outstanding);
                let exact = ray_mul_floor(r.total_scaled_debt(), r.usage_index()).unwrap();
                prop_assert!(exact <= r.total_debt() + 1);
            }
        }
    }
}
