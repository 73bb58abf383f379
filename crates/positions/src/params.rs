//! Risk parameters

use lendkit_core::math::{mul_ratio_ceil, mul_ratio_floor};
use lendkit_core::MathError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PositionError;

/// Collateralization parameters (changeable by a governor)
///
/// - borrowing is allowed while `debt <= collateral * max_ltv`
/// - withdrawing is allowed while `collateral >= debt * liquidation_threshold`
/// - a position is liquidatable when `collateral < debt * liquidation_threshold`
///
/// `max_ltv * liquidation_threshold <= 1` keeps a freshly maxed-out borrow
/// out of the liquidatable zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    #[serde(default = "default_max_ltv")]
    pub max_ltv: Decimal,

    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold: Decimal,
}

fn default_max_ltv() -> Decimal {
    Decimal::new(75, 2)
}

fn default_liquidation_threshold() -> Decimal {
    Decimal::new(125, 2)
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_ltv: default_max_ltv(),
            liquidation_threshold: default_liquidation_threshold(),
        }
    }
}

impl RiskParams {
    pub fn validate(&self) -> Result<(), PositionError> {
        if self.max_ltv <= Decimal::ZERO || self.max_ltv > Decimal::ONE {
            return Err(PositionError::InvalidConfig(format!(
                "max_ltv must be in (0, 1], got {}",
                self.max_ltv
            )));
        }
        if self.liquidation_threshold <= Decimal::ZERO {
            return Err(PositionError::InvalidConfig(format!(
                "liquidation_threshold must be positive, got {}",
                self.liquidation_threshold
            )));
        }
        let product = self
            .max_ltv
            .checked_mul(self.liquidation_threshold)
            .ok_or(MathError::Overflow)?;
        if product > Decimal::ONE {
            return Err(PositionError::InvalidConfig(format!(
                "max_ltv * liquidation_threshold = {product} exceeds 1"
            )));
        }
        Ok(())
    }

    /// Largest debt the collateral supports for new borrowing
    pub fn borrow_limit(&self, collateral_value: u128) -> Result<u128, MathError> {
        mul_ratio_floor(collateral_value, self.max_ltv)
    }

    /// Collateral needed to stay clear of liquidation
    pub fn required_collateral(&self, debt: u128) -> Result<u128, MathError> {
        required_collateral(debt, self.liquidation_threshold)
    }
}

/// `ceil(debt * threshold)`; a position below this is liquidatable
pub fn required_collateral(debt: u128, threshold: Decimal) -> Result<u128, MathError> {
    mul_ratio_ceil(debt, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_params_valid() {
        assert!(RiskParams::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bounds() {
        let over_ltv = RiskParams {
            max_ltv: dec!(1.01),
            liquidation_threshold: dec!(0.5),
        };
        assert!(over_ltv.validate().is_err());

        let inconsistent = RiskParams {
            max_ltv: dec!(0.9),
            liquidation_threshold: dec!(1.5),
        };
        assert!(matches!(
            inconsistent.validate(),
            Err(PositionError::InvalidConfig(_))
        ));

        let low_threshold = RiskParams {
            max_ltv: dec!(0.5),
            liquidation_threshold: dec!(0.6),
        };
        assert!(low_threshold.validate().is_ok());
    }

    #[test]
    fn test_limits_round_against_borrower() {
        let params = RiskParams {
            max_ltv: dec!(0.75),
            liquidation_threshold: dec!(1.25),
        };
        assert_eq!(params.borrow_limit(99).unwrap(), 74);
        assert_eq!(params.required_collateral(3).unwrap(), 4);
        assert_eq!(params.required_collateral(0).unwrap(), 0);
    }
}
