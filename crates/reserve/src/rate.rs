//! Borrow rate models
//!
//! Rates are configured as annual `Decimal` fractions (0.08 = 8% APR) and
//! converted to a per-second ray for accrual. Interest compounds once per
//! accrual call: `index *= 1 + rate_per_second * elapsed`.

use lendkit_core::math::{mul_div_floor, ray_from_ratio};
use lendkit_core::{MathError, RAY, SECONDS_PER_YEAR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ReserveError;

/// Default annual base rate for the kinked model (2%)
pub const DEFAULT_BASE_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Default kink at 80% utilization
pub const DEFAULT_OPTIMAL_UTILIZATION: Decimal = Decimal::from_parts(80, 0, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum BorrowRateModel {
    /// Constant annual rate regardless of utilization
    Fixed { annual_rate: Decimal },

    /// Two-slope model: gentle below the kink, steep above it
    Kinked {
        base_rate: Decimal,
        slope_low: Decimal,
        slope_high: Decimal,
        optimal_utilization: Decimal,
    },
}

impl Default for BorrowRateModel {
    fn default() -> Self {
        Self::Kinked {
            base_rate: DEFAULT_BASE_RATE,
            slope_low: Decimal::new(4, 2),
            slope_high: Decimal::new(75, 2),
            optimal_utilization: DEFAULT_OPTIMAL_UTILIZATION,
        }
    }
}

impl BorrowRateModel {
    pub fn validate(&self) -> Result<(), ReserveError> {
        match self {
            Self::Fixed { annual_rate } => {
                if *annual_rate < Decimal::ZERO {
                    return Err(ReserveError::InvalidConfig(
                        "annual_rate must be non-negative".to_string(),
                    ));
                }
            }
            Self::Kinked {
                base_rate,
                slope_low,
                slope_high,
                optimal_utilization,
            } => {
                if [base_rate, slope_low, slope_high]
                    .iter()
                    .any(|r| **r < Decimal::ZERO)
                {
                    return Err(ReserveError::InvalidConfig(
                        "rates must be non-negative".to_string(),
                    ));
                }
                if *optimal_utilization <= Decimal::ZERO || *optimal_utilization >= Decimal::ONE {
                    return Err(ReserveError::InvalidConfig(format!(
                        "optimal_utilization must be in (0, 1), got {optimal_utilization}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Annual borrow rate in ray at the given utilization (ray)
    pub fn annual_rate_ray(&self, utilization: u128) -> Result<u128, MathError> {
        match self {
            Self::Fixed { annual_rate } => ray_from_ratio(*annual_rate),
            Self::Kinked {
                base_rate,
                slope_low,
                slope_high,
                optimal_utilization,
            } => {
                let base = ray_from_ratio(*base_rate)?;
                let low = ray_from_ratio(*slope_low)?;
                let high = ray_from_ratio(*slope_high)?;
                let optimal = ray_from_ratio(*optimal_utilization)?;
                let utilization = utilization.min(RAY);

                if utilization <= optimal {
                    let ramp = mul_div_floor(low, utilization, optimal)?;
                    base.checked_add(ramp).ok_or(MathError::Overflow)
                } else {
                    let excess = mul_div_floor(high, utilization - optimal, RAY - optimal)?;
                    base.checked_add(low)
                        .and_then(|r| r.checked_add(excess))
                        .ok_or(MathError::Overflow)
                }
            }
        }
    }

    /// Per-second borrow rate in ray at the given utilization (ray)
    pub fn rate_per_second(&self, utilization: u128) -> Result<u128, MathError> {
        Ok(self.annual_rate_ray(utilization)? / SECONDS_PER_YEAR as u128)
    }
}

/// Reserve parameters (changeable by a governor)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConfig {
    #[serde(default)]
    pub rate_model: BorrowRateModel,
}

impl ReserveConfig {
    pub fn validate(&self) -> Result<(), ReserveError> {
        self.rate_model.validate()
    }
}
