//! Fixed-point math
//!
//! Amounts, shares and prices are `u128` base units. The usage index is a
//! ray: a fixed-point number with 27 decimals. Every product is formed in a
//! 256-bit intermediate before the single division, so no precision is lost
//! to an early truncation, and any result that does not fit `u128` fails
//! closed with `MathError::Overflow` instead of wrapping.
//!
//! Ratios (LTV, thresholds, rates) arrive as `Decimal` and are applied
//! exactly through their mantissa and scale.

use ethereum_types::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// 1.0 in ray precision
pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Seconds in a 365-day year, used to convert annual rates
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Arithmetic underflow")]
    Underflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Ratio must be non-negative")]
    NegativeRatio,
}

fn narrow(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.as_u128())
}

/// `floor(a * b / denominator)`
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    narrow(product / U256::from(denominator))
}

/// `ceil(a * b / denominator)`
pub fn mul_div_ceil(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let (quotient, remainder) = product.div_mod(U256::from(denominator));
    let quotient = if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::one()
    };
    narrow(quotient)
}

/// `floor(amount * ray / RAY)`
pub fn ray_mul_floor(amount: u128, ray: u128) -> Result<u128, MathError> {
    mul_div_floor(amount, ray, RAY)
}

/// `ceil(amount * ray / RAY)`
pub fn ray_mul_ceil(amount: u128, ray: u128) -> Result<u128, MathError> {
    mul_div_ceil(amount, ray, RAY)
}

/// `floor(amount * RAY / ray)`
pub fn ray_div_floor(amount: u128, ray: u128) -> Result<u128, MathError> {
    mul_div_floor(amount, RAY, ray)
}

/// `ceil(amount * RAY / ray)`
pub fn ray_div_ceil(amount: u128, ray: u128) -> Result<u128, MathError> {
    mul_div_ceil(amount, RAY, ray)
}

/// Split a non-negative decimal into `(mantissa, 10^scale)`
pub fn ratio_parts(ratio: Decimal) -> Result<(u128, u128), MathError> {
    if ratio < Decimal::ZERO {
        return Err(MathError::NegativeRatio);
    }
    let mantissa = u128::try_from(ratio.mantissa()).map_err(|_| MathError::NegativeRatio)?;
    let denominator = 10u128
        .checked_pow(ratio.scale())
        .ok_or(MathError::Overflow)?;
    Ok((mantissa, denominator))
}

/// `floor(value * ratio)`
pub fn mul_ratio_floor(value: u128, ratio: Decimal) -> Result<u128, MathError> {
    let (mantissa, denominator) = ratio_parts(ratio)?;
    mul_div_floor(value, mantissa, denominator)
}

/// `ceil(value * ratio)`
pub fn mul_ratio_ceil(value: u128, ratio: Decimal) -> Result<u128, MathError> {
    let (mantissa, denominator) = ratio_parts(ratio)?;
    mul_div_ceil(value, mantissa, denominator)
}

/// Convert a decimal ratio to ray precision (rounded down)
pub fn ray_from_ratio(ratio: Decimal) -> Result<u128, MathError> {
    mul_ratio_floor(RAY, ratio)
}

/// Render a ray as a decimal for display and logging (lossy past 28 digits)
pub fn ray_to_decimal(ray: u128) -> Decimal {
    let whole = ray / RAY;
    let frac = ray % RAY;
    let frac = Decimal::from_i128_with_scale((frac / 10u128.pow(9)) as i128, 18);
    Decimal::from(whole as u64).saturating_add(frac)
}

pub fn checked_add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn checked_sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}
