//! Lendkit Reserve - Pooled liquidity accounting
//!
//! One `ReserveAccountant` per borrowable asset. Debt is stored scaled by the
//! usage index; real debt is `scaled * index` and grows as the index accrues.
//!
//! Every mutating operation accrues first, computes the complete new record,
//! and only then writes it back, so a failed validation leaves the reserve
//! untouched.

pub mod error;
pub mod rate;
pub mod reserve;

pub use error::ReserveError;
pub use rate::{BorrowRateModel, ReserveConfig};
pub use reserve::{RepayOutcome, ReserveAccountant, ReserveState};
