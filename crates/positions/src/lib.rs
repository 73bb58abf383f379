//! Lendkit Positions - Borrower positions
//!
//! A position holds discrete collateral items and a scaled debt balance.
//! Every check that needs prices reads them through one oracle snapshot and
//! accrues a staged copy of the reserve; nothing is written back until all
//! checks pass.

pub mod error;
pub mod manager;
pub mod params;
pub mod position;

pub use error::PositionError;
pub use manager::{BorrowOutcome, PositionBook, PositionManager, RepayReceipt, WithdrawOutcome};
pub use params::RiskParams;
pub use position::{Health, Position, Valuation};
