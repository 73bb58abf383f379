//! Lendkit Core - Domain types
//!
//! This crate contains the fundamental types shared by every lendkit component:
//! - `AssetId`, `ItemId`, `PositionId`, `TicketId`, `Principal`: stable identifiers
//! - `Caller`: explicit capability carried into every owner-checked call
//! - `AccessControl`: the role-check collaborator interface
//! - `Clock`: source of "now" for time-dependent accounting
//! - `math`: ray fixed-point arithmetic with 256-bit intermediates

pub mod access;
pub mod clock;
pub mod ids;
pub mod math;

pub use access::{AccessControl, AccessDenied, Caller, Role, RoleTable};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{AssetId, IdError, ItemId, PositionId, Principal, TicketId};
pub use math::{MathError, RAY, SECONDS_PER_YEAR};
