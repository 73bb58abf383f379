//! Lendkit Liquidation - Snapshot tickets
//!
//! Liquidation spans two calls. `begin_liquidation` accrues the reserve,
//! snapshots debt, collateral and the oracle version into a ticket, and
//! locks the position. `finalize_liquidation` commits only if none of that
//! has moved since; otherwise the ticket is aborted and the liquidator
//! starts over.
//!
//! A ticket leaves `Open` exactly once, to `Committed` or `Aborted`.

pub mod coordinator;
pub mod error;
pub mod ticket;

pub use coordinator::{LiquidationConfig, LiquidationCoordinator, Settlement, TicketBook};
pub use error::LiquidationError;
pub use ticket::{AbortReason, LiquidationTicket, TicketState};
