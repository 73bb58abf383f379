//! Liquidation ticket

use chrono::{DateTime, Utc};
use lendkit_core::{AssetId, ItemId, PositionId, Principal, TicketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{Display, EnumString};

/// Ticket lifecycle
///
/// ```text
/// Open -> Committed
///      -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TicketState {
    Open,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AbortReason {
    /// Snapshot no longer matched state at finalize
    SnapshotInvalidated,
    /// Open past its window
    Expired,
    /// Withdrawn by the opener or a governor
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTicket {
    pub id: TicketId,
    pub position: PositionId,
    pub debt_snapshot: u128,
    pub scaled_debt_snapshot: u128,
    pub index_snapshot: u128,
    pub collateral_snapshot: u128,
    /// Oracle version of the snapshot the ticket was priced at
    pub price_version_consumed: u64,
    pub items: BTreeSet<ItemId>,
    /// Threshold in force when the ticket opened
    pub liquidation_threshold: Decimal,
    pub opened_by: Principal,
    pub opened_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: TicketState,
    pub abort_reason: Option<AbortReason>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl LiquidationTicket {
    pub fn is_open(&self) -> bool {
        self.state == TicketState::Open
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Collateral assets whose prices the ticket depends on
    pub fn assets(&self) -> BTreeSet<AssetId> {
        self.items.iter().map(|item| item.asset.clone()).collect()
    }

    pub(crate) fn commit(&mut self, now: DateTime<Utc>) {
        self.state = TicketState::Committed;
        self.closed_at = Some(now);
    }

    pub(crate) fn abort(&mut self, reason: AbortReason, now: DateTime<Utc>) {
        self.state = TicketState::Aborted;
        self.abort_reason = Some(reason);
        self.closed_at = Some(now);
    }
}
