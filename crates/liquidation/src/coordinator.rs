//! Liquidation coordinator

use chrono::{DateTime, Duration, Utc};
use lendkit_core::{AccessControl, Caller, ItemId, MathError, PositionId, Role, TicketId};
use lendkit_oracle::PriceOracle;
use lendkit_positions::params::required_collateral;
use lendkit_positions::{PositionError, PositionManager, Valuation};
use lendkit_reserve::ReserveAccountant;
use lendkit_vault::CollateralVault;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::LiquidationError;
use crate::ticket::{AbortReason, LiquidationTicket, TicketState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// How long a ticket may stay open before anyone can expire it
    #[serde(default = "default_ticket_ttl_secs")]
    pub ticket_ttl_secs: u64,
}

fn default_ticket_ttl_secs() -> u64 {
    300
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            ticket_ttl_secs: default_ticket_ttl_secs(),
        }
    }
}

impl LiquidationConfig {
    pub fn validate(&self) -> Result<(), LiquidationError> {
        if self.ticket_ttl_secs == 0 || self.ticket_ttl_secs > i64::MAX as u64 / 1_000 {
            return Err(LiquidationError::InvalidConfig(format!(
                "ticket_ttl_secs out of range: {}",
                self.ticket_ttl_secs
            )));
        }
        Ok(())
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::seconds(self.ticket_ttl_secs as i64)
    }
}

/// Persisted ticket table; closed tickets are kept, ids are never reused
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBook {
    pub tickets: BTreeMap<TicketId, LiquidationTicket>,
    pub next_id: u64,
}

/// What a committed liquidation moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub ticket: TicketId,
    pub position: PositionId,
    pub items: BTreeSet<ItemId>,
    pub debt_repaid: u128,
    pub scaled_burned: u128,
    /// Threshold the position was judged under
    pub liquidation_threshold: Decimal,
}

#[derive(Debug, Clone)]
pub struct LiquidationCoordinator {
    config: LiquidationConfig,
    book: TicketBook,
    /// Position -> its open ticket, derived from the book
    open: BTreeMap<PositionId, TicketId>,
}

impl LiquidationCoordinator {
    pub fn new(config: LiquidationConfig) -> Result<Self, LiquidationError> {
        Self::from_book(config, TicketBook::default())
    }

    pub fn from_book(config: LiquidationConfig, book: TicketBook) -> Result<Self, LiquidationError> {
        config.validate()?;
        let mut open = BTreeMap::new();
        for ticket in book.tickets.values().filter(|t| t.is_open()) {
            if let Some(other) = open.insert(ticket.position, ticket.id) {
                return Err(LiquidationError::TicketAlreadyOpen {
                    position: ticket.position,
                    ticket: other,
                });
            }
        }
        Ok(Self { config, book, open })
    }

    pub fn config(&self) -> &LiquidationConfig {
        &self.config
    }

    pub fn book(&self) -> &TicketBook {
        &self.book
    }

    pub fn ticket(&self, id: TicketId) -> Option<&LiquidationTicket> {
        self.book.tickets.get(&id)
    }

    pub fn open_ticket_for(&self, position: PositionId) -> Option<&LiquidationTicket> {
        self.open.get(&position).and_then(|id| self.book.tickets.get(id))
    }

    pub fn open_tickets(&self) -> impl Iterator<Item = &LiquidationTicket> {
        self.open.values().filter_map(|id| self.book.tickets.get(id))
    }

    /// Change the ticket window (governor only); open tickets keep theirs
    pub fn set_config(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        config: LiquidationConfig,
    ) -> Result<(), LiquidationError> {
        access.require(caller, Role::Governor)?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// NONE -> OPEN
    ///
    /// An expired ticket still open on the same position is aborted as part
    /// of a successful begin.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_liquidation(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        position_id: PositionId,
        positions: &mut PositionManager,
        reserve: &mut ReserveAccountant,
        oracle: &PriceOracle,
        now: DateTime<Utc>,
    ) -> Result<LiquidationTicket, LiquidationError> {
        access.require(caller, Role::Liquidator)?;

        let stale = match self.open_ticket_for(position_id) {
            Some(existing) if !existing.is_expired(now) => {
                return Err(LiquidationError::TicketAlreadyOpen {
                    position: position_id,
                    ticket: existing.id,
                });
            }
            Some(existing) => Some(existing.id),
            None => None,
        };

        let position = positions
            .position(position_id)
            .ok_or(PositionError::PositionNotFound(position_id))?;

        let mut staged = reserve.clone();
        staged.accrue(now)?;
        let debt = staged.debt_of(position.scaled_debt)?;

        let snapshot = oracle.snapshot(&position.assets(), now)?;
        let collateral_value = Valuation::collateral_value(&position.items, &snapshot)?;
        let threshold = positions.params().liquidation_threshold;
        let required = required_collateral(debt, threshold)?;

        if debt == 0 || collateral_value >= required {
            return Err(LiquidationError::NotLiquidatable {
                position: position_id,
                collateral_value,
                required,
            });
        }

        let id = TicketId(self.book.next_id);
        let next_id = self.book.next_id.checked_add(1).ok_or(MathError::Overflow)?;
        let ticket = LiquidationTicket {
            id,
            position: position_id,
            debt_snapshot: debt,
            scaled_debt_snapshot: position.scaled_debt,
            index_snapshot: staged.usage_index(),
            collateral_snapshot: collateral_value,
            price_version_consumed: snapshot.version,
            items: position.items.clone(),
            liquidation_threshold: threshold,
            opened_by: caller.principal().clone(),
            opened_at: now,
            expires_at: now + self.config.ticket_ttl(),
            state: TicketState::Open,
            abort_reason: None,
            closed_at: None,
        };

        positions.set_liquidation_flag(position_id, true)?;
        *reserve = staged;
        if let Some(stale) = stale {
            self.close(stale, AbortReason::Expired, now);
        }
        self.book.next_id = next_id;
        self.book.tickets.insert(id, ticket.clone());
        self.open.insert(position_id, id);

        tracing::info!(
            ticket = %id,
            position = %position_id,
            debt,
            collateral = collateral_value,
            price_version = snapshot.version,
            "Liquidation ticket opened"
        );
        Ok(ticket)
    }

    /// OPEN -> COMMITTED, or OPEN -> ABORTED when anything moved
    ///
    /// Does not accrue: any accrual since `begin_liquidation` means the
    /// debt snapshot is stale and the ticket aborts.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_liquidation(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        ticket_id: TicketId,
        expected_debt: u128,
        positions: &mut PositionManager,
        reserve: &mut ReserveAccountant,
        vault: &mut CollateralVault,
        oracle: &PriceOracle,
        now: DateTime<Utc>,
    ) -> Result<Settlement, LiquidationError> {
        access.require(caller, Role::Liquidator)?;
        let ticket = self.open_ticket(ticket_id)?.clone();

        if ticket.is_expired(now) {
            self.close(ticket_id, AbortReason::Expired, now);
            self.unlock(positions, ticket.position);
            tracing::warn!(ticket = %ticket_id, "Liquidation ticket expired at finalize");
            return Err(LiquidationError::TicketExpired(ticket_id));
        }

        if let Some(reason) = invalidation(&ticket, expected_debt, positions, reserve, vault, oracle) {
            self.close(ticket_id, AbortReason::SnapshotInvalidated, now);
            self.unlock(positions, ticket.position);
            tracing::warn!(ticket = %ticket_id, reason = %reason, "Liquidation snapshot invalidated");
            return Err(LiquidationError::SnapshotInvalidated {
                ticket: ticket_id,
                reason,
            });
        }

        let mut staged_reserve = reserve.clone();
        staged_reserve.burn(ticket.scaled_debt_snapshot, ticket.debt_snapshot)?;
        let mut staged_vault = vault.clone();
        staged_vault.take_custody(&ticket.items)?;

        positions.seize(ticket.position)?;
        *reserve = staged_reserve;
        *vault = staged_vault;
        if let Some(t) = self.book.tickets.get_mut(&ticket_id) {
            t.commit(now);
        }
        self.open.remove(&ticket.position);

        tracing::info!(
            ticket = %ticket_id,
            position = %ticket.position,
            debt = ticket.debt_snapshot,
            items = ticket.items.len(),
            "Liquidation committed"
        );
        Ok(Settlement {
            ticket: ticket_id,
            position: ticket.position,
            items: ticket.items,
            debt_repaid: ticket.debt_snapshot,
            scaled_burned: ticket.scaled_debt_snapshot,
            liquidation_threshold: ticket.liquidation_threshold,
        })
    }

    /// OPEN -> ABORTED by the opener or a governor
    pub fn cancel_liquidation(
        &mut self,
        access: &dyn AccessControl,
        caller: &Caller,
        ticket_id: TicketId,
        positions: &mut PositionManager,
        now: DateTime<Utc>,
    ) -> Result<LiquidationTicket, LiquidationError> {
        let ticket = self.open_ticket(ticket_id)?;
        if !caller.is(&ticket.opened_by) {
            access.require(caller, Role::Governor)?;
        }
        let position = ticket.position;

        self.close(ticket_id, AbortReason::Cancelled, now);
        self.unlock(positions, position);
        tracing::info!(ticket = %ticket_id, by = %caller.principal(), "Liquidation cancelled");
        self.closed(ticket_id)
    }

    /// OPEN -> ABORTED once the window has passed; callable by anyone
    pub fn expire_ticket(
        &mut self,
        ticket_id: TicketId,
        positions: &mut PositionManager,
        now: DateTime<Utc>,
    ) -> Result<LiquidationTicket, LiquidationError> {
        let ticket = self.open_ticket(ticket_id)?;
        if !ticket.is_expired(now) {
            return Err(LiquidationError::TicketNotExpired {
                ticket: ticket_id,
                expires_at: ticket.expires_at,
            });
        }
        let position = ticket.position;

        self.close(ticket_id, AbortReason::Expired, now);
        self.unlock(positions, position);
        tracing::info!(ticket = %ticket_id, "Liquidation ticket expired");
        self.closed(ticket_id)
    }

    /// Expire every open ticket past its window
    pub fn expire_stale(&mut self, positions: &mut PositionManager, now: DateTime<Utc>) -> Vec<TicketId> {
        let stale: Vec<TicketId> = self
            .open_tickets()
            .filter(|t| t.is_expired(now))
            .map(|t| t.id)
            .collect();
        for id in &stale {
            if let Some(position) = self.book.tickets.get(id).map(|t| t.position) {
                self.close(*id, AbortReason::Expired, now);
                self.unlock(positions, position);
            }
        }
        stale
    }

    fn open_ticket(&self, id: TicketId) -> Result<&LiquidationTicket, LiquidationError> {
        let ticket = self
            .book
            .tickets
            .get(&id)
            .ok_or(LiquidationError::TicketNotFound(id))?;
        if !ticket.is_open() {
            return Err(LiquidationError::TicketNotOpen {
                ticket: id,
                state: ticket.state,
            });
        }
        Ok(ticket)
    }

    fn closed(&self, id: TicketId) -> Result<LiquidationTicket, LiquidationError> {
        self.book
            .tickets
            .get(&id)
            .cloned()
            .ok_or(LiquidationError::TicketNotFound(id))
    }

    fn close(&mut self, id: TicketId, reason: AbortReason, now: DateTime<Utc>) {
        if let Some(ticket) = self.book.tickets.get_mut(&id) {
            ticket.abort(reason, now);
            self.open.remove(&ticket.position);
        }
    }

    /// Clear the position flag; the position may be gone already
    fn unlock(&self, positions: &mut PositionManager, position: PositionId) {
        if positions.set_liquidation_flag(position, false).is_err() {
            tracing::debug!(position = %position, "Position gone before unlock");
        }
    }
}

/// First reason the ticket no longer describes current state, if any
fn invalidation(
    ticket: &LiquidationTicket,
    expected_debt: u128,
    positions: &PositionManager,
    reserve: &ReserveAccountant,
    vault: &CollateralVault,
    oracle: &PriceOracle,
) -> Option<String> {
    if expected_debt != ticket.debt_snapshot {
        return Some(format!(
            "expected debt {expected_debt} differs from snapshot {}",
            ticket.debt_snapshot
        ));
    }
    let Some(position) = positions.position(ticket.position) else {
        return Some(format!("position {} no longer exists", ticket.position));
    };
    if position.scaled_debt != ticket.scaled_debt_snapshot {
        return Some(format!(
            "scaled debt moved from {} to {}",
            ticket.scaled_debt_snapshot, position.scaled_debt
        ));
    }
    if reserve.usage_index() != ticket.index_snapshot {
        return Some("reserve accrued since snapshot".to_string());
    }
    if position.items != ticket.items {
        return Some("collateral set changed".to_string());
    }
    let threshold = positions.params().liquidation_threshold;
    if threshold != ticket.liquidation_threshold {
        return Some(format!(
            "liquidation threshold changed from {} to {threshold}",
            ticket.liquidation_threshold
        ));
    }
    if let Some(item) = ticket.items.iter().find(|item| vault.holds(item)) {
        return Some(format!("item {item} already in vault custody"));
    }
    let moved = oracle.changed_since(&ticket.assets(), ticket.price_version_consumed);
    if !moved.is_empty() {
        let moved: Vec<String> = moved.iter().map(ToString::to_string).collect();
        return Some(format!("prices updated for {}", moved.join(", ")));
    }
    None
}
