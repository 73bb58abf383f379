//! Market facade

use chrono::{DateTime, Duration, Utc};
use lendkit_core::math::checked_add;
use lendkit_core::{AccessControl, AssetId, Caller, Clock, ItemId, PositionId, Role, TicketId};
use lendkit_events::MarketEvent;
use lendkit_liquidation::{
    AbortReason, LiquidationConfig, LiquidationCoordinator, LiquidationError, LiquidationTicket,
    Settlement,
};
use lendkit_oracle::{OracleConfig, PriceOracle, PriceQuote};
use lendkit_positions::{
    BorrowOutcome, Health, PositionManager, RepayReceipt, RiskParams, WithdrawOutcome,
};
use lendkit_reserve::{BorrowRateModel, ReserveAccountant};
use lendkit_vault::{CollateralVault, PoolView, VaultConfig};
use std::sync::Arc;

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::state::MarketState;

/// An event with the instant of the call that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped {
    pub at: DateTime<Utc>,
    pub event: MarketEvent,
}

pub struct Market {
    config: MarketConfig,
    access: Arc<dyn AccessControl>,
    clock: Arc<dyn Clock>,
    oracle: PriceOracle,
    reserve: ReserveAccountant,
    vault: CollateralVault,
    positions: PositionManager,
    liquidations: LiquidationCoordinator,
    outbox: Vec<Stamped>,
}

impl Market {
    /// Fresh market with empty tables
    pub fn new(
        config: MarketConfig,
        access: Arc<dyn AccessControl>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MarketError> {
        config.validate()?;
        let now = clock.now();

        let market = Self {
            oracle: PriceOracle::new(config.oracle.clone())?,
            reserve: ReserveAccountant::new(config.borrow_asset.clone(), &config.reserve, now)?,
            vault: CollateralVault::new(config.vault.clone())?,
            positions: PositionManager::new(config.risk.clone())?,
            liquidations: LiquidationCoordinator::new(config.liquidation.clone())?,
            config,
            access,
            clock,
            outbox: Vec::new(),
        };
        tracing::info!(asset = %market.config.borrow_asset, "Market created");
        Ok(market)
    }

    /// Rebuild a market from persisted tables
    pub fn restore(
        config: MarketConfig,
        state: MarketState,
        access: Arc<dyn AccessControl>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MarketError> {
        config.validate()?;
        if state.reserve.asset != config.borrow_asset {
            return Err(MarketError::AssetMismatch {
                expected: config.borrow_asset.to_string(),
                actual: state.reserve.asset.to_string(),
            });
        }

        let market = Self {
            oracle: PriceOracle::from_state(config.oracle.clone(), state.oracle)?,
            reserve: ReserveAccountant::from_state(state.reserve)?,
            vault: CollateralVault::from_state(config.vault.clone(), state.vault)?,
            positions: PositionManager::from_book(config.risk.clone(), state.positions)?,
            liquidations: LiquidationCoordinator::from_book(config.liquidation.clone(), state.tickets)?,
            config,
            access,
            clock,
            outbox: Vec::new(),
        };
        market.check_consistency()?;
        tracing::info!(
            positions = market.positions.positions().count(),
            open_tickets = market.liquidations.open_tickets().count(),
            "Market restored"
        );
        Ok(market)
    }

    /// Cross-component invariants that no single table can check alone
    fn check_consistency(&self) -> Result<(), MarketError> {
        let mut scaled = 0u128;
        for position in self.positions.positions() {
            scaled = checked_add(scaled, position.scaled_debt)?;
            if let Some(item) = position.items.iter().find(|item| self.vault.holds(item)) {
                return Err(MarketError::InconsistentState(format!(
                    "{item} is held by both {} and the vault",
                    position.id
                )));
            }
        }
        if scaled != self.reserve.total_scaled_debt() {
            return Err(MarketError::InconsistentState(format!(
                "positions owe {scaled} scaled, reserve tracks {}",
                self.reserve.total_scaled_debt()
            )));
        }
        for ticket in self.liquidations.open_tickets() {
            let flagged = self
                .positions
                .position(ticket.position)
                .is_some_and(|p| p.liquidation_flag);
            if !flagged {
                return Err(MarketError::InconsistentState(format!(
                    "{} is open but {} is not locked",
                    ticket.id, ticket.position
                )));
            }
        }
        Ok(())
    }

    pub fn export_state(&self) -> MarketState {
        MarketState {
            reserve: self.reserve.state().clone(),
            vault: self.vault.state().clone(),
            positions: self.positions.book().clone(),
            oracle: self.oracle.state().clone(),
            tickets: self.liquidations.book().clone(),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn oracle(&self) -> &PriceOracle {
        &self.oracle
    }

    pub fn reserve(&self) -> &ReserveAccountant {
        &self.reserve
    }

    pub fn vault(&self) -> &CollateralVault {
        &self.vault
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn liquidations(&self) -> &LiquidationCoordinator {
        &self.liquidations
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Take every queued event, oldest first
    pub fn drain_events(&mut self) -> Vec<Stamped> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_events(&self) -> &[Stamped] {
        &self.outbox
    }

    fn emit(&mut self, at: DateTime<Utc>, event: MarketEvent) {
        tracing::debug!(kind = event.kind(), "Event queued");
        self.outbox.push(Stamped { at, event });
    }

    // === Oracle ===

    pub fn submit_price(
        &mut self,
        caller: &Caller,
        asset: AssetId,
        value: u128,
        source_timestamp: DateTime<Utc>,
    ) -> Result<PriceQuote, MarketError> {
        let now = self.now();
        let quote = self
            .oracle
            .submit_price(self.access.as_ref(), caller, asset, value, source_timestamp, now)?;
        self.emit(now, price_event(&quote, false));
        Ok(quote)
    }

    pub fn reset_price(
        &mut self,
        caller: &Caller,
        asset: AssetId,
        value: u128,
        source_timestamp: DateTime<Utc>,
    ) -> Result<PriceQuote, MarketError> {
        let now = self.now();
        let quote = self
            .oracle
            .reset_price(self.access.as_ref(), caller, asset, value, source_timestamp, now)?;
        self.emit(now, price_event(&quote, true));
        Ok(quote)
    }

    pub fn read_price(&self, asset: &AssetId, max_age: Duration) -> Result<PriceQuote, MarketError> {
        Ok(self.oracle.read_price(asset, max_age, self.now())?)
    }

    // === Liquidity providers ===
    //
    // Supplier and borrower entry points require `Role::Participant`;
    // expiry stays open to anyone.

    /// Deposit into the pool; returns shares minted
    pub fn supply(&mut self, caller: &Caller, amount: u128) -> Result<u128, MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        let shares = self.vault.deposit(caller, amount, &mut self.reserve, now)?;
        self.emit(
            now,
            MarketEvent::Supplied {
                holder: caller.principal().clone(),
                amount,
                shares,
            },
        );
        Ok(shares)
    }

    /// Redeem pool shares; returns assets paid out
    pub fn redeem(&mut self, caller: &Caller, shares: u128) -> Result<u128, MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        let amount = self.vault.withdraw(caller, shares, &mut self.reserve, now)?;
        self.emit(
            now,
            MarketEvent::Redeemed {
                holder: caller.principal().clone(),
                shares,
                amount,
            },
        );
        Ok(amount)
    }

    pub fn pool_view(&self) -> PoolView {
        self.vault.pool_view(&self.reserve)
    }

    // === Borrowers ===

    pub fn open_position(&mut self, caller: &Caller, item: ItemId) -> Result<PositionId, MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        let position = self.positions.open_position(caller, item.clone(), &self.vault)?;
        self.emit(
            now,
            MarketEvent::PositionOpened {
                position,
                owner: caller.principal().clone(),
                item,
            },
        );
        Ok(position)
    }

    pub fn deposit_collateral(
        &mut self,
        caller: &Caller,
        position: PositionId,
        item: ItemId,
    ) -> Result<(), MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        self.positions
            .deposit_collateral(caller, position, item.clone(), &self.vault)?;
        self.emit(now, MarketEvent::CollateralDeposited { position, item });
        Ok(())
    }

    pub fn withdraw_collateral(
        &mut self,
        caller: &Caller,
        position: PositionId,
        item: &ItemId,
    ) -> Result<WithdrawOutcome, MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        let outcome = self.positions.withdraw_collateral(
            caller,
            position,
            item,
            &mut self.reserve,
            &self.oracle,
            now,
        )?;
        self.emit(
            now,
            MarketEvent::CollateralWithdrawn {
                position,
                item: outcome.item.clone(),
                closed: outcome.closed,
            },
        );
        Ok(outcome)
    }

    pub fn borrow(
        &mut self,
        caller: &Caller,
        position: PositionId,
        amount: u128,
    ) -> Result<BorrowOutcome, MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        let outcome = self
            .positions
            .borrow(caller, position, amount, &mut self.reserve, &self.oracle, now)?;
        self.emit(
            now,
            MarketEvent::Borrowed {
                position,
                amount,
                scaled: outcome.scaled,
                price_version: outcome.valuation.price_version,
            },
        );
        Ok(outcome)
    }

    pub fn repay(
        &mut self,
        caller: &Caller,
        position: PositionId,
        amount: u128,
    ) -> Result<RepayReceipt, MarketError> {
        self.access.require(caller, Role::Participant)?;
        let now = self.now();
        let receipt = self
            .positions
            .repay(caller, position, amount, &mut self.reserve, now)?;
        self.emit(
            now,
            MarketEvent::Repaid {
                position,
                paid: receipt.outcome.paid,
                refund: receipt.outcome.refund,
                scaled_burned: receipt.outcome.scaled_burned,
                closed: receipt.closed,
            },
        );
        Ok(receipt)
    }

    pub fn health(&self, position: PositionId) -> Result<Health, MarketError> {
        Ok(self
            .positions
            .health(position, &self.reserve, &self.oracle, self.now())?)
    }

    /// Bring the usage index up to now; returns interest accrued
    pub fn accrue(&mut self) -> Result<u128, MarketError> {
        let now = self.now();
        Ok(self.reserve.accrue(now)?)
    }

    // === Liquidation ===

    pub fn begin_liquidation(
        &mut self,
        caller: &Caller,
        position: PositionId,
    ) -> Result<LiquidationTicket, MarketError> {
        let now = self.now();
        let replaced = self
            .liquidations
            .open_ticket_for(position)
            .filter(|t| t.is_expired(now))
            .map(|t| t.id);

        let ticket = self.liquidations.begin_liquidation(
            self.access.as_ref(),
            caller,
            position,
            &mut self.positions,
            &mut self.reserve,
            &self.oracle,
            now,
        )?;

        if let Some(stale) = replaced {
            self.emit(
                now,
                MarketEvent::LiquidationAborted {
                    ticket: stale,
                    position,
                    reason: AbortReason::Expired,
                },
            );
        }
        self.emit(
            now,
            MarketEvent::LiquidationOpened {
                ticket: ticket.id,
                position,
                debt: ticket.debt_snapshot,
                collateral_value: ticket.collateral_snapshot,
                price_version: ticket.price_version_consumed,
            },
        );
        Ok(ticket)
    }

    /// Commit a ticket, or abort it when its snapshot no longer holds
    ///
    /// An abort is itself a committed transition: its event is queued
    /// before the error is returned.
    pub fn finalize_liquidation(
        &mut self,
        caller: &Caller,
        ticket: TicketId,
        expected_debt: u128,
    ) -> Result<Settlement, MarketError> {
        let now = self.now();
        let result = self.liquidations.finalize_liquidation(
            self.access.as_ref(),
            caller,
            ticket,
            expected_debt,
            &mut self.positions,
            &mut self.reserve,
            &mut self.vault,
            &self.oracle,
            now,
        );

        match result {
            Ok(settlement) => {
                self.emit(
                    now,
                    MarketEvent::LiquidationCommitted {
                        ticket,
                        position: settlement.position,
                        items: settlement.items.iter().cloned().collect(),
                        debt_repaid: settlement.debt_repaid,
                    },
                );
                Ok(settlement)
            }
            Err(
                err @ (LiquidationError::TicketExpired(_)
                | LiquidationError::SnapshotInvalidated { .. }),
            ) => {
                self.emit_abort(ticket, now);
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn cancel_liquidation(
        &mut self,
        caller: &Caller,
        ticket: TicketId,
    ) -> Result<LiquidationTicket, MarketError> {
        let now = self.now();
        let closed = self.liquidations.cancel_liquidation(
            self.access.as_ref(),
            caller,
            ticket,
            &mut self.positions,
            now,
        )?;
        self.emit_abort(ticket, now);
        Ok(closed)
    }

    /// Expire one ticket past its window; anyone may call
    pub fn expire_ticket(&mut self, ticket: TicketId) -> Result<LiquidationTicket, MarketError> {
        let now = self.now();
        let closed = self
            .liquidations
            .expire_ticket(ticket, &mut self.positions, now)?;
        self.emit_abort(ticket, now);
        Ok(closed)
    }

    /// Expire every ticket past its window
    pub fn expire_stale(&mut self) -> Vec<TicketId> {
        let now = self.now();
        let expired = self.liquidations.expire_stale(&mut self.positions, now);
        for ticket in &expired {
            self.emit_abort(*ticket, now);
        }
        expired
    }

    fn emit_abort(&mut self, ticket: TicketId, now: DateTime<Utc>) {
        let closed = self
            .liquidations
            .ticket(ticket)
            .and_then(|t| t.abort_reason.map(|reason| (t.position, reason)));
        if let Some((position, reason)) = closed {
            self.emit(
                now,
                MarketEvent::LiquidationAborted {
                    ticket,
                    position,
                    reason,
                },
            );
        }
    }

    // === Governance ===

    /// Hand a seized item out of the vault
    pub fn release_item(&mut self, caller: &Caller, item: ItemId) -> Result<(), MarketError> {
        let now = self.now();
        self.vault.release_item(self.access.as_ref(), caller, &item)?;
        self.emit(now, MarketEvent::ItemReleased { item });
        Ok(())
    }

    pub fn set_risk_params(&mut self, caller: &Caller, params: RiskParams) -> Result<(), MarketError> {
        let now = self.now();
        self.positions
            .set_params(self.access.as_ref(), caller, params.clone())?;
        self.config.risk = params;
        self.emit_config_changed("risk", now);
        Ok(())
    }

    pub fn set_oracle_config(&mut self, caller: &Caller, config: OracleConfig) -> Result<(), MarketError> {
        let now = self.now();
        self.oracle
            .set_config(self.access.as_ref(), caller, config.clone())?;
        self.config.oracle = config;
        self.emit_config_changed("oracle", now);
        Ok(())
    }

    pub fn set_vault_config(&mut self, caller: &Caller, config: VaultConfig) -> Result<(), MarketError> {
        let now = self.now();
        self.vault
            .set_config(self.access.as_ref(), caller, config.clone())?;
        self.config.vault = config;
        self.emit_config_changed("vault", now);
        Ok(())
    }

    /// Accrues under the old model first, then switches
    pub fn set_rate_model(&mut self, caller: &Caller, model: BorrowRateModel) -> Result<(), MarketError> {
        let now = self.now();
        self.reserve
            .set_rate_model(self.access.as_ref(), caller, model.clone(), now)?;
        self.config.reserve.rate_model = model;
        self.emit_config_changed("reserve", now);
        Ok(())
    }

    pub fn set_liquidation_config(
        &mut self,
        caller: &Caller,
        config: LiquidationConfig,
    ) -> Result<(), MarketError> {
        let now = self.now();
        self.liquidations
            .set_config(self.access.as_ref(), caller, config.clone())?;
        self.config.liquidation = config;
        self.emit_config_changed("liquidation", now);
        Ok(())
    }

    fn emit_config_changed(&mut self, component: &str, now: DateTime<Utc>) {
        self.emit(
            now,
            MarketEvent::ConfigChanged {
                component: component.to_string(),
            },
        );
    }

    /// Whether `caller` holds `role` in the access collaborator
    pub fn has_role(&self, caller: &Caller, role: Role) -> bool {
        self.access.has_role(caller.principal(), role)
    }
}

fn price_event(quote: &PriceQuote, reset: bool) -> MarketEvent {
    MarketEvent::PriceAccepted {
        asset: quote.asset.clone(),
        value: quote.value,
        version: quote.source_version,
        reset,
    }
}
