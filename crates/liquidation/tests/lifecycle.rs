//! Ticket lifecycle tests across positions, reserve, vault and oracle

use chrono::{DateTime, Duration, TimeZone, Utc};
use lendkit_core::{AssetId, Caller, ItemId, PositionId, Principal, Role, RoleTable};
use lendkit_liquidation::{
    AbortReason, LiquidationConfig, LiquidationCoordinator, LiquidationError, LiquidationTicket,
    Settlement, TicketState,
};
use lendkit_oracle::{OracleConfig, PriceOracle};
use lendkit_positions::{PositionError, PositionManager, RiskParams};
use lendkit_reserve::{BorrowRateModel, ReserveAccountant, ReserveConfig};
use lendkit_vault::{CollateralVault, VaultConfig};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn caller(name: &str) -> Caller {
    Caller::new(Principal::new(name).unwrap())
}

fn punks() -> AssetId {
    "PUNKS".parse().unwrap()
}

fn item(s: &str) -> ItemId {
    s.parse().unwrap()
}

fn roles() -> RoleTable {
    RoleTable::new()
        .with(Principal::new("feeder").unwrap(), Role::Feeder)
        .with(Principal::new("gov").unwrap(), Role::Governor)
        .with(Principal::new("keeper").unwrap(), Role::Liquidator)
        .with(Principal::new("rival").unwrap(), Role::Liquidator)
}

struct Market {
    roles: RoleTable,
    positions: PositionManager,
    reserve: ReserveAccountant,
    vault: CollateralVault,
    oracle: PriceOracle,
    coordinator: LiquidationCoordinator,
    position: PositionId,
    now: DateTime<Utc>,
}

impl Market {
    /// Alice holds PUNKS#1 and owes 50; the price then falls from 100 to 20
    fn underwater(annual_rate: Decimal) -> Self {
        let roles = roles();
        let params = RiskParams {
            max_ltv: dec!(0.5),
            liquidation_threshold: dec!(0.6),
        };
        let reserve_config = ReserveConfig {
            rate_model: BorrowRateModel::Fixed { annual_rate },
        };
        let mut reserve = ReserveAccountant::new("USDC".parse().unwrap(), &reserve_config, t0()).unwrap();
        reserve.supply(10_000, t0()).unwrap();

        let mut oracle = PriceOracle::new(OracleConfig::default()).unwrap();
        oracle
            .submit_price(&roles, &caller("feeder"), punks(), 100, t0(), t0())
            .unwrap();

        let vault = CollateralVault::new(VaultConfig::default()).unwrap();
        let mut positions = PositionManager::new(params).unwrap();
        let position = positions
            .open_position(&caller("alice"), item("PUNKS#1"), &vault)
            .unwrap();

        let now = t0() + Duration::seconds(30);
        positions
            .borrow(&caller("alice"), position, 50, &mut reserve, &oracle, now)
            .unwrap();
        oracle
            .reset_price(&roles, &caller("gov"), punks(), 20, t0(), now)
            .unwrap();

        Self {
            roles,
            positions,
            reserve,
            vault,
            oracle,
            coordinator: LiquidationCoordinator::new(LiquidationConfig::default()).unwrap(),
            position,
            now: now + Duration::seconds(30),
        }
    }

    fn begin(&mut self, who: &str) -> Result<LiquidationTicket, LiquidationError> {
        self.coordinator.begin_liquidation(
            &self.roles,
            &caller(who),
            self.position,
            &mut self.positions,
            &mut self.reserve,
            &self.oracle,
            self.now,
        )
    }

    fn finalize(&mut self, ticket: &LiquidationTicket, expected_debt: u128) -> Result<Settlement, LiquidationError> {
        self.coordinator
            .finalize_liquidation(
                &self.roles,
                &caller("keeper"),
                ticket.id,
                expected_debt,
                &mut self.positions,
                &mut self.reserve,
                &mut self.vault,
                &self.oracle,
                self.now,
            )
    }

    fn repay(&mut self, amount: u128) -> Result<(), PositionError> {
        self.positions
            .repay(&caller("alice"), self.position, amount, &mut self.reserve, self.now)
            .map(|_| ())
    }

    fn state_of(&self, ticket: &LiquidationTicket) -> TicketState {
        self.coordinator.ticket(ticket.id).unwrap().state
    }
}

#[test]
fn test_healthy_position_not_liquidatable() {
    let mut m = Market::underwater(dec!(0));
    m.oracle
        .reset_price(&m.roles, &caller("gov"), punks(), 100, t0(), m.now)
        .unwrap();
    m.now += Duration::seconds(15);

    let result = m.begin("keeper");
    assert!(matches!(
        result,
        Err(LiquidationError::NotLiquidatable {
            collateral_value: 100,
            required: 30,
            ..
        })
    ));
    assert!(!m.positions.position(m.position).unwrap().liquidation_flag);
}

#[test]
fn test_begin_requires_liquidator_role() {
    let mut m = Market::underwater(dec!(0));
    assert!(matches!(m.begin("alice"), Err(LiquidationError::Unauthorized(_))));
}

#[test]
fn test_commit_moves_items_and_burns_debt() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();
    assert_eq!(ticket.debt_snapshot, 50);
    assert_eq!(ticket.collateral_snapshot, 20);
    assert_eq!(ticket.price_version_consumed, m.oracle.version());
    assert!(m.positions.position(m.position).unwrap().liquidation_flag);

    let receivable = m.reserve.total_debt();
    let settlement = m.finalize(&ticket, 50).unwrap();
    assert_eq!(settlement.debt_repaid, 50);
    assert_eq!(settlement.liquidation_threshold, dec!(0.6));

    assert_eq!(m.state_of(&ticket), TicketState::Committed);
    assert!(m.positions.position(m.position).is_none());
    assert!(m.vault.holds(&item("PUNKS#1")));
    assert_eq!(m.reserve.total_debt(), receivable - 50);
    assert_eq!(m.reserve.total_scaled_debt(), 0);

    // Seized items cannot be pledged again
    let reuse = m
        .positions
        .open_position(&caller("bob"), item("PUNKS#1"), &m.vault);
    assert!(matches!(reuse, Err(PositionError::AlreadyOwned(_))));
}

#[test]
fn test_repay_between_begin_and_finalize_aborts() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    m.repay(10).unwrap();
    let result = m.finalize(&ticket, 50);

    let err = result.unwrap_err();
    assert!(matches!(err, LiquidationError::SnapshotInvalidated { .. }));
    assert!(err.is_recoverable());
    let closed = m.coordinator.ticket(ticket.id).unwrap();
    assert_eq!(closed.state, TicketState::Aborted);
    assert_eq!(closed.abort_reason, Some(AbortReason::SnapshotInvalidated));

    // Nothing moved: the position keeps its item and remaining debt
    let position = m.positions.position(m.position).unwrap();
    assert_eq!(position.items.len(), 1);
    assert_eq!(position.scaled_debt, 40);
    assert!(!position.liquidation_flag);
    assert!(!m.vault.holds(&item("PUNKS#1")));

    // Restart with a fresh snapshot
    let retry = m.begin("keeper").unwrap();
    assert_eq!(retry.debt_snapshot, 40);
    assert_ne!(retry.id, ticket.id);
    m.finalize(&retry, 40).unwrap();
}

#[test]
fn test_wrong_expected_debt_aborts() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();
    let result = m.finalize(&ticket, 49);
    assert!(matches!(result, Err(LiquidationError::SnapshotInvalidated { .. })));
    assert_eq!(m.state_of(&ticket), TicketState::Aborted);
}

#[test]
fn test_price_update_aborts() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    m.now += Duration::seconds(10);
    m.oracle
        .submit_price(&m.roles, &caller("feeder"), punks(), 19, m.now, m.now)
        .unwrap();

    let result = m.finalize(&ticket, 50);
    assert!(matches!(result, Err(LiquidationError::SnapshotInvalidated { .. })));
}

#[test]
fn test_threshold_change_aborts() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();
    assert_eq!(ticket.liquidation_threshold, dec!(0.6));

    let stricter = RiskParams {
        max_ltv: dec!(0.5),
        liquidation_threshold: dec!(0.8),
    };
    m.positions.set_params(&m.roles, &caller("gov"), stricter).unwrap();

    let result = m.finalize(&ticket, 50);
    assert!(matches!(result, Err(LiquidationError::SnapshotInvalidated { .. })));
    assert_eq!(m.state_of(&ticket), TicketState::Aborted);

    // A fresh ticket carries the new threshold through to settlement
    let retry = m.begin("keeper").unwrap();
    let settlement = m.finalize(&retry, 50).unwrap();
    assert_eq!(settlement.liquidation_threshold, dec!(0.8));
}

#[test]
fn test_unrelated_price_update_does_not_abort() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    m.now += Duration::seconds(10);
    m.oracle
        .submit_price(&m.roles, &caller("feeder"), "APES".parse().unwrap(), 7, m.now, m.now)
        .unwrap();

    m.finalize(&ticket, 50).unwrap();
}

#[test]
fn test_accrual_since_snapshot_aborts() {
    let mut m = Market::underwater(dec!(0.10));
    let ticket = m.begin("keeper").unwrap();

    m.now += Duration::seconds(60);
    m.reserve.accrue(m.now).unwrap();

    let result = m.finalize(&ticket, ticket.debt_snapshot);
    assert!(matches!(result, Err(LiquidationError::SnapshotInvalidated { .. })));
}

#[test]
fn test_finalize_after_window_expires_ticket() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    m.now = ticket.expires_at;
    let result = m.finalize(&ticket, 50);
    assert!(matches!(result, Err(LiquidationError::TicketExpired(_))));
    let closed = m.coordinator.ticket(ticket.id).unwrap();
    assert_eq!(closed.abort_reason, Some(AbortReason::Expired));
    assert!(!m.positions.position(m.position).unwrap().liquidation_flag);
}

#[test]
fn test_expire_by_anyone_after_window() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    let early = m
        .coordinator
        .expire_ticket(ticket.id, &mut m.positions, m.now);
    assert!(matches!(early, Err(LiquidationError::TicketNotExpired { .. })));

    let later = ticket.expires_at + Duration::seconds(1);
    let expired = m
        .coordinator
        .expire_ticket(ticket.id, &mut m.positions, later)
        .unwrap();
    assert_eq!(expired.state, TicketState::Aborted);
    assert!(m.coordinator.open_ticket_for(m.position).is_none());
}

#[test]
fn test_cancel_by_opener_or_governor_only() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    let rival = m
        .coordinator
        .cancel_liquidation(&m.roles, &caller("rival"), ticket.id, &mut m.positions, m.now);
    assert!(matches!(rival, Err(LiquidationError::Unauthorized(_))));

    let cancelled = m
        .coordinator
        .cancel_liquidation(&m.roles, &caller("gov"), ticket.id, &mut m.positions, m.now)
        .unwrap();
    assert_eq!(cancelled.abort_reason, Some(AbortReason::Cancelled));

    let again = m
        .coordinator
        .cancel_liquidation(&m.roles, &caller("keeper"), ticket.id, &mut m.positions, m.now);
    assert!(matches!(
        again,
        Err(LiquidationError::TicketNotOpen {
            state: TicketState::Aborted,
            ..
        })
    ));
}

#[test]
fn test_one_open_ticket_per_position() {
    let mut m = Market::underwater(dec!(0));
    let first = m.begin("keeper").unwrap();

    assert!(matches!(
        m.begin("rival"),
        Err(LiquidationError::TicketAlreadyOpen { .. })
    ));

    // Once the first ticket's window passes, a new begin replaces it
    m.now = first.expires_at;
    let second = m.begin("rival").unwrap();
    assert_eq!(m.state_of(&first), TicketState::Aborted);
    assert_eq!(m.coordinator.open_ticket_for(m.position).unwrap().id, second.id);
}

#[test]
fn test_open_ticket_blocks_borrow_and_withdraw() {
    let mut m = Market::underwater(dec!(0));
    m.begin("keeper").unwrap();

    let borrow = m.positions.borrow(
        &caller("alice"),
        m.position,
        1,
        &mut m.reserve,
        &m.oracle,
        m.now,
    );
    assert!(matches!(borrow, Err(PositionError::PositionLocked(_))));

    let withdraw = m.positions.withdraw_collateral(
        &caller("alice"),
        m.position,
        &item("PUNKS#1"),
        &mut m.reserve,
        &m.oracle,
        m.now,
    );
    assert!(matches!(withdraw, Err(PositionError::PositionLocked(_))));
}

#[test]
fn test_ticket_book_restores_open_index() {
    let mut m = Market::underwater(dec!(0));
    let ticket = m.begin("keeper").unwrap();

    let json = serde_json::to_string(m.coordinator.book()).unwrap();
    let restored = LiquidationCoordinator::from_book(
        LiquidationConfig::default(),
        serde_json::from_str(&json).unwrap(),
    )
    .unwrap();
    assert_eq!(restored.open_ticket_for(m.position).unwrap().id, ticket.id);
}

#[derive(Debug, Clone)]
enum Action {
    Finalize,
    FinalizeWrong,
    Cancel,
    Expire,
    Repay,
    Wait(i64),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Finalize),
        Just(Action::FinalizeWrong),
        Just(Action::Cancel),
        Just(Action::Expire),
        Just(Action::Repay),
        (1i64..400).prop_map(Action::Wait),
    ]
}

proptest! {
    /// A ticket leaves OPEN exactly once and never changes afterwards
    #[test]
    fn prop_ticket_closes_exactly_once(actions in proptest::collection::vec(action(), 1..25)) {
        let mut m = Market::underwater(dec!(0));
        let ticket = m.begin("keeper").unwrap();
        let mut settled: Option<TicketState> = None;
        let mut commits = 0;

        for action in actions {
            let result = match action {
                Action::Finalize => m.finalize(&ticket, ticket.debt_snapshot).map(|_| true),
                Action::FinalizeWrong => m.finalize(&ticket, ticket.debt_snapshot + 1).map(|_| true),
                Action::Cancel => m
                    .coordinator
                    .cancel_liquidation(&m.roles, &caller("keeper"), ticket.id, &mut m.positions, m.now)
                    .map(|_| false),
                Action::Expire => m
                    .coordinator
                    .expire_ticket(ticket.id, &mut m.positions, m.now)
                    .map(|_| false),
                Action::Repay => {
                    let _ = m.repay(1);
                    Ok(false)
                }
                Action::Wait(secs) => {
                    m.now += Duration::seconds(secs);
                    Ok(false)
                }
            };
            if let Ok(true) = result {
                commits += 1;
            }

            let state = m.state_of(&ticket);
            match settled {
                Some(previous) => prop_assert_eq!(state, previous),
                None if state != TicketState::Open => settled = Some(state),
                None => {}
            }
        }

        prop_assert!(commits <= 1);
        if commits == 1 {
            prop_assert_eq!(settled, Some(TicketState::Committed));
        }
    }
}
