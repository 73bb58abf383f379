//! CLI commands

use lendkit_core::{AssetId, Caller, ItemId, PositionId, Principal, Role, TicketId};
use lendkit_events::EventReader;
use lendkit_oracle::{FeedRelay, JsonFileFeed};
use std::path::Path;

use crate::context::AppContext;

fn parse_asset(code: &str) -> Result<AssetId, anyhow::Error> {
    Ok(code.parse()?)
}

fn parse_item(item: &str) -> Result<ItemId, anyhow::Error> {
    Ok(item.parse()?)
}

/// Grant a role to a principal
pub fn grant(ctx: &mut AppContext, caller: &Caller, principal: &str, role: Role) -> Result<(), anyhow::Error> {
    let principal = Principal::new(principal)?;
    ctx.grant(caller, principal.clone(), role)?;
    println!("✅ Granted {} to {}", role, principal);
    Ok(())
}

/// Submit a price as a feeder, or force one through as a governor
pub fn price(
    ctx: &mut AppContext,
    caller: &Caller,
    asset: &str,
    value: u128,
    reset: bool,
) -> Result<(), anyhow::Error> {
    let asset = parse_asset(asset)?;
    let now = ctx.market.now();
    let quote = if reset {
        ctx.market.reset_price(caller, asset, value, now)?
    } else {
        ctx.market.submit_price(caller, asset, value, now)?
    };
    ctx.commit()?;
    println!(
        "✅ {} = {} (version {})",
        quote.asset, quote.value, quote.source_version
    );
    Ok(())
}

/// Pull prices from a JSON feed file and submit them as `caller`
pub async fn relay(
    ctx: &mut AppContext,
    caller: &Caller,
    feed: &Path,
    assets: &[String],
) -> Result<(), anyhow::Error> {
    let assets = assets
        .iter()
        .map(|code| parse_asset(code))
        .collect::<Result<Vec<_>, _>>()?;
    let relay = FeedRelay::new(JsonFileFeed::new(feed), assets);

    let market = &mut ctx.market;
    let report = relay
        .run_once(|price| {
            market
                .submit_price(caller, price.asset.clone(), price.value, price.source_timestamp)
                .map(|_| ())
        })
        .await;
    ctx.commit()?;

    println!("✅ Relayed {} prices", report.accepted.len());
    for (asset, reason) in report.rejected.iter().chain(report.unavailable.iter()) {
        println!("   ⚠️  {}: {}", asset, reason);
    }
    Ok(())
}

/// Deposit liquidity into the pool
pub fn supply(ctx: &mut AppContext, caller: &Caller, amount: u128) -> Result<(), anyhow::Error> {
    let shares = ctx.market.supply(caller, amount)?;
    ctx.commit()?;
    println!("✅ Supplied {} for {} shares", amount, shares);
    Ok(())
}

/// Redeem pool shares
pub fn redeem(ctx: &mut AppContext, caller: &Caller, shares: u128) -> Result<(), anyhow::Error> {
    let amount = ctx.market.redeem(caller, shares)?;
    ctx.commit()?;
    println!("✅ Redeemed {} shares for {}", shares, amount);
    Ok(())
}

/// Open a position with its first collateral item
pub fn open(ctx: &mut AppContext, caller: &Caller, item: &str) -> Result<(), anyhow::Error> {
    let position = ctx.market.open_position(caller, parse_item(item)?)?;
    ctx.commit()?;
    println!("✅ Opened {} with {}", position, item);
    Ok(())
}

pub fn deposit(ctx: &mut AppContext, caller: &Caller, position: u64, item: &str) -> Result<(), anyhow::Error> {
    let position = PositionId(position);
    ctx.market
        .deposit_collateral(caller, position, parse_item(item)?)?;
    ctx.commit()?;
    println!("✅ Deposited {} into {}", item, position);
    Ok(())
}

pub fn withdraw(ctx: &mut AppContext, caller: &Caller, position: u64, item: &str) -> Result<(), anyhow::Error> {
    let position = PositionId(position);
    let outcome = ctx
        .market
        .withdraw_collateral(caller, position, &parse_item(item)?)?;
    ctx.commit()?;
    println!("✅ Withdrew {} from {}", outcome.item, position);
    if outcome.closed {
        println!("   Position closed");
    }
    Ok(())
}

pub fn borrow(ctx: &mut AppContext, caller: &Caller, position: u64, amount: u128) -> Result<(), anyhow::Error> {
    let position = PositionId(position);
    let outcome = ctx.market.borrow(caller, position, amount)?;
    ctx.commit()?;
    println!(
        "✅ {} borrowed {} (debt {}, collateral {} at price version {})",
        position, amount, outcome.debt, outcome.valuation.collateral_value, outcome.valuation.price_version
    );
    Ok(())
}

pub fn repay(ctx: &mut AppContext, caller: &Caller, position: u64, amount: u128) -> Result<(), anyhow::Error> {
    let position = PositionId(position);
    let receipt = ctx.market.repay(caller, position, amount)?;
    ctx.commit()?;
    println!(
        "✅ {} repaid {} (remaining debt {})",
        position, receipt.outcome.paid, receipt.debt_remaining
    );
    if receipt.outcome.refund > 0 {
        println!("   Refunded {}", receipt.outcome.refund);
    }
    if receipt.closed {
        println!("   Position closed");
    }
    Ok(())
}

pub fn liquidate_begin(ctx: &mut AppContext, caller: &Caller, position: u64) -> Result<(), anyhow::Error> {
    let ticket = ctx.market.begin_liquidation(caller, PositionId(position))?;
    ctx.commit()?;
    println!(
        "✅ Opened {} on {}: debt {}, collateral {}, expires {}",
        ticket.id, ticket.position, ticket.debt_snapshot, ticket.collateral_snapshot, ticket.expires_at
    );
    println!(
        "   Finalize with: lendkit liquidate finalize {} {}",
        ticket.id.0, ticket.debt_snapshot
    );
    Ok(())
}

/// Finalize a ticket; an abort is persisted before the error is reported
pub fn liquidate_finalize(
    ctx: &mut AppContext,
    caller: &Caller,
    ticket: u64,
    expected_debt: u128,
) -> Result<(), anyhow::Error> {
    let result = ctx
        .market
        .finalize_liquidation(caller, TicketId(ticket), expected_debt);
    ctx.commit()?;

    match result {
        Ok(settlement) => {
            println!(
                "✅ {} committed: {} items to the vault, {} repaid",
                settlement.ticket,
                settlement.items.len(),
                settlement.debt_repaid
            );
            Ok(())
        }
        Err(e) if e.is_recoverable() => {
            println!("❌ {}", e);
            println!("   Ticket aborted; begin a new liquidation to retry");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn liquidate_cancel(ctx: &mut AppContext, caller: &Caller, ticket: u64) -> Result<(), anyhow::Error> {
    let closed = ctx.market.cancel_liquidation(caller, TicketId(ticket))?;
    ctx.commit()?;
    println!("✅ Cancelled {} on {}", closed.id, closed.position);
    Ok(())
}

/// Expire one ticket, or every stale ticket when `ticket` is absent
pub fn liquidate_expire(ctx: &mut AppContext, ticket: Option<u64>) -> Result<(), anyhow::Error> {
    let expired = match ticket {
        Some(id) => vec![ctx.market.expire_ticket(TicketId(id))?.id],
        None => ctx.market.expire_stale(),
    };
    ctx.commit()?;
    println!("✅ Expired {} tickets", expired.len());
    for id in expired {
        println!("   {}", id);
    }
    Ok(())
}

/// Print pool, oracle and position state
pub fn status(ctx: &AppContext, position: Option<u64>) -> Result<(), anyhow::Error> {
    let market = &ctx.market;

    if let Some(id) = position {
        let id = PositionId(id);
        let Some(record) = market.positions().position(id) else {
            anyhow::bail!("{} not found", id);
        };
        println!("📄 {} (owner {})", id, record.owner);
        for item in &record.items {
            println!("   {}", item);
        }
        match market.health(id) {
            Ok(health) => {
                println!("   Debt:        {}", health.valuation.debt);
                println!("   Collateral:  {}", health.valuation.collateral_value);
                println!("   Borrow limit: {}", health.borrow_limit);
                println!("   Required:    {}", health.required_collateral);
                println!("   Liquidatable: {}", health.liquidatable);
            }
            Err(e) => println!("   Health unavailable: {}", e),
        }
        if let Some(ticket) = market.liquidations().open_ticket_for(id) {
            println!("   Locked by {} until {}", ticket.id, ticket.expires_at);
        }
        return Ok(());
    }

    let pool = market.pool_view();
    let reserve = market.reserve();
    println!("🏦 Pool ({})", reserve.asset());
    println!("   Deposited:   {}", pool.total_deposited);
    println!("   Shares:      {}", pool.total_shares);
    println!("   Liquidity:   {}", pool.available_liquidity);
    println!("   Receivable:  {}", pool.receivable);
    println!("   Items held:  {}", pool.items_held);
    println!("   Usage index: {}", reserve.usage_index());

    println!("📈 Oracle (version {})", market.oracle().version());
    let max_age = market.config().oracle.max_price_age();
    for (asset, quote) in &market.oracle().state().quotes {
        let fresh = market.read_price(asset, max_age).is_ok();
        let mark = if fresh { "" } else { " (unreadable)" };
        println!(
            "   {} = {} at {} (v{}){}",
            asset, quote.value, quote.observed_at, quote.source_version, mark
        );
    }

    println!("📋 Positions");
    for position in market.positions().positions() {
        let debt = market.reserve().debt_of(position.scaled_debt)?;
        let lock = if position.liquidation_flag { " [locked]" } else { "" };
        println!(
            "   {} owner={} items={} debt={}{}",
            position.id,
            position.owner,
            position.items.len(),
            debt,
            lock
        );
    }

    let open: Vec<_> = market.liquidations().open_tickets().collect();
    if !open.is_empty() {
        println!("⏳ Open tickets");
        for ticket in open {
            println!(
                "   {} on {} debt={} expires {}",
                ticket.id, ticket.position, ticket.debt_snapshot, ticket.expires_at
            );
        }
    }
    Ok(())
}

/// Print journal events, newest last
pub fn events(ctx: &AppContext, limit: usize, verify: bool) -> Result<(), anyhow::Error> {
    let reader = EventReader::from_directory(ctx.journal_path())?;
    let records = if verify {
        let records = reader.read_verified()?;
        println!("✅ Hash chain verified ({} events)", records.len());
        records
    } else {
        reader.read_all()?
    };

    let skip = records.len().saturating_sub(limit);
    for record in records.iter().skip(skip) {
        println!("{:>6}  {}  {}", record.sequence, record.timestamp, record.event);
    }
    Ok(())
}
