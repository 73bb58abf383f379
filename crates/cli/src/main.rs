//! Lendkit CLI - Main entry point

use clap::{Parser, Subcommand};
use lendkit_cli::{commands, AppContext};
use lendkit_core::{Caller, Principal, Role, SystemClock};
use lendkit_market::MarketConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lendkit")]
#[command(about = "Lendkit - collateralized lending engine", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Principal performing the command
    #[arg(long = "as", global = true, default_value = "operator")]
    principal: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a market; the acting principal becomes governor
    Init {
        /// Market config JSON (defaults apply to missing fields)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grant a role (governor only)
    Grant {
        principal: String,
        /// feeder, governor, liquidator or participant
        role: Role,
    },

    /// Submit a price (feeder), or force one with --reset (governor)
    Price {
        asset: String,
        value: u128,
        #[arg(long)]
        reset: bool,
    },

    /// Pull prices from a JSON feed file and submit them as a feeder
    Relay {
        feed: PathBuf,
        /// Assets to poll
        #[arg(required = true)]
        assets: Vec<String>,
    },

    /// Deposit liquidity into the pool
    Supply { amount: u128 },

    /// Redeem pool shares
    Redeem { shares: u128 },

    /// Open a position with a collateral item (ASSET#SERIAL)
    Open { item: String },

    /// Add a collateral item to a position
    Deposit { position: u64, item: String },

    /// Take a collateral item back out of a position
    Withdraw { position: u64, item: String },

    /// Borrow against a position
    Borrow { position: u64, amount: u128 },

    /// Repay position debt
    Repay { position: u64, amount: u128 },

    /// Two-step liquidation
    Liquidate {
        #[command(subcommand)]
        action: LiquidateAction,
    },

    /// Show pool, oracle and positions, or one position in detail
    Status {
        #[arg(long)]
        position: Option<u64>,
    },

    /// Show journal events
    Events {
        /// Maximum number of events to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Verify the hash chain first
        #[arg(long)]
        verify: bool,
    },
}

#[derive(Subcommand)]
enum LiquidateAction {
    /// Snapshot an undercollateralized position into a ticket
    Begin { position: u64 },
    /// Commit a ticket if nothing moved since it was opened
    Finalize { ticket: u64, expected_debt: u128 },
    /// Withdraw a ticket (opener or governor)
    Cancel { ticket: u64 },
    /// Expire a ticket past its window, or all stale ones
    Expire { ticket: Option<u64> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, principal = %cli.principal, "Command started");

    let principal = Principal::new(&cli.principal)?;
    let caller = Caller::new(principal.clone());
    let clock = Arc::new(SystemClock);

    let command = match cli.command {
        Commands::Init { config } => {
            let config = match config {
                Some(path) => MarketConfig::from_file(&path)?,
                None => MarketConfig::default(),
            };
            let ctx = AppContext::init(&cli.data, config, principal, clock)?;
            println!(
                "✅ Market initialized in {} (lending {})",
                ctx.data_path().display(),
                ctx.market.config().borrow_asset
            );
            return Ok(());
        }
        command => command,
    };

    let mut ctx = AppContext::open(&cli.data, clock)?;

    match command {
        Commands::Init { .. } => anyhow::bail!("Market already initialized"),
        Commands::Grant { principal, role } => commands::grant(&mut ctx, &caller, &principal, role)?,
        Commands::Price { asset, value, reset } => commands::price(&mut ctx, &caller, &asset, value, reset)?,
        Commands::Relay { feed, assets } => commands::relay(&mut ctx, &caller, &feed, &assets).await?,
        Commands::Supply { amount } => commands::supply(&mut ctx, &caller, amount)?,
        Commands::Redeem { shares } => commands::redeem(&mut ctx, &caller, shares)?,
        Commands::Open { item } => commands::open(&mut ctx, &caller, &item)?,
        Commands::Deposit { position, item } => commands::deposit(&mut ctx, &caller, position, &item)?,
        Commands::Withdraw { position, item } => commands::withdraw(&mut ctx, &caller, position, &item)?,
        Commands::Borrow { position, amount } => commands::borrow(&mut ctx, &caller, position, amount)?,
        Commands::Repay { position, amount } => commands::repay(&mut ctx, &caller, position, amount)?,
        Commands::Liquidate { action } => match action {
            LiquidateAction::Begin { position } => commands::liquidate_begin(&mut ctx, &caller, position)?,
            LiquidateAction::Finalize {
                ticket,
                expected_debt,
            } => commands::liquidate_finalize(&mut ctx, &caller, ticket, expected_debt)?,
            LiquidateAction::Cancel { ticket } => commands::liquidate_cancel(&mut ctx, &caller, ticket)?,
            LiquidateAction::Expire { ticket } => commands::liquidate_expire(&mut ctx, ticket)?,
        },
        Commands::Status { position } => commands::status(&ctx, position)?,
        Commands::Events { limit, verify } => commands::events(&ctx, limit, verify)?,
    }

    Ok(())
}
