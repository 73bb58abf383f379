//! Lendkit Market - Single entry point
//!
//! `Market` owns one instance of every component and is the only place
//! that reads the clock. Each entry point reads "now" once, checks the
//! caller, drives the components, and queues the resulting events in an
//! outbox once state is consistent again.

pub mod config;
pub mod error;
pub mod market;
pub mod state;

pub use config::MarketConfig;
pub use error::{ErrorKind, MarketError};
pub use market::{Market, Stamped};
pub use state::MarketState;
