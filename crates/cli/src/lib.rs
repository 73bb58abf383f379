//! Lendkit CLI - command orchestration over a data directory
//!
//! A data directory holds `config.json`, `roles.json`, `state.json` and a
//! `journal/` of hash-chained events. Each command opens the market,
//! performs one operation, then persists state before appending events.

pub mod commands;
pub mod context;

pub use context::AppContext;
