//! Lendkit Events - JSONL journal
//!
//! Every committed market operation, and every aborted liquidation ticket,
//! is published as a `MarketEvent`. The store appends them as hash-chained
//! records to one JSONL file per day; the reader replays and verifies them.

pub mod error;
pub mod event;
pub mod reader;
pub mod record;
pub mod store;

pub use error::{ChainError, EventError};
pub use event::MarketEvent;
pub use reader::EventReader;
pub use record::{verify_chain, EventRecord, GENESIS};
pub use store::EventStore;
