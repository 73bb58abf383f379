//! Hash-chained journal records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ChainError, EventError};
use crate::event::MarketEvent;

/// `prev_hash` of the first record
pub const GENESIS: &str = "GENESIS";

/// One journal line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Starts at 1, no gaps
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
    pub event: MarketEvent,
}

impl EventRecord {
    /// Build a record and compute its hash
    pub fn seal(
        sequence: u64,
        prev_hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        event: MarketEvent,
    ) -> Result<Self, EventError> {
        let mut record = Self {
            sequence,
            timestamp,
            prev_hash: prev_hash.into(),
            hash: String::new(),
            event,
        };
        record.hash = record.calculate_hash()?;
        Ok(record)
    }

    /// SHA256 over every field except `hash`
    pub fn calculate_hash(&self) -> Result<String, EventError> {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(serde_json::to_vec(&self.event)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Check links, hashes and sequence numbers of a full journal
pub fn verify_chain(records: &[EventRecord]) -> Result<(), EventError> {
    let mut prev_hash = GENESIS.to_string();
    let mut expected_sequence = 1;

    for record in records {
        if record.sequence != expected_sequence {
            return Err(ChainError::InvalidSequence {
                expected: expected_sequence,
                actual: record.sequence,
            }
            .into());
        }
        if record.prev_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                sequence: record.sequence,
                expected: prev_hash,
                actual: record.prev_hash.clone(),
            }
            .into());
        }
        let calculated = record.calculate_hash()?;
        if record.hash != calculated {
            return Err(ChainError::InvalidHash {
                sequence: record.sequence,
                expected: calculated,
                actual: record.hash.clone(),
            }
            .into());
        }

        prev_hash = record.hash.clone();
        expected_sequence += 1;
    }

    Ok(())
}
