//! JSONL event store - append-only writer

use crate::error::EventError;
use crate::event::MarketEvent;
use crate::reader::EventReader;
use crate::record::{EventRecord, GENESIS};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only JSONL journal, one file per UTC day
pub struct EventStore {
    base_path: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
    last_sequence: u64,
    last_hash: String,
}

impl EventStore {
    /// Open (or create) a journal directory and resume its chain
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, EventError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let (last_sequence, last_hash) = match EventReader::from_directory(&base_path)?.last_record()? {
            Some(record) => (record.sequence, record.hash),
            None => (0, GENESIS.to_string()),
        };

        Ok(Self {
            base_path,
            current_file: None,
            current_date: None,
            last_sequence,
            last_hash,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Sequence of the last appended record (0 when empty)
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Seal and append one event
    pub fn append(&mut self, timestamp: DateTime<Utc>, event: MarketEvent) -> Result<EventRecord, EventError> {
        let sequence = self.last_sequence + 1;
        let record = EventRecord::seal(sequence, self.last_hash.clone(), timestamp, event)?;

        let date = timestamp.format("%Y-%m-%d").to_string();
        if self.current_date.as_ref() != Some(&date) {
            self.rotate_file(&date)?;
        }

        if let Some(ref mut writer) = self.current_file {
            let json = serde_json::to_string(&record)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        self.last_sequence = sequence;
        self.last_hash = record.hash.clone();
        tracing::debug!(sequence, kind = record.event.kind(), "Event appended");
        Ok(record)
    }

    /// Append a batch in order; stops at the first failure
    pub fn append_all(
        &mut self,
        timestamp: DateTime<Utc>,
        events: impl IntoIterator<Item = MarketEvent>,
    ) -> Result<Vec<EventRecord>, EventError> {
        events
            .into_iter()
            .map(|event| self.append(timestamp, event))
            .collect()
    }

    fn rotate_file(&mut self, date: &str) -> Result<(), EventError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }

        let file_path = self.base_path.join(format!("{}.jsonl", date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        self.current_file = Some(BufWriter::new(file));
        self.current_date = Some(date.to_string());
        Ok(())
    }

    /// List all JSONL files in the store
    pub fn list_files(&self) -> Result<Vec<PathBuf>, EventError> {
        Ok(EventReader::from_directory(&self.base_path)?.files().to_vec())
    }

    /// Flush and close the current file
    pub fn close(&mut self) -> Result<(), EventError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;
        self.current_date = None;
        Ok(())
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
