//! JSONL event reader - sequential reader for replay

use crate::error::EventError;
use crate::record::{verify_chain, EventRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Sequential reader over every journal file, oldest first
pub struct EventReader {
    files: Vec<PathBuf>,
}

impl EventReader {
    /// Collect the `*.jsonl` files of a directory; a missing directory is empty
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        let mut files = Vec::new();

        if path.exists() {
            for entry in std::fs::read_dir(path)? {
                let file_path = entry?.path();
                if file_path.extension().is_some_and(|ext| ext == "jsonl") {
                    files.push(file_path);
                }
            }
        }

        // Names are dates, so lexical order is chronological
        files.sort();

        Ok(Self { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read all records from all files in order
    pub fn read_all(&self) -> Result<Vec<EventRecord>, EventError> {
        let mut records = Vec::new();
        for file_path in &self.files {
            read_file(file_path, &mut records)?;
        }
        Ok(records)
    }

    /// Read all records and verify the hash chain
    pub fn read_verified(&self) -> Result<Vec<EventRecord>, EventError> {
        let records = self.read_all()?;
        verify_chain(&records)?;
        Ok(records)
    }

    /// Last record of the newest file
    pub fn last_record(&self) -> Result<Option<EventRecord>, EventError> {
        for file_path in self.files.iter().rev() {
            let mut records = Vec::new();
            read_file(file_path, &mut records)?;
            if let Some(last) = records.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }

    /// Count records across all files
    pub fn count(&self) -> Result<usize, EventError> {
        let mut count = 0;
        for file_path in &self.files {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines() {
                if !line?.trim().is_empty() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

fn read_file(path: &Path, out: &mut Vec<EventRecord>) -> Result<(), EventError> {
    let reader = BufReader::new(File::open(path)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| EventError::InvalidFile {
            file: path.display().to_string(),
            line: index + 1,
            reason: e.to_string(),
        })?;
        out.push(record);
    }
    Ok(())
}
