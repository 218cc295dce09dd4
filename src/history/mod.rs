// src/history/mod.rs

use crate::error::Result;
use crate::protocol::{ExecutionResult, Plan};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One execution attempt, as written to the audit log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: DateTime<Utc>,
    pub host: String,
    pub instruction: String,
    pub plan: Plan,
    pub results: Vec<ExecutionResult>,
}

impl HistoryEntry {
    pub fn new(host: &str, instruction: &str, plan: Plan, results: Vec<ExecutionResult>) -> Self {
        Self {
            ts: Utc::now(),
            host: host.to_string(),
            instruction: instruction.to_string(),
            plan,
            results,
        }
    }
}

/// Append-only audit record. Entries are never rewritten.
pub trait HistoryLog {
    fn append(&self, entry: &HistoryEntry) -> Result<()>;

    /// Up to `limit` most recent entries, oldest first.
    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>>;
}

/// JSON-lines file, one entry per line.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonlHistory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryLog for JsonlHistory {
    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable history line"),
            }
        }
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }
}

/// Process-local log, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl HistoryLog for InMemoryHistory {
    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }
}
