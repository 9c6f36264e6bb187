/// Persistent command history, kept as a capped JSON document.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::sink::{ExecutionSink, OperationRecord};

pub const FILE_NAME: &str = "history.json";
pub const MAX_ENTRIES: usize = 1000;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    /// UTC, ISO-8601 with a trailing `Z`
    pub timestamp: String,
    /// Command type, e.g. "exec-all"
    pub command: String,
    pub args: Vec<String>,
    pub hosts: Vec<String>,
    pub success: bool,
    pub full_command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    commands: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub limit: Option<usize>,
    pub host: Option<String>,
    pub command: Option<String>,
    /// ISO-8601 lower bound, compared lexically
    pub since: Option<String>,
}

impl HistoryFilter {
    fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(ref host) = self.host {
            if !entry.hosts.contains(host) {
                return false;
            }
        }
        if let Some(ref command) = self.command {
            if &entry.command != command {
                return false;
            }
        }
        if let Some(ref since) = self.since {
            if entry.timestamp.as_str() < since.as_str() {
                return false;
            }
        }
        true
    }
}

pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: MAX_ENTRIES,
            lock: Mutex::new(()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and return its id. Oldest entries are dropped past
    /// the cap.
    pub fn add(
        &self,
        command: &str,
        args: &[String],
        hosts: &[String],
        success: bool,
        metadata: BTreeMap<String, Value>,
    ) -> Result<u64, HistoryError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut data = self.read()?;

        let id = data.commands.last().map_or(1, |last| last.id + 1);
        let full_command = if args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, shell_words::join(args))
        };

        data.commands.push(HistoryEntry {
            id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            command: command.to_string(),
            args: args.to_vec(),
            hosts: hosts.to_vec(),
            success,
            full_command,
            metadata,
        });

        if data.commands.len() > self.max_entries {
            let excess = data.commands.len() - self.max_entries;
            data.commands.drain(..excess);
        }

        self.write(&data)?;
        Ok(id)
    }

    /// Matching entries, oldest first, keeping only the most recent `limit`.
    pub fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, HistoryError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<HistoryEntry> = self
            .read()?
            .commands
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect();

        if let Some(limit) = filter.limit {
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }
        Ok(entries)
    }

    pub fn get(&self, id: u64) -> Result<Option<HistoryEntry>, HistoryError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.commands.into_iter().find(|entry| entry.id == id))
    }

    pub fn len(&self) -> Result<usize, HistoryError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.commands.len())
    }

    pub fn clear(&self) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(&HistoryFile::default())
    }

    pub fn export(&self, dest: &Path) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let data = self.read()?;
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(dest, serde_json::to_string_pretty(&data)?)?;
        Ok(())
    }

    fn read(&self) -> Result<HistoryFile, HistoryError> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, data: &HistoryFile) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(data)?)?;
        Ok(())
    }
}

impl ExecutionSink for HistoryStore {
    fn name(&self) -> &str {
        "history"
    }

    fn record(&self, record: &OperationRecord<'_>) -> anyhow::Result<()> {
        self.add(
            record.command_type,
            &[record.command.to_string()],
            record.hosts,
            record.all_succeeded(),
            record.metadata.clone(),
        )?;
        Ok(())
    }
}
