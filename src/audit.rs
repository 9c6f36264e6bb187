/// Append-only audit trail of bulk operations, one JSON object per line.
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sink::{ExecutionSink, OperationRecord};

pub const FILE_NAME: &str = "audit.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostOutcome {
    pub success: bool,
    pub exit_code: i64,
    pub output_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub unix_time: i64,
    pub user: String,
    pub command_type: String,
    pub command: String,
    pub hosts: Vec<String>,
    pub host_count: usize,
    pub results: BTreeMap<String, HostOutcome>,
    pub summary: AuditSummary,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl AuditEntry {
    pub fn from_record(record: &OperationRecord<'_>, user: &str) -> Self {
        let now = Utc::now();
        let results = record
            .results
            .iter()
            .map(|r| {
                (
                    r.host().to_string(),
                    HostOutcome {
                        success: r.is_success(),
                        exit_code: r.exit_code(),
                        output_length: r.stdout().len(),
                    },
                )
            })
            .collect();
        let succeeded = record.succeeded();

        Self {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            unix_time: now.timestamp(),
            user: user.to_string(),
            command_type: record.command_type.to_string(),
            command: record.command.to_string(),
            hosts: record.hosts.to_vec(),
            host_count: record.hosts.len(),
            results,
            summary: AuditSummary {
                total: record.results.len(),
                succeeded,
                failed: record.results.len() - succeeded,
            },
            metadata: record.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user: Option<String>,
    pub command_type: Option<String>,
    pub host: Option<String>,
    /// ISO-8601 lower bound
    pub since: Option<String>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.user.as_ref().map_or(true, |u| &entry.user == u)
            && self
                .command_type
                .as_ref()
                .map_or(true, |t| &entry.command_type == t)
            && self.host.as_ref().map_or(true, |h| entry.hosts.contains(h))
            && self
                .since
                .as_ref()
                .map_or(true, |s| entry.timestamp.as_str() >= s.as_str())
    }
}

pub struct AuditLog {
    path: PathBuf,
    enabled: bool,
    user: String,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            user: current_user(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create '{}'", parent.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log '{}'", self.path.display()))?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(())
    }

    /// The last `n` entries, oldest first. Unparsable lines are skipped.
    pub fn recent(&self, n: usize) -> Result<Vec<AuditEntry>> {
        let mut entries = self.read_all()?;
        if entries.len() > n {
            entries.drain(..entries.len() - n);
        }
        Ok(entries)
    }

    pub fn search(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect())
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read audit log '{}'", self.path.display()))?;
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::debug!("Skipping malformed audit line: {}", e);
                    None
                }
            })
            .collect())
    }
}

impl ExecutionSink for AuditLog {
    fn name(&self) -> &str {
        "audit"
    }

    fn record(&self, record: &OperationRecord<'_>) -> Result<()> {
        self.append(&AuditEntry::from_record(record, &self.user))
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ExecutionResult;
    use crate::ssh::CommandOutput;

    fn results() -> Vec<ExecutionResult> {
        vec![
            ExecutionResult::completed(
                "web01",
                CommandOutput {
                    stdout: b"up 3 days\n".to_vec(),
                    stderr: vec![],
                    exit_status: Some(0),
                },
            ),
            ExecutionResult::failed("db01", "Failed to connect: refused"),
        ]
    }

    fn record_into(log: &AuditLog, command_type: &str, hosts: &[String]) {
        let results = results();
        let metadata = BTreeMap::new();
        log.record(&OperationRecord {
            command_type,
            command: "uptime",
            hosts,
            results: &results,
            metadata: &metadata,
        })
        .unwrap();
    }

    #[test]
    fn test_entry_shape() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"), true).with_user("alice");
        let hosts = vec!["web01".to_string(), "db01".to_string()];

        record_into(&log, "exec-multi", &hosts);

        let entries = log.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.user, "alice");
        assert_eq!(entry.host_count, 2);
        assert_eq!(
            entry.summary,
            AuditSummary {
                total: 2,
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(entry.results["web01"].output_length, 10);
        assert_eq!(entry.results["db01"].exit_code, -1);
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"), false);

        record_into(&log, "exec-all", &["web01".to_string()]);

        assert!(!log.path().exists());
        assert!(log.recent(5).unwrap().is_empty());
    }

    #[test]
    fn test_recent_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"), true).with_user("bob");

        record_into(&log, "exec-all", &["web01".to_string()]);
        record_into(&log, "exec-group", &["db01".to_string()]);
        record_into(&log, "exec-group", &["web01".to_string()]);

        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].hosts, vec!["db01"]);

        let groups = log
            .search(&AuditFilter {
                command_type: Some("exec-group".into()),
                host: Some("web01".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(groups.len(), 1);

        let nobody = log
            .search(&AuditFilter {
                user: Some("mallory".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(nobody.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"), true);
        record_into(&log, "exec-all", &["web01".to_string()]);

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "not json").unwrap();

        assert_eq!(log.recent(10).unwrap().len(), 1);
    }
}
