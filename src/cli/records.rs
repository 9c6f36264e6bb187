use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use crossterm::style::Stylize;

use crate::audit::{AuditEntry, AuditFilter};
use crate::cli::common::App;
use crate::exit_codes::ExitCode;
use crate::history::{HistoryEntry, HistoryFilter};

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryAction {
    /// List recent commands
    List {
        /// Show at most this many entries
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Only commands that ran on this server
        #[arg(long)]
        host: Option<String>,
        /// Only this command type, e.g. exec-all
        #[arg(long)]
        command: Option<String>,
        /// Only entries at or after this ISO-8601 time
        #[arg(long)]
        since: Option<String>,
    },
    /// Show one entry in full
    Show { id: u64 },
    /// Delete all history
    Clear,
    /// Write the history to a JSON file
    Export { file: PathBuf },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuditAction {
    /// Show the latest audit entries
    Recent {
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
    /// Search the audit log
    Search {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        command_type: Option<String>,
        #[arg(long)]
        host: Option<String>,
        /// ISO-8601 lower bound
        #[arg(long)]
        since: Option<String>,
    },
}

impl HistoryAction {
    pub fn execute(&self, app: &App) -> Result<ExitCode> {
        let store = app.history();
        match self {
            HistoryAction::List {
                limit,
                host,
                command,
                since,
            } => {
                let entries = store.list(&HistoryFilter {
                    limit: Some(*limit),
                    host: host.clone(),
                    command: command.clone(),
                    since: since.clone(),
                })?;
                if entries.is_empty() {
                    println!("📝 No history");
                }
                for entry in entries.iter() {
                    print_history_line(entry);
                }
            }
            HistoryAction::Show { id } => {
                let entry = store
                    .get(*id)?
                    .ok_or_else(|| anyhow!("History entry {} not found", id))?;
                println!("{}", serde_json::to_string_pretty(&entry)?);
            }
            HistoryAction::Clear => {
                store.clear()?;
                println!("🗑️  History cleared");
            }
            HistoryAction::Export { file } => {
                store.export(file)?;
                println!("📤 History exported to {}", file.display());
            }
        }
        Ok(ExitCode::Success)
    }
}

fn print_history_line(entry: &HistoryEntry) {
    let mark = if entry.success {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{:>5}  {}  {}  {}  ({} hosts)",
        entry.id,
        entry.timestamp,
        mark,
        entry.full_command,
        entry.hosts.len()
    );
}

impl AuditAction {
    pub fn execute(&self, app: &App) -> Result<ExitCode> {
        let log = app.audit_log();
        let entries = match self {
            AuditAction::Recent { count } => log.recent(*count)?,
            AuditAction::Search {
                user,
                command_type,
                host,
                since,
            } => log.search(&AuditFilter {
                user: user.clone(),
                command_type: command_type.clone(),
                host: host.clone(),
                since: since.clone(),
            })?,
        };

        if entries.is_empty() {
            println!("📝 No audit entries");
        }
        for entry in entries.iter() {
            print_audit_line(entry);
        }
        Ok(ExitCode::Success)
    }
}

fn print_audit_line(entry: &AuditEntry) {
    println!(
        "{}  {}  {}  '{}'  {}/{} ok on {} hosts",
        entry.timestamp,
        entry.user.as_str().cyan(),
        entry.command_type,
        entry.command,
        entry.summary.succeeded,
        entry.summary.total,
        entry.host_count
    );
}
