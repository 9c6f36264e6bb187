/// CLI interface and commands.

/// Common functions for CLI.
pub mod common;

/// Single-host and bulk command execution.
pub mod exec;

/// Server groups and tags.
pub mod group;

/// Adding, editing and removing servers.
pub mod server;

/// Shortcuts for common single-server checks.
pub mod quick;

/// Server and command aliases.
pub mod alias;

/// Config file inspection and editing.
pub mod settings;

/// History and audit browsing.
pub mod records;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "remotex")]
#[command(version)]
#[command(about = "🚀 Run commands on many SSH servers in parallel")]
pub struct Cli {
    /// Config file, defaults to ~/.remotex/config.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Log at info level and report retries
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🖥️  List configured servers
    List,
    /// 🛠️  Add, edit, inspect and remove servers
    #[command(subcommand)]
    Server(server::ServerAction),
    /// ▶️  Run a command on one server
    Exec(exec::ExecCommand),
    /// 🌐 Run a command on every configured server
    ExecAll(exec::ExecAllCommand),
    /// 🎯 Run a command on a comma separated list of servers
    ExecMulti(exec::ExecMultiCommand),
    /// 👥 Run a command on every server of a group
    ExecGroup(exec::ExecGroupCommand),
    /// 🏷️  Run a command on every server carrying a tag
    ExecTag(exec::ExecTagCommand),
    /// 👥 Manage server groups
    #[command(subcommand)]
    Group(group::GroupAction),
    /// 🏷️  Manage server tags
    #[command(subcommand)]
    Tag(group::TagAction),
    /// 🔗 Manage server aliases
    #[command(subcommand)]
    Alias(alias::AliasAction),
    /// 📎 Manage command aliases (used as @name)
    #[command(subcommand)]
    CmdAlias(alias::CmdAliasAction),
    /// ⚙️  Show, validate and edit the config file
    #[command(subcommand)]
    Config(settings::ConfigAction),
    /// 📜 Browse command history
    #[command(subcommand)]
    History(records::HistoryAction),
    /// 🔍 Browse the audit log
    #[command(subcommand)]
    Audit(records::AuditAction),
    /// 📊 Show connection pool statistics
    PoolStats(exec::PoolStatsCommand),
    #[command(flatten)]
    Quick(quick::QuickCommand),
}
