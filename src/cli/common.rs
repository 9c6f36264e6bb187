/// Common functions for CLI.
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::executor::{ConnectionSource, HostExecutor};
use crate::history::{self, HistoryStore};
use crate::pool::ConnectionPool;
use crate::resolve::{CachedResolver, HostResolver, RESOLVE_TTL};
use crate::sink::Sinks;
use crate::ssh::SshConnector;

/// Everything a command needs: the loaded config and the process-wide pool.
pub struct App {
    pub config: Config,
    pub config_path: PathBuf,
    pub verbose: bool,
    pub connector: Arc<SshConnector>,
    pub pool: Arc<ConnectionPool>,
}

impl App {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        verbose: bool,
        connector: Arc<SshConnector>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            config,
            config_path,
            verbose,
            connector,
            pool,
        }
    }

    /// Directory holding history and audit files, next to the config file.
    pub fn data_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path)
    }

    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.data_dir().join(history::FILE_NAME))
    }

    pub fn audit_log(&self) -> AuditLog {
        AuditLog::new(
            self.data_dir().join(audit::FILE_NAME),
            self.config.defaults.audit_enabled,
        )
    }

    pub fn sinks(&self) -> Sinks {
        Sinks::new()
            .with_sink(Box::new(self.history()))
            .with_sink(Box::new(self.audit_log()))
    }

    pub fn executor(&self) -> HostExecutor {
        let resolver: Arc<dyn HostResolver> = Arc::new(CachedResolver::new(
            Arc::new(self.config.clone()),
            RESOLVE_TTL,
        ));
        HostExecutor::new(resolver, ConnectionSource::Pooled(Arc::clone(&self.pool)))
            .with_verbose(self.verbose)
    }

    /// Ask for the password of every host configured with `use_password`
    /// and no stored secret. Done up front so workers never block on input.
    pub fn prompt_passwords(&self, hosts: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        for host in hosts {
            if !seen.insert(host.as_str()) || self.connector.has_password(host) {
                continue;
            }
            let Some(srv_cfg) = self.config.resolve(host) else {
                continue;
            };
            if !srv_cfg.needs_password_prompt() {
                continue;
            }

            eprint!(
                "🔐 Password for {} ({}@{}:{}): ",
                host,
                srv_cfg.username,
                srv_cfg.host,
                srv_cfg.port()
            );
            std::io::stderr().flush().ok();
            let password = rpassword::read_password().context("Failed to read password")?;
            self.connector.set_password(host, password);
        }
        Ok(())
    }

    pub fn require_server(&self, name: &str) -> Result<String> {
        let resolved = self
            .config
            .resolve_server(Some(name))
            .unwrap_or_else(|| name.to_string());
        if self.config.server.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(anyhow!("Server '{}' not found in config", name))
        }
    }
}

/// List all servers.
pub fn list_servers(config: &Config) {
    if config.server.is_empty() {
        println!("📝 No servers configured");
        return;
    }

    println!("\n🖥️  Configured Servers ({})", config.server.len());
    println!("{}", "─".repeat(50));

    for (name, srv_cfg) in config.server.iter() {
        let auth_type = if srv_cfg.use_password.unwrap_or(false) {
            "🔐 Password"
        } else {
            "🔑 Key"
        };
        let default = if config.default_server.as_deref() == Some(name.as_str()) {
            " *"
        } else {
            ""
        };

        println!(
            "  {}{} - {}@{}:{} ({})",
            name,
            default,
            srv_cfg.username,
            srv_cfg.host,
            srv_cfg.port(),
            auth_type
        );

        let tags = config.server_tags(name);
        if !tags.is_empty() {
            println!("      tags: {}", tags.join(", "));
        }
    }

    println!("{}", "─".repeat(50));
}

/// Progress bar for a bulk run, drawn on stderr.
pub fn progress_bar(total: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
