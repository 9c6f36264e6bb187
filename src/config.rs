/// Configuration serialization and deserialization.
use std::{
    collections::BTreeMap,
    fs::{self},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ssh::Client;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "REMOTEX_";

pub const OUTPUT_MODES: [&str; 3] = ["normal", "compact", "silent"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub keypath: Option<String>,
    pub password: Option<String>,
    pub use_password: Option<bool>,
}

impl ServerConfig {
    pub fn build_client(&self) -> Client {
        let mut client = Client::new(self.host.clone(), self.username.clone());

        client.with_port(self.port());

        if let Some(ref keypath) = self.keypath {
            client.with_private_key(keypath.clone());
        } else if let Some(ref password) = self.password {
            client.with_password(password.clone());
        }

        client
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(22)
    }

    /// Password auth requested but no password stored in the file.
    pub fn needs_password_prompt(&self) -> bool {
        self.use_password.unwrap_or(false) && self.password.is_none() && self.keypath.is_none()
    }
}

// config like:
// default_server = "web01"
//
// [defaults]
// parallel = 5
// timeout = 30
//
// [server.web01]
// host = "10.0.0.11"
// username = "deploy"
// keypath = "~/.ssh/id_ed25519"
//
// [groups]
// web = ["web01", "web02"]
//
// [tags]
// web01 = ["prod", "nginx"]
//
// [command_aliases]
// disk = "df -h"
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub default_server: Option<String>,
    pub defaults: Defaults,
    pub server: BTreeMap<String, ServerConfig>,
    /// short name -> server name
    pub aliases: BTreeMap<String, String>,
    /// group name -> server names
    pub groups: BTreeMap<String, Vec<String>>,
    /// server name -> tags
    pub tags: BTreeMap<String, Vec<String>>,
    /// alias name -> command line
    pub command_aliases: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Defaults {
    pub parallel: usize,
    /// seconds
    pub timeout: u64,
    pub retries: u32,
    pub output_mode: String,
    pub audit_enabled: bool,
    /// seconds a pooled connection may live
    pub pool_max_age: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            parallel: 5,
            timeout: 30,
            retries: 0,
            output_mode: "normal".to_string(),
            audit_enabled: true,
            pool_max_age: 600,
        }
    }
}

impl Config {
    /// Directory holding the config file, history and audit log.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".remotex"))
            .unwrap_or_else(|| PathBuf::from(".remotex"))
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load the config file, falling back to defaults when it doesn't exist,
    /// then apply `REMOTEX_*` environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load the config file without environment overrides.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&contents).map_err(anyhow::Error::from),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&contents).map_err(anyhow::Error::from)
            }
            _ => match toml::from_str(&contents) {
                Ok(config) => Ok(config),
                Err(_) => serde_yaml::from_str(&contents).map_err(anyhow::Error::from),
            },
        };
        parsed.with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Env vars take precedence over the file. Unparsable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(server) = var("DEFAULT_SERVER") {
            self.default_server = Some(server);
        }
        if let Some(mode) = var("OUTPUT_MODE") {
            self.defaults.output_mode = mode;
        }
        if let Some(parallel) = var("PARALLEL").and_then(|v| v.parse().ok()) {
            self.defaults.parallel = parallel;
        }
        if let Some(timeout) = var("TIMEOUT").and_then(|v| v.parse().ok()) {
            self.defaults.timeout = timeout;
        }
        if let Some(audit) = var("AUDIT_ENABLED") {
            self.defaults.audit_enabled =
                matches!(audit.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
    }

    /// Return every problem found, empty when the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        if !OUTPUT_MODES.contains(&self.defaults.output_mode.as_str()) {
            errors.push(format!(
                "Invalid output_mode: {}. Must be one of {:?}",
                self.defaults.output_mode, OUTPUT_MODES
            ));
        }
        if !(1..=50).contains(&self.defaults.parallel) {
            errors.push(format!(
                "Invalid parallel: {}. Must be between 1 and 50",
                self.defaults.parallel
            ));
        }
        if self.defaults.timeout < 1 {
            errors.push(format!(
                "Invalid timeout: {}. Must be a positive integer",
                self.defaults.timeout
            ));
        }
        if let Some(ref server) = self.default_server {
            if self.resolve_server(Some(server)).map_or(true, |s| !self.server.contains_key(&s)) {
                errors.push(format!("Default server '{}' not found in config", server));
            }
        }
        for (group, servers) in self.groups.iter() {
            for server in servers {
                if !self.server.contains_key(server) {
                    errors.push(format!(
                        "Group '{}' references non-existent server: {}",
                        group, server
                    ));
                }
            }
        }
        for (alias, server) in self.aliases.iter() {
            if !self.server.contains_key(server) {
                errors.push(format!(
                    "Alias '{}' points to non-existent server: {}",
                    alias, server
                ));
            }
        }
        for server in self.tags.keys() {
            if !self.server.contains_key(server) {
                errors.push(format!("Tags defined for non-existent server: {}", server));
            }
        }

        errors
    }

    /// Resolve user input to a server name: alias first, then the input
    /// itself, then the default server when no input was given.
    pub fn resolve_server(&self, input: Option<&str>) -> Option<String> {
        match input {
            Some(name) => Some(
                self.aliases
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.to_string()),
            ),
            None => self.default_server.clone(),
        }
    }

    pub fn server_names(&self) -> Vec<String> {
        self.server.keys().cloned().collect()
    }

    /// Remove a server together with every reference to it: group
    /// membership, tags, aliases and the default server.
    pub fn remove_server(&mut self, name: &str) -> bool {
        if self.server.remove(name).is_none() {
            return false;
        }
        for servers in self.groups.values_mut() {
            servers.retain(|s| s != name);
        }
        self.tags.remove(name);
        self.aliases.retain(|_, target| target != name);
        if self.default_server.as_deref() == Some(name) {
            self.default_server = None;
        }
        true
    }

    pub fn group_servers(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(|servers| servers.as_slice())
    }

    pub fn add_group(&mut self, group: &str, servers: Vec<String>) {
        self.groups.insert(group.to_string(), servers);
    }

    pub fn remove_group(&mut self, group: &str) -> bool {
        self.groups.remove(group).is_some()
    }

    pub fn add_server_to_group(&mut self, group: &str, server: &str) {
        let servers = self.groups.entry(group.to_string()).or_default();
        if !servers.iter().any(|s| s == server) {
            servers.push(server.to_string());
        }
    }

    pub fn remove_server_from_group(&mut self, group: &str, server: &str) -> bool {
        match self.groups.get_mut(group) {
            Some(servers) => {
                let before = servers.len();
                servers.retain(|s| s != server);
                servers.len() != before
            }
            None => false,
        }
    }

    pub fn server_tags(&self, server: &str) -> &[String] {
        self.tags.get(server).map(|t| t.as_slice()).unwrap_or(&[])
    }

    pub fn add_tag(&mut self, server: &str, tag: &str) {
        let tags = self.tags.entry(server.to_string()).or_default();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    pub fn remove_tag(&mut self, server: &str, tag: &str) -> bool {
        match self.tags.get_mut(server) {
            Some(tags) => {
                let before = tags.len();
                tags.retain(|t| t != tag);
                tags.len() != before
            }
            None => false,
        }
    }

    pub fn servers_by_tag(&self, tag: &str) -> Vec<String> {
        self.tags
            .iter()
            .filter(|(_, tags)| tags.iter().any(|t| t == tag))
            .map(|(server, _)| server.clone())
            .collect()
    }

    /// Expand `@name` to the stored command alias. Anything else is returned
    /// unchanged.
    pub fn expand_command(&self, command: &str) -> Result<String> {
        match command.strip_prefix('@') {
            Some(name) => self
                .command_aliases
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("Command alias '{}' not found", name)),
            None => Ok(command.to_string()),
        }
    }

    /// Merge another config on top of this one, key by key.
    pub fn merge(&mut self, other: Config) {
        if other.default_server.is_some() {
            self.default_server = other.default_server;
        }
        self.defaults = other.defaults;
        self.server.extend(other.server);
        self.aliases.extend(other.aliases);
        self.groups.extend(other.groups);
        self.tags.extend(other.tags);
        self.command_aliases.extend(other.command_aliases);
    }
}
