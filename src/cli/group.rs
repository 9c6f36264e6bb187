use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::cli::common::App;
use crate::exit_codes::ExitCode;
use crate::utils::split_list;

#[derive(Subcommand, Debug, Clone)]
pub enum GroupAction {
    /// Create or replace a group
    Add {
        name: String,
        /// Comma separated server names
        servers: String,
    },
    /// List all groups
    List,
    /// Show the servers of a group
    Show { name: String },
    /// Delete a group
    Remove { name: String },
    /// Add one server to a group
    AddServer { group: String, server: String },
    /// Remove one server from a group
    RemoveServer { group: String, server: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagAction {
    /// Tag a server
    Add {
        server: String,
        #[arg(required = true, num_args = 1..)]
        tags: Vec<String>,
    },
    /// Remove a tag from a server
    Remove { server: String, tag: String },
    /// List tags, or the servers carrying one tag
    List { tag: Option<String> },
}

impl GroupAction {
    pub fn execute(&self, app: &mut App) -> Result<ExitCode> {
        match self {
            GroupAction::Add { name, servers } => {
                let mut members = vec![];
                for server in split_list(servers) {
                    members.push(app.require_server(&server)?);
                }
                if members.is_empty() {
                    return Err(anyhow!("No servers specified"));
                }
                println!("✅ Group '{}' set to {} servers", name, members.len());
                app.config.add_group(name, members);
                app.save_config()?;
            }
            GroupAction::List => {
                if app.config.groups.is_empty() {
                    println!("📝 No groups configured");
                } else {
                    println!("\n👥 Groups ({})", app.config.groups.len());
                    println!("{}", "─".repeat(50));
                    for (name, servers) in app.config.groups.iter() {
                        println!("  {} ({}): {}", name, servers.len(), servers.join(", "));
                    }
                    println!("{}", "─".repeat(50));
                }
            }
            GroupAction::Show { name } => {
                let servers = app
                    .config
                    .group_servers(name)
                    .ok_or_else(|| anyhow!("Group '{}' not found", name))?;
                println!("\n👥 {} ({})", name, servers.len());
                for server in servers {
                    match app.config.server.get(server) {
                        Some(srv_cfg) => println!(
                            "  {} - {}@{}:{}",
                            server,
                            srv_cfg.username,
                            srv_cfg.host,
                            srv_cfg.port()
                        ),
                        None => println!("  {} - ⚠️  not configured", server),
                    }
                }
            }
            GroupAction::Remove { name } => {
                if !app.config.remove_group(name) {
                    return Err(anyhow!("Group '{}' not found", name));
                }
                app.save_config()?;
                println!("🗑️  Group '{}' removed", name);
            }
            GroupAction::AddServer { group, server } => {
                let server = app.require_server(server)?;
                app.config.add_server_to_group(group, &server);
                app.save_config()?;
                println!("✅ Added '{}' to group '{}'", server, group);
            }
            GroupAction::RemoveServer { group, server } => {
                if app.config.group_servers(group).is_none() {
                    return Err(anyhow!("Group '{}' not found", group));
                }
                if !app.config.remove_server_from_group(group, server) {
                    return Err(anyhow!("Server '{}' is not in group '{}'", server, group));
                }
                app.save_config()?;
                println!("🗑️  Removed '{}' from group '{}'", server, group);
            }
        }
        Ok(ExitCode::Success)
    }
}

impl TagAction {
    pub fn execute(&self, app: &mut App) -> Result<ExitCode> {
        match self {
            TagAction::Add { server, tags } => {
                let server = app.require_server(server)?;
                for tag in tags {
                    app.config.add_tag(&server, tag);
                }
                app.save_config()?;
                println!(
                    "🏷️  {} tags: {}",
                    server,
                    app.config.server_tags(&server).join(", ")
                );
            }
            TagAction::Remove { server, tag } => {
                let server = app.require_server(server)?;
                if !app.config.remove_tag(&server, tag) {
                    return Err(anyhow!("Server '{}' has no tag '{}'", server, tag));
                }
                app.save_config()?;
                println!("🗑️  Removed tag '{}' from '{}'", tag, server);
            }
            TagAction::List { tag: Some(tag) } => {
                let servers = app.config.servers_by_tag(tag);
                if servers.is_empty() {
                    println!("📝 No servers tagged '{}'", tag);
                } else {
                    println!("🏷️  {}: {}", tag, servers.join(", "));
                }
            }
            TagAction::List { tag: None } => {
                if app.config.tags.is_empty() {
                    println!("📝 No tags configured");
                }
                for (server, tags) in app.config.tags.iter() {
                    println!("  {}: {}", server, tags.join(", "));
                }
            }
        }
        Ok(ExitCode::Success)
    }
}
