use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::cli::common::App;
use crate::exit_codes::ExitCode;

#[derive(Subcommand, Debug, Clone)]
pub enum AliasAction {
    /// Point a short name at a server
    Set { alias: String, server: String },
    /// Delete a server alias
    Remove { alias: String },
    /// List server aliases
    List,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CmdAliasAction {
    /// Store a command under a name, run it later as @name
    Set {
        name: String,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Delete a command alias
    Remove { name: String },
    /// List command aliases
    List,
}

impl AliasAction {
    pub fn execute(&self, app: &mut App) -> Result<ExitCode> {
        match self {
            AliasAction::Set { alias, server } => {
                if !app.config.server.contains_key(server) {
                    return Err(anyhow!("Server '{}' not found in config", server));
                }
                app.config.aliases.insert(alias.clone(), server.clone());
                app.save_config()?;
                println!("🔗 {} -> {}", alias, server);
            }
            AliasAction::Remove { alias } => {
                if app.config.aliases.remove(alias).is_none() {
                    return Err(anyhow!("Alias '{}' not found", alias));
                }
                app.save_config()?;
                println!("🗑️  Alias '{}' removed", alias);
            }
            AliasAction::List => {
                if app.config.aliases.is_empty() {
                    println!("📝 No aliases configured");
                }
                for (alias, server) in app.config.aliases.iter() {
                    println!("  {} -> {}", alias, server);
                }
            }
        }
        Ok(ExitCode::Success)
    }
}

impl CmdAliasAction {
    pub fn execute(&self, app: &mut App) -> Result<ExitCode> {
        match self {
            CmdAliasAction::Set { name, command } => {
                let name = name.trim_start_matches('@');
                if name.is_empty() {
                    return Err(anyhow!("Alias name cannot be empty"));
                }
                let command = command.join(" ");
                println!("📎 @{} = {}", name, command);
                app.config.command_aliases.insert(name.to_string(), command);
                app.save_config()?;
            }
            CmdAliasAction::Remove { name } => {
                let name = name.trim_start_matches('@');
                if app.config.command_aliases.remove(name).is_none() {
                    return Err(anyhow!("Command alias '{}' not found", name));
                }
                app.save_config()?;
                println!("🗑️  Command alias '@{}' removed", name);
            }
            CmdAliasAction::List => {
                if app.config.command_aliases.is_empty() {
                    println!("📝 No command aliases configured");
                }
                for (name, command) in app.config.command_aliases.iter() {
                    println!("  @{} = {}", name, command);
                }
            }
        }
        Ok(ExitCode::Success)
    }
}
