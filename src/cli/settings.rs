use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;

use crate::cli::common::App;
use crate::config::{Config, OUTPUT_MODES};
use crate::exit_codes::ExitCode;

const MASK: &str = "********";

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective config, passwords masked
    Show,
    /// Check the config for problems
    Validate,
    /// Set the server used when none is given
    SetDefault { server: String },
    /// Set the default output mode (normal, compact, silent)
    SetOutput { mode: String },
    /// Write the config to a file (.toml, .yaml or .yml), without passwords
    Export { file: PathBuf },
    /// Load a config file, replacing or merging into the current one
    Import {
        file: PathBuf,
        /// Merge into the existing config instead of replacing it
        #[arg(long)]
        merge: bool,
    },
}

impl ConfigAction {
    pub fn execute(&self, app: &mut App) -> Result<ExitCode> {
        match self {
            ConfigAction::Show => {
                println!("# {}", app.config_path.display());
                println!("{}", toml::to_string_pretty(&masked(&app.config))?);
            }
            ConfigAction::Validate => {
                let problems = app.config.validate();
                if !problems.is_empty() {
                    println!("❌ {} problem(s) in {}", problems.len(), app.config_path.display());
                    for problem in problems.iter() {
                        println!("  - {}", problem);
                    }
                    return Ok(ExitCode::ConfigInvalid);
                }
                println!("✅ Configuration is valid");
            }
            ConfigAction::SetDefault { server } => {
                let server = app.require_server(server)?;
                app.config.default_server = Some(server.clone());
                app.save_config()?;
                println!("✅ Default server set to '{}'", server);
            }
            ConfigAction::SetOutput { mode } => {
                if !OUTPUT_MODES.contains(&mode.as_str()) {
                    return Err(anyhow!(
                        "Invalid config value for output mode '{}', expected one of {:?}",
                        mode,
                        OUTPUT_MODES
                    ));
                }
                app.config.defaults.output_mode = mode.clone();
                app.save_config()?;
                println!("✅ Output mode set to '{}'", mode);
            }
            ConfigAction::Export { file } => {
                without_passwords(&app.config).save(file)?;
                println!("📤 Config exported to {}", file.display());
            }
            ConfigAction::Import { file, merge } => {
                if !file.exists() {
                    return Err(anyhow!("No such file: {}", file.display()));
                }
                let imported = Config::load_file(file)
                    .with_context(|| format!("Failed to import {}", file.display()))?;
                if *merge {
                    app.config.merge(imported);
                } else {
                    app.config = imported;
                }

                let problems = app.config.validate();
                for problem in problems.iter() {
                    log::warn!("Imported config: {}", problem);
                }
                app.save_config()?;
                println!(
                    "📥 Config {} from {}",
                    if *merge { "merged" } else { "imported" },
                    file.display()
                );
            }
        }
        Ok(ExitCode::Success)
    }
}

/// Copy of `config` with stored passwords replaced.
fn masked(config: &Config) -> Config {
    let mut config = config.clone();
    for srv_cfg in config.server.values_mut() {
        if srv_cfg.password.is_some() {
            srv_cfg.password = Some(MASK.to_string());
        }
    }
    config
}

/// Copy of `config` with stored passwords dropped; those servers prompt
/// instead.
fn without_passwords(config: &Config) -> Config {
    let mut config = config.clone();
    for srv_cfg in config.server.values_mut() {
        if srv_cfg.password.take().is_some() {
            srv_cfg.use_password = Some(true);
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_masked_hides_passwords() {
        let mut config = Config::default();
        config.server.insert(
            "db01".to_string(),
            ServerConfig {
                host: "10.0.0.5".to_string(),
                port: None,
                username: "root".to_string(),
                keypath: None,
                password: Some("hunter2".to_string()),
                use_password: Some(true),
            },
        );

        let shown = masked(&config);
        assert_eq!(shown.server["db01"].password.as_deref(), Some(MASK));
        assert_eq!(config.server["db01"].password.as_deref(), Some("hunter2"));

        let exported = without_passwords(&config);
        assert_eq!(exported.server["db01"].password, None);
        assert!(exported.server["db01"].needs_password_prompt());
    }
}
