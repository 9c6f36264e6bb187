use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::cli::common::App;
use crate::config::ServerConfig;
use crate::exit_codes::ExitCode;
use crate::ssh::{expand_home, Connector};

#[derive(Subcommand, Debug, Clone)]
pub enum ServerAction {
    /// Add a server
    Add {
        name: String,
        #[command(flatten)]
        fields: ServerFields,
    },
    /// Remove a server and every group, tag and alias reference to it
    Remove { name: String },
    /// Show the settings of one server
    Info {
        name: String,
        /// Also try to open a session
        #[arg(long)]
        test: bool,
    },
    /// Change some settings of a server, others are kept
    Edit {
        name: String,
        #[command(flatten)]
        fields: ServerFields,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServerFields {
    /// Hostname or IP address
    #[arg(long)]
    pub host: Option<String>,
    /// SSH username
    #[arg(short, long)]
    pub user: Option<String>,
    /// SSH port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Path to the private key
    #[arg(short, long)]
    pub key: Option<String>,
    /// Authenticate with a password prompted at run time
    #[arg(long)]
    pub use_password: Option<bool>,
}

impl ServerFields {
    fn build(&self) -> Result<ServerConfig> {
        let host = self
            .host
            .clone()
            .ok_or_else(|| anyhow!("--host is required"))?;
        let username = self
            .user
            .clone()
            .ok_or_else(|| anyhow!("--user is required"))?;
        let mut srv_cfg = ServerConfig {
            host,
            port: None,
            username,
            keypath: None,
            password: None,
            use_password: None,
        };
        self.apply(&mut srv_cfg)?;
        Ok(srv_cfg)
    }

    fn apply(&self, srv_cfg: &mut ServerConfig) -> Result<()> {
        if let Some(ref host) = self.host {
            srv_cfg.host = host.clone();
        }
        if let Some(ref user) = self.user {
            srv_cfg.username = user.clone();
        }
        if let Some(port) = self.port {
            if port == 0 {
                return Err(anyhow!("Invalid port: {}", port));
            }
            srv_cfg.port = (port != 22).then_some(port);
        }
        if let Some(ref key) = self.key {
            srv_cfg.keypath = (!key.is_empty()).then(|| key.clone());
        }
        if let Some(use_password) = self.use_password {
            srv_cfg.use_password = use_password.then_some(true);
        }
        Ok(())
    }
}

impl ServerAction {
    pub async fn execute(&self, app: &mut App) -> Result<ExitCode> {
        match self {
            ServerAction::Add { name, fields } => {
                if app.config.server.contains_key(name) {
                    return Err(anyhow!("Server '{}' already exists", name));
                }
                let srv_cfg = fields.build()?;
                println!(
                    "✅ Added '{}' ({}@{}:{})",
                    name,
                    srv_cfg.username,
                    srv_cfg.host,
                    srv_cfg.port()
                );
                app.config.server.insert(name.clone(), srv_cfg);
                app.save_config()?;
            }
            ServerAction::Remove { name } => {
                let server = app.require_server(name)?;
                app.config.remove_server(&server);
                app.save_config()?;
                println!("🗑️  Server '{}' removed", server);
            }
            ServerAction::Info { name, test } => {
                let server = app.require_server(name)?;
                let srv_cfg = app.config.server[&server].clone();
                print_info(app, &server, &srv_cfg);

                if *test {
                    app.prompt_passwords(std::slice::from_ref(&server))?;
                    println!("\n🔌 Testing connection...");
                    let session = app.connector.connect(&server, &srv_cfg).await?;
                    session.close().await;
                    println!("✅ Connection successful");
                }
            }
            ServerAction::Edit { name, fields } => {
                let server = app.require_server(name)?;
                if let Some(srv_cfg) = app.config.server.get_mut(&server) {
                    fields.apply(srv_cfg)?;
                }
                app.save_config()?;
                println!("✅ Server '{}' updated", server);
            }
        }
        Ok(ExitCode::Success)
    }
}

fn print_info(app: &App, name: &str, srv_cfg: &ServerConfig) {
    println!("\n🖥️  {}", name);
    println!("{}", "─".repeat(50));
    println!("  Host:     {}", srv_cfg.host);
    println!("  User:     {}", srv_cfg.username);
    println!("  Port:     {}", srv_cfg.port());
    match srv_cfg.keypath {
        Some(ref keypath) => {
            let status = if expand_home(keypath).exists() { "✓" } else { "✗" };
            println!("  Key:      {} {}", status, keypath);
        }
        None if srv_cfg.use_password.unwrap_or(false) => println!("  Auth:     🔐 Password"),
        None => println!("  Auth:     🔑 Default identity"),
    }
    let tags = app.config.server_tags(name);
    if !tags.is_empty() {
        println!("  Tags:     {}", tags.join(", "));
    }
    let groups: Vec<&str> = app
        .config
        .groups
        .iter()
        .filter(|(_, servers)| servers.iter().any(|s| s == name))
        .map(|(group, _)| group.as_str())
        .collect();
    if !groups.is_empty() {
        println!("  Groups:   {}", groups.join(", "));
    }
    if app.config.default_server.as_deref() == Some(name) {
        println!("  Default:  yes");
    }
    println!("{}", "─".repeat(50));
}
