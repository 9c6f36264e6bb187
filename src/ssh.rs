/// SSH transport: connection, authentication and command execution.
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use russh::{
    client::{self, Config, Handle},
    keys::{load_secret_key, ssh_key, PrivateKeyWithHashAlg},
    ChannelMsg, Disconnect,
};

use crate::config::ServerConfig;

/// Raw output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the channel closed before the server reported a status.
    pub exit_status: Option<u32>,
}

/// An open, authenticated session to one host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run `command` and read stdout and stderr to completion.
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Whether the underlying transport still reports itself alive.
    fn is_active(&self) -> bool;

    /// Close the session. Must not fail, even if the transport is already gone.
    async fn close(&self);
}

/// Opens sessions from resolved connection parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, params: &ServerConfig) -> Result<Arc<dyn RemoteSession>>;
}

#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    username: String,
    password: Option<String>,
    keypath: Option<String>,
}

impl Client {
    pub fn new(host: String, username: String) -> Self {
        Self {
            host,
            port: 22,
            username,
            password: None,
            keypath: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.username
    }

    pub fn with_password(&mut self, password: String) {
        self.password = Some(password);
    }

    pub fn with_private_key(&mut self, keypath: String) {
        self.keypath = Some(keypath);
    }

    pub fn with_port(&mut self, port: u16) {
        self.port = port;
    }

    pub async fn connect(&self) -> Result<Session> {
        let config = Arc::new(Config::default());

        let handler = Handler {};
        let mut session = client::connect(config, (&self.host[..], self.port), handler)
            .await
            .with_context(|| format!("Failed to reach {}:{}", self.host, self.port))?;

        let auth_result = if let Some(password) = &self.password {
            session
                .authenticate_password(&self.username, password)
                .await?
        } else {
            let keypath = match self.keypath {
                Some(ref keypath) => expand_home(keypath),
                None => default_identity().ok_or_else(|| {
                    anyhow!("No authentication method provided (need password or private key)")
                })?,
            };
            let key_pair = load_secret_key(&keypath, None).with_context(|| {
                format!("Failed to load private key from: {}", keypath.display())
            })?;
            session
                .authenticate_publickey(
                    &self.username,
                    PrivateKeyWithHashAlg::new(
                        Arc::new(key_pair),
                        session.best_supported_rsa_hash().await?.flatten(),
                    ),
                )
                .await?
        };

        if !auth_result.success() {
            return Err(anyhow!(
                "SSH authentication failed for user: {}",
                self.username
            ));
        }

        Ok(Session { handler: session })
    }
}

impl std::fmt::Display for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

pub struct Session {
    handler: Handle<Handler>,
}

#[async_trait]
impl RemoteSession for Session {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self.handler.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = CommandOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        output.stderr.extend_from_slice(&data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(output)
    }

    fn is_active(&self) -> bool {
        !self.handler.is_closed()
    }

    async fn close(&self) {
        if let Err(e) = self
            .handler
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            log::debug!("Ignoring error while closing session: {}", e);
        }
    }
}

/// Production connector backed by russh.
///
/// Passwords for hosts configured with `use_password` are collected by the
/// caller before dispatch, so workers never block on a terminal prompt.
#[derive(Debug, Default)]
pub struct SshConnector {
    passwords: RwLock<HashMap<String, String>>,
}

impl SshConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, host: &str, password: String) {
        self.passwords
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(host.to_string(), password);
    }

    pub fn has_password(&self, host: &str) -> bool {
        self.passwords
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(host)
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, host: &str, params: &ServerConfig) -> Result<Arc<dyn RemoteSession>> {
        let mut client = params.build_client();
        let password = self
            .passwords
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(host)
            .cloned();
        if let Some(password) = password {
            client.with_password(password);
        }

        log::debug!("Opening SSH session to '{}' ({})", host, client);
        let session = client.connect().await?;
        Ok(Arc::new(session))
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn default_identity() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.exists())
}

#[derive(Debug)]
struct Handler {}

impl client::Handler for Handler {
    type Error = russh::Error;

    fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }
}
