/// Per-host SSH session pool with age-based eviction.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ServerConfig;
use crate::ssh::{Connector, RemoteSession};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);

pub struct PooledConnection {
    pub host: String,
    pub session: Arc<dyn RemoteSession>,
    pub created_at: Instant,
}

impl PooledConnection {
    fn is_valid(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() < max_age && self.session.is_active()
    }
}

/// A session handed out for one command.
pub struct Checkout {
    pub session: Arc<dyn RemoteSession>,
    /// Exclusive claim on the pooled session, `None` for a session opened
    /// outside the pool.
    claim: Option<OwnedMutexGuard<()>>,
}

impl Checkout {
    pub fn unpooled(session: Arc<dyn RemoteSession>) -> Self {
        Self {
            session,
            claim: None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.claim.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    /// seconds
    pub max_age: u64,
}

/// Caches one session per host alias.
///
/// The map is guarded by a single lock, held only while inspecting or
/// updating entries. New sessions are connected outside the lock, so a slow
/// host never stalls workers targeting other hosts.
///
/// Commands go through [`ConnectionPool::checkout`], which runs at most one
/// command at a time on a pooled session.
pub struct ConnectionPool {
    connections: Mutex<HashMap<String, PooledConnection>>,
    claims: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    connector: Arc<dyn Connector>,
    max_age: Duration,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_max_age(connector, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(connector: Arc<dyn Connector>, max_age: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            claims: Mutex::new(HashMap::new()),
            connector,
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Return the pooled session for `host`, or open and store a new one.
    ///
    /// A pooled session is reused only while younger than `max_age` and
    /// still active; otherwise it is evicted and closed first.
    pub async fn get_connection(
        &self,
        host: &str,
        params: &ServerConfig,
    ) -> Result<Arc<dyn RemoteSession>> {
        let stale = {
            let mut connections = self.connections.lock().await;
            match connections.get(host).map(|c| c.is_valid(self.max_age)) {
                Some(true) => {
                    log::debug!("Reusing connection to '{}'", host);
                    return Ok(Arc::clone(&connections[host].session));
                }
                Some(false) => connections.remove(host),
                None => None,
            }
        };

        if let Some(stale) = stale {
            log::debug!(
                "Evicting connection to '{}' (age {:?})",
                stale.host,
                stale.created_at.elapsed()
            );
            stale.session.close().await;
        }

        log::debug!("Creating new connection to '{}'", host);
        let session = self.connector.connect(host, params).await?;

        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(host) {
            // Another worker connected to the same host meanwhile; keep theirs.
            if existing.is_valid(self.max_age) {
                let existing = Arc::clone(&existing.session);
                drop(connections);
                session.close().await;
                return Ok(existing);
            }
        }

        let replaced = connections.insert(
            host.to_string(),
            PooledConnection {
                host: host.to_string(),
                session: Arc::clone(&session),
                created_at: Instant::now(),
            },
        );
        drop(connections);

        if let Some(replaced) = replaced {
            replaced.session.close().await;
        }

        Ok(session)
    }

    /// Session for running one command on `host`.
    ///
    /// The pooled session is claimed for as long as the [`Checkout`] lives.
    /// While it is claimed, further checkouts of the same host get a fresh
    /// unpooled session that the caller must close.
    pub async fn checkout(&self, host: &str, params: &ServerConfig) -> Result<Checkout> {
        let claim = {
            let mut claims = self.claims.lock().await;
            Arc::clone(claims.entry(host.to_string()).or_default())
        };

        match claim.try_lock_owned() {
            Ok(claim) => {
                let session = self.get_connection(host, params).await?;
                Ok(Checkout {
                    session,
                    claim: Some(claim),
                })
            }
            Err(_) => {
                log::debug!("Pooled session for '{}' is busy, opening another", host);
                let session = self.connector.connect(host, params).await?;
                Ok(Checkout::unpooled(session))
            }
        }
    }

    /// Close every pooled session. Never fails.
    pub async fn close_all(&self) {
        let drained: Vec<PooledConnection> = {
            let mut connections = self.connections.lock().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };

        for conn in drained {
            log::debug!("Closing connection to '{}'", conn.host);
            conn.session.close().await;
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let connections = self.connections.lock().await;
        PoolStats {
            total: connections.len(),
            active: connections
                .values()
                .filter(|conn| conn.session.is_active())
                .count(),
            max_age: self.max_age.as_secs(),
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
