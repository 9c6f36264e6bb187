#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use remotex::config::ServerConfig;
use remotex::resolve::HostResolver;
use remotex::ssh::{CommandOutput, Connector, RemoteSession};

/// What a mock host does when contacted.
#[derive(Debug, Clone)]
pub enum Behavior {
    Output { stdout: String, exit_status: Option<u32> },
    RefuseConnect,
    Hang,
    Panic,
}

#[derive(Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub execs: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    /// Highest number of commands seen running on one session at once.
    pub max_per_session: AtomicUsize,
    pub closes: AtomicUsize,
    pub connects_by_host: Mutex<HashMap<String, usize>>,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connects_to(&self, host: &str) -> usize {
        self.connects_by_host
            .lock()
            .unwrap()
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn max_per_session(&self) -> usize {
        self.max_per_session.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Connector whose hosts succeed with `ok from <host>` unless told otherwise.
#[derive(Default)]
pub struct MockConnector {
    behaviors: HashMap<String, Behavior>,
    exec_delay: Duration,
    pub counters: Arc<Counters>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(host.to_string(), behavior);
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    fn behavior(&self, host: &str) -> Behavior {
        self.behaviors
            .get(host)
            .cloned()
            .unwrap_or_else(|| Behavior::Output {
                stdout: format!("ok from {}", host),
                exit_status: Some(0),
            })
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, host: &str, _params: &ServerConfig) -> Result<Arc<dyn RemoteSession>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        *self
            .counters
            .connects_by_host
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default() += 1;

        let behavior = self.behavior(host);
        if let Behavior::RefuseConnect = behavior {
            return Err(anyhow!("Connection refused (os error 111)"));
        }

        Ok(Arc::new(MockSession {
            host: host.to_string(),
            behavior,
            delay: self.exec_delay,
            active: AtomicBool::new(true),
            running: Arc::new(AtomicUsize::new(0)),
            counters: Arc::clone(&self.counters),
        }))
    }
}

pub struct MockSession {
    host: String,
    behavior: Behavior,
    delay: Duration,
    active: AtomicBool,
    running: Arc<AtomicUsize>,
    counters: Arc<Counters>,
}

/// Decrements the session's running count when exec finishes or is dropped.
struct Running(Arc<AtomicUsize>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&self, _command: &str) -> Result<CommandOutput> {
        self.counters.execs.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_running.fetch_max(now, Ordering::SeqCst);
        let on_session = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_per_session
            .fetch_max(on_session, Ordering::SeqCst);
        let _running = Running(Arc::clone(&self.running));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let output = match self.behavior {
            Behavior::Output {
                ref stdout,
                exit_status,
            } => CommandOutput {
                stdout: stdout.clone().into_bytes(),
                stderr: Vec::new(),
                exit_status,
            },
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                CommandOutput::default()
            }
            Behavior::Panic => panic!("session for {} blew up", self.host),
            Behavior::RefuseConnect => unreachable!(),
        };

        self.counters.running.fetch_sub(1, Ordering::SeqCst);
        Ok(output)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }
}

pub fn server(host: &str) -> ServerConfig {
    ServerConfig {
        host: host.to_string(),
        port: None,
        username: "deploy".to_string(),
        keypath: None,
        password: None,
        use_password: None,
    }
}

/// Resolver knowing exactly `hosts`.
pub fn resolver(hosts: &[&str]) -> Arc<dyn HostResolver> {
    let map: HashMap<String, ServerConfig> = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| (host.to_string(), server(&format!("10.0.0.{}", i + 1))))
        .collect();
    Arc::new(map)
}

pub fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}
