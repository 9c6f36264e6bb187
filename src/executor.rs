/// Single-host command execution.
use std::sync::Arc;

use anyhow::Result;
use tokio::time::{timeout_at, Instant};

use crate::config::ServerConfig;
use crate::pool::{Checkout, ConnectionPool};
use crate::resolve::HostResolver;
use crate::result::{ExecError, ExecutionRequest, ExecutionResult};
use crate::retry::RetryPolicy;
use crate::ssh::{CommandOutput, Connector};

/// Where the executor gets its sessions from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// Reuse sessions across hosts and commands.
    Pooled(Arc<ConnectionPool>),
    /// Open a fresh session per attempt and close it afterwards.
    Direct(Arc<dyn Connector>),
}

impl ConnectionSource {
    async fn acquire(&self, host: &str, params: &ServerConfig) -> Result<Checkout> {
        match self {
            ConnectionSource::Pooled(pool) => pool.checkout(host, params).await,
            ConnectionSource::Direct(connector) => {
                Ok(Checkout::unpooled(connector.connect(host, params).await?))
            }
        }
    }
}

/// Runs one command on one host and always produces exactly one
/// [`ExecutionResult`]; failures come back as data, never as errors.
pub struct HostExecutor {
    resolver: Arc<dyn HostResolver>,
    source: ConnectionSource,
    retry: RetryPolicy,
}

impl HostExecutor {
    pub fn new(resolver: Arc<dyn HostResolver>, source: ConnectionSource) -> Self {
        Self {
            resolver,
            source,
            retry: RetryPolicy::default(),
        }
    }

    /// Backoff settings used when a request asks for retries. The retry
    /// count itself always comes from the request.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.retry.verbose = verbose;
        self
    }

    pub async fn execute(&self, host: &str, request: &ExecutionRequest) -> ExecutionResult {
        if request.max_retries() == 0 {
            return match self.attempt(host, request).await {
                Ok(output) => ExecutionResult::completed(host, output),
                Err(e) => ExecutionResult::failed(host, e.to_string()),
            };
        }

        let policy = self.retry.clone().with_max_retries(request.max_retries());
        policy
            .run(host, move |_| async move {
                self.attempt(host, request)
                    .await
                    .inspect_err(|e| {
                        // Advisory only, every failure is retried.
                        if !e.is_transient() {
                            log::debug!("'{}' failure does not look transient: {}", host, e);
                        }
                    })
                    .map(|output| ExecutionResult::completed(host, output))
            })
            .await
    }

    /// One try: resolve, connect, run, read. Bounded by the request timeout.
    /// Unpooled sessions are closed afterwards, also when the command timed out.
    async fn attempt(
        &self,
        host: &str,
        request: &ExecutionRequest,
    ) -> Result<CommandOutput, ExecError> {
        let params = self.resolver.resolve(host).ok_or(ExecError::Resolve)?;
        let deadline = Instant::now() + request.timeout();

        let checkout = match timeout_at(deadline, self.source.acquire(host, &params)).await {
            Ok(checkout) => checkout.map_err(|e| ExecError::Connect(format!("{:#}", e)))?,
            Err(_) => return Err(timed_out(host, request)),
        };

        log::info!("Executing '{}' on server '{}'", request.command(), host);
        let output = timeout_at(deadline, checkout.session.exec(request.command())).await;

        if !checkout.is_pooled() {
            checkout.session.close().await;
        }

        match output {
            Ok(output) => output.map_err(|e| ExecError::Remote(format!("{:#}", e))),
            Err(_) => Err(timed_out(host, request)),
        }
    }
}

fn timed_out(host: &str, request: &ExecutionRequest) -> ExecError {
    log::warn!("'{}' timed out after {:?}", host, request.timeout());
    ExecError::Timeout(request.timeout())
}
