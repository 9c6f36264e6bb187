/// Bulk fan-out/fan-in over many hosts.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::executor::HostExecutor;
use crate::result::{ExecutionRequest, ExecutionResult};

/// What a dry run would do. Building one never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunPlan {
    pub command: String,
    pub hosts: Vec<String>,
    pub parallelism: usize,
    /// seconds
    pub timeout: u64,
    pub retries: u32,
}

/// Runs a request against a host list with a bounded number of workers.
///
/// Every submitted host yields exactly one result, in completion order. One
/// host failing, timing out or panicking never affects the others.
pub struct Dispatcher {
    executor: Arc<HostExecutor>,
}

impl Dispatcher {
    pub fn new(executor: Arc<HostExecutor>) -> Self {
        Self { executor }
    }

    pub fn plan(&self, hosts: &[String], request: &ExecutionRequest) -> DryRunPlan {
        DryRunPlan {
            command: request.command().to_string(),
            hosts: hosts.to_vec(),
            parallelism: request.parallelism().min(hosts.len().max(1)),
            timeout: request.timeout().as_secs(),
            retries: request.max_retries(),
        }
    }

    pub async fn dispatch(
        &self,
        hosts: &[String],
        request: &ExecutionRequest,
    ) -> Vec<ExecutionResult> {
        self.dispatch_with_progress(hosts, request, |_| {}).await
    }

    /// Like [`Self::dispatch`], calling `on_result` as each host finishes.
    pub async fn dispatch_with_progress<F>(
        &self,
        hosts: &[String],
        request: &ExecutionRequest,
        mut on_result: F,
    ) -> Vec<ExecutionResult>
    where
        F: FnMut(&ExecutionResult),
    {
        if hosts.is_empty() {
            return vec![];
        }

        let worker_num = std::cmp::min(request.parallelism(), hosts.len());

        // The queue holds every host up front, so submission never waits.
        let (sender, receiver) = mpsc::channel(hosts.len());
        for host in hosts {
            if sender.try_send(host.clone()).is_err() {
                log::error!("Failed to queue host '{}'", host);
            }
        }
        drop(sender);
        let receiver = Arc::new(Mutex::new(receiver));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let request = Arc::new(request.clone());

        log::info!(
            "Starting execution with {} workers for {} hosts",
            worker_num,
            hosts.len()
        );

        let mut handles = vec![];
        for _ in 0..worker_num {
            let receiver = Arc::clone(&receiver);
            let executor = Arc::clone(&self.executor);
            let request = Arc::clone(&request);
            let result_tx = result_tx.clone();

            handles.push(tokio::spawn(async move {
                host_worker(executor, request, receiver, result_tx).await;
            }));
        }
        drop(result_tx);

        let mut results = Vec::with_capacity(hosts.len());
        while let Some(result) = result_rx.recv().await {
            on_result(&result);
            results.push(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Worker terminated abnormally: {}", e);
            }
        }

        for missing in missing_hosts(hosts, &results) {
            let result = ExecutionResult::failed(&missing, "Execution was lost before completing");
            on_result(&result);
            results.push(result);
        }

        results
    }
}

/// Pulls hosts off the shared queue until it is empty.
async fn host_worker(
    executor: Arc<HostExecutor>,
    request: Arc<ExecutionRequest>,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    results: mpsc::UnboundedSender<ExecutionResult>,
) {
    loop {
        let host = match receiver.lock().await.recv().await {
            Some(host) => host,
            None => break,
        };

        // Run each host in its own task so a panic stays contained to it.
        let unit = {
            let executor = Arc::clone(&executor);
            let request = Arc::clone(&request);
            let host = host.clone();
            tokio::spawn(async move { executor.execute(&host, &request).await })
        };

        let result = match unit.await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Execution on '{}' panicked: {}", host, e);
                ExecutionResult::failed(&host, format!("Execution panicked: {}", e))
            }
        };

        if results.send(result).is_err() {
            break;
        }
    }
}

/// Hosts (with multiplicity) that have no result yet.
fn missing_hosts(hosts: &[String], results: &[ExecutionResult]) -> Vec<String> {
    let mut pending: HashMap<&str, usize> = HashMap::new();
    for host in hosts {
        *pending.entry(host.as_str()).or_default() += 1;
    }
    for result in results {
        if let Some(count) = pending.get_mut(result.host()) {
            *count = count.saturating_sub(1);
        }
    }

    let mut missing = vec![];
    for host in hosts {
        if let Some(count) = pending.get_mut(host.as_str()) {
            if *count > 0 {
                *count -= 1;
                missing.push(host.clone());
            }
        }
    }
    missing
}
