mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{hosts, resolver, Behavior, MockConnector};
use remotex::audit::AuditLog;
use remotex::dispatch::Dispatcher;
use remotex::executor::{ConnectionSource, HostExecutor};
use remotex::history::{HistoryFilter, HistoryStore};
use remotex::result::ExecutionRequest;
use remotex::sink::Sinks;

async fn run_batch() -> (Vec<String>, Vec<remotex::result::ExecutionResult>) {
    let connector = Arc::new(MockConnector::new().with("db01", Behavior::RefuseConnect));
    let executor = HostExecutor::new(
        resolver(&["web01", "db01"]),
        ConnectionSource::Direct(connector),
    );
    let dispatcher = Dispatcher::new(Arc::new(executor));
    let targets = hosts(&["web01", "db01"]);
    let request = ExecutionRequest::new("uptime", Duration::from_secs(5), 0, 2).unwrap();

    let results = dispatcher.dispatch(&targets, &request).await;
    (targets, results)
}

#[tokio::test]
async fn test_unwritable_history_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the history directory should be.
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();

    let broken = HistoryStore::new(blocker.join("history.json"));
    let audit = AuditLog::new(dir.path().join("audit.log"), true).with_user("ops");
    let sinks = Sinks::new()
        .with_sink(Box::new(broken))
        .with_sink(Box::new(audit));

    let (targets, results) = run_batch().await;
    sinks.record("exec-multi", &targets, "uptime", &results, &BTreeMap::new());

    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);

    let audit = AuditLog::new(dir.path().join("audit.log"), true);
    let entries = audit.recent(5).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].summary.failed, 1);
    assert_eq!(entries[0].results["db01"].exit_code, -1);
}

#[tokio::test]
async fn test_history_records_bulk_run() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("history.json");
    let sinks = Sinks::new().with_sink(Box::new(HistoryStore::new(&store_path)));

    let (targets, results) = run_batch().await;
    let mut metadata = BTreeMap::new();
    metadata.insert("parallel".to_string(), serde_json::json!(2));
    sinks.record("exec-multi", &targets, "uptime", &results, &metadata);

    let entries = HistoryStore::new(&store_path)
        .list(&HistoryFilter::default())
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, 1);
    assert_eq!(entries[0].command, "exec-multi");
    assert_eq!(entries[0].args, vec!["uptime"]);
    assert!(!entries[0].success);
    assert_eq!(entries[0].metadata["parallel"], 2);
}
