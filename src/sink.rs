/// Fire-and-forget destinations for completed bulk operations.
use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use crate::result::ExecutionResult;

/// A finished bulk operation, as handed to every sink.
#[derive(Debug, Clone, Copy)]
pub struct OperationRecord<'a> {
    /// e.g. "exec-all", "exec-group"
    pub command_type: &'a str,
    pub command: &'a str,
    pub hosts: &'a [String],
    pub results: &'a [ExecutionResult],
    pub metadata: &'a BTreeMap<String, Value>,
}

impl OperationRecord<'_> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.is_success())
    }
}

pub trait ExecutionSink: Send + Sync {
    fn name(&self) -> &str;

    fn record(&self, record: &OperationRecord<'_>) -> Result<()>;
}

/// Fans a record out to every registered sink, swallowing their failures.
#[derive(Default)]
pub struct Sinks {
    sinks: Vec<Box<dyn ExecutionSink>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Box<dyn ExecutionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn record(
        &self,
        command_type: &str,
        hosts: &[String],
        command: &str,
        results: &[ExecutionResult],
        metadata: &BTreeMap<String, Value>,
    ) {
        let record = OperationRecord {
            command_type,
            command,
            hosts,
            results,
            metadata,
        };

        for sink in self.sinks.iter() {
            if let Err(e) = sink.record(&record) {
                log::debug!("Ignoring {} write failure: {:#}", sink.name(), e);
            }
        }
    }
}
