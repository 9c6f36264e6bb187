/// Configuration serialization and deserialization.
pub mod config;

/// SSH related functionality.
pub mod ssh;

/// Time-bound memoization.
pub mod cache;

/// Host alias resolution.
pub mod resolve;

/// Execution requests and per-host results.
pub mod result;

/// Retry with exponential backoff.
pub mod retry;

/// Pooled SSH sessions.
pub mod pool;

/// Single-host executor.
pub mod executor;

/// Bulk dispatcher.
pub mod dispatch;

/// Destinations for finished bulk operations.
pub mod sink;

/// Command history.
pub mod history;

/// Audit log.
pub mod audit;

/// Result rendering.
pub mod report;

/// Process exit codes.
pub mod exit_codes;

/// Utility functions for common operations.
pub mod utils;

/// CLI interface and commands.
pub mod cli;
