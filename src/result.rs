/// Execution request and per-host result types.
use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

use crate::retry::should_retry_error;
use crate::ssh::CommandOutput;

/// Exit code used when the remote command never reported one.
pub const NO_EXIT_CODE: i64 = -1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("command cannot be empty")]
    EmptyCommand,
    #[error("parallelism must be at least 1")]
    ZeroParallelism,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// One logical command to run on a set of hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    command: String,
    timeout: Duration,
    max_retries: u32,
    parallelism: usize,
}

impl ExecutionRequest {
    pub fn new(
        command: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        parallelism: usize,
    ) -> Result<Self, RequestError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(RequestError::EmptyCommand);
        }
        if parallelism == 0 {
            return Err(RequestError::ZeroParallelism);
        }
        if timeout.is_zero() {
            return Err(RequestError::ZeroTimeout);
        }

        Ok(Self {
            command,
            timeout,
            max_retries,
            parallelism,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

/// Why a single attempt against one host did not produce an exit status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("Failed to parse SSH config")]
    Resolve,
    #[error("Failed to connect: {0}")]
    Connect(String),
    #[error("Command timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("Command execution failed: {0}")]
    Remote(String),
}

impl ExecError {
    /// Whether the failure looks transient (network hiccup, timeout).
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Timeout(_)) || should_retry_error(&self.to_string())
    }
}

/// Outcome of running one command on one host.
///
/// `success` holds exactly when `exit_code == 0` and there is no error; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    host: String,
    success: bool,
    exit_code: i64,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    error: Option<String>,
}

impl ExecutionResult {
    /// Build a result from what the remote side returned.
    pub fn completed(host: impl Into<String>, output: CommandOutput) -> Self {
        let (exit_code, error) = match output.exit_status {
            Some(status) => (i64::from(status), None),
            None => (
                NO_EXIT_CODE,
                Some("Remote command returned no exit status".to_string()),
            ),
        };

        Self {
            host: host.into(),
            success: exit_code == 0 && error.is_none(),
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            error,
        }
    }

    /// A result for a host that never produced an exit status.
    pub fn failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            host: host.into(),
            success: false,
            exit_code: NO_EXIT_CODE,
            stdout: Vec::new(),
            stderr: Vec::new(),
            error: Some(if error.is_empty() {
                "Unknown error".to_string()
            } else {
                error
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// The infrastructure error if any, otherwise whatever the command wrote
    /// to stderr.
    pub fn error_text(&self) -> Cow<'_, str> {
        match self.error {
            Some(ref error) => Cow::Borrowed(error.as_str()),
            None => self.stderr_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_status: Option<u32>) -> CommandOutput {
        CommandOutput {
            stdout: b"ok\n".to_vec(),
            stderr: Vec::new(),
            exit_status,
        }
    }

    #[test]
    fn test_request_validation() {
        let timeout = Duration::from_secs(5);
        assert!(ExecutionRequest::new("uptime", timeout, 0, 1).is_ok());
        assert_eq!(
            ExecutionRequest::new("uptime", timeout, 0, 0),
            Err(RequestError::ZeroParallelism)
        );
        assert_eq!(
            ExecutionRequest::new("uptime", Duration::ZERO, 0, 2),
            Err(RequestError::ZeroTimeout)
        );
        assert_eq!(
            ExecutionRequest::new("  ", timeout, 0, 2),
            Err(RequestError::EmptyCommand)
        );
    }

    #[test]
    fn test_completed_success() {
        let result = ExecutionResult::completed("web01", output(Some(0)));
        assert!(result.is_success());
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.error(), None);
        assert_eq!(result.stdout_text(), "ok\n");
    }

    #[test]
    fn test_completed_nonzero_keeps_real_exit_code() {
        let result = ExecutionResult::completed("web01", output(Some(3)));
        assert!(!result.is_success());
        assert_eq!(result.exit_code(), 3);
        assert_eq!(result.error(), None);
    }

    #[test]
    fn test_completed_without_status_is_failure() {
        let result = ExecutionResult::completed("web01", output(None));
        assert!(!result.is_success());
        assert_eq!(result.exit_code(), NO_EXIT_CODE);
        assert!(result.error().is_some());
    }

    #[test]
    fn test_failed_sentinel() {
        let result = ExecutionResult::failed("db01", ExecError::Resolve.to_string());
        assert!(!result.is_success());
        assert_eq!(result.exit_code(), -1);
        assert_eq!(result.error(), Some("Failed to parse SSH config"));
        assert!(result.stdout().is_empty());
    }

    #[test]
    fn test_failed_never_has_empty_error() {
        let result = ExecutionResult::failed("db01", "");
        assert_eq!(result.error(), Some("Unknown error"));
    }

    #[test]
    fn test_lossy_decoding() {
        let result = ExecutionResult::completed(
            "web01",
            CommandOutput {
                stdout: vec![b'o', 0xff, b'k'],
                stderr: vec![0xfe],
                exit_status: Some(0),
            },
        );
        assert_eq!(result.stdout_text(), "o\u{fffd}k");
        assert_eq!(result.error_text(), "\u{fffd}");
    }

    #[test]
    fn test_exec_error_messages() {
        assert_eq!(
            ExecError::Timeout(Duration::from_secs(5)).to_string(),
            "Command timed out after 5s"
        );
        assert!(ExecError::Connect("refused".into())
            .to_string()
            .starts_with("Failed to connect"));
    }

    #[test]
    fn test_exec_error_transience() {
        assert!(ExecError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ExecError::Connect("Connection refused (os error 111)".into()).is_transient());
        assert!(!ExecError::Resolve.is_transient());
        assert!(!ExecError::Connect("SSH authentication failed for user: root".into()).is_transient());
    }
}
