/// Process exit codes and the help shown alongside them.
use crate::report::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,

    ConnectionFailed = 10,
    ConnectionTimeout = 11,
    AuthenticationFailed = 12,
    HostUnreachable = 13,

    ConfigNotFound = 20,
    ConfigInvalid = 21,
    ServerNotFound = 22,
    GroupNotFound = 23,

    CommandFailed = 30,
    CommandTimeout = 31,
    PartialFailure = 32,

    PermissionDenied = 40,
    KeyNotFound = 41,

    InvalidInput = 50,
    FileNotFound = 51,

    SystemError = 60,

    Interrupted = 130,
}

pub struct ExitHelp {
    pub title: &'static str,
    pub suggestions: &'static [&'static str],
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn help(self) -> ExitHelp {
        ExitHelp {
            title: self.title(),
            suggestions: self.suggestions(),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "Operation failed",
            ExitCode::InvalidUsage => "Invalid usage",
            ExitCode::ConnectionFailed => "Connection failed",
            ExitCode::ConnectionTimeout => "Connection timed out",
            ExitCode::AuthenticationFailed => "Authentication failed",
            ExitCode::HostUnreachable => "Host unreachable",
            ExitCode::ConfigNotFound => "Configuration not found",
            ExitCode::ConfigInvalid => "Configuration invalid",
            ExitCode::ServerNotFound => "Server not found",
            ExitCode::GroupNotFound => "Group not found",
            ExitCode::CommandFailed => "Command failed",
            ExitCode::CommandTimeout => "Command timed out",
            ExitCode::PartialFailure => "Some hosts failed",
            ExitCode::PermissionDenied => "Permission denied",
            ExitCode::KeyNotFound => "SSH key not found",
            ExitCode::InvalidInput => "Invalid input",
            ExitCode::FileNotFound => "File not found",
            ExitCode::SystemError => "System error",
            ExitCode::Interrupted => "Interrupted",
        }
    }

    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            ExitCode::Success | ExitCode::Interrupted => &[],
            ExitCode::GeneralError => &["Re-run with --verbose or --debug for details"],
            ExitCode::InvalidUsage => &["Run with --help to see usage"],
            ExitCode::ConnectionFailed => &[
                "Check that the host is reachable and sshd is running",
                "Verify host and port in the server entry",
            ],
            ExitCode::ConnectionTimeout => &[
                "Increase --timeout",
                "Check firewalls between you and the host",
            ],
            ExitCode::AuthenticationFailed => &[
                "Check the username and key path",
                "Set use_password = true to authenticate with a password",
            ],
            ExitCode::HostUnreachable => &["Check DNS and network routes to the host"],
            ExitCode::ConfigNotFound => &["Create ~/.remotex/config.toml or pass --config"],
            ExitCode::ConfigInvalid => &["Run `remotex config validate` to list problems"],
            ExitCode::ServerNotFound => &["Run `remotex list` to see configured servers"],
            ExitCode::GroupNotFound => &["Run `remotex group list` to see configured groups"],
            ExitCode::CommandFailed => &["Inspect the per-host output with --show-output"],
            ExitCode::CommandTimeout => &["Increase --timeout"],
            ExitCode::PartialFailure => &[
                "Re-run on the failed hosts with exec-multi",
                "Use --retries for flaky hosts",
            ],
            ExitCode::PermissionDenied => {
                &["Check file permissions of the key and config directory"]
            }
            ExitCode::KeyNotFound => &[
                "Check keypath in the server entry",
                "Generate a key with ssh-keygen",
            ],
            ExitCode::InvalidInput => &["Check the arguments passed"],
            ExitCode::FileNotFound => &["Check the path exists"],
            ExitCode::SystemError => &["Re-run with --debug for details"],
        }
    }

    /// Exit code for a finished bulk run. Any failed host fails the process
    /// unless the caller asked to continue on errors.
    pub fn from_summary(summary: &Summary, continue_on_error: bool) -> Self {
        if summary.failed > 0 && !continue_on_error {
            ExitCode::GeneralError
        } else {
            ExitCode::Success
        }
    }

    /// Best-effort classification of a fatal error message.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&["authentication failed"]) {
            ExitCode::AuthenticationFailed
        } else if has(&["no such file"]) {
            ExitCode::FileNotFound
        } else if has(&["permission denied"]) {
            ExitCode::PermissionDenied
        } else if has(&["failed to parse config", "invalid config"]) {
            ExitCode::ConfigInvalid
        } else if has(&["already exists", "invalid port"]) {
            ExitCode::InvalidInput
        } else if has(&["group '"]) {
            ExitCode::GroupNotFound
        } else if has(&["server '", "no server"]) {
            ExitCode::ServerNotFound
        } else if has(&["timed out"]) {
            ExitCode::ConnectionTimeout
        } else if has(&["connection refused", "failed to connect"]) {
            ExitCode::ConnectionFailed
        } else if has(&["unreachable"]) {
            ExitCode::HostUnreachable
        } else {
            ExitCode::GeneralError
        }
    }
}
