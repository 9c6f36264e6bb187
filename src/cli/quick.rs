use anyhow::Result;
use clap::{Args, Subcommand};
use shell_words::quote;

use crate::cli::common::App;
use crate::cli::exec::ExecCommand;
use crate::exit_codes::ExitCode;

/// Where a quick command runs.
#[derive(Args, Clone, Debug, Default)]
pub struct QuickTarget {
    /// Server name or alias, defaults to the configured default server
    #[arg(short, long)]
    pub server: Option<String>,
    /// Timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum QuickCommand {
    /// ⏱️  Show uptime and load
    Uptime {
        #[command(flatten)]
        target: QuickTarget,
    },
    /// 💾 Show disk usage
    Disk {
        #[command(flatten)]
        target: QuickTarget,
    },
    /// 🧠 Show memory usage
    Memory {
        #[command(flatten)]
        target: QuickTarget,
    },
    /// 🔧 Show CPU information
    Cpu {
        #[command(flatten)]
        target: QuickTarget,
    },
    /// 📋 List the processes using the most memory
    Processes {
        #[command(flatten)]
        target: QuickTarget,
        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 15)]
        limit: usize,
    },
    /// 🔄 Restart a systemd service and show its status
    Restart {
        service: String,
        #[command(flatten)]
        target: QuickTarget,
    },
    /// 📡 Show the status of a systemd service
    Status {
        service: String,
        #[command(flatten)]
        target: QuickTarget,
    },
    /// 📜 Show recent logs of a service or a log file
    Logs {
        /// Service name, or a path to a log file
        service: String,
        #[command(flatten)]
        target: QuickTarget,
        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

impl QuickCommand {
    fn target(&self) -> &QuickTarget {
        match self {
            QuickCommand::Uptime { target }
            | QuickCommand::Disk { target }
            | QuickCommand::Memory { target }
            | QuickCommand::Cpu { target }
            | QuickCommand::Processes { target, .. }
            | QuickCommand::Restart { target, .. }
            | QuickCommand::Status { target, .. }
            | QuickCommand::Logs { target, .. } => target,
        }
    }

    /// The shell command this shortcut runs.
    pub fn command_line(&self) -> String {
        match self {
            QuickCommand::Uptime { .. } => "uptime".to_string(),
            QuickCommand::Disk { .. } => "df -h".to_string(),
            QuickCommand::Memory { .. } => "free -h".to_string(),
            QuickCommand::Cpu { .. } => "lscpu | head -20".to_string(),
            QuickCommand::Processes { limit, .. } => {
                format!("ps aux --sort=-%mem | head -{}", limit)
            }
            QuickCommand::Restart { service, .. } => {
                let service = quote(service);
                format!(
                    "sudo systemctl restart {} && sudo systemctl status {}",
                    service, service
                )
            }
            QuickCommand::Status { service, .. } => {
                format!("sudo systemctl status {}", quote(service))
            }
            QuickCommand::Logs { service, lines, .. } => {
                if service.contains('/') || service.ends_with(".log") {
                    format!("tail -n {} {}", lines, quote(service))
                } else {
                    format!("sudo journalctl -u {} -n {}", quote(service), lines)
                }
            }
        }
    }

    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        let target = self.target();
        let exec = ExecCommand {
            server: target.server.clone(),
            timeout: target.timeout,
            retries: None,
            command: vec![self.command_line()],
        };
        exec.execute(app).await
    }
}
