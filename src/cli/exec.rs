use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use crossterm::style::Stylize;
use serde_json::{json, Value};

use crate::cli::common::{self, App};
use crate::dispatch::{Dispatcher, DryRunPlan};
use crate::exit_codes::ExitCode;
use crate::report::{self, OutputFormat, Summary};
use crate::result::ExecutionRequest;
use crate::utils::{csv_field, split_list, truncate_error_message};

/// Flags shared by every bulk command.
#[derive(Args, Clone, Debug, Default)]
pub struct BulkArgs {
    /// Maximum hosts to run on at once
    #[arg(short, long)]
    pub parallel: Option<usize>,
    /// Per-host timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
    /// Retries per host after a failure
    #[arg(short, long)]
    pub retries: Option<u32>,
    /// Show what would run without connecting
    #[arg(long)]
    pub dry_run: bool,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Shortcut for --format json
    #[arg(long)]
    pub json: bool,
    /// Shortcut for --format csv
    #[arg(long)]
    pub csv: bool,
    /// Shortcut for --format quiet
    #[arg(long)]
    pub quiet: bool,
    /// Shortcut for --format plain
    #[arg(long)]
    pub plain: bool,
    /// Shortcut for --format compact
    #[arg(long)]
    pub compact: bool,
    /// Print full output of every host
    #[arg(long)]
    pub show_output: bool,
}

impl BulkArgs {
    pub fn output_format(&self, mode: &str) -> OutputFormat {
        if let Some(format) = self.format {
            return format;
        }
        [
            (self.json, OutputFormat::Json),
            (self.csv, OutputFormat::Csv),
            (self.quiet, OutputFormat::Quiet),
            (self.plain, OutputFormat::Plain),
            (self.compact, OutputFormat::Compact),
        ]
        .into_iter()
        .find(|(set, _)| *set)
        .map(|(_, format)| format)
        .unwrap_or_else(|| OutputFormat::from_mode(mode))
    }
}

#[derive(Args, Clone, Debug)]
pub struct ExecCommand {
    /// Server name or alias, defaults to the configured default server
    #[arg(short, long)]
    pub server: Option<String>,
    /// Per-host timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
    /// Retries after a failure
    #[arg(short, long)]
    pub retries: Option<u32>,
    /// Command to execute, `@name` expands a command alias
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ExecAllCommand {
    #[command(flatten)]
    pub bulk: BulkArgs,
    /// Exit with an error when any host fails
    #[arg(long)]
    pub stop: bool,
    /// Exit successfully even when hosts fail (table output only, default)
    #[arg(long = "continue", conflicts_with = "stop")]
    pub keep_going: bool,
    /// Command to execute, `@name` expands a command alias
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ExecMultiCommand {
    /// Comma separated server names
    pub servers: String,
    #[command(flatten)]
    pub bulk: BulkArgs,
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ExecGroupCommand {
    pub group: String,
    #[command(flatten)]
    pub bulk: BulkArgs,
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ExecTagCommand {
    pub tag: String,
    #[command(flatten)]
    pub bulk: BulkArgs,
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct PoolStatsCommand {
    /// Connect to these servers first (comma separated)
    #[arg(long)]
    pub warm: Option<String>,
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// A resolved bulk operation, ready to dispatch.
struct BulkRun<'a> {
    command_type: &'static str,
    hosts: Vec<String>,
    command: &'a [String],
    bulk: &'a BulkArgs,
    /// Partial failure exits 0 when rendering the default table.
    continue_in_table: bool,
    metadata: BTreeMap<String, Value>,
}

impl ExecAllCommand {
    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        let hosts = app.config.server_names();
        if hosts.is_empty() {
            return Err(anyhow!("No servers configured"));
        }

        run_bulk(
            app,
            BulkRun {
                command_type: "exec-all",
                hosts,
                command: &self.command,
                bulk: &self.bulk,
                continue_in_table: !self.stop,
                metadata: BTreeMap::new(),
            },
        )
        .await
    }
}

impl ExecMultiCommand {
    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        let hosts: Vec<String> = split_list(&self.servers)
            .into_iter()
            .map(|name| app.config.resolve_server(Some(&name)).unwrap_or(name))
            .collect();
        if hosts.is_empty() {
            return Err(anyhow!("No servers specified"));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("hosts_list".to_string(), json!(self.servers));

        run_bulk(
            app,
            BulkRun {
                command_type: "exec-multi",
                hosts,
                command: &self.command,
                bulk: &self.bulk,
                continue_in_table: false,
                metadata,
            },
        )
        .await
    }
}

impl ExecGroupCommand {
    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        let hosts = app
            .config
            .group_servers(&self.group)
            .ok_or_else(|| anyhow!("Group '{}' not found", self.group))?
            .to_vec();
        if hosts.is_empty() {
            return Err(anyhow!("Group '{}' has no servers", self.group));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("group_name".to_string(), json!(self.group));

        run_bulk(
            app,
            BulkRun {
                command_type: "exec-group",
                hosts,
                command: &self.command,
                bulk: &self.bulk,
                continue_in_table: false,
                metadata,
            },
        )
        .await
    }
}

impl ExecTagCommand {
    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        let hosts = app.config.servers_by_tag(&self.tag);
        if hosts.is_empty() {
            return Err(anyhow!("No servers found with tag '{}'", self.tag));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("tag".to_string(), json!(self.tag));

        run_bulk(
            app,
            BulkRun {
                command_type: "exec-tag",
                hosts,
                command: &self.command,
                bulk: &self.bulk,
                continue_in_table: false,
                metadata,
            },
        )
        .await
    }
}

async fn run_bulk(app: &App, run: BulkRun<'_>) -> Result<ExitCode> {
    let defaults = &app.config.defaults;
    let command = app.config.expand_command(&run.command.join(" "))?;
    let parallel = run.bulk.parallel.unwrap_or(defaults.parallel);
    let timeout = run.bulk.timeout.unwrap_or(defaults.timeout);
    let retries = run.bulk.retries.unwrap_or(defaults.retries);
    let format = run.bulk.output_format(&defaults.output_mode);

    let request = ExecutionRequest::new(
        command.as_str(),
        Duration::from_secs(timeout),
        retries,
        parallel,
    )?;
    let dispatcher = Dispatcher::new(Arc::new(app.executor()));

    if run.bulk.dry_run {
        print_plan(&dispatcher.plan(&run.hosts, &request), format)?;
        return Ok(ExitCode::Success);
    }

    app.prompt_passwords(&run.hosts)?;

    if !format.is_machine_readable() && format != OutputFormat::Quiet {
        println!(
            "\n🚀 Executing '{}' on {} servers (parallel: {}, timeout: {}s)",
            command,
            run.hosts.len(),
            request.parallelism().min(run.hosts.len()),
            timeout
        );
    }

    let pb = common::progress_bar(
        run.hosts.len(),
        format.is_machine_readable() || format == OutputFormat::Quiet,
    );
    let mut results = tokio::select! {
        results = dispatcher.dispatch_with_progress(&run.hosts, &request, |result| {
            pb.set_message(result.host().to_string());
            pb.inc(1);
        }) => results,
        _ = tokio::signal::ctrl_c() => {
            pb.abandon();
            eprintln!("\n⚠️  Interrupted");
            return Ok(ExitCode::Interrupted);
        }
    };
    pb.finish_and_clear();

    results.sort_by(|a, b| a.host().cmp(b.host()));

    let mut stdout = std::io::stdout().lock();
    report::render(&mut stdout, format, &command, &results, run.bulk.show_output)?;
    stdout.flush()?;

    let summary = Summary::from_results(&results);
    let mut metadata = run.metadata;
    metadata.insert("total".to_string(), json!(summary.total));
    metadata.insert("succeeded".to_string(), json!(summary.succeeded));
    metadata.insert("failed".to_string(), json!(summary.failed));
    metadata.insert("parallel".to_string(), json!(parallel));
    metadata.insert("timeout".to_string(), json!(timeout));
    metadata.insert("retries".to_string(), json!(retries));

    app.sinks()
        .record(run.command_type, &run.hosts, &command, &results, &metadata);

    Ok(ExitCode::from_summary(
        &summary,
        continues_on_error(format, run.continue_in_table),
    ))
}

fn continues_on_error(format: OutputFormat, continue_in_table: bool) -> bool {
    continue_in_table && format == OutputFormat::Table
}

fn print_plan(plan: &DryRunPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(plan)?);
            return Ok(());
        }
        OutputFormat::Csv | OutputFormat::Quiet => {
            if format == OutputFormat::Csv {
                println!("Host");
            }
            for host in plan.hosts.iter() {
                println!("{}", csv_field(host));
            }
            return Ok(());
        }
        _ => {}
    }

    println!("\n🔍 Dry run, nothing will be executed");
    println!("{}", "─".repeat(50));
    println!("  Command:  {}", plan.command);
    println!("  Parallel: {}", plan.parallelism);
    println!("  Timeout:  {}s", plan.timeout);
    println!("  Retries:  {}", plan.retries);
    println!("  Servers ({}):", plan.hosts.len());
    for host in plan.hosts.iter() {
        println!("    - {}", host);
    }
    println!("{}", "─".repeat(50));
    Ok(())
}

impl ExecCommand {
    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        let server = match self.server {
            Some(ref name) => app.require_server(name)?,
            None => {
                let default = app
                    .config
                    .default_server
                    .as_deref()
                    .ok_or_else(|| anyhow!("No server given and no default server configured"))?;
                app.require_server(default)?
            }
        };

        let command = app.config.expand_command(&self.command.join(" "))?;
        let defaults = &app.config.defaults;
        let timeout = self.timeout.unwrap_or(defaults.timeout);
        let retries = self.retries.unwrap_or(defaults.retries);
        let request = ExecutionRequest::new(
            command.as_str(),
            Duration::from_secs(timeout),
            retries,
            1,
        )?;

        let hosts = vec![server.clone()];
        app.prompt_passwords(&hosts)?;

        let executor = app.executor();
        let result = tokio::select! {
            result = executor.execute(&server, &request) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n⚠️  Interrupted");
                return Ok(ExitCode::Interrupted);
            }
        };

        print!("{}", result.stdout_text());
        let errors = result.error_text();
        if !errors.trim().is_empty() {
            eprintln!("{}", truncate_error_message(errors.trim_end(), 20).red());
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("timeout".to_string(), json!(timeout));
        metadata.insert("retries".to_string(), json!(retries));
        app.sinks().record(
            "exec",
            &hosts,
            &command,
            std::slice::from_ref(&result),
            &metadata,
        );

        if result.is_success() {
            Ok(ExitCode::Success)
        } else if let Some(error) = result.error() {
            Err(anyhow!("{}", error))
        } else {
            log::info!("'{}' exited with code {}", server, result.exit_code());
            Ok(ExitCode::CommandFailed)
        }
    }
}

impl PoolStatsCommand {
    pub async fn execute(&self, app: &App) -> Result<ExitCode> {
        if let Some(ref warm) = self.warm {
            let hosts = split_list(warm);
            app.prompt_passwords(&hosts)?;
            for host in hosts.iter() {
                let server = app.require_server(host)?;
                let srv_cfg = app.config.server[&server].clone();
                if let Err(e) = app.pool.get_connection(&server, &srv_cfg).await {
                    eprintln!("❌ {}: {:#}", server, e);
                }
            }
        }

        let stats = app.pool.stats().await;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("\n📊 Connection Pool");
            println!("{}", "─".repeat(40));
            println!("  Total connections:  {}", stats.total);
            println!("  Active connections: {}", stats.active);
            println!("  Max age:            {}s", stats.max_age);
            println!("{}", "─".repeat(40));
        }
        Ok(ExitCode::Success)
    }
}
