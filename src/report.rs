/// Rendering of bulk results for terminals and machines.
use std::io::{self, Write};

use clap::ValueEnum;
use crossterm::style::Stylize;
use serde::Serialize;

use crate::result::ExecutionResult;
use crate::utils::{csv_field, preview, single_line, truncate_error_message};

const TABLE_PREVIEW_CHARS: usize = 150;
const COMPACT_PREVIEW_CHARS: usize = 100;
const QUIET_PREVIEW_CHARS: usize = 80;
const ERROR_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
    Quiet,
    Compact,
    Plain,
}

impl OutputFormat {
    /// Format implied by the configured `output_mode`.
    pub fn from_mode(mode: &str) -> Self {
        match mode {
            "compact" => OutputFormat::Compact,
            "silent" => OutputFormat::Quiet,
            _ => OutputFormat::Table,
        }
    }

    /// Formats meant for other programs; no progress or banners around them.
    pub fn is_machine_readable(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Csv)
    }
}

#[derive(Serialize)]
struct JsonResult<'a> {
    host: &'a str,
    success: bool,
    exit_code: i64,
    stdout: String,
    stderr: String,
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    command: &'a str,
    total: usize,
    succeeded: usize,
    failed: usize,
    results: Vec<JsonResult<'a>>,
}

/// Write `results` for `command` in the requested format.
pub fn render<W: Write>(
    out: &mut W,
    format: OutputFormat,
    command: &str,
    results: &[ExecutionResult],
    show_output: bool,
) -> io::Result<()> {
    match format {
        OutputFormat::Table => render_table(out, results, show_output),
        OutputFormat::Json => render_json(out, command, results),
        OutputFormat::Csv => render_csv(out, results),
        OutputFormat::Quiet => render_quiet(out, results),
        OutputFormat::Compact => render_compact(out, results),
        OutputFormat::Plain => render_plain(out, results, show_output),
    }
}

/// What a one-line view shows for a host: its output when it succeeded,
/// otherwise the reason it failed.
fn headline(result: &ExecutionResult) -> String {
    if result.is_success() {
        result.stdout_text().into_owned()
    } else {
        result.error_text().into_owned()
    }
}

fn render_table<W: Write>(
    out: &mut W,
    results: &[ExecutionResult],
    show_output: bool,
) -> io::Result<()> {
    let rows: Vec<(&str, &str, String, String)> = results
        .iter()
        .map(|r| {
            (
                r.host(),
                if r.is_success() { "✓ OK" } else { "✗ FAILED" },
                r.exit_code().to_string(),
                preview(&headline(r), TABLE_PREVIEW_CHARS),
            )
        })
        .collect();

    let host_w = rows.iter().map(|r| r.0.chars().count()).max().unwrap_or(0).max(6);
    let status_w = 8;
    let code_w = 9;

    writeln!(
        out,
        "{:<host_w$}  {:<status_w$}  {:<code_w$}  {}",
        "Server", "Status", "Exit Code", "Output Preview"
    )?;
    writeln!(out, "{}", "─".repeat(host_w + status_w + code_w + 24))?;

    for (result, (host, status, code, text)) in results.iter().zip(rows.iter()) {
        let status = format!("{:<status_w$}", status);
        let status = if result.is_success() {
            status.green()
        } else {
            status.red()
        };
        writeln!(
            out,
            "{}  {}  {:<code_w$}  {}",
            format!("{:<host_w$}", host).cyan(),
            status,
            code,
            text
        )?;
    }

    if show_output {
        for result in results {
            writeln!(out)?;
            writeln!(out, "{}", format!("── {} ──", result.host()).bold())?;
            let stdout = result.stdout_text();
            if !stdout.trim().is_empty() {
                for line in stdout.lines() {
                    writeln!(out, "   {}", line)?;
                }
            }
            let errors = result.error_text();
            if !errors.trim().is_empty() {
                let errors = truncate_error_message(errors.trim_end(), ERROR_LINES);
                for line in errors.lines() {
                    writeln!(out, "   {}", line.red())?;
                }
            }
        }
    }

    let summary = Summary::from_results(results);
    writeln!(out)?;
    writeln!(
        out,
        "Total: {} | Success: {} | Failed: {}",
        summary.total,
        summary.succeeded.to_string().green(),
        if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().stylize()
        }
    )
}

fn render_json<W: Write>(out: &mut W, command: &str, results: &[ExecutionResult]) -> io::Result<()> {
    let summary = Summary::from_results(results);
    let report = JsonReport {
        command,
        total: summary.total,
        succeeded: summary.succeeded,
        failed: summary.failed,
        results: results
            .iter()
            .map(|r| JsonResult {
                host: r.host(),
                success: r.is_success(),
                exit_code: r.exit_code(),
                stdout: r.stdout_text().into_owned(),
                stderr: r.stderr_text().into_owned(),
                error: r.error(),
            })
            .collect(),
    };

    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)
}

fn render_csv<W: Write>(out: &mut W, results: &[ExecutionResult]) -> io::Result<()> {
    writeln!(out, "Host,Success,ExitCode,Output,Error")?;
    for r in results {
        writeln!(
            out,
            "{},{},{},{},{}",
            csv_field(r.host()),
            r.is_success(),
            r.exit_code(),
            csv_field(single_line(r.stdout_text().trim()).as_str()),
            csv_field(single_line(r.error_text().trim()).as_str()),
        )?;
    }
    Ok(())
}

fn render_quiet<W: Write>(out: &mut W, results: &[ExecutionResult]) -> io::Result<()> {
    for r in results {
        let mark = if r.is_success() { "✓" } else { "✗" };
        writeln!(
            out,
            "{}: {} [{}] {}",
            r.host(),
            mark,
            r.exit_code(),
            preview(&headline(r), QUIET_PREVIEW_CHARS)
        )?;
    }
    Ok(())
}

fn render_compact<W: Write>(out: &mut W, results: &[ExecutionResult]) -> io::Result<()> {
    for r in results {
        let mark = if r.is_success() { "✓" } else { "✗" };
        writeln!(
            out,
            "{} {} [{}]: {}",
            mark,
            r.host(),
            r.exit_code(),
            preview(&headline(r), COMPACT_PREVIEW_CHARS)
        )?;
    }
    let summary = Summary::from_results(results);
    writeln!(out, "{}/{} successful", summary.succeeded, summary.total)
}

fn render_plain<W: Write>(
    out: &mut W,
    results: &[ExecutionResult],
    show_output: bool,
) -> io::Result<()> {
    writeln!(out, "Executing on {} servers...", results.len())?;
    for r in results {
        let status = if r.is_success() { "SUCCESS" } else { "FAILED" };
        writeln!(out, "{}: {} (exit code: {})", r.host(), status, r.exit_code())?;

        if show_output {
            for line in r.stdout_text().lines() {
                writeln!(out, "  {}", line)?;
            }
        }
        if !r.is_success() {
            let errors = r.error_text();
            if !errors.trim().is_empty() {
                writeln!(
                    out,
                    "  Error: {}",
                    truncate_error_message(errors.trim(), ERROR_LINES)
                )?;
            }
        }
    }

    let summary = Summary::from_results(results);
    writeln!(out, "Summary: {}/{} successful", summary.succeeded, summary.total)
}
