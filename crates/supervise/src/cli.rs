use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use proc_supervisor::RunRequest;
use tracing::{Level, debug};

use crate::error::{CliError, CliResult};
use crate::report;

#[derive(Debug, Parser)]
#[command(name = "supervise", version)]
#[command(about = "Run a command under a deadline and reap its whole process tree")]
pub struct Cli {
    /// Kill the process tree after this long (1.5, 500ms, 2s, 1m)
    #[arg(long, env = "SUPERVISE_TIMEOUT", value_parser = parse_duration)]
    pub timeout: Option<Duration>,
    /// Text written to the command's stdin
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,
    /// File whose contents are written to the command's stdin
    #[arg(long, value_name = "PATH")]
    pub input_file: Option<PathBuf>,
    /// Send the command's stdout to this file instead of capturing it
    #[arg(long, value_name = "PATH")]
    pub stdout_file: Option<PathBuf>,
    /// Send the command's stderr to this file instead of capturing it
    #[arg(long, value_name = "PATH")]
    pub stderr_file: Option<PathBuf>,
    /// How to print the outcome
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
    /// Log verbosity (logs go to stderr)
    #[arg(long, value_enum, env = "SUPERVISE_LOG", default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
    /// Program to run, followed by its arguments
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    pub command: Vec<OsString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Accepts bare seconds (`1.5`) or a number with an `ms`, `s` or `m` suffix.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else {
        (s, 1.0)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    Duration::try_from_secs_f64(value * scale).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

/// Build the request from the arguments, run it and print the outcome.
pub async fn execute(cli: Cli) -> CliResult<ExitCode> {
    let mut command = cli.command.into_iter();
    // clap enforces at least one value.
    let program = command.next().unwrap_or_default();

    let input = match (cli.input, &cli.input_file) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(path)) => tokio::fs::read(path)
            .await
            .map_err(|source| CliError::Input {
                path: path.clone(),
                source,
            })?,
        (None, None) => Vec::new(),
    };

    let mut request = RunRequest::new(&program)
        .args(command)
        .input(input)
        .maybe_deadline(cli.timeout);
    if let Some(path) = &cli.stdout_file {
        request = request.stdout_sink(create_sink(path)?);
    }
    if let Some(path) = &cli.stderr_file {
        request = request.stderr_sink(create_sink(path)?);
    }

    debug!(program = %program.to_string_lossy(), timeout = ?cli.timeout, "starting supervised run");
    let outcome = proc_supervisor::run(request).await?;

    report::emit(&outcome, cli.format)?;
    Ok(ExitCode::from(report::exit_status(&outcome)))
}

fn create_sink(path: &Path) -> CliResult<File> {
    File::create(path).map_err(|source| CliError::Sink {
        path: path.to_path_buf(),
        source,
    })
}
