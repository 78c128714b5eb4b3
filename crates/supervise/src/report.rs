use std::borrow::Cow;
use std::io::Write;

use chrono::{DateTime, Utc};
use proc_supervisor::RunOutcome;
use serde::Serialize;
use tracing::warn;

use crate::cli::Format;
use crate::error::CliResult;

/// Exit status used when the deadline fired, matching coreutils `timeout`.
pub const TIMED_OUT_STATUS: u8 = 124;

/// Exit status used when the program could not be started.
pub const LAUNCH_FAILED_STATUS: u8 = 127;

/// Exit status used when an interrupt was absorbed instead of ending us.
const INTERRUPTED_STATUS: u8 = 130;

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub exit_code: i32,
    pub cause: &'static str,
    pub timed_out: bool,
    pub interrupted: bool,
    pub pid: u32,
    pub pgid: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub stdout: Cow<'a, str>,
    pub stderr: Cow<'a, str>,
}

impl<'a> Report<'a> {
    pub fn new(outcome: &'a RunOutcome) -> Self {
        Self {
            exit_code: outcome.exit_code,
            cause: outcome.cause.as_str(),
            timed_out: outcome.timed_out(),
            interrupted: outcome.interrupted(),
            pid: outcome.pid,
            pgid: outcome.pgid,
            started_at: outcome.started_at,
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            stdout: String::from_utf8_lossy(&outcome.stdout),
            stderr: String::from_utf8_lossy(&outcome.stderr),
        }
    }
}

/// Print the outcome on our own streams.
///
/// `text` replays the captured bytes unchanged; `json` writes one report
/// line to stdout.
pub fn emit(outcome: &RunOutcome, format: Format) -> CliResult<()> {
    match format {
        Format::Text => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&outcome.stdout)?;
            stdout.flush()?;
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(&outcome.stderr)?;
            stderr.flush()?;
        }
        Format::Json => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &Report::new(outcome))?;
            writeln!(stdout)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Our own exit status for a finished run.
pub fn exit_status(outcome: &RunOutcome) -> u8 {
    if outcome.timed_out() {
        return TIMED_OUT_STATUS;
    }
    if outcome.interrupted() {
        return INTERRUPTED_STATUS;
    }
    match u8::try_from(outcome.exit_code) {
        Ok(code) => code,
        Err(_) => {
            warn!(
                exit_code = outcome.exit_code,
                "exit code out of u8 range, using 1"
            );
            1
        }
    }
}
