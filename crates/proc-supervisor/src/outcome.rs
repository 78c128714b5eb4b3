use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::launch::ProcessHandle;

/// Which event ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// The child terminated on its own.
    Exited,
    /// The deadline elapsed and the process group was killed.
    TimedOut,
    /// SIGINT reached the host and the process group was killed.
    Interrupted,
}

impl Cause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exited => "exited",
            Self::TimedOut => "timed_out",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a finished run.
///
/// `stdout`/`stderr` hold the complete streams, or are empty for a stream
/// that was redirected to a caller-supplied sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub pid: u32,
    pub pgid: u32,
    pub cause: Cause,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub(crate) fn assemble(
        handle: &ProcessHandle,
        cause: Cause,
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            pid: handle.pid.as_raw().unsigned_abs(),
            pgid: handle.pgid.as_raw().unsigned_abs(),
            cause,
            started_at: handle.started_at,
            elapsed: handle.started.elapsed(),
        }
    }

    pub fn timed_out(&self) -> bool {
        self.cause == Cause::TimedOut
    }

    pub fn interrupted(&self) -> bool {
        self.cause == Cause::Interrupted
    }

    /// Exited on its own with status 0.
    pub fn success(&self) -> bool {
        self.cause == Cause::Exited && self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;
    use std::time::Instant;

    fn handle() -> ProcessHandle {
        ProcessHandle {
            pid: Pid::from_raw(1234),
            pgid: Pid::from_raw(1234),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    #[test]
    fn cause_flags_follow_the_cause() {
        let timed_out = RunOutcome::assemble(&handle(), Cause::TimedOut, 1, vec![], vec![]);
        assert!(timed_out.timed_out());
        assert!(!timed_out.interrupted());
        assert!(!timed_out.success());

        let interrupted = RunOutcome::assemble(&handle(), Cause::Interrupted, 1, vec![], vec![]);
        assert!(interrupted.interrupted());
        assert!(!interrupted.timed_out());
    }

    #[test]
    fn success_needs_natural_exit_and_zero() {
        let ok = RunOutcome::assemble(&handle(), Cause::Exited, 0, b"out".to_vec(), vec![]);
        assert!(ok.success());
        assert_eq!(ok.pid, 1234);
        assert_eq!(ok.pgid, 1234);

        let failed = RunOutcome::assemble(&handle(), Cause::Exited, 2, vec![], vec![]);
        assert!(!failed.success());
    }

    #[test]
    fn cause_renders_as_snake_case() {
        assert_eq!(Cause::TimedOut.to_string(), "timed_out");
        assert_eq!(Cause::Exited.as_str(), "exited");
    }
}
