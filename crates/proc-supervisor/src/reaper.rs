use std::io;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::launch::ProcessHandle;

/// Exit code recorded when the child's real status cannot be determined
/// (killed by us, or the wait itself failed).
pub const SENTINEL_EXIT_CODE: i32 = 1;

/// Send SIGKILL to every member of process group `pgid`.
///
/// A group that no longer exists (`ESRCH`) counts as success.
pub fn kill_process_group(pgid: Pid) -> nix::Result<()> {
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => {
            debug!(pgid = pgid.as_raw(), "sent SIGKILL to process group");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            debug!(pgid = pgid.as_raw(), "process group already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Exit code of a child that ended on its own, mapping a signal death to
/// `128 + signal` the way shells do.
pub(crate) fn extract_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map(|sig| 128 + sig).unwrap_or(SENTINEL_EXIT_CODE))
}

/// Owns the direct child and terminates its whole process group.
///
/// The first call to [`reap`](Self::reap) or [`settle`](Self::settle)
/// fixes the exit code; later calls return it unchanged without
/// signalling again. Dropping an unsettled reaper kills the group.
#[derive(Debug)]
pub(crate) struct TreeReaper {
    handle: ProcessHandle,
    child: Child,
    exit_code: Option<i32>,
}

impl TreeReaper {
    pub fn new(handle: ProcessHandle, child: Child) -> Self {
        Self {
            handle,
            child,
            exit_code: None,
        }
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// Wait for the direct child to exit on its own.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forced termination: kill the group, then reap the direct child.
    pub async fn reap(&mut self) -> i32 {
        if let Some(code) = self.exit_code {
            debug!(pid = self.handle.pid.as_raw(), exit_code = code, "already reaped");
            return code;
        }

        let pgid = self.handle.pgid;
        if let Err(e) = kill_process_group(pgid) {
            warn!(pgid = pgid.as_raw(), error = %e, "failed to signal process group");
        }

        let code = match self.child.wait().await {
            Ok(status) => status.code().unwrap_or(SENTINEL_EXIT_CODE),
            Err(e) if e.raw_os_error() == Some(libc::ECHILD) => {
                debug!(pid = self.handle.pid.as_raw(), "child already reaped elsewhere");
                SENTINEL_EXIT_CODE
            }
            Err(e) => {
                warn!(
                    pid = self.handle.pid.as_raw(),
                    error = %e,
                    "could not read exit status, using sentinel code {SENTINEL_EXIT_CODE}"
                );
                SENTINEL_EXIT_CODE
            }
        };

        self.exit_code = Some(code);
        code
    }

    /// Natural exit: record the child's own code, then sweep whatever it
    /// left behind in its group (background jobs still holding our pipes).
    pub fn settle(&mut self, status: ExitStatus) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        let code = extract_exit_code(status);
        if let Err(e) = kill_process_group(self.handle.pgid) {
            warn!(pgid = self.handle.pgid.as_raw(), error = %e, "failed to sweep process group");
        }
        self.exit_code = Some(code);
        code
    }
}

impl Drop for TreeReaper {
    fn drop(&mut self) {
        if self.exit_code.is_none() {
            let _ = kill_process_group(self.handle.pgid);
        }
    }
}
