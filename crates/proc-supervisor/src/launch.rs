use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use chrono::{DateTime, Utc};
use nix::unistd::{Pid, getpgid};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{Result, SupervisorError};
use crate::pipe::ChildEnds;

/// Identity of a launched child. The child leads its own process group, so
/// `pgid == pid` unless the group could not be read back.
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandle {
    pub pid: Pid,
    pub pgid: Pid,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
}

/// What to start and how.
#[derive(Debug)]
pub(crate) struct LaunchSpec<'a> {
    pub program: &'a OsString,
    pub args: &'a [OsString],
    pub current_dir: Option<&'a PathBuf>,
    pub env: &'a [(OsString, OsString)],
}

/// Start the child as the leader of a new process group with `ends` as its
/// standard streams.
///
/// The command (and with it every child-side endpoint) is dropped before
/// this returns, so the parent holds no write end of the output pipes.
pub(crate) fn launch(spec: &LaunchSpec<'_>, ends: ChildEnds) -> Result<(Child, ProcessHandle)> {
    let program = spec.program.to_string_lossy().into_owned();

    let child = {
        let mut cmd = Command::new(spec.program);
        cmd.args(spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::from(ends.stdin))
            .stdout(Stdio::from(ends.stdout))
            .stderr(Stdio::from(ends.stderr))
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = spec.current_dir {
            cmd.current_dir(dir);
        }
        cmd.spawn().map_err(|source| SupervisorError::Launch {
            program: program.clone(),
            source,
        })?
    };

    let raw = child.id().ok_or_else(|| SupervisorError::Launch {
        program: program.clone(),
        source: std::io::Error::other("child was reaped before its pid was read"),
    })?;
    let pid = i32::try_from(raw)
        .map(Pid::from_raw)
        .map_err(|e| SupervisorError::Launch {
            program: program.clone(),
            source: std::io::Error::other(format!("pid {raw} out of range: {e}")),
        })?;

    let pgid = match getpgid(Some(pid)) {
        Ok(pgid) => pgid,
        Err(e) => {
            // Already exited; the group id it was given is its own pid.
            debug!(pid = pid.as_raw(), error = %e, "getpgid failed, assuming pgid == pid");
            pid
        }
    };

    let handle = ProcessHandle {
        pid,
        pgid,
        started_at: Utc::now(),
        started: Instant::now(),
    };
    info!(
        program = %program,
        pid = pid.as_raw(),
        pgid = pgid.as_raw(),
        "child launched"
    );
    Ok((child, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::open_fabric;

    fn spec<'a>(program: &'a OsString, args: &'a [OsString]) -> LaunchSpec<'a> {
        LaunchSpec {
            program,
            args,
            current_dir: None,
            env: &[],
        }
    }

    #[tokio::test]
    async fn child_leads_its_own_process_group() {
        let program = OsString::from("sleep");
        let args = [OsString::from("5")];
        let (ends, _parent) = open_fabric(None, None).unwrap();

        let (mut child, handle) = launch(&spec(&program, &args), ends).unwrap();
        assert_eq!(handle.pid, handle.pgid);
        assert_ne!(handle.pgid, getpgid(None).unwrap());

        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_failure() {
        let program = OsString::from("/nonexistent/definitely-not-here");
        let (ends, _parent) = open_fabric(None, None).unwrap();

        let err = launch(&spec(&program, &[]), ends).unwrap_err();
        assert!(err.is_launch_failure());
        assert!(err.to_string().contains("definitely-not-here"), "error was: {err}");
    }

    #[tokio::test]
    async fn non_executable_file_is_a_launch_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let program = file.path().as_os_str().to_owned();
        let (ends, _parent) = open_fabric(None, None).unwrap();

        let err = launch(&spec(&program, &[]), ends).unwrap_err();
        assert!(err.is_launch_failure());
    }
}
