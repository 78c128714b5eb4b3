use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::deadline::{Finish, race};
use crate::drain::{Stream, drain_output, feed_input};
use crate::error::Result;
use crate::interrupt::Interceptor;
use crate::launch::{LaunchSpec, launch};
use crate::outcome::{Cause, RunOutcome};
use crate::pipe::open_fabric;
use crate::reaper::TreeReaper;
use crate::request::RunRequest;

/// Run `request` to completion and reap its whole process tree.
///
/// Returns an error only when the child could not be started. Once the
/// child is running, every ending (natural exit, deadline, SIGINT) yields a
/// [`RunOutcome`], and by the time it is returned the child's process group
/// has been killed and the child itself reaped.
///
/// If SIGINT arrives during the run, the tree is killed, the outcome is
/// assembled, and the signal is raised again against this process once no
/// other run is active. With the default disposition that terminates the
/// process before this function returns.
pub async fn run(request: RunRequest) -> Result<RunOutcome> {
    let RunRequest {
        program,
        args,
        input,
        deadline,
        stdout_sink,
        stderr_sink,
        current_dir,
        env,
    } = request;

    let mut interceptor = Interceptor::install()?;
    let (child_ends, parent_ends) = open_fabric(stdout_sink, stderr_sink)?;

    let spec = LaunchSpec {
        program: &program,
        args: &args,
        current_dir: current_dir.as_ref(),
        env: &env,
    };
    let (child, handle) = launch(&spec, child_ends)?;
    interceptor.watch(handle.pgid);

    let feed = feed_input(parent_ends.stdin, input);
    let stdout = drain_output(parent_ends.stdout, Stream::Stdout);
    let stderr = drain_output(parent_ends.stderr, Stream::Stderr);

    let mut reaper = TreeReaper::new(handle, child);
    debug!(pid = handle.pid.as_raw(), ?deadline, "waiting for child");

    let finish = race(reaper.wait(), deadline, interceptor.tripped()).await;
    let (cause, exit_code) = match finish {
        Finish::Exited(status) => (Cause::Exited, reaper.settle(status)),
        Finish::WaitFailed(e) => {
            warn!(pid = handle.pid.as_raw(), error = %e, "waiting on child failed, reaping");
            (Cause::Exited, reaper.reap().await)
        }
        Finish::TimedOut => {
            info!(pid = handle.pid.as_raw(), ?deadline, "deadline elapsed, killing process group");
            (Cause::TimedOut, reaper.reap().await)
        }
        Finish::Interrupted => {
            info!(pid = handle.pid.as_raw(), "interrupted, killing process group");
            (Cause::Interrupted, reaper.reap().await)
        }
    };

    // The group is dead; nothing left to watch. A pending interrupt is
    // re-raised here, possibly ending the process.
    interceptor.release();

    if let Err(e) = feed.await {
        warn!(error = %e, "stdin feed task failed");
    }
    let stdout = collect(stdout, Stream::Stdout).await;
    let stderr = collect(stderr, Stream::Stderr).await;

    let outcome = RunOutcome::assemble(reaper.handle(), cause, exit_code, stdout, stderr);
    info!(
        pid = outcome.pid,
        exit_code = outcome.exit_code,
        cause = %outcome.cause,
        elapsed_ms = outcome.elapsed.as_millis(),
        "run finished"
    );
    Ok(outcome)
}

async fn collect(task: JoinHandle<Vec<u8>>, stream: Stream) -> Vec<u8> {
    match task.await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(?stream, error = %e, "output drain task failed");
            Vec::new()
        }
    }
}
