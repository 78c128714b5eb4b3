//! The race between natural exit, the deadline, and an external interrupt.

use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

/// How the `Running` state ended. First detected wins; the others are
/// never consulted again for this run.
#[derive(Debug)]
pub(crate) enum Finish {
    Exited(ExitStatus),
    /// Waiting on the child failed; the status has to be recovered by reaping.
    WaitFailed(io::Error),
    TimedOut,
    Interrupted,
}

/// Wait for whichever of `exit`, the optional `deadline`, or `interrupt`
/// resolves first. With no deadline only exit or interrupt can end the race.
pub(crate) async fn race<E, I>(exit: E, deadline: Option<Duration>, interrupt: I) -> Finish
where
    E: Future<Output = io::Result<ExitStatus>>,
    I: Future<Output = ()>,
{
    let timer = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = exit => match status {
            Ok(status) => Finish::Exited(status),
            Err(e) => Finish::WaitFailed(e),
        },
        () = timer => Finish::TimedOut,
        () = interrupt => Finish::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Instant;

    async fn exit_after(delay: Duration, code: i32) -> io::Result<ExitStatus> {
        tokio::time::sleep(delay).await;
        // Raw wait status: exit code lives in the second byte.
        Ok(ExitStatus::from_raw(code << 8))
    }

    #[tokio::test]
    async fn natural_exit_wins_before_deadline() {
        let finish = race(
            exit_after(Duration::from_millis(10), 3),
            Some(Duration::from_secs(5)),
            std::future::pending(),
        )
        .await;
        match finish {
            Finish::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_fires_when_child_outlives_it() {
        let start = Instant::now();
        let finish = race(
            exit_after(Duration::from_secs(30), 0),
            Some(Duration::from_millis(50)),
            std::future::pending(),
        )
        .await;
        assert!(matches!(finish, Finish::TimedOut), "got {finish:?}");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn interrupt_preempts_both() {
        let finish = race(
            exit_after(Duration::from_secs(30), 0),
            Some(Duration::from_secs(30)),
            tokio::time::sleep(Duration::from_millis(10)),
        )
        .await;
        assert!(matches!(finish, Finish::Interrupted), "got {finish:?}");
    }

    #[tokio::test]
    async fn no_deadline_waits_for_exit() {
        let finish = race(
            exit_after(Duration::from_millis(100), 0),
            None,
            std::future::pending(),
        )
        .await;
        assert!(matches!(finish, Finish::Exited(_)), "got {finish:?}");
    }

    #[tokio::test]
    async fn wait_error_is_reported_not_swallowed() {
        let finish = race(
            async { Err::<ExitStatus, _>(io::Error::from_raw_os_error(libc::ECHILD)) },
            None,
            std::future::pending(),
        )
        .await;
        assert!(matches!(finish, Finish::WaitFailed(_)), "got {finish:?}");
    }
}
