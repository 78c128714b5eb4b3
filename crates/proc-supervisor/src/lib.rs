//! Supervised execution of a child program.
//!
//! [`run`] starts a program as the leader of its own process group, feeds
//! it a byte payload on stdin, drains stdout and stderr concurrently, and
//! waits for whichever comes first: natural exit, an optional deadline, or
//! SIGINT delivered to the host. On every path the whole group is killed
//! and the child reaped before the [`RunOutcome`] is returned.

mod deadline;
mod drain;
mod error;
mod interrupt;
mod launch;
mod outcome;
mod pipe;
mod reaper;
mod request;
mod supervisor;

pub use error::{Result, SupervisorError};
pub use interrupt::MAX_CONCURRENT_RUNS;
pub use outcome::{Cause, RunOutcome};
pub use reaper::{SENTINEL_EXIT_CODE, kill_process_group};
pub use request::RunRequest;
pub use supervisor::run;
