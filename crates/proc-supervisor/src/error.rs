/// Failures that abort a run before any child is being supervised.
///
/// Everything that can go wrong after a successful launch (timeouts,
/// interrupts, already-dead groups, unreadable exit statuses) is absorbed
/// into the returned `RunOutcome` instead.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pipe setup failed: {0}")]
    Pipe(#[source] nix::errno::Errno),

    #[error("interrupt interceptor unavailable: {0}")]
    Interceptor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// True when the program itself could not be started (bad path,
    /// permissions), as opposed to a host resource failure.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. })
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
