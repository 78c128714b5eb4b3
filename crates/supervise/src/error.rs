use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Supervisor(#[from] proc_supervisor::SupervisorError),

    #[error("cannot read input file {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open output file {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Supervisor(e) if e.is_launch_failure())
    }
}

pub type CliResult<T> = Result<T, CliError>;
