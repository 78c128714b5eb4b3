use std::ffi::{OsStr, OsString};
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to start one supervised run.
///
/// ```no_run
/// # async fn demo() -> proc_supervisor::Result<()> {
/// use std::time::Duration;
/// use proc_supervisor::RunRequest;
///
/// let outcome = proc_supervisor::run(
///     RunRequest::new("cat")
///         .input("abc")
///         .deadline(Duration::from_secs(5)),
/// )
/// .await?;
/// assert_eq!(outcome.stdout, b"abc");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RunRequest {
    pub(crate) program: OsString,
    pub(crate) args: Vec<OsString>,
    pub(crate) input: Vec<u8>,
    pub(crate) deadline: Option<Duration>,
    pub(crate) stdout_sink: Option<OwnedFd>,
    pub(crate) stderr_sink: Option<OwnedFd>,
    pub(crate) current_dir: Option<PathBuf>,
    pub(crate) env: Vec<(OsString, OsString)>,
}

impl RunRequest {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            input: Vec::new(),
            deadline: None,
            stdout_sink: None,
            stderr_sink: None,
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Bytes written to the child's stdin before it is closed.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = input.into();
        self
    }

    /// Kill the process tree if it has not exited after `limit`.
    pub fn deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    /// Same as [`deadline`](Self::deadline), accepting an optional value.
    pub fn maybe_deadline(mut self, limit: Option<Duration>) -> Self {
        self.deadline = limit;
        self
    }

    /// Send the child's stdout straight to `sink` instead of capturing it.
    ///
    /// The descriptor is consumed and closed in this process once the child
    /// is running; pass a duplicate (e.g. `file.try_clone()?`) to keep using it.
    pub fn stdout_sink(mut self, sink: impl Into<OwnedFd>) -> Self {
        self.stdout_sink = Some(sink.into());
        self
    }

    /// Send the child's stderr straight to `sink`; see [`stdout_sink`](Self::stdout_sink).
    pub fn stderr_sink(mut self, sink: impl Into<OwnedFd>) -> Self {
        self.stderr_sink = Some(sink.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_everything() {
        let req = RunRequest::new("sh")
            .arg("-c")
            .args(["echo $X", "ignored"])
            .input("abc")
            .deadline(Duration::from_secs(2))
            .env("X", "1")
            .current_dir("/tmp");

        assert_eq!(req.program(), "sh");
        assert_eq!(req.args, ["-c", "echo $X", "ignored"]);
        assert_eq!(req.input, b"abc");
        assert_eq!(req.deadline, Some(Duration::from_secs(2)));
        assert_eq!(req.env, [(OsString::from("X"), OsString::from("1"))]);
        assert_eq!(req.current_dir, Some(PathBuf::from("/tmp")));
        assert!(req.stdout_sink.is_none());
    }

    #[test]
    fn maybe_deadline_can_clear() {
        let req = RunRequest::new("true")
            .deadline(Duration::from_secs(1))
            .maybe_deadline(None);
        assert!(req.deadline.is_none());
    }
}
