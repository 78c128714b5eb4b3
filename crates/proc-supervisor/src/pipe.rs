//! Pipe fabric: the three unidirectional channels between supervisor and child.
//!
//! Every descriptor is created close-on-exec. The child-side ends reach the
//! child through `dup2` onto fds 0/1/2 (which clears the flag), so a child
//! launched concurrently from another thread never inherits our endpoints.

use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::error::{Result, SupervisorError};

/// A read/write endpoint pair.
#[derive(Debug)]
pub struct Pipe {
    pub reader: OwnedFd,
    pub writer: OwnedFd,
}

impl Pipe {
    pub fn open() -> Result<Self> {
        Self::open_with(OFlag::O_CLOEXEC)
    }

    /// Open a pipe whose endpoints never block; used for signal wake-ups.
    pub(crate) fn open_nonblocking() -> Result<Self> {
        Self::open_with(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
    }

    fn open_with(flags: OFlag) -> Result<Self> {
        let (reader, writer) = pipe2(flags).map_err(SupervisorError::Pipe)?;
        Ok(Self { reader, writer })
    }
}

/// Endpoints handed to the child as stdin/stdout/stderr.
///
/// Moved into the launch command and closed in the parent as soon as the
/// child is spawned.
#[derive(Debug)]
pub(crate) struct ChildEnds {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

/// Endpoints the supervisor keeps. An output reader is `None` when the
/// caller redirected that stream to its own sink.
#[derive(Debug)]
pub(crate) struct ParentEnds {
    pub stdin: OwnedFd,
    pub stdout: Option<OwnedFd>,
    pub stderr: Option<OwnedFd>,
}

/// Allocate the channels for one run.
pub(crate) fn open_fabric(
    stdout_sink: Option<OwnedFd>,
    stderr_sink: Option<OwnedFd>,
) -> Result<(ChildEnds, ParentEnds)> {
    let stdin = Pipe::open()?;
    let (child_stdout, parent_stdout) = output_channel(stdout_sink)?;
    let (child_stderr, parent_stderr) = output_channel(stderr_sink)?;

    Ok((
        ChildEnds {
            stdin: stdin.reader,
            stdout: child_stdout,
            stderr: child_stderr,
        },
        ParentEnds {
            stdin: stdin.writer,
            stdout: parent_stdout,
            stderr: parent_stderr,
        },
    ))
}

/// A caller-supplied sink is used as the child's end as-is; no second
/// write endpoint is created and there is nothing for the parent to read.
fn output_channel(sink: Option<OwnedFd>) -> Result<(OwnedFd, Option<OwnedFd>)> {
    match sink {
        Some(sink) => Ok((sink, None)),
        None => {
            let pipe = Pipe::open()?;
            Ok((pipe.writer, Some(pipe.reader)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;

    fn is_cloexec(fd: &OwnedFd) -> bool {
        // SAFETY: F_GETFD on a descriptor we own has no side effects.
        let bits = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
        assert!(bits >= 0);
        bits & libc::FD_CLOEXEC != 0
    }

    #[test]
    fn pipe_carries_bytes_from_writer_to_reader() {
        let pipe = Pipe::open().unwrap();
        let mut writer = std::fs::File::from(pipe.writer);
        writer.write_all(b"ping").unwrap();
        drop(writer);

        let mut out = String::new();
        std::fs::File::from(pipe.reader)
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "ping");
    }

    #[test]
    fn pipe_endpoints_are_close_on_exec() {
        let pipe = Pipe::open().unwrap();
        assert!(is_cloexec(&pipe.reader));
        assert!(is_cloexec(&pipe.writer));
    }

    #[test]
    fn fabric_without_sinks_has_all_parent_readers() {
        let (_child, parent) = open_fabric(None, None).unwrap();
        assert!(parent.stdout.is_some());
        assert!(parent.stderr.is_some());
    }

    #[test]
    fn sink_replaces_pipe_and_leaves_no_reader() {
        let file = tempfile::tempfile().unwrap();
        let (child, parent) = open_fabric(Some(OwnedFd::from(file)), None).unwrap();
        assert!(parent.stdout.is_none());
        assert!(parent.stderr.is_some());

        // The child's stdout is the sink itself: writing through it lands in the file.
        let mut sink = std::fs::File::from(child.stdout);
        sink.write_all(b"direct").unwrap();
    }
}
