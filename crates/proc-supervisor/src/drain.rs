//! Input feed and output drain, each running as its own tokio task so the
//! child can never stall on a full pipe the supervisor is not servicing.

use std::io;
use std::os::fd::OwnedFd;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which output stream a drain serves; only used to label log events.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Push `input` into the child's stdin and close it.
///
/// A child that exits (or closes stdin) before consuming everything makes
/// the write fail with `EPIPE`; that is expected and only logged.
pub(crate) fn feed_input(writer: OwnedFd, input: Vec<u8>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match write_and_close(writer, &input).await {
            Ok(()) => debug!(bytes = input.len(), "stdin fed and closed"),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(bytes = input.len(), "child closed stdin before consuming all input");
            }
            Err(e) => debug!(error = %e, "writing child stdin failed"),
        }
    })
}

async fn write_and_close(writer: OwnedFd, input: &[u8]) -> io::Result<()> {
    let mut sender = pipe::Sender::from_owned_fd(writer)?;
    if !input.is_empty() {
        sender.write_all(input).await?;
    }
    // Dropping the sender closes the last parent-side write end.
    Ok(())
}

/// Read `reader` to end-of-stream on a background task.
///
/// With no reader (the stream went to a caller-supplied sink) the task
/// completes immediately with empty content.
pub(crate) fn drain_output(reader: Option<OwnedFd>, stream: Stream) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let Some(reader) = reader else {
            return Vec::new();
        };

        let mut buf = Vec::new();
        if let Err(e) = read_to_end(reader, &mut buf).await {
            warn!(stream = stream.as_str(), error = %e, kept = buf.len(), "draining child output failed");
        }
        debug!(stream = stream.as_str(), bytes = buf.len(), "output drained");
        buf
    })
}

async fn read_to_end(reader: OwnedFd, buf: &mut Vec<u8>) -> io::Result<()> {
    let mut receiver = pipe::Receiver::from_owned_fd(reader)?;
    receiver.read_to_end(buf).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;

    #[tokio::test]
    async fn drain_without_reader_is_empty() {
        let out = drain_output(None, Stream::Stdout).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn fed_input_is_drained_on_the_other_end() {
        let pipe = Pipe::open().unwrap();
        let drained = drain_output(Some(pipe.reader), Stream::Stdout);
        feed_input(pipe.writer, b"abc".to_vec()).await.unwrap();
        assert_eq!(drained.await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn large_payload_moves_through_a_pipe_without_deadlock() {
        // Far larger than a pipe buffer, so writer and reader must interleave.
        let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let pipe = Pipe::open().unwrap();
        let drained = drain_output(Some(pipe.reader), Stream::Stderr);
        feed_input(pipe.writer, payload.clone()).await.unwrap();
        assert_eq!(drained.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn feeding_a_closed_pipe_does_not_fail_the_task() {
        let pipe = Pipe::open().unwrap();
        drop(pipe.reader);
        // Rust binaries ignore SIGPIPE, so this surfaces as EPIPE and is swallowed.
        feed_input(pipe.writer, vec![0u8; 1024]).await.unwrap();
    }
}
