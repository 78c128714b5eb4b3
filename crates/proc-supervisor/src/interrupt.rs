//! Scoped SIGINT interception.
//!
//! While at least one run is active, SIGINT is routed to [`on_interrupt`],
//! which SIGKILLs every watched process group and wakes the supervising
//! tasks through per-run pipes. When the last active run releases its guard
//! the previous disposition is restored, and if an interrupt arrived in the
//! meantime it is raised again so the host sees it as if we had never been
//! installed.
//!
//! Signal-context state is limited to atomics in [`SLOTS`], [`PENDING`] and
//! [`IN_FLIGHT`]; the mutex-guarded [`Registry`] is only touched from normal
//! code.

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, raise, sigaction};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};
use crate::pipe::Pipe;

/// Maximum number of runs that can be supervised concurrently in one process.
pub const MAX_CONCURRENT_RUNS: usize = 64;

/// The host signal being intercepted.
const INTERRUPT: Signal = Signal::SIGINT;

/// One concurrently supervised run, as seen from signal context.
struct Slot {
    /// Write end of the run's wake pipe; `-1` when the slot is free.
    wake_fd: AtomicI32,
    /// Process group to kill; `0` until the child is launched.
    pgid: AtomicI32,
}

impl Slot {
    const FREE: Slot = Slot {
        wake_fd: AtomicI32::new(-1),
        pgid: AtomicI32::new(0),
    };
}

static SLOTS: [Slot; MAX_CONCURRENT_RUNS] = [const { Slot::FREE }; MAX_CONCURRENT_RUNS];

/// Set by the handler; consumed by whoever restores the previous disposition.
static PENDING: AtomicBool = AtomicBool::new(false);

/// Number of handler invocations currently executing.
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

struct Registry {
    active: usize,
    previous: Option<SigAction>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    active: 0,
    previous: None,
});

/// Async-signal-safe: atomics, `killpg` and `write` only.
extern "C" fn on_interrupt(_sig: libc::c_int) {
    IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    let saved_errno = Errno::last_raw();

    PENDING.store(true, Ordering::SeqCst);
    for slot in &SLOTS {
        let fd = slot.wake_fd.load(Ordering::SeqCst);
        if fd < 0 {
            continue;
        }
        let pgid = slot.pgid.load(Ordering::SeqCst);
        if pgid > 0 {
            // SAFETY: killpg has no memory-safety preconditions and is async-signal-safe.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
        let byte = 1u8;
        // SAFETY: `fd` stays open until IN_FLIGHT drops to zero (see `Interceptor::disengage`);
        // the buffer is a live local; write is async-signal-safe. A full pipe just returns EAGAIN.
        unsafe {
            libc::write(fd, (&raw const byte).cast(), 1);
        }
    }

    Errno::set_raw(saved_errno);
    IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
}

/// Per-run guard over the process-wide SIGINT handler.
///
/// Acquired before the child is launched and released exactly once, either
/// explicitly through [`release`](Self::release) or on drop.
pub(crate) struct Interceptor {
    slot: Option<usize>,
    wake_rx: pipe::Receiver,
    // Kept open for the handler; closed only after the slot is cleared.
    _wake_tx: OwnedFd,
}

impl Interceptor {
    pub fn install() -> Result<Self> {
        let wake = Pipe::open_nonblocking()?;
        let wake_rx = pipe::Receiver::from_owned_fd(wake.reader)?;
        let wake_fd = wake.writer.as_raw_fd();

        let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());

        let index = claim_slot(wake_fd).ok_or_else(|| {
            SupervisorError::Interceptor(format!(
                "all {MAX_CONCURRENT_RUNS} interrupt slots are in use"
            ))
        })?;

        if registry.active == 0 {
            let action = SigAction::new(
                SigHandler::Handler(on_interrupt),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            // SAFETY: `on_interrupt` only performs async-signal-safe operations.
            match unsafe { sigaction(INTERRUPT, &action) } {
                Ok(previous) => {
                    registry.previous = Some(previous);
                    debug!("SIGINT interceptor installed");
                }
                Err(e) => {
                    free_slot(index);
                    return Err(SupervisorError::Interceptor(format!(
                        "sigaction(SIGINT): {e}"
                    )));
                }
            }
        }
        registry.active += 1;

        Ok(Self {
            slot: Some(index),
            wake_rx,
            _wake_tx: wake.writer,
        })
    }

    /// Publish the launched process group so the handler can kill it.
    pub fn watch(&self, pgid: Pid) {
        if let Some(slot) = self.slot.and_then(|i| SLOTS.get(i)) {
            slot.pgid.store(pgid.as_raw(), Ordering::SeqCst);
        }
    }

    /// Resolves once an interrupt has been delivered during this run.
    pub async fn tripped(&mut self) {
        let mut buf = [0u8; 16];
        match self.wake_rx.read(&mut buf).await {
            Ok(n) if n > 0 => {}
            Ok(_) => std::future::pending::<()>().await,
            Err(e) => {
                warn!(error = %e, "interrupt wake pipe unreadable");
                std::future::pending::<()>().await
            }
        }
    }

    /// Leave interception; the last active run restores the previous
    /// disposition and re-raises a pending interrupt.
    pub fn release(mut self) {
        self.disengage();
    }

    fn disengage(&mut self) {
        let Some(index) = self.slot.take() else {
            return;
        };
        free_slot(index);
        // A handler that loaded our fd before it was cleared may still be writing to it.
        while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }

        let reraise = {
            let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
            registry.active = registry.active.saturating_sub(1);
            if registry.active > 0 {
                false
            } else {
                if let Some(previous) = registry.previous.take() {
                    // SAFETY: reinstating the disposition that was in place before us.
                    if let Err(e) = unsafe { sigaction(INTERRUPT, &previous) } {
                        warn!(error = %e, "failed to restore previous SIGINT disposition");
                    } else {
                        debug!("previous SIGINT disposition restored");
                    }
                }
                PENDING.swap(false, Ordering::SeqCst)
            }
        };

        if reraise {
            info!("re-raising SIGINT for the host process");
            if let Err(e) = raise(INTERRUPT) {
                warn!(error = %e, "failed to re-raise SIGINT");
            }
        }
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.disengage();
    }
}

fn claim_slot(wake_fd: i32) -> Option<usize> {
    SLOTS.iter().position(|slot| {
        slot.wake_fd
            .compare_exchange(-1, wake_fd, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    })
}

fn free_slot(index: usize) {
    if let Some(slot) = SLOTS.get(index) {
        slot.wake_fd.store(-1, Ordering::SeqCst);
        slot.pgid.store(0, Ordering::SeqCst);
    }
}
