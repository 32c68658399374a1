//! Reactor backed by the tokio runtime
//!
//! Each watched descriptor gets one local task that waits for read
//! readiness and runs the registered callback:
//!
//! ```text
//!  watch_readable(fd) ── first time ──> AsyncFd + spawn_local(watch_loop)
//!                     ── again ───────> resume the paused task
//!  unwatch(fd)        ────────────────> pause (registration is kept)
//!  release(fd)        ────────────────> abort the task, deregister
//! ```
//!
//! The tasks are `!Send`, so the reactor must be used from inside a
//! [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

use store_api::{Dispatched, Reactor, ReadableCallback};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

struct WatchState {
    active: Cell<bool>,
    resume: Notify,
    on_readable: RefCell<ReadableCallback>,
}

struct FdWatch {
    state: Rc<WatchState>,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct TokioReactor {
    watches: RefCell<HashMap<RawFd, FdWatch>>,
}

impl TokioReactor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors with a live task, paused or not
    #[must_use]
    pub fn registered(&self) -> usize {
        self.watches.borrow().len()
    }
}

async fn watch_loop(fd: AsyncFd<RawFd>, state: Rc<WatchState>) {
    loop {
        if !state.active.get() {
            state.resume.notified().await;
            continue;
        }
        let mut guard = match fd.readable().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(fd = fd.get_ref(), error = %e, "poll descriptor failed");
                return;
            }
        };
        if !state.active.get() {
            continue;
        }
        let on_readable = state.on_readable.borrow().clone();
        match on_readable() {
            Dispatched::Nothing => guard.clear_ready(),
            Dispatched::Completed => {
                // More may be queued behind this one; keep the readiness
                drop(guard);
                tokio::task::yield_now().await;
            }
        }
    }
}

impl Reactor for TokioReactor {
    fn watch_readable(&self, fd: RawFd, on_readable: ReadableCallback) -> io::Result<()> {
        let mut watches = self.watches.borrow_mut();
        if let Some(watch) = watches.get(&fd) {
            *watch.state.on_readable.borrow_mut() = on_readable;
            watch.state.active.set(true);
            watch.state.resume.notify_one();
            trace!(fd, "resumed watch");
            return Ok(());
        }
        let async_fd = AsyncFd::with_interest(fd, Interest::READABLE)?;
        let state = Rc::new(WatchState {
            active: Cell::new(true),
            resume: Notify::new(),
            on_readable: RefCell::new(on_readable),
        });
        let task = tokio::task::spawn_local(watch_loop(async_fd, Rc::clone(&state)));
        watches.insert(fd, FdWatch { state, task });
        debug!(fd, "registered descriptor");
        Ok(())
    }

    fn unwatch(&self, fd: RawFd) {
        if let Some(watch) = self.watches.borrow().get(&fd) {
            watch.state.active.set(false);
            trace!(fd, "paused watch");
        }
    }

    fn release(&self, fd: RawFd) {
        if let Some(watch) = self.watches.borrow_mut().remove(&fd) {
            watch.task.abort();
            debug!(fd, "deregistered descriptor");
        }
    }
}

impl Drop for TokioReactor {
    fn drop(&mut self) {
        for (_, watch) in self.watches.get_mut().drain() {
            watch.task.abort();
        }
    }
}
