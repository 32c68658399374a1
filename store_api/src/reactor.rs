//! Reactor integration point
//!
//! The event loop that owns readiness notification. A client registers its
//! poll descriptor while operations are outstanding and the reactor calls
//! back whenever the descriptor is readable.

use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Outcome of one readiness callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Nothing was ready; the descriptor has been drained
    Nothing,
    /// One operation made progress; more may be ready
    Completed,
}

/// Callback invoked by the reactor when a watched descriptor is readable
pub type ReadableCallback = Rc<dyn Fn() -> Dispatched>;

pub trait Reactor {
    /// Start calling `on_readable` whenever `fd` is readable
    ///
    /// # Errors
    /// The descriptor cannot be registered with the event loop
    fn watch_readable(&self, fd: RawFd, on_readable: ReadableCallback) -> io::Result<()>;

    /// Stop calling back for `fd`
    fn unwatch(&self, fd: RawFd);

    /// Forget `fd` entirely; it is about to be closed
    fn release(&self, fd: RawFd) {
        self.unwatch(fd);
    }
}
