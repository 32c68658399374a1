//! A reactor that only records what it is asked to do.
//!
//! Tests play the event loop themselves: `notify_readable` invokes the
//! registered callback as if the descriptor had become readable.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

use store_api::{Dispatched, Reactor, ReadableCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    Watch(RawFd),
    Unwatch(RawFd),
    Release(RawFd),
}

#[derive(Default)]
struct MockReactorState {
    watches: HashMap<RawFd, ReadableCallback>,
    events: Vec<ReactorEvent>,
    refuse_next_watch: bool,
}

#[derive(Clone, Default)]
pub struct MockReactor {
    inner: Rc<RefCell<MockReactorState>>,
}

impl MockReactor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_watching(&self, fd: RawFd) -> bool {
        self.inner.borrow().watches.contains_key(&fd)
    }

    /// Every watch/unwatch/release request, in order
    #[must_use]
    pub fn events(&self) -> Vec<ReactorEvent> {
        self.inner.borrow().events.clone()
    }

    /// Next `watch_readable` fails
    pub fn refuse_next_watch(&self) {
        self.inner.borrow_mut().refuse_next_watch = true;
    }

    /// Invoke the callback of `fd`; `None` if nothing watches it
    pub fn notify_readable(&self, fd: RawFd) -> Option<Dispatched> {
        let callback = self.inner.borrow().watches.get(&fd).cloned()?;
        Some(callback())
    }

    /// Keep notifying until the callback reports nothing more to do.
    /// Returns the number of dispatches that made progress.
    pub fn run_until_idle(&self, fd: RawFd) -> usize {
        let mut progressed = 0;
        while self.notify_readable(fd) == Some(Dispatched::Completed) {
            progressed += 1;
        }
        progressed
    }
}

impl Reactor for MockReactor {
    fn watch_readable(&self, fd: RawFd, on_readable: ReadableCallback) -> io::Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.refuse_next_watch {
            state.refuse_next_watch = false;
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "watch refused by mock reactor",
            ));
        }
        state.watches.insert(fd, on_readable);
        state.events.push(ReactorEvent::Watch(fd));
        Ok(())
    }

    fn unwatch(&self, fd: RawFd) {
        let mut state = self.inner.borrow_mut();
        state.watches.remove(&fd);
        state.events.push(ReactorEvent::Unwatch(fd));
    }

    fn release(&self, fd: RawFd) {
        let mut state = self.inner.borrow_mut();
        state.watches.remove(&fd);
        state.events.push(ReactorEvent::Release(fd));
    }
}
