//! In-flight operations keyed by their store handle
//!
//! The table also owns the reactor registration of the poll descriptor: it
//! is watched while at least one operation is outstanding.
//!
//! ```text
//!   add(H1)   add(H2)   take(H1)   take(H2)
//!    |         |          |          |
//!    v         v          v          v
//!  watch     (no-op)    (no-op)   unwatch
//! ```

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::rc::Rc;

use store_api::{Attributes, OpHandle, Reactor, ReadableCallback, Response};
use tracing::{debug, warn};

use crate::completion::Completion;
use crate::error::Error;
use crate::sequence::SequenceCompletion;

/// What the caller of an in-flight operation is waiting for
#[derive(Debug, Clone)]
pub enum Awaiting {
    Value(Completion<Response>),
    Sequence(SequenceCompletion<Attributes>),
}

impl Awaiting {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Value(c) => c.is_resolved(),
            Self::Sequence(s) => s.is_resolved(),
        }
    }

    /// Fail unless already terminal
    pub fn fail(&self, error: Error) {
        if self.is_resolved() {
            return;
        }
        let _ = match self {
            Self::Value(c) => c.fail(error),
            Self::Sequence(s) => s.fail(error),
        };
    }
}

/// Registration of a poll descriptor with a reactor
pub struct Watch {
    reactor: Rc<dyn Reactor>,
    fd: RawFd,
    on_readable: ReadableCallback,
}

impl Watch {
    #[must_use]
    pub fn new(reactor: Rc<dyn Reactor>, fd: RawFd, on_readable: ReadableCallback) -> Self {
        Self {
            reactor,
            fd,
            on_readable,
        }
    }
}

#[derive(Default)]
pub struct OperationTable {
    entries: HashMap<OpHandle, Awaiting>,
    watch: Option<Watch>,
}

impl OperationTable {
    /// Table without a reactor; it never watches anything
    #[must_use]
    pub fn standalone() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn watched(watch: Watch) -> Self {
        Self {
            entries: HashMap::new(),
            watch: Some(watch),
        }
    }

    #[must_use]
    pub fn has_reactor(&self) -> bool {
        self.watch.is_some()
    }

    /// Register an in-flight operation
    ///
    /// # Errors
    /// `Error::Watch` if this is the first entry and the reactor refuses
    /// the descriptor. The entry is not kept in that case.
    pub fn add(&mut self, op: OpHandle, awaiting: Awaiting) -> Result<(), Error> {
        let first = self.entries.is_empty();
        if self.entries.insert(op, awaiting).is_some() {
            warn!(op = %op, "store client reused a handle that is still in flight");
        }
        if !first {
            return Ok(());
        }
        if let Some(watch) = &self.watch {
            if let Err(e) = watch
                .reactor
                .watch_readable(watch.fd, Rc::clone(&watch.on_readable))
            {
                self.entries.remove(&op);
                return Err(Error::Watch(e.to_string()));
            }
            debug!(fd = watch.fd, "watching poll descriptor");
        }
        Ok(())
    }

    /// Remove an entry; the last removal stops the watch
    pub fn take(&mut self, op: OpHandle) -> Option<Awaiting> {
        let awaiting = self.entries.remove(&op)?;
        if self.entries.is_empty() {
            self.unwatch();
        }
        Some(awaiting)
    }

    #[must_use]
    pub fn get(&self, op: OpHandle) -> Option<&Awaiting> {
        self.entries.get(&op)
    }

    /// Remove every entry, oldest handle first
    pub fn drain(&mut self) -> Vec<(OpHandle, Awaiting)> {
        let was_watching = self.is_watching();
        let mut drained: Vec<_> = self.entries.drain().collect();
        drained.sort_by_key(|(op, _)| *op);
        if was_watching {
            self.unwatch();
        }
        drained
    }

    /// Give the descriptor back to the reactor for good
    pub fn release(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.reactor.release(watch.fd);
            debug!(fd = watch.fd, "released poll descriptor");
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch.is_some() && !self.entries.is_empty()
    }

    fn unwatch(&self) {
        if let Some(watch) = &self.watch {
            watch.reactor.unwatch(watch.fd);
            debug!(fd = watch.fd, "stopped watching poll descriptor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_api::Dispatched;
    use store_api_mocked::{MockReactor, ReactorEvent};

    const FD: RawFd = 9;

    fn table(reactor: &MockReactor) -> OperationTable {
        let reactor: Rc<dyn Reactor> = Rc::new(reactor.clone());
        OperationTable::watched(Watch::new(reactor, FD, Rc::new(|| Dispatched::Nothing)))
    }

    fn value() -> Awaiting {
        Awaiting::Value(Completion::new())
    }

    #[test]
    fn watch_follows_empty_transitions() {
        let reactor = MockReactor::new();
        let mut table = table(&reactor);
        let (a, b) = (OpHandle::new(1), OpHandle::new(2));

        table.add(a, value()).unwrap();
        table.add(b, value()).unwrap();
        assert!(table.take(a).is_some());
        assert!(table.is_watching());
        assert!(table.take(b).is_some());

        assert!(!table.is_watching());
        assert_eq!(
            reactor.events(),
            vec![ReactorEvent::Watch(FD), ReactorEvent::Unwatch(FD)]
        );
    }

    #[test]
    fn get_keeps_the_entry() {
        let reactor = MockReactor::new();
        let mut table = table(&reactor);
        let op = OpHandle::new(3);
        table
            .add(op, Awaiting::Sequence(SequenceCompletion::new()))
            .unwrap();

        assert!(matches!(table.get(op), Some(Awaiting::Sequence(_))));
        assert_eq!(table.len(), 1);
        assert!(table.take(OpHandle::new(4)).is_none());
        assert_eq!(reactor.events(), vec![ReactorEvent::Watch(FD)]);
    }

    #[test]
    fn refused_watch_drops_the_entry() {
        let reactor = MockReactor::new();
        reactor.refuse_next_watch();
        let mut table = table(&reactor);

        let err = table.add(OpHandle::new(1), value()).unwrap_err();

        assert!(matches!(err, Error::Watch(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn drain_returns_oldest_first_and_unwatches() {
        let reactor = MockReactor::new();
        let mut table = table(&reactor);
        for id in [5, 2, 7] {
            table.add(OpHandle::new(id), value()).unwrap();
        }

        let ids: Vec<i64> = table.drain().into_iter().map(|(op, _)| op.id()).collect();

        assert_eq!(ids, vec![2, 5, 7]);
        assert!(!reactor.is_watching(FD));
    }

    #[test]
    fn standalone_table_never_touches_a_reactor() {
        let mut table = OperationTable::standalone();
        table.add(OpHandle::new(1), value()).unwrap();

        assert!(!table.is_watching());
        assert!(!table.has_reactor());
    }
}
