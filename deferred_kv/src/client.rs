//! Deferred store client
//!
//! [`DeferredClient`] wraps a synchronous [`StoreClient`] and returns a
//! completion for every call instead of blocking.
//!
//! ```text
//!   caller ──get()──> DeferredClient ──submit()──> StoreClient
//!     ^                    │                            │
//!     │              OperationTable                 poll fd
//!     │             (handle -> awaiting)                │
//!     │                    ^                            v
//!     └── callbacks ── dispatcher <── readable ──── Reactor
//! ```
//!
//! In `Mode::Standalone` there is no event loop: every call runs to
//! completion before it returns, and the returned completion is already
//! resolved.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use store_api::{
    Attributes, Connect, Dispatched, Key, Predicate, ReadableCallback, Reactor, Request, Response,
    Search, StoreClient,
};
use tracing::{debug, error, trace, warn};

use crate::completion::Completion;
use crate::config::ClientConfig;
use crate::dispatcher::{self, Step};
use crate::error::Error;
use crate::op_table::{Awaiting, OperationTable, Watch};
use crate::sequence::SequenceCompletion;

/// How completions are driven
#[derive(Clone)]
pub enum Mode {
    /// Calls block inside the store client and resolve before returning
    Standalone,
    /// Calls are submitted and resolved from the reactor's readiness events
    Reactor(Rc<dyn Reactor>),
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "Standalone"),
            Self::Reactor(_) => write!(f, "Reactor"),
        }
    }
}

impl Mode {
    #[must_use]
    pub fn reactor(reactor: impl Reactor + 'static) -> Self {
        Self::Reactor(Rc::new(reactor))
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        matches!(self, Self::Standalone)
    }
}

pub(crate) struct Inner<C> {
    /// `None` once closed
    pub(crate) client: Option<C>,
    pub(crate) table: OperationTable,
    /// Error that put the client into the failed state
    pub(crate) failure: Option<Error>,
    /// Completions of a drained operation are being resolved
    pub(crate) dispatching: bool,
    mode: Mode,
    target: ClientConfig,
}

/// Synchronous outcome of starting a streaming call
enum Streamed {
    InFlight,
    Inline {
        items: Vec<Attributes>,
        end: Result<(), Error>,
    },
}

impl<C: StoreClient> Inner<C> {
    fn usable(&mut self) -> Result<&mut C, Error> {
        if let Some(cause) = &self.failure {
            return Err(Error::ClientFailed(Box::new(cause.clone())));
        }
        self.client.as_mut().ok_or(Error::Closed)
    }

    /// Switch to the failed state and hand out everything still awaited
    pub(crate) fn enter_failed(&mut self, error: Error) -> Step {
        let outstanding: Vec<Awaiting> = self
            .table
            .drain()
            .into_iter()
            .map(|(_, awaiting)| awaiting)
            .collect();
        error!(
            error = %error,
            outstanding = outstanding.len(),
            coordinator = %self.target,
            "store client failed"
        );
        self.failure = Some(error.clone());
        Step::Fatal(outstanding, error)
    }

    /// `None` if the request is in flight, else its final result
    fn start(
        &mut self,
        request: &Request,
        completion: &Completion<Response>,
    ) -> Option<Result<Response, Error>> {
        let standalone = !self.table.has_reactor();
        let client = match self.usable() {
            Ok(client) => client,
            Err(e) => return Some(Err(e)),
        };
        let operation = request.operation().name();
        if standalone {
            trace!(operation, "executing");
            return Some(client.execute(request).map_err(Error::from));
        }
        let op = match client.submit(request) {
            Ok(op) => op,
            Err(e) => {
                debug!(operation, error = %e, "submit refused");
                return Some(Err(Error::Client(e)));
            }
        };
        if let Err(e) = self.table.add(op, Awaiting::Value(completion.clone())) {
            return Some(Err(self.watch_failed(e)));
        }
        trace!(op = %op, operation, pending = self.table.len(), "submitted");
        None
    }

    fn start_stream(
        &mut self,
        search: &Search,
        sequence: &SequenceCompletion<Attributes>,
    ) -> Streamed {
        let standalone = !self.table.has_reactor();
        let inline_error = |e: Error| Streamed::Inline {
            items: Vec::new(),
            end: Err(e),
        };
        let client = match self.usable() {
            Ok(client) => client,
            Err(e) => return inline_error(e),
        };
        let operation = search.operation().name();
        let op = match client.search(search) {
            Ok(op) => op,
            Err(e) => {
                debug!(operation, error = %e, "search refused");
                return inline_error(Error::Client(e));
            }
        };
        if standalone {
            let mut items = Vec::new();
            let end = loop {
                match client.next_item(op) {
                    Ok(Some(item)) => items.push(item),
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(Error::Client(e)),
                }
            };
            trace!(operation, items = items.len(), "search exhausted");
            return Streamed::Inline { items, end };
        }
        if let Err(e) = self.table.add(op, Awaiting::Sequence(sequence.clone())) {
            return inline_error(self.watch_failed(e));
        }
        trace!(op = %op, operation, pending = self.table.len(), "search submitted");
        Streamed::InFlight
    }

    /// A refused watch leaves an operation that nothing will ever drain
    fn watch_failed(&mut self, error: Error) -> Error {
        error!(error = %error, coordinator = %self.target, "reactor refused the poll descriptor");
        self.failure = Some(error.clone());
        error
    }
}

/// Callback-driven facade over a synchronous store client
pub struct DeferredClient<C: StoreClient + 'static> {
    inner: Rc<RefCell<Inner<C>>>,
}

impl<C: Connect + 'static> DeferredClient<C> {
    /// Connect to the coordinator named by `config`
    ///
    /// # Errors
    /// The store client refused the connection
    pub fn connect(config: &ClientConfig, mode: Mode) -> Result<Self, Error> {
        let client = C::connect(&config.host, config.port)?;
        debug!(coordinator = %config, ?mode, "connected");
        Ok(Self::with_client(client, config.clone(), mode))
    }
}

impl<C: StoreClient + 'static> DeferredClient<C> {
    /// Wrap an already connected client
    #[must_use]
    pub fn with_client(client: C, target: ClientConfig, mode: Mode) -> Self {
        let fd = client.poll_fd();
        let inner = Rc::new_cyclic(|weak: &Weak<RefCell<Inner<C>>>| {
            let table = match &mode {
                Mode::Standalone => OperationTable::standalone(),
                Mode::Reactor(reactor) => {
                    let weak = weak.clone();
                    let on_readable: ReadableCallback = Rc::new(move || match weak.upgrade() {
                        Some(inner) => dispatcher::dispatch_one(&inner, Some(Duration::ZERO)),
                        None => Dispatched::Nothing,
                    });
                    OperationTable::watched(Watch::new(Rc::clone(reactor), fd, on_readable))
                }
            };
            RefCell::new(Inner {
                client: Some(client),
                table,
                failure: None,
                dispatching: false,
                mode,
                target,
            })
        });
        Self { inner }
    }

    /// Start a single-value operation
    pub fn call(&self, request: Request) -> Completion<Response> {
        let completion = Completion::new();
        let outcome = self.inner.borrow_mut().start(&request, &completion);
        if let Some(result) = outcome {
            let _ = completion.resolve(result);
        }
        completion
    }

    /// Start a streaming operation
    pub fn stream(&self, search: Search) -> SequenceCompletion<Attributes> {
        let sequence = SequenceCompletion::new();
        let streamed = self.inner.borrow_mut().start_stream(&search, &sequence);
        if let Streamed::Inline { items, end } = streamed {
            for item in items {
                sequence.deliver_item(item);
            }
            let _ = match end {
                Ok(()) => sequence.deliver_end(),
                Err(e) => sequence.fail(e),
            };
        }
        sequence
    }

    pub fn get(&self, space: &str, key: impl Into<Key>) -> Completion<Response> {
        self.call(Request::Get {
            space: space.to_string(),
            key: key.into(),
        })
    }

    pub fn put(&self, space: &str, key: impl Into<Key>, attributes: Attributes) -> Completion<Response> {
        self.call(Request::Put {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn put_if_not_exist(
        &self,
        space: &str,
        key: impl Into<Key>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::PutIfNotExist {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn cond_put(
        &self,
        space: &str,
        key: impl Into<Key>,
        checks: Vec<Predicate>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::CondPut {
            space: space.to_string(),
            key: key.into(),
            checks,
            attributes,
        })
    }

    pub fn del(&self, space: &str, key: impl Into<Key>) -> Completion<Response> {
        self.call(Request::Del {
            space: space.to_string(),
            key: key.into(),
        })
    }

    pub fn cond_del(
        &self,
        space: &str,
        key: impl Into<Key>,
        checks: Vec<Predicate>,
    ) -> Completion<Response> {
        self.call(Request::CondDel {
            space: space.to_string(),
            key: key.into(),
            checks,
        })
    }

    pub fn atomic_add(
        &self,
        space: &str,
        key: impl Into<Key>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::AtomicAdd {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn atomic_sub(
        &self,
        space: &str,
        key: impl Into<Key>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::AtomicSub {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn string_append(
        &self,
        space: &str,
        key: impl Into<Key>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::StringAppend {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn string_prepend(
        &self,
        space: &str,
        key: impl Into<Key>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::StringPrepend {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn list_rpush(
        &self,
        space: &str,
        key: impl Into<Key>,
        attributes: Attributes,
    ) -> Completion<Response> {
        self.call(Request::ListRpush {
            space: space.to_string(),
            key: key.into(),
            attributes,
        })
    }

    pub fn count(&self, space: &str, predicates: Vec<Predicate>) -> Completion<Response> {
        self.call(Request::Count {
            space: space.to_string(),
            predicates,
        })
    }

    pub fn group_del(&self, space: &str, predicates: Vec<Predicate>) -> Completion<Response> {
        self.call(Request::GroupDel {
            space: space.to_string(),
            predicates,
        })
    }

    pub fn search(&self, space: &str, predicates: Vec<Predicate>) -> SequenceCompletion<Attributes> {
        self.stream(Search::new(space, predicates))
    }

    pub fn sorted_search(
        &self,
        space: &str,
        predicates: Vec<Predicate>,
        sort_by: &str,
        limit: usize,
        descending: bool,
    ) -> SequenceCompletion<Attributes> {
        self.stream(Search::new(space, predicates).sorted(sort_by, limit, descending))
    }

    /// Drain one completed operation, as the reactor does on readiness.
    /// For embedders that run their own event loop.
    pub fn handle_readable(&self) -> Dispatched {
        dispatcher::dispatch_one(&self.inner, Some(Duration::ZERO))
    }

    /// Wait for every outstanding operation, then detach from the reactor
    /// and release the store client. Later calls fail with `Error::Closed`.
    ///
    /// Closing from inside a completion callback cannot wait: operations
    /// still in flight then fail with `Error::Closed`.
    pub fn close(&self) {
        let abandoned = loop {
            {
                let mut inner = self.inner.borrow_mut();
                if inner.client.is_none() {
                    return;
                }
                if inner.table.is_empty() {
                    break Vec::new();
                }
                if inner.dispatching {
                    warn!(
                        outstanding = inner.table.len(),
                        "closed from a callback, abandoning outstanding operations"
                    );
                    break inner.table.drain();
                }
            }
            dispatcher::dispatch_one(&self.inner, None);
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.table.release();
            inner.client = None;
            debug!(coordinator = %inner.target, "client closed");
        }
        for (_, awaiting) in abandoned {
            awaiting.fail(Error::Closed);
        }
    }

    /// Operations in flight
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.borrow().table.len()
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.inner.borrow().failure.is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().client.is_none()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.borrow().mode.clone()
    }

    #[must_use]
    pub fn target(&self) -> ClientConfig {
        self.inner.borrow().target.clone()
    }
}

impl<C: StoreClient + 'static> Drop for DeferredClient<C> {
    fn drop(&mut self) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };
        if !inner.table.is_empty() {
            warn!(
                outstanding = inner.table.len(),
                "client dropped with operations in flight"
            );
        }
        inner.table.release();
    }
}
