//! Readiness handler
//!
//! Every readiness event drains at most one completed operation from the
//! store client and routes it to whoever awaits its handle:
//!
//! ```text
//!  poll fd readable
//!        |
//!        v
//!  loop_once(0) --Err--------------------------> fail everything, client failed
//!        |
//!   Some(handle) --not in table----------------> fail everything, client failed
//!        |
//!        +-- Value    -> take entry, wait()      -> succeed / fail
//!        +-- Sequence -> next_item()  Some(item) -> deliver, entry stays
//!                                     None       -> take entry, deliver end
//!                                     Err        -> take entry, fail
//! ```
//!
//! The client state is borrowed only while talking to the store client.
//! Completions are resolved after the borrow is released, and a callback
//! that asks for another dispatch in the meantime is turned away.

use std::cell::RefCell;
use std::time::Duration;

use store_api::{Attributes, ClientError, Dispatched, OpHandle, Response, StoreClient};
use tracing::{debug, error, trace, warn};

use crate::client::Inner;
use crate::completion::Completion;
use crate::error::Error;
use crate::op_table::Awaiting;
use crate::sequence::SequenceCompletion;

/// Outcome of one drain, applied once the client state is released
pub(crate) enum Step {
    Idle,
    Resolve(Completion<Response>, Result<Response, ClientError>),
    Item(SequenceCompletion<Attributes>, Attributes),
    End(SequenceCompletion<Attributes>),
    Abort(SequenceCompletion<Attributes>, ClientError),
    /// Drained for a sequence that a consumer error already failed
    Discard,
    Fatal(Vec<Awaiting>, Error),
}

/// Drain and route one completed operation
pub(crate) fn dispatch_one<C: StoreClient>(
    inner: &RefCell<Inner<C>>,
    timeout: Option<Duration>,
) -> Dispatched {
    let step = {
        let Ok(mut guard) = inner.try_borrow_mut() else {
            warn!("readiness handler re-entered while polling, ignoring");
            return Dispatched::Nothing;
        };
        if guard.dispatching {
            warn!("readiness handler re-entered from a callback, ignoring");
            return Dispatched::Nothing;
        }
        guard.dispatching = true;
        next_step(&mut guard, timeout)
    };
    let dispatched = step.apply();
    if let Ok(mut guard) = inner.try_borrow_mut() {
        guard.dispatching = false;
    }
    dispatched
}

fn next_step<C: StoreClient>(inner: &mut Inner<C>, timeout: Option<Duration>) -> Step {
    if inner.failure.is_some() {
        return Step::Idle;
    }
    let Some(client) = inner.client.as_mut() else {
        return Step::Idle;
    };
    let op = match client.loop_once(timeout) {
        Ok(Some(op)) => op,
        Ok(None) => {
            trace!("spurious readiness");
            return Step::Idle;
        }
        Err(e) => return inner.enter_failed(Error::Client(e)),
    };
    let Some(awaiting) = inner.table.get(op).cloned() else {
        error!(op = %op, "store client reported an operation nobody awaits");
        return inner.enter_failed(Error::UnknownHandle(op));
    };
    match awaiting {
        Awaiting::Value(completion) => {
            inner.table.take(op);
            let result = match inner.client.as_mut() {
                Some(client) => client.wait(op),
                None => return Step::Idle,
            };
            trace!(op = %op, pending = inner.table.len(), "operation finished");
            Step::Resolve(completion, result)
        }
        Awaiting::Sequence(sequence) => next_item(inner, op, sequence),
    }
}

fn next_item<C: StoreClient>(
    inner: &mut Inner<C>,
    op: OpHandle,
    sequence: SequenceCompletion<Attributes>,
) -> Step {
    let item = match inner.client.as_mut() {
        Some(client) => client.next_item(op),
        None => return Step::Idle,
    };
    match item {
        Ok(Some(_)) if sequence.is_resolved() => {
            trace!(op = %op, "dropping item of a failed sequence");
            Step::Discard
        }
        Ok(Some(item)) => Step::Item(sequence, item),
        Ok(None) => {
            inner.table.take(op);
            trace!(op = %op, pending = inner.table.len(), "sequence finished");
            if sequence.is_resolved() {
                Step::Discard
            } else {
                Step::End(sequence)
            }
        }
        Err(e) => {
            inner.table.take(op);
            Step::Abort(sequence, e)
        }
    }
}

impl Step {
    fn apply(self) -> Dispatched {
        match self {
            Self::Idle => return Dispatched::Nothing,
            Self::Resolve(completion, result) => {
                if let Err(e) = completion.resolve(result.map_err(Error::Client)) {
                    error!(error = %e, "operation resolved twice");
                }
            }
            Self::Item(sequence, item) => {
                sequence.deliver_item(item);
            }
            Self::End(sequence) => {
                if let Err(e) = sequence.deliver_end() {
                    error!(error = %e, "sequence ended twice");
                }
            }
            Self::Abort(sequence, e) => {
                debug!(error = %e, "sequence failed mid-way");
                let _ = sequence.fail(Error::Client(e));
            }
            Self::Discard => {}
            Self::Fatal(outstanding, error) => {
                for awaiting in outstanding {
                    awaiting.fail(error.clone());
                }
                return Dispatched::Nothing;
            }
        }
        Dispatched::Completed
    }
}
