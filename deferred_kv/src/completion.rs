//! Single-assignment completion
//!
//! A [`Completion`] is resolved exactly once, either with a value or with an
//! [`Error`]. Callbacks can be attached before or after resolution:
//!
//! - registered while pending, they run at resolution time, in registration
//!   order, exactly once;
//! - registered after resolution, they run immediately with the stored
//!   outcome.
//!
//! All clones share one state. Nothing in here locks: a completion lives on
//! the event-loop thread, and callbacks never run while the state is
//! borrowed, so they are free to register more callbacks or to start new
//! operations.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use tracing::error;

use crate::error::Error;

type SuccessCallback<T> = Box<dyn FnOnce(&T)>;
type FailureCallback = Box<dyn FnOnce(&Error)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    Succeeded,
    Failed,
}

enum State<T> {
    Pending {
        on_success: Vec<SuccessCallback<T>>,
        on_failure: Vec<FailureCallback>,
    },
    Succeeded(Rc<T>),
    Failed(Rc<Error>),
}

pub struct Completion<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.borrow() {
            State::Pending { .. } => "pending".to_string(),
            State::Succeeded(_) => "succeeded".to_string(),
            State::Failed(e) => format!("failed: {e}"),
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}

impl<T: 'static> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Completion<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending {
                on_success: Vec::new(),
                on_failure: Vec::new(),
            })),
        }
    }

    /// Completion that has already succeeded with `value`
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Succeeded(Rc::new(value)))),
        }
    }

    /// Completion that has already failed with `error`
    #[must_use]
    pub fn failed(error: Error) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Failed(Rc::new(error)))),
        }
    }

    #[must_use]
    pub fn state(&self) -> CompletionState {
        match &*self.state.borrow() {
            State::Pending { .. } => CompletionState::Pending,
            State::Succeeded(_) => CompletionState::Succeeded,
            State::Failed(_) => CompletionState::Failed,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state() != CompletionState::Pending
    }

    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.state() == CompletionState::Succeeded
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state() == CompletionState::Failed
    }

    /// Resolve with `value` and run the success callbacks
    ///
    /// # Errors
    /// `Error::AlreadyResolved` if the completion is terminal
    pub fn succeed(&self, value: T) -> Result<(), Error> {
        let (callbacks, value) = {
            let mut state = self.state.borrow_mut();
            let State::Pending { on_success, .. } = &mut *state else {
                return Err(Error::AlreadyResolved);
            };
            let callbacks = std::mem::take(on_success);
            let value = Rc::new(value);
            *state = State::Succeeded(Rc::clone(&value));
            (callbacks, value)
        };
        for callback in callbacks {
            run_guarded("success", || callback(&value));
        }
        Ok(())
    }

    /// Resolve with `error` and run the failure callbacks
    ///
    /// # Errors
    /// `Error::AlreadyResolved` if the completion is terminal
    pub fn fail(&self, error: Error) -> Result<(), Error> {
        let (callbacks, error) = {
            let mut state = self.state.borrow_mut();
            let State::Pending { on_failure, .. } = &mut *state else {
                return Err(Error::AlreadyResolved);
            };
            let callbacks = std::mem::take(on_failure);
            let error = Rc::new(error);
            *state = State::Failed(Rc::clone(&error));
            (callbacks, error)
        };
        for callback in callbacks {
            run_guarded("failure", || callback(&error));
        }
        Ok(())
    }

    /// Resolve with whichever side `result` holds
    ///
    /// # Errors
    /// `Error::AlreadyResolved` if the completion is terminal
    pub fn resolve(&self, result: Result<T, Error>) -> Result<(), Error> {
        match result {
            Ok(value) => self.succeed(value),
            Err(error) => self.fail(error),
        }
    }

    /// Run `callback` with the value once the completion succeeds
    pub fn on_success(&self, callback: impl FnOnce(&T) + 'static) -> &Self {
        let value = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending { on_success, .. } => {
                    on_success.push(Box::new(callback));
                    return self;
                }
                State::Succeeded(value) => Rc::clone(value),
                State::Failed(_) => return self,
            }
        };
        run_guarded("success", || callback(&value));
        self
    }

    /// Run `callback` with the error once the completion fails
    pub fn on_failure(&self, callback: impl FnOnce(&Error) + 'static) -> &Self {
        let error = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending { on_failure, .. } => {
                    on_failure.push(Box::new(callback));
                    return self;
                }
                State::Failed(error) => Rc::clone(error),
                State::Succeeded(_) => return self,
            }
        };
        run_guarded("failure", || callback(&error));
        self
    }
}

/// Run a caller-supplied callback, containing any panic it raises
pub(crate) fn catch_callback<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn run_guarded(kind: &str, f: impl FnOnce()) {
    if let Err(msg) = catch_callback(f) {
        error!(callback = kind, panic = %msg, "completion callback panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

/// Future returned by awaiting a [`Completion`]
pub struct CompletionFuture<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Future for CompletionFuture<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Every holder of the completion went away while it was pending
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Clone + 'static> IntoFuture for Completion<T> {
    type Output = Result<T, Error>;
    type IntoFuture = CompletionFuture<T>;

    fn into_future(self) -> CompletionFuture<T> {
        let (tx, rx) = oneshot::channel();
        let on_success_tx = Rc::new(RefCell::new(Some(tx)));
        let on_failure_tx = Rc::clone(&on_success_tx);
        self.on_success(move |value| {
            if let Some(tx) = on_success_tx.borrow_mut().take() {
                let _ = tx.send(Ok(value.clone()));
            }
        });
        self.on_failure(move |error| {
            if let Some(tx) = on_failure_tx.borrow_mut().take() {
                let _ = tx.send(Err(error.clone()));
            }
        });
        CompletionFuture { rx }
    }
}
