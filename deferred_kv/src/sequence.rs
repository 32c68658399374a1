//! Completion of an incrementally produced sequence
//!
//! Items are delivered one by one as the store client hands them out. Until
//! an item consumer is registered, items are kept in arrival order; the
//! consumer first receives the backlog, then every later item as it comes.
//! The end of the sequence resolves the inner `Completion<()>`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::stream::Stream;
use tracing::{trace, warn};

use crate::completion::{catch_callback, Completion, CompletionState};
use crate::error::Error;

type ItemConsumer<T> = Box<dyn FnMut(&T) -> Result<(), Error>>;

struct Items<T> {
    backlog: VecDeque<T>,
    consumer: Option<ItemConsumer<T>>,
}

pub struct SequenceCompletion<T> {
    done: Completion<()>,
    items: Rc<RefCell<Items<T>>>,
}

impl<T> Clone for SequenceCompletion<T> {
    fn clone(&self) -> Self {
        Self {
            done: self.done.clone(),
            items: Rc::clone(&self.items),
        }
    }
}

impl<T> fmt::Debug for SequenceCompletion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items = self.items.borrow();
        f.debug_struct("SequenceCompletion")
            .field("done", &self.done)
            .field("buffered", &items.backlog.len())
            .field("has_consumer", &items.consumer.is_some())
            .finish()
    }
}

impl<T: 'static> Default for SequenceCompletion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> SequenceCompletion<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            done: Completion::new(),
            items: Rc::new(RefCell::new(Items {
                backlog: VecDeque::new(),
                consumer: None,
            })),
        }
    }

    /// Hand one item to the consumer, or buffer it if there is none yet.
    /// Returns `false` if the sequence is already terminal and the item
    /// was dropped.
    pub fn deliver_item(&self, item: T) -> bool {
        if self.done.is_resolved() {
            trace!("dropping item delivered after the sequence ended");
            return false;
        }
        let consumer = {
            let mut items = self.items.borrow_mut();
            match items.consumer.take() {
                Some(consumer) => consumer,
                None => {
                    items.backlog.push_back(item);
                    return true;
                }
            }
        };
        if let Some(consumer) = self.feed(consumer, &item) {
            self.restore(consumer);
        }
        true
    }

    /// Mark the sequence as complete
    ///
    /// # Errors
    /// `Error::AlreadyResolved` if the sequence is terminal
    pub fn deliver_end(&self) -> Result<(), Error> {
        self.done.succeed(())?;
        self.items.borrow_mut().consumer = None;
        Ok(())
    }

    /// Register the item consumer. Buffered items are replayed first.
    ///
    /// An `Err` returned by the consumer, or a panic inside it, fails the
    /// sequence with `Error::Callback`.
    pub fn on_each_item(&self, consumer: impl FnMut(&T) -> Result<(), Error> + 'static) -> &Self {
        let mut consumer: ItemConsumer<T> = Box::new(consumer);
        loop {
            let next = self.items.borrow_mut().backlog.pop_front();
            let Some(item) = next else {
                break;
            };
            match self.feed(consumer, &item) {
                Some(c) => consumer = c,
                None => {
                    self.items.borrow_mut().backlog.clear();
                    return self;
                }
            }
        }
        if self.done.is_resolved() {
            // Nothing more can arrive
            return self;
        }
        let mut items = self.items.borrow_mut();
        if items.consumer.is_some() {
            warn!("replacing the item consumer of a sequence");
        }
        items.consumer = Some(consumer);
        self
    }

    /// # Errors
    /// `Error::AlreadyResolved` if the sequence is terminal
    pub fn fail(&self, error: Error) -> Result<(), Error> {
        self.done.fail(error)?;
        self.items.borrow_mut().consumer = None;
        Ok(())
    }

    pub fn on_success(&self, callback: impl FnOnce(&()) + 'static) -> &Self {
        self.done.on_success(callback);
        self
    }

    pub fn on_failure(&self, callback: impl FnOnce(&Error) + 'static) -> &Self {
        self.done.on_failure(callback);
        self
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.done.is_resolved()
    }

    #[must_use]
    pub fn state(&self) -> CompletionState {
        self.done.state()
    }

    /// Items delivered but not yet consumed
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.items.borrow().backlog.len()
    }

    /// The end-of-sequence completion
    #[must_use]
    pub fn as_completion(&self) -> &Completion<()> {
        &self.done
    }

    /// Run the consumer on one item. `None` means the consumer failed and
    /// the sequence has been failed with it.
    fn feed(&self, mut consumer: ItemConsumer<T>, item: &T) -> Option<ItemConsumer<T>> {
        let error = match catch_callback(|| consumer(item)) {
            Ok(Ok(())) => return Some(consumer),
            Ok(Err(Error::Callback(msg))) => Error::Callback(msg),
            Ok(Err(e)) => Error::Callback(e.to_string()),
            Err(panic) => Error::Callback(format!("item consumer panicked: {panic}")),
        };
        warn!(error = %error, "item consumer failed, failing the sequence");
        if self.done.is_resolved() {
            return None;
        }
        let _ = self.fail(error);
        None
    }

    fn restore(&self, consumer: ItemConsumer<T>) {
        let mut items = self.items.borrow_mut();
        // The consumer may have replaced itself, or the sequence may have ended
        if items.consumer.is_none() && !self.done.is_resolved() {
            items.consumer = Some(consumer);
        }
    }
}

impl<T: Clone + 'static> SequenceCompletion<T> {
    /// Items as a stream. A failure is yielded as the last element.
    #[must_use]
    pub fn into_stream(self) -> ItemStream<T> {
        let (tx, rx) = mpsc::unbounded();
        let item_tx = tx.clone();
        let failure_tx = tx.clone();
        self.on_each_item(move |item| {
            let _ = item_tx.unbounded_send(Ok(item.clone()));
            Ok(())
        });
        self.on_success(move |_| tx.close_channel());
        self.on_failure(move |error| {
            let _ = failure_tx.unbounded_send(Err(error.clone()));
            failure_tx.close_channel();
        });
        ItemStream { rx }
    }
}

pub struct ItemStream<T> {
    rx: mpsc::UnboundedReceiver<Result<T, Error>>,
}

impl<T> Stream for ItemStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}
