//! Non-blocking facade over a synchronous store client.
//!
//! [`DeferredClient`] submits operations to a [`store_api::StoreClient`] and
//! hands back a [`Completion`] (single value) or a [`SequenceCompletion`]
//! (search results). A [`store_api::Reactor`] watches the client's poll
//! descriptor while operations are in flight and drives the dispatcher,
//! which correlates every finished operation with its awaiting completion.

pub mod client;
pub mod completion;
pub mod config;
mod dispatcher;
pub mod error;
pub mod op_table;
pub mod reactor;
pub mod sequence;

pub use client::{DeferredClient, Mode};
pub use completion::{Completion, CompletionFuture, CompletionState};
pub use config::ClientConfig;
pub use error::Error;
pub use op_table::{Awaiting, OperationTable, Watch};
pub use reactor::TokioReactor;
pub use sequence::{ItemStream, SequenceCompletion};
