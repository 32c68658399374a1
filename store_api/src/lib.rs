//! Contracts of the store client library and of the reactor.
//!
//! `deferred_kv` drives any [`StoreClient`] from any [`Reactor`];
//! `store_api_mocked` provides in-memory implementations of both.

mod client_trait;
mod error;
mod handle;
pub mod reactor;
mod request;
mod value;

pub use client_trait::{Connect, StoreClient};
pub use error::{ClientError, Status};
pub use handle::{HandleGen, OpHandle};
pub use reactor::{Dispatched, Reactor, ReadableCallback};
pub use request::{Operation, Request, Response, Search, SortBy};
pub use value::{Attributes, Comparison, Key, Predicate, Value};
