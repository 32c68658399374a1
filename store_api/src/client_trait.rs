use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::ClientError;
use crate::handle::OpHandle;
use crate::request::{Request, Response, Search};
use crate::value::Attributes;

/// Trait for store client operations.
/// Provides an abstraction layer over the store client library: a blocking
/// call per operation, an asynchronous variant that returns an in-flight
/// handle, and the polling primitives needed to drive those handles from an
/// event loop.
pub trait StoreClient {
    /// Run a single-value operation and block until it completes
    fn execute(&mut self, request: &Request) -> Result<Response, ClientError>;

    /// Start a single-value operation and return its in-flight handle
    fn submit(&mut self, request: &Request) -> Result<OpHandle, ClientError>;

    /// Final value of an operation that `loop_once` reported as completed
    fn wait(&mut self, op: OpHandle) -> Result<Response, ClientError>;

    /// Start a streaming operation and return the handle of its iterator
    fn search(&mut self, search: &Search) -> Result<OpHandle, ClientError>;

    /// Next object of a streaming operation; `None` marks the end
    fn next_item(&mut self, op: OpHandle) -> Result<Option<Attributes>, ClientError>;

    /// Wait for one operation to make progress.
    ///
    /// `Some(Duration::ZERO)` polls without blocking and returns `Ok(None)`
    /// when nothing is ready, which also happens after background protocol
    /// traffic. `None` blocks until something completes.
    fn loop_once(&mut self, timeout: Option<Duration>) -> Result<Option<OpHandle>, ClientError>;

    /// Descriptor that becomes readable when `loop_once` has work to do
    fn poll_fd(&self) -> RawFd;
}

/// Store clients that can open a connection to a coordinator
pub trait Connect: StoreClient + Sized {
    /// # Errors
    /// The client library refused the connection target
    fn connect(host: &str, port: u16) -> Result<Self, ClientError>;
}
