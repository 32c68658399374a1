use std::fmt;

use store_api::{ClientError, OpHandle};

/// Errors delivered through the failure channel of a completion
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The store client reported an error for this operation, or while
    /// polling for completed operations
    Client(ClientError),
    /// The client hit an unrecoverable error earlier and refuses new work
    ClientFailed(Box<Error>),
    /// The client was closed
    Closed,
    /// A caller-supplied callback returned an error or panicked
    Callback(String),
    /// A completion was resolved twice
    AlreadyResolved,
    /// The store client reported progress for a handle nobody awaits
    UnknownHandle(OpHandle),
    /// The reactor refused to watch the poll descriptor
    Watch(String),
    /// Invalid client configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(e) => write!(f, "store client error: {e}"),
            Self::ClientFailed(cause) => write!(
                f,
                "this client has failed, please open a new one (cause: {cause})"
            ),
            Self::Closed => write!(f, "client is closed"),
            Self::Callback(msg) => write!(f, "callback failed: {msg}"),
            Self::AlreadyResolved => write!(f, "completion is already resolved"),
            Self::UnknownHandle(op) => write!(f, "store client reported unknown operation {op}"),
            Self::Watch(msg) => write!(f, "cannot watch poll descriptor: {msg}"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client(e) => Some(e),
            Self::ClientFailed(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<ClientError> for Error {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}
