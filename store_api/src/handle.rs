use std::cell::Cell;
use std::fmt;

/// Opaque token identifying one in-flight operation of a store client.
///
/// Handles are minted by the client for every asynchronous call and are
/// unique among the operations that are in flight at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpHandle {
    id: i64,
}

impl OpHandle {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for OpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.id)
    }
}

/// Single-threaded handle generator
#[derive(Debug)]
pub struct HandleGen {
    next_id: Cell<i64>,
}

impl HandleGen {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
        }
    }

    /// Get the next unique handle
    pub fn next_handle(&self) -> OpHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        OpHandle::new(id)
    }
}

impl Default for HandleGen {
    fn default() -> Self {
        Self::new()
    }
}
