//! Operations of the store client
//!
//! Every operation the client offers is listed once in [`Operation`]. The
//! single-value operations carry their arguments in [`Request`]; the
//! streaming ones in [`Search`].

use crate::value::{Attributes, Key, Predicate};

/// Static table of the store client's operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
    PutIfNotExist,
    CondPut,
    Del,
    CondDel,
    AtomicAdd,
    AtomicSub,
    StringAppend,
    StringPrepend,
    ListRpush,
    Count,
    GroupDel,
    Search,
    SortedSearch,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::Get,
        Operation::Put,
        Operation::PutIfNotExist,
        Operation::CondPut,
        Operation::Del,
        Operation::CondDel,
        Operation::AtomicAdd,
        Operation::AtomicSub,
        Operation::StringAppend,
        Operation::StringPrepend,
        Operation::ListRpush,
        Operation::Count,
        Operation::GroupDel,
        Operation::Search,
        Operation::SortedSearch,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::PutIfNotExist => "put_if_not_exist",
            Operation::CondPut => "cond_put",
            Operation::Del => "del",
            Operation::CondDel => "cond_del",
            Operation::AtomicAdd => "atomic_add",
            Operation::AtomicSub => "atomic_sub",
            Operation::StringAppend => "string_append",
            Operation::StringPrepend => "string_prepend",
            Operation::ListRpush => "list_rpush",
            Operation::Count => "count",
            Operation::GroupDel => "group_del",
            Operation::Search => "search",
            Operation::SortedSearch => "sorted_search",
        }
    }

    /// Streaming operations produce a sequence of objects instead of one value
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(self, Operation::Search | Operation::SortedSearch)
    }
}

/// Arguments of a single-value operation
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get {
        space: String,
        key: Key,
    },
    Put {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    PutIfNotExist {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    CondPut {
        space: String,
        key: Key,
        checks: Vec<Predicate>,
        attributes: Attributes,
    },
    Del {
        space: String,
        key: Key,
    },
    CondDel {
        space: String,
        key: Key,
        checks: Vec<Predicate>,
    },
    AtomicAdd {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    AtomicSub {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    StringAppend {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    StringPrepend {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    ListRpush {
        space: String,
        key: Key,
        attributes: Attributes,
    },
    Count {
        space: String,
        predicates: Vec<Predicate>,
    },
    GroupDel {
        space: String,
        predicates: Vec<Predicate>,
    },
}

impl Request {
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Request::Get { .. } => Operation::Get,
            Request::Put { .. } => Operation::Put,
            Request::PutIfNotExist { .. } => Operation::PutIfNotExist,
            Request::CondPut { .. } => Operation::CondPut,
            Request::Del { .. } => Operation::Del,
            Request::CondDel { .. } => Operation::CondDel,
            Request::AtomicAdd { .. } => Operation::AtomicAdd,
            Request::AtomicSub { .. } => Operation::AtomicSub,
            Request::StringAppend { .. } => Operation::StringAppend,
            Request::StringPrepend { .. } => Operation::StringPrepend,
            Request::ListRpush { .. } => Operation::ListRpush,
            Request::Count { .. } => Operation::Count,
            Request::GroupDel { .. } => Operation::GroupDel,
        }
    }

    #[must_use]
    pub fn space(&self) -> &str {
        match self {
            Request::Get { space, .. }
            | Request::Put { space, .. }
            | Request::PutIfNotExist { space, .. }
            | Request::CondPut { space, .. }
            | Request::Del { space, .. }
            | Request::CondDel { space, .. }
            | Request::AtomicAdd { space, .. }
            | Request::AtomicSub { space, .. }
            | Request::StringAppend { space, .. }
            | Request::StringPrepend { space, .. }
            | Request::ListRpush { space, .. }
            | Request::Count { space, .. }
            | Request::GroupDel { space, .. } => space,
        }
    }
}

/// Sort order of a sorted search
#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub attribute: String,
    pub limit: usize,
    pub descending: bool,
}

/// Arguments of a streaming operation
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub space: String,
    pub predicates: Vec<Predicate>,
    pub sort: Option<SortBy>,
}

impl Search {
    #[must_use]
    pub fn new(space: &str, predicates: Vec<Predicate>) -> Self {
        Self {
            space: space.to_string(),
            predicates,
            sort: None,
        }
    }

    #[must_use]
    pub fn sorted(mut self, attribute: &str, limit: usize, descending: bool) -> Self {
        self.sort = Some(SortBy {
            attribute: attribute.to_string(),
            limit,
            descending,
        });
        self
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        if self.sort.is_some() {
            Operation::SortedSearch
        } else {
            Operation::Search
        }
    }
}

/// Final value of a single-value operation
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Result of `get`; `None` when the key does not exist
    Object(Option<Attributes>),
    /// Result of a write; `false` when a condition failed or the key was missing
    Success(bool),
    /// Result of `count`
    Count(u64),
}

impl Response {
    #[must_use]
    pub fn as_object(&self) -> Option<&Attributes> {
        match self {
            Response::Object(Some(attrs)) => Some(attrs),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(true))
    }

    #[must_use]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Response::Count(n) => Some(*n),
            _ => None,
        }
    }
}
