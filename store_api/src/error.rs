use std::fmt;

/// Return status reported by the store client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotFound,
    CmpFail,
    ReadOnly,
    UnknownSpace,
    CoordFail,
    ServerError,
    PollFailed,
    Timeout,
    UnknownAttribute,
    WrongType,
    NonePending,
    Interrupted,
    Internal,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotFound => "not found",
            Status::CmpFail => "comparison failed",
            Status::ReadOnly => "cluster is read-only",
            Status::UnknownSpace => "unknown space",
            Status::CoordFail => "coordinator failure",
            Status::ServerError => "server error",
            Status::PollFailed => "poll failed",
            Status::Timeout => "timeout",
            Status::UnknownAttribute => "unknown attribute",
            Status::WrongType => "wrong type",
            Status::NonePending => "no operations pending",
            Status::Interrupted => "interrupted",
            Status::Internal => "internal error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the store client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub status: Status,
    pub message: String,
}

impl ClientError {
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

impl std::error::Error for ClientError {}
