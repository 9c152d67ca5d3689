//! Error types for coordination-service operations

use std::fmt;

use thiserror::Error;
use zoo_driver::{ConnectionState, DriverError, ErrorCode};

use crate::adapter::Interrupted;

/// What went wrong underneath a tagged [`ZooError`]
///
/// Driver errors that carry a code keep it; anything else degrades to the
/// driver's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Service exception with its code
    Code { code: ErrorCode, message: String },
    /// Free-text failure without a code
    Message(String),
}

impl Cause {
    /// The service error code, if there is one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Cause::Code { code, .. } => Some(*code),
            Cause::Message(_) => None,
        }
    }

    /// A connection that stopped in `state`
    pub fn from_state(state: ConnectionState) -> Self {
        Cause::Message(format!("connection in state {state}"))
    }

    pub fn message(&self) -> &str {
        match self {
            Cause::Code { message, .. } => message,
            Cause::Message(message) => message,
        }
    }
}

impl From<DriverError> for Cause {
    fn from(error: DriverError) -> Self {
        match error.code() {
            Some(code) => Cause::Code {
                code,
                message: error.to_string(),
            },
            None => Cause::Message(error.to_string()),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Tag of a [`ZooError`], for matching without the cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connect,
    Mkdirp,
    Create,
    GetChildren,
    WaitDelete,
    ConnectionDropped,
    Interrupted,
}

/// Errors surfaced by [`ClientFacade`](crate::ClientFacade) operations
///
/// Each operation fails with its own tag; callers match on the variant,
/// not on the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZooError {
    /// The handshake ended in a failure state
    #[error("Connect failed: {0}")]
    Connect(Cause),

    #[error("Mkdirp failed: {0}")]
    Mkdirp(Cause),

    #[error("Create failed: {0}")]
    Create(Cause),

    #[error("Get children failed: {0}")]
    GetChildren(Cause),

    /// The existence watch could not be registered
    #[error("Wait for deletion failed: {0}")]
    WaitDelete(Cause),

    /// The connection was lost after it had been established
    #[error("Connection dropped: {0}")]
    ConnectionDropped(Cause),

    /// The operation was cancelled before it settled
    #[error("Operation interrupted")]
    Interrupted,
}

impl ZooError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZooError::Connect(_) => ErrorKind::Connect,
            ZooError::Mkdirp(_) => ErrorKind::Mkdirp,
            ZooError::Create(_) => ErrorKind::Create,
            ZooError::GetChildren(_) => ErrorKind::GetChildren,
            ZooError::WaitDelete(_) => ErrorKind::WaitDelete,
            ZooError::ConnectionDropped(_) => ErrorKind::ConnectionDropped,
            ZooError::Interrupted => ErrorKind::Interrupted,
        }
    }

    /// The underlying cause, absent only for [`ZooError::Interrupted`]
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            ZooError::Connect(cause)
            | ZooError::Mkdirp(cause)
            | ZooError::Create(cause)
            | ZooError::GetChildren(cause)
            | ZooError::WaitDelete(cause)
            | ZooError::ConnectionDropped(cause) => Some(cause),
            ZooError::Interrupted => None,
        }
    }

    pub(crate) fn connect_state(state: ConnectionState) -> Self {
        ZooError::Connect(Cause::from_state(state))
    }

    pub(crate) fn dropped_state(state: ConnectionState) -> Self {
        ZooError::ConnectionDropped(Cause::from_state(state))
    }
}

impl From<Interrupted> for ZooError {
    fn from(_: Interrupted) -> Self {
        ZooError::Interrupted
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ZooError>;
