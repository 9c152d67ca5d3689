//! Plain types exchanged across the driver boundary.

use std::fmt;
use std::str::FromStr;

use crate::error::{DriverError, Result};

/// Connection state codes reported by the driver.
///
/// The driver emits many of these during handshake and reconnection; which
/// ones are conclusive is decided by the client, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    SyncConnected,
    AuthFailed,
    ConnectedReadOnly,
    SaslAuthenticated,
    Expired,
}

impl ConnectionState {
    /// All states the driver can report
    pub const ALL: [ConnectionState; 6] = [
        ConnectionState::Disconnected,
        ConnectionState::SyncConnected,
        ConnectionState::AuthFailed,
        ConnectionState::ConnectedReadOnly,
        ConnectionState::SaslAuthenticated,
        ConnectionState::Expired,
    ];

    /// Numeric code as reported by the driver
    pub fn code(&self) -> i32 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::SyncConnected => 3,
            ConnectionState::AuthFailed => 4,
            ConnectionState::ConnectedReadOnly => 5,
            ConnectionState::SaslAuthenticated => 6,
            ConnectionState::Expired => -122,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::SyncConnected => "SYNC_CONNECTED",
            ConnectionState::AuthFailed => "AUTH_FAILED",
            ConnectionState::ConnectedReadOnly => "CONNECTED_READ_ONLY",
            ConnectionState::SaslAuthenticated => "SASL_AUTHENTICATED",
            ConnectionState::Expired => "EXPIRED",
        }
    }

    /// Look up a state by its numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name(), self.code())
    }
}

/// Node creation modes supported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CreateMode {
    #[default]
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn code(&self) -> i32 {
        match self {
            CreateMode::Persistent => 0,
            CreateMode::Ephemeral => 1,
            CreateMode::PersistentSequential => 2,
            CreateMode::EphemeralSequential => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CreateMode::Persistent => "PERSISTENT",
            CreateMode::Ephemeral => "EPHEMERAL",
            CreateMode::PersistentSequential => "PERSISTENT_SEQUENTIAL",
            CreateMode::EphemeralSequential => "EPHEMERAL_SEQUENTIAL",
        }
    }

    /// Whether nodes in this mode are bound to the creating session
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Whether the service appends a sequence number to the node name
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

impl FromStr for CreateMode {
    type Err = DriverError;

    /// Accepts the driver's mode names in any case, e.g. `"PERSISTENT"` or
    /// `"ephemeral_sequential"`.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PERSISTENT" => Ok(CreateMode::Persistent),
            "EPHEMERAL" => Ok(CreateMode::Ephemeral),
            "PERSISTENT_SEQUENTIAL" => Ok(CreateMode::PersistentSequential),
            "EPHEMERAL_SEQUENTIAL" => Ok(CreateMode::EphemeralSequential),
            other => Err(DriverError::Other(format!("unknown create mode: {other}"))),
        }
    }
}

impl fmt::Display for CreateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kinds of watch notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// A watch notification for a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventType,
    pub path: String,
}

impl WatchEvent {
    pub fn new(kind: EventType, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Handle for a registered watch, used to remove it before it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Completion callback for a single driver request
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// One-shot watch callback
pub type Watcher = Box<dyn FnOnce(WatchEvent) + Send + 'static>;

/// Listener for connection state notifications
pub type StateListener = Box<dyn Fn(ConnectionState) + Send + Sync + 'static>;
