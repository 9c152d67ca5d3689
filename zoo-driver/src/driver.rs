//! The native driver contract
//!
//! A driver owns one session with the ensemble and exposes a callback-based
//! API. Every request takes exactly one completion callback; the driver must
//! call it at most once, from whichever thread it likes.

use std::sync::Arc;

use bytes::Bytes;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::{Callback, CreateMode, StateListener, WatchId, Watcher};

/// Callback-based handle to a single session with the coordination service
pub trait Driver: Send + Sync + 'static {
    /// Start the connection handshake.
    ///
    /// Progress is reported only through the state listeners registered with
    /// [`Driver::on_state`].
    fn connect(&self);

    /// Close the session. Closing twice is allowed.
    fn close(&self) -> Result<()>;

    /// Register a listener for every connection state notification
    fn on_state(&self, listener: StateListener);

    /// Create `path` and any missing ancestors as persistent nodes.
    /// Completes with the path that was ensured.
    fn mkdirp(&self, path: &str, callback: Callback<String>);

    /// Create a single node. Completes with the actual path, which differs
    /// from `path` for sequential modes.
    fn create(&self, path: &str, data: Option<Bytes>, mode: CreateMode, callback: Callback<String>);

    /// List the names of the children of `path`, in no particular order
    fn get_children(&self, path: &str, callback: Callback<Vec<String>>);

    /// Check whether `path` exists and leave a one-shot watch on it.
    ///
    /// The watcher fires on the next creation, deletion or data change of
    /// exactly `path`, unless removed first with [`Driver::remove_watch`].
    fn exists(&self, path: &str, watcher: Watcher, callback: Callback<bool>) -> WatchId;

    /// Drop a watch that has not fired yet. Unknown ids are ignored.
    fn remove_watch(&self, watch: WatchId);

    /// Delete a node that has no children
    fn remove(&self, path: &str, callback: Callback<()>);

    /// Replace the payload of an existing node
    fn set_data(&self, path: &str, data: Bytes, callback: Callback<()>);
}

/// Builds drivers from a [`ClientConfig`]
pub trait DriverFactory: Send + Sync {
    fn create_driver(&self, config: &ClientConfig) -> Result<Arc<dyn Driver>>;
}
