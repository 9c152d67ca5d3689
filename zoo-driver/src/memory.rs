//! In-process coordination service
//!
//! `MemoryEnsemble` keeps a hierarchical namespace in memory and hands out
//! [`MemoryDriver`] sessions that talk to it through the ordinary
//! [`Driver`] contract. It follows the service's node rules (parents must
//! exist, ephemerals die with their session, sequential names, one-shot
//! watches) closely enough to run end-to-end scenarios without a server.
//!
//! Callbacks and watchers are invoked synchronously on the calling thread,
//! always after the ensemble lock has been released, so they may issue new
//! requests from inside a callback.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::driver::{Driver, DriverFactory};
use crate::error::{DriverError, ErrorCode, Result};
use crate::types::{
    Callback, ConnectionState, CreateMode, EventType, StateListener, WatchEvent, WatchId, Watcher,
};

type SessionId = u64;

// ============================================================================
// Namespace
// ============================================================================

#[derive(Debug)]
struct Node {
    data: Bytes,
    /// Owning session for ephemeral nodes
    owner: Option<SessionId>,
    /// Creation order, used to report children unsorted
    czxid: u64,
    /// Next suffix handed to a sequential child
    next_sequence: u64,
}

struct WatchEntry {
    id: WatchId,
    session: SessionId,
    watcher: Watcher,
}

/// Watchers removed from the table, ready to be fired once the lock is gone
type Fired = Vec<(Watcher, WatchEvent)>;

struct Tree {
    nodes: BTreeMap<String, Node>,
    watches: HashMap<String, Vec<WatchEntry>>,
    sessions: HashSet<SessionId>,
    zxid: u64,
    next_watch: u64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Bytes::new(),
                owner: None,
                czxid: 0,
                next_sequence: 0,
            },
        );
        Self {
            nodes,
            watches: HashMap::new(),
            sessions: HashSet::new(),
            zxid: 0,
            next_watch: 1,
        }
    }

    fn children_of(&self, path: &str) -> Vec<(&String, &Node)> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| key.len() > prefix.len() && !key[prefix.len()..].contains('/'))
            .collect()
    }

    fn insert(
        &mut self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        session: SessionId,
        fired: &mut Fired,
    ) -> Result<String> {
        if path == "/" {
            return Err(DriverError::exception(ErrorCode::NodeExists, path));
        }

        let parent_path = parent(path);
        let parent = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| DriverError::exception(ErrorCode::NoNode, path))?;
        if parent.owner.is_some() {
            return Err(DriverError::exception(
                ErrorCode::NoChildrenForEphemerals,
                path,
            ));
        }

        let actual = if mode.is_sequential() {
            let sequence = parent.next_sequence;
            parent.next_sequence += 1;
            format!("{path}{sequence:010}")
        } else {
            path.to_string()
        };

        if self.nodes.contains_key(&actual) {
            return Err(DriverError::exception(ErrorCode::NodeExists, actual));
        }

        self.zxid += 1;
        self.nodes.insert(
            actual.clone(),
            Node {
                data,
                owner: mode.is_ephemeral().then_some(session),
                czxid: self.zxid,
                next_sequence: 0,
            },
        );
        self.fire(&actual, EventType::NodeCreated, fired);
        Ok(actual)
    }

    fn delete(&mut self, path: &str, fired: &mut Fired) -> Result<()> {
        if path == "/" {
            return Err(DriverError::exception(ErrorCode::BadArguments, path));
        }
        if !self.nodes.contains_key(path) {
            return Err(DriverError::exception(ErrorCode::NoNode, path));
        }
        if !self.children_of(path).is_empty() {
            return Err(DriverError::exception(ErrorCode::NotEmpty, path));
        }
        self.nodes.remove(path);
        self.fire(path, EventType::NodeDeleted, fired);
        Ok(())
    }

    /// Detach every watch on `path`; watches are one-shot.
    fn fire(&mut self, path: &str, kind: EventType, fired: &mut Fired) {
        if let Some(entries) = self.watches.remove(path) {
            for entry in entries {
                tracing::trace!("Firing {} for {:?} on {}", entry.id, kind, path);
                fired.push((entry.watcher, WatchEvent::new(kind, path)));
            }
        }
    }

    fn remove_watch(&mut self, id: WatchId) -> bool {
        let mut removed = false;
        self.watches.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    fn watch_count(&self) -> usize {
        self.watches.values().map(Vec::len).sum()
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    let well_formed = path.starts_with('/')
        && !path.ends_with('/')
        && path[1..]
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if well_formed {
        Ok(())
    } else {
        Err(DriverError::exception(ErrorCode::BadArguments, path))
    }
}

fn run_fired(fired: Fired) {
    for (watcher, event) in fired {
        watcher(event);
    }
}

// ============================================================================
// MemoryEnsemble
// ============================================================================

struct Shared {
    tree: Mutex<Tree>,
    handshake: Mutex<Vec<ConnectionState>>,
    next_session: AtomicU64,
}

/// An in-memory coordination service shared by any number of sessions
///
/// Cloning is cheap and every clone sees the same namespace.
#[derive(Clone)]
pub struct MemoryEnsemble {
    shared: Arc<Shared>,
}

impl MemoryEnsemble {
    /// Create an empty ensemble whose sessions connect successfully
    pub fn new() -> Self {
        Self::with_handshake(vec![ConnectionState::SyncConnected])
    }

    /// Create an ensemble whose sessions report `states`, in order, when
    /// they start connecting
    pub fn with_handshake(states: Vec<ConnectionState>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::new()),
                handshake: Mutex::new(states),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Replace the handshake script for sessions connecting from now on
    pub fn set_handshake(&self, states: Vec<ConnectionState>) {
        *self.shared.handshake.lock() = states;
    }

    /// Open a new session
    pub fn session(&self) -> Arc<MemoryDriver> {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        self.shared.tree.lock().sessions.insert(id);
        tracing::debug!("Opened in-memory session {}", id);
        Arc::new(MemoryDriver {
            id,
            shared: Arc::clone(&self.shared),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether a node exists at `path`
    pub fn exists(&self, path: &str) -> bool {
        self.shared.tree.lock().nodes.contains_key(path)
    }

    /// Payload stored at `path`
    pub fn data(&self, path: &str) -> Option<Bytes> {
        self.shared.tree.lock().nodes.get(path).map(|n| n.data.clone())
    }

    /// Number of sessions that have not been closed
    pub fn open_sessions(&self) -> usize {
        self.shared.tree.lock().sessions.len()
    }

    /// Number of watches registered and not yet fired
    pub fn watch_count(&self) -> usize {
        self.shared.tree.lock().watch_count()
    }
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.shared.tree.lock();
        f.debug_struct("MemoryEnsemble")
            .field("node_count", &tree.nodes.len())
            .field("open_sessions", &tree.sessions.len())
            .finish()
    }
}

impl DriverFactory for MemoryEnsemble {
    fn create_driver(&self, config: &ClientConfig) -> Result<Arc<dyn Driver>> {
        config
            .validate()
            .map_err(|e| DriverError::Other(e.to_string()))?;
        tracing::debug!(
            "Creating in-memory driver for {}",
            config.connection_string
        );
        let driver: Arc<dyn Driver> = self.session();
        Ok(driver)
    }
}

// ============================================================================
// MemoryDriver
// ============================================================================

/// One session against a [`MemoryEnsemble`]
pub struct MemoryDriver {
    id: SessionId,
    shared: Arc<Shared>,
    listeners: Mutex<Vec<Arc<dyn Fn(ConnectionState) + Send + Sync>>>,
    closed: AtomicBool,
}

impl MemoryDriver {
    pub fn session_id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Report `state` to every state listener, as the network layer would
    pub fn emit(&self, state: ConnectionState) {
        let listeners: Vec<_> = self.listeners.lock().iter().cloned().collect();
        tracing::trace!("Session {} emitting {}", self.id, state);
        for listener in listeners {
            listener(state);
        }
    }

    fn check_open(&self, path: &str) -> Result<()> {
        if self.is_closed() {
            Err(DriverError::exception(ErrorCode::ConnectionLoss, path))
        } else {
            validate_path(path)
        }
    }
}

impl Driver for MemoryDriver {
    fn connect(&self) {
        if self.is_closed() {
            tracing::warn!("Session {} is closed, ignoring connect", self.id);
            return;
        }
        let script = self.shared.handshake.lock().clone();
        for state in script {
            self.emit(state);
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut fired = Vec::new();
        {
            let mut tree = self.shared.tree.lock();
            tree.sessions.remove(&self.id);

            let owned: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.owner == Some(self.id))
                .map(|(path, _)| path.clone())
                .collect();
            for path in owned {
                if let Err(e) = tree.delete(&path, &mut fired) {
                    tracing::warn!("Failed to drop ephemeral node {}: {}", path, e);
                }
            }

            for entries in tree.watches.values_mut() {
                entries.retain(|entry| entry.session != self.id);
            }
            tree.watches.retain(|_, entries| !entries.is_empty());
        }

        tracing::debug!("Closed in-memory session {}", self.id);
        run_fired(fired);
        self.emit(ConnectionState::Disconnected);
        Ok(())
    }

    fn on_state(&self, listener: StateListener) {
        self.listeners.lock().push(Arc::from(listener));
    }

    fn mkdirp(&self, path: &str, callback: Callback<String>) {
        if let Err(e) = self.check_open(path) {
            return callback(Err(e));
        }

        let mut fired = Vec::new();
        let result = {
            let mut tree = self.shared.tree.lock();
            let mut current = String::new();
            let mut result = Ok(path.to_string());
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                current.push('/');
                current.push_str(segment);
                if tree.nodes.contains_key(&current) {
                    continue;
                }
                if let Err(e) = tree.insert(
                    &current,
                    Bytes::new(),
                    CreateMode::Persistent,
                    self.id,
                    &mut fired,
                ) {
                    result = Err(e);
                    break;
                }
            }
            result
        };

        run_fired(fired);
        callback(result);
    }

    fn create(&self, path: &str, data: Option<Bytes>, mode: CreateMode, callback: Callback<String>) {
        if let Err(e) = self.check_open(path) {
            return callback(Err(e));
        }

        let mut fired = Vec::new();
        let result = self.shared.tree.lock().insert(
            path,
            data.unwrap_or_default(),
            mode,
            self.id,
            &mut fired,
        );

        run_fired(fired);
        callback(result);
    }

    fn get_children(&self, path: &str, callback: Callback<Vec<String>>) {
        if let Err(e) = self.check_open(path) {
            return callback(Err(e));
        }

        let result = {
            let tree = self.shared.tree.lock();
            if tree.nodes.contains_key(path) {
                let mut children = tree.children_of(path);
                children.sort_by_key(|(_, node)| node.czxid);
                let prefix_len = if path == "/" { 1 } else { path.len() + 1 };
                Ok(children
                    .into_iter()
                    .map(|(key, _)| key[prefix_len..].to_string())
                    .collect())
            } else {
                Err(DriverError::exception(ErrorCode::NoNode, path))
            }
        };

        callback(result);
    }

    fn exists(&self, path: &str, watcher: Watcher, callback: Callback<bool>) -> WatchId {
        let mut tree = self.shared.tree.lock();
        let id = WatchId::new(tree.next_watch);
        tree.next_watch += 1;

        if let Err(e) = self.check_open(path) {
            drop(tree);
            callback(Err(e));
            return id;
        }

        let exists = tree.nodes.contains_key(path);
        tree.watches
            .entry(path.to_string())
            .or_default()
            .push(WatchEntry {
                id,
                session: self.id,
                watcher,
            });
        drop(tree);

        tracing::trace!("Registered {} on {} (exists: {})", id, path, exists);
        callback(Ok(exists));
        id
    }

    fn remove_watch(&self, watch: WatchId) {
        if self.shared.tree.lock().remove_watch(watch) {
            tracing::trace!("Removed {}", watch);
        }
    }

    fn remove(&self, path: &str, callback: Callback<()>) {
        if let Err(e) = self.check_open(path) {
            return callback(Err(e));
        }

        let mut fired = Vec::new();
        let result = self.shared.tree.lock().delete(path, &mut fired);

        run_fired(fired);
        callback(result);
    }

    fn set_data(&self, path: &str, data: Bytes, callback: Callback<()>) {
        if let Err(e) = self.check_open(path) {
            return callback(Err(e));
        }

        let mut fired = Vec::new();
        let result = {
            let mut tree = self.shared.tree.lock();
            let result = match tree.nodes.get_mut(path) {
                Some(node) => {
                    node.data = data;
                    Ok(())
                }
                None => Err(DriverError::exception(ErrorCode::NoNode, path)),
            };
            if result.is_ok() {
                tree.fire(path, EventType::NodeDataChanged, &mut fired);
            }
            result
        };

        run_fired(fired);
        callback(result);
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("session_id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
