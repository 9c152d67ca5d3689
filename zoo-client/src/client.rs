//! Client facade over a native driver
//!
//! [`ClientFacade`] owns one driver session. It registers a single dispatch
//! callback with the driver, which records the latest connection state and
//! fans it out to the [`ListenerRegistry`]. Coordination calls go through the
//! callback [`adapter`](crate::adapter) and come back as futures.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use zoo_driver::{
    Bytes, ConnectionState, CreateMode, Driver, EventType, Result as DriverResult, WatchEvent,
    WatchId,
};

use crate::adapter::{adapt, CancelHook, Resolver};
use crate::error::{Result, ZooError};
use crate::listeners::{ListenerRegistry, Unsubscribe};
use crate::state_machine::ConnectionStateMachine;
use crate::types::{ChildList, CreatedNode, DeletionObserved, Mkdirp, NodeId};

/// Last observed connection state, readable without locking
struct StateCell(AtomicI64);

impl StateCell {
    const UNSET: i64 = i64::MIN;

    fn new() -> Self {
        Self(AtomicI64::new(Self::UNSET))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(i64::from(state.code()), Ordering::Release);
    }

    fn load(&self) -> Option<ConnectionState> {
        match self.0.load(Ordering::Acquire) {
            Self::UNSET => None,
            code => i32::try_from(code).ok().and_then(ConnectionState::from_code),
        }
    }
}

struct Inner {
    driver: Arc<dyn Driver>,
    state: StateCell,
    listeners: ListenerRegistry,
    disposed: AtomicBool,
}

impl Inner {
    fn dispatch(&self, state: ConnectionState) {
        self.state.store(state);
        let delivered = self.listeners.broadcast(state);
        tracing::debug!("Connection state {} delivered to {} listeners", state, delivered);
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            tracing::trace!("Already disposed");
            return;
        }
        tracing::info!("Closing coordination session");
        if let Err(e) = self.driver.close() {
            tracing::warn!("Failed to close coordination session: {}", e);
        }
    }
}

/// Facade over one coordination-service session
///
/// Dropping a facade does not close its session; call [`dispose`] or hold it
/// through a [`ManagedSession`](crate::ManagedSession).
///
/// [`dispose`]: ClientFacade::dispose
pub struct ClientFacade {
    inner: Arc<Inner>,
}

impl ClientFacade {
    /// Wrap `driver` and start tracking its connection state
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        let inner = Arc::new(Inner {
            driver,
            state: StateCell::new(),
            listeners: ListenerRegistry::new(),
            disposed: AtomicBool::new(false),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.driver.on_state(Box::new(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(state);
            }
        }));

        Self { inner }
    }

    /// Run the connection handshake.
    ///
    /// Resolves on the first conclusive state: `SyncConnected` succeeds, any
    /// failure state fails with [`ZooError::Connect`]. A failed attempt
    /// leaves no listener behind and does not close the session. Dropping
    /// the future before it resolves unsubscribes and disposes.
    pub async fn connect(&self) -> Result<&Self> {
        tracing::info!("Connecting");

        let operation = adapt::<(), ZooError, _>(|resolver| {
            let machine = Arc::new(ConnectionStateMachine::new());
            let registration: Arc<OnceLock<Unsubscribe>> = Arc::new(OnceLock::new());

            let unsubscribe = {
                let machine = Arc::clone(&machine);
                let registration = Arc::clone(&registration);
                self.inner.listeners.add(move |state| {
                    if let Some(outcome) = machine.observe(state) {
                        if let Some(unsubscribe) = registration.get() {
                            unsubscribe.unsubscribe();
                        }
                        resolver.settle(outcome);
                    }
                })
            };
            let _ = registration.set(unsubscribe.clone());
            // A driver thread may have concluded the attempt before the
            // handle was published.
            if machine.phase().is_terminal() {
                unsubscribe.unsubscribe();
            }

            self.inner.driver.connect();

            let inner = Arc::clone(&self.inner);
            let hook: CancelHook = Box::new(move || {
                tracing::debug!("Connect cancelled");
                unsubscribe.unsubscribe();
                inner.dispose();
            });
            Some(hook)
        });

        operation.await?;
        tracing::info!("Connected");
        Ok(self)
    }

    /// Observe every connection state from now on
    pub fn listen<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.inner.listeners.add(callback)
    }

    /// Most recent state reported by the driver, if any
    pub fn current_state(&self) -> Option<ConnectionState> {
        self.inner.state.load()
    }

    /// Fail with [`ZooError::ConnectionDropped`] if the session was lost
    pub fn ensure_connected(&self) -> Result<()> {
        match self.current_state() {
            Some(state @ (ConnectionState::Disconnected | ConnectionState::Expired)) => {
                Err(ZooError::dropped_state(state))
            }
            _ => Ok(()),
        }
    }

    /// Create `path` and any missing ancestors
    pub async fn mkdirp(&self, path: &str) -> Result<Mkdirp> {
        tracing::debug!("mkdirp {}", path);
        adapt(|resolver: Resolver<Mkdirp, ZooError>| {
            self.inner.driver.mkdirp(
                path,
                Box::new(move |result: DriverResult<String>| {
                    resolver.settle(
                        result
                            .map(|path| Mkdirp { path })
                            .map_err(|e| ZooError::Mkdirp(e.into())),
                    );
                }),
            );
            None
        })
        .await
    }

    /// Create a single node, with no payload when `data` is `None`
    pub async fn create(
        &self,
        path: &str,
        mode: CreateMode,
        data: Option<Bytes>,
    ) -> Result<CreatedNode> {
        tracing::debug!("create {} ({})", path, mode);
        adapt(|resolver: Resolver<CreatedNode, ZooError>| {
            self.inner.driver.create(
                path,
                data,
                mode,
                Box::new(move |result: DriverResult<String>| {
                    resolver.settle(
                        result
                            .map(|path| CreatedNode { path })
                            .map_err(|e| ZooError::Create(e.into())),
                    );
                }),
            );
            None
        })
        .await
    }

    /// Final segment of `path`
    pub fn current_id(&self, path: &str) -> NodeId {
        NodeId::of(path)
    }

    /// Names of the children of `root`, sorted
    pub async fn get_children(&self, root: &str) -> Result<ChildList> {
        tracing::debug!("get_children {}", root);
        let owned_root = root.to_string();
        adapt(|resolver: Resolver<ChildList, ZooError>| {
            self.inner.driver.get_children(
                root,
                Box::new(move |result: DriverResult<Vec<String>>| {
                    resolver.settle(
                        result
                            .map(|children| ChildList::new(owned_root, children))
                            .map_err(|e| ZooError::GetChildren(e.into())),
                    );
                }),
            );
            None
        })
        .await
    }

    /// Wait until `path` is deleted.
    ///
    /// Only a deletion of exactly `path` resolves; any other event on the
    /// watch re-arms it. Dropping the future removes the armed watch.
    pub async fn wait_for_deletion(&self, path: &str) -> Result<DeletionObserved> {
        tracing::debug!("wait_for_deletion {}", path);
        adapt(|resolver: Resolver<DeletionObserved, ZooError>| {
            let watch = Arc::new(DeletionWatch {
                driver: Arc::clone(&self.inner.driver),
                path: path.to_string(),
                resolver,
                armed: Mutex::new(Armed::default()),
            });
            watch.arm();

            let hook: CancelHook = Box::new(move || watch.disarm());
            Some(hook)
        })
        .await
    }

    /// Close the native session. Idempotent; close errors are logged.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl std::fmt::Debug for ClientFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFacade")
            .field("state", &self.current_state())
            .field("listeners", &self.inner.listeners.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[derive(Default)]
struct Armed {
    /// Bumped on every arm so a late registration cannot overwrite a newer one
    generation: u64,
    watch: Option<WatchId>,
}

/// One-shot existence watch kept armed until its path is deleted
struct DeletionWatch {
    driver: Arc<dyn Driver>,
    path: String,
    resolver: Resolver<DeletionObserved, ZooError>,
    armed: Mutex<Armed>,
}

impl DeletionWatch {
    fn arm(self: &Arc<Self>) {
        let generation = {
            let mut armed = self.armed.lock();
            armed.generation += 1;
            armed.watch = None;
            armed.generation
        };

        let watch = Arc::clone(self);
        let resolver = self.resolver.clone();
        let path = self.path.clone();
        let id = self.driver.exists(
            &self.path,
            Box::new(move |event: WatchEvent| watch.on_event(event)),
            Box::new(move |result: DriverResult<bool>| match result {
                Ok(exists) => tracing::trace!("Watching {} (exists: {})", path, exists),
                Err(e) => {
                    resolver.fail(ZooError::WaitDelete(e.into()));
                }
            }),
        );

        let stale = {
            let mut armed = self.armed.lock();
            if armed.generation != generation {
                return;
            }
            armed.watch = Some(id);
            // Settled while `exists` was in flight, so disarm found nothing.
            if self.resolver.is_settled() {
                armed.watch.take()
            } else {
                None
            }
        };
        if let Some(id) = stale {
            tracing::debug!("Removing late {} on {}", id, self.path);
            self.driver.remove_watch(id);
        }
    }

    fn on_event(self: &Arc<Self>, event: WatchEvent) {
        if self.resolver.is_settled() {
            return;
        }
        if event.kind == EventType::NodeDeleted && event.path == self.path {
            tracing::debug!("Observed deletion of {}", self.path);
            self.armed.lock().watch = None;
            self.resolver.succeed(DeletionObserved {
                path: self.path.clone(),
            });
        } else {
            tracing::trace!("Ignoring {:?} on {}, re-arming", event.kind, event.path);
            self.arm();
        }
    }

    fn disarm(&self) {
        let watch = self.armed.lock().watch.take();
        if let Some(id) = watch {
            tracing::debug!("Removing {} on {}", id, self.path);
            self.driver.remove_watch(id);
        }
    }
}
