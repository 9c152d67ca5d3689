//! Scripted driver for exercising the client without a real ensemble.
//!
//! `ScriptedDriver` replays a fixed list of connection states on `connect`,
//! answers requests from canned data, and records what the client asked it
//! to do so tests can assert on close counts and watch bookkeeping.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use zoo_driver::{
    Bytes, Callback, ClientConfig, ConnectionState, CreateMode, Driver, DriverError,
    DriverFactory, ErrorCode, StateListener, WatchEvent, WatchId, Watcher,
};

/// Mock driver with a scripted handshake and configurable failures.
pub struct ScriptedDriver {
    script: Mutex<Vec<ConnectionState>>,
    listeners: Mutex<Vec<Arc<dyn Fn(ConnectionState) + Send + Sync>>>,
    children: Mutex<Vec<String>>,
    watches: Mutex<Vec<(WatchId, Watcher)>>,
    removed_watches: Mutex<Vec<WatchId>>,
    next_watch: AtomicU64,
    fail_requests: Mutex<Option<DriverError>>,
    fail_close: AtomicBool,
    connect_count: AtomicU32,
    close_count: AtomicU32,
    exists_count: AtomicU32,
    exists_gate: Mutex<Option<Arc<ExistsGate>>>,
}

/// Parks one numbered `exists` call until the test lets it through.
pub struct ExistsGate {
    call: u32,
    entered: Barrier,
    released: Barrier,
}

impl ExistsGate {
    /// Block until the gated call is parked inside the driver.
    pub fn wait_entered(&self) {
        self.entered.wait();
    }

    /// Let the parked call register its watch and return.
    pub fn release(&self) {
        self.released.wait();
    }
}

impl ScriptedDriver {
    pub fn new(script: Vec<ConnectionState>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            listeners: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            watches: Mutex::new(Vec::new()),
            removed_watches: Mutex::new(Vec::new()),
            next_watch: AtomicU64::new(1),
            fail_requests: Mutex::new(None),
            fail_close: AtomicBool::new(false),
            connect_count: AtomicU32::new(0),
            close_count: AtomicU32::new(0),
            exists_count: AtomicU32::new(0),
            exists_gate: Mutex::new(None),
        })
    }

    /// A driver whose handshake succeeds immediately.
    pub fn connected() -> Arc<Self> {
        Self::new(vec![ConnectionState::SyncConnected])
    }

    /// Children reported by `get_children`, in the given (unsorted) order.
    pub fn set_children(&self, children: Vec<&str>) {
        *self.children.lock().unwrap() = children.into_iter().map(String::from).collect();
    }

    /// Fail every subsequent request with `error`.
    pub fn fail_requests_with(&self, error: DriverError) {
        *self.fail_requests.lock().unwrap() = Some(error);
    }

    /// Make `close` return an error.
    pub fn set_fail_close(&self, should_fail: bool) {
        self.fail_close.store(should_fail, Ordering::Relaxed);
    }

    /// Push a state to every registered listener.
    pub fn emit(&self, state: ConnectionState) {
        let listeners: Vec<_> = self.listeners.lock().unwrap().iter().cloned().collect();
        for listener in listeners {
            listener(state);
        }
    }

    /// Fire every pending watch with `event`.
    pub fn fire_watches(&self, event: WatchEvent) {
        let pending: Vec<_> = self.watches.lock().unwrap().drain(..).collect();
        for (_, watcher) in pending {
            watcher(event.clone());
        }
    }

    /// Park the `call`-th `exists` request (1-based) before it registers.
    pub fn gate_exists_call(&self, call: u32) -> Arc<ExistsGate> {
        let gate = Arc::new(ExistsGate {
            call,
            entered: Barrier::new(2),
            released: Barrier::new(2),
        });
        *self.exists_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn pending_watches(&self) -> usize {
        self.watches.lock().unwrap().len()
    }

    pub fn removed_watches(&self) -> Vec<WatchId> {
        self.removed_watches.lock().unwrap().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::Relaxed)
    }

    pub fn exists_count(&self) -> u32 {
        self.exists_count.load(Ordering::Relaxed)
    }

    fn injected_failure(&self) -> Option<DriverError> {
        self.fail_requests.lock().unwrap().clone()
    }
}

impl Driver for ScriptedDriver {
    fn connect(&self) {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        let script = self.script.lock().unwrap().clone();
        for state in script {
            self.emit(state);
        }
    }

    fn close(&self) -> zoo_driver::Result<()> {
        self.close_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_close.load(Ordering::Relaxed) {
            return Err(DriverError::Other("close refused".to_string()));
        }
        Ok(())
    }

    fn on_state(&self, listener: StateListener) {
        self.listeners.lock().unwrap().push(Arc::from(listener));
    }

    fn mkdirp(&self, path: &str, callback: Callback<String>) {
        match self.injected_failure() {
            Some(error) => callback(Err(error)),
            None => callback(Ok(path.to_string())),
        }
    }

    fn create(
        &self,
        path: &str,
        _data: Option<Bytes>,
        _mode: CreateMode,
        callback: Callback<String>,
    ) {
        match self.injected_failure() {
            Some(error) => callback(Err(error)),
            None => callback(Ok(path.to_string())),
        }
    }

    fn get_children(&self, _path: &str, callback: Callback<Vec<String>>) {
        match self.injected_failure() {
            Some(error) => callback(Err(error)),
            None => callback(Ok(self.children.lock().unwrap().clone())),
        }
    }

    fn exists(&self, _path: &str, watcher: Watcher, callback: Callback<bool>) -> WatchId {
        let call = self.exists_count.fetch_add(1, Ordering::Relaxed) + 1;
        let gate = self.exists_gate.lock().unwrap().clone();
        if let Some(gate) = gate.filter(|gate| gate.call == call) {
            gate.entered.wait();
            gate.released.wait();
        }
        let id = WatchId::new(self.next_watch.fetch_add(1, Ordering::Relaxed));
        match self.injected_failure() {
            Some(error) => callback(Err(error)),
            None => {
                self.watches.lock().unwrap().push((id, watcher));
                callback(Ok(true));
            }
        }
        id
    }

    fn remove_watch(&self, watch: WatchId) {
        self.watches.lock().unwrap().retain(|(id, _)| *id != watch);
        self.removed_watches.lock().unwrap().push(watch);
    }

    fn remove(&self, path: &str, callback: Callback<()>) {
        callback(Err(DriverError::exception(ErrorCode::Unimplemented, path)));
    }

    fn set_data(&self, path: &str, _data: Bytes, callback: Callback<()>) {
        callback(Err(DriverError::exception(ErrorCode::Unimplemented, path)));
    }
}

/// Factory handing out one shared `ScriptedDriver`.
pub struct ScriptedFactory {
    pub driver: Arc<ScriptedDriver>,
    should_fail: AtomicBool,
    creation_count: AtomicU32,
}

impl ScriptedFactory {
    pub fn new(driver: Arc<ScriptedDriver>) -> Self {
        Self {
            driver,
            should_fail: AtomicBool::new(false),
            creation_count: AtomicU32::new(0),
        }
    }

    pub fn set_fail_creation(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::Relaxed);
    }

    pub fn creation_count(&self) -> u32 {
        self.creation_count.load(Ordering::Relaxed)
    }
}

impl DriverFactory for ScriptedFactory {
    fn create_driver(&self, _config: &ClientConfig) -> zoo_driver::Result<Arc<dyn Driver>> {
        self.creation_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(DriverError::Other("no driver for you".to_string()));
        }
        Ok(self.driver.clone())
    }
}

/// A config that passes validation.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("scripted:2181")
}
