//! Connection-state listener registry
//!
//! A concurrent handle table mapping [`ListenerHandle`]s to callbacks.
//! Handles come from an atomic counter, so they are unique and strictly
//! increasing for the lifetime of a registry, and broadcast order follows
//! registration order.
//!
//! Each subscription carries a re-entrant gate that is held while its
//! callback runs, plus a registered flag checked under that gate. Removal
//! clears the flag, which gives two guarantees:
//!
//! - once [`Unsubscribe::unsubscribe`] returns, the callback is never entered
//!   again (outside a callback, removal also waits for an invocation already
//!   running on another thread)
//! - a callback may remove itself, or any other subscription, from inside
//!   a broadcast without deadlocking, even when broadcasts on two threads
//!   remove each other's callbacks

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use zoo_driver::ConnectionState;

/// Callback invoked with every broadcast state
pub type ListenerFn = Arc<dyn Fn(ConnectionState) + Send + Sync + 'static>;

/// Unique identifier for a listener subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

thread_local! {
    /// Listener callbacks currently running on this thread
    static DISPATCH_DEPTH: Cell<usize> = Cell::new(0);
}

/// Marks the current thread as running a listener callback
struct DispatchGuard;

impl DispatchGuard {
    fn enter() -> Self {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        DispatchGuard
    }

    fn active() -> bool {
        DISPATCH_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

struct Subscription {
    callback: ListenerFn,
    registered: AtomicBool,
    /// Held for the duration of every invocation
    gate: ReentrantMutex<()>,
}

struct Inner {
    listeners: DashMap<ListenerHandle, Arc<Subscription>>,
    next_handle: AtomicU64,
}

impl Inner {
    fn remove(&self, handle: ListenerHandle) -> bool {
        match self.listeners.remove(&handle) {
            Some((_, subscription)) => {
                subscription.registered.store(false, Ordering::Release);
                // Inside a callback, waiting here can deadlock against a
                // broadcast on another thread. The flag alone suffices.
                if !DispatchGuard::active() {
                    drop(subscription.gate.lock());
                }
                tracing::trace!("Removed {}", handle);
                true
            }
            None => false,
        }
    }
}

/// Thread-safe registry of connection-state listeners
///
/// Cloning is cheap and every clone shares the same table.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: DashMap::new(),
                next_handle: AtomicU64::new(0),
            }),
        }
    }

    /// Register a callback, returning the handle that removes it
    pub fn add<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.insert(
            handle,
            Arc::new(Subscription {
                callback: Arc::new(callback),
                registered: AtomicBool::new(true),
                gate: ReentrantMutex::new(()),
            }),
        );
        tracing::trace!("Added {}", handle);

        Unsubscribe {
            handle,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription. Unknown or already removed handles are ignored.
    ///
    /// Returns whether a subscription was removed by this call.
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        self.inner.remove(handle)
    }

    /// Invoke every registered callback with `state`, in registration order
    ///
    /// Iterates over a snapshot: callbacks added during the broadcast are not
    /// invoked, callbacks removed before their turn are skipped. Returns the
    /// number of callbacks invoked.
    pub fn broadcast(&self, state: ConnectionState) -> usize {
        let mut snapshot: Vec<(ListenerHandle, Arc<Subscription>)> = self
            .inner
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        snapshot.sort_by_key(|(handle, _)| *handle);

        let mut delivered = 0;
        for (_, subscription) in snapshot {
            let _gate = subscription.gate.lock();
            if subscription.registered.load(Ordering::Acquire) {
                let _dispatch = DispatchGuard::enter();
                (subscription.callback)(state);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.listeners.is_empty()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.len())
            .finish()
    }
}

/// Removes one listener when invoked
///
/// Holds only a weak reference to the registry; unsubscribing after the
/// registry is gone is a no-op.
#[derive(Clone)]
pub struct Unsubscribe {
    handle: ListenerHandle,
    registry: Weak<Inner>,
}

impl Unsubscribe {
    pub fn handle(&self) -> ListenerHandle {
        self.handle
    }

    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map(|inner| inner.remove(self.handle))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::OnceLock;

    fn recorder() -> (Arc<Mutex<Vec<(u32, ConnectionState)>>>, impl Fn(u32) -> ListenerFn) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |id: u32| -> ListenerFn {
            let sink = Arc::clone(&sink);
            Arc::new(move |state| sink.lock().push((id, state)))
        };
        (log, make)
    }

    #[test]
    fn test_handles_strictly_increase() {
        let registry = ListenerRegistry::new();
        let handles: Vec<_> = (0..5).map(|_| registry.add(|_| {}).handle()).collect();
        assert!(handles.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_broadcast_in_registration_order() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        for id in 0..4 {
            let callback = make(id);
            registry.add(move |state| callback(state));
        }

        assert_eq!(registry.broadcast(ConnectionState::SyncConnected), 4);
        let ids: Vec<u32> = log.lock().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ListenerRegistry::new();
        let unsubscribe = registry.add(|_| {});

        assert!(unsubscribe.unsubscribe());
        assert!(!unsubscribe.unsubscribe());
        assert!(!registry.remove(unsubscribe.handle()));
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast(ConnectionState::Expired), 0);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = ListenerRegistry::new();
        let unsubscribe = registry.add(|_| {});
        drop(registry);
        assert!(!unsubscribe.unsubscribe());
    }

    #[test]
    fn test_self_unsubscribe_during_broadcast() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<OnceLock<Unsubscribe>> = Arc::new(OnceLock::new());

        let c = Arc::clone(&calls);
        let s = Arc::clone(&slot);
        let unsubscribe = registry.add(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = s.get() {
                me.unsubscribe();
            }
        });
        slot.set(unsubscribe).unwrap();

        registry.broadcast(ConnectionState::SyncConnected);
        registry.broadcast(ConnectionState::SyncConnected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_removed_mid_broadcast_is_skipped() {
        let registry = ListenerRegistry::new();
        let (log, make) = recorder();
        let victim: Arc<OnceLock<Unsubscribe>> = Arc::new(OnceLock::new());

        let first = make(1);
        let v = Arc::clone(&victim);
        registry.add(move |state| {
            first(state);
            if let Some(victim) = v.get() {
                victim.unsubscribe();
            }
        });
        let second = make(2);
        victim
            .set(registry.add(move |state| second(state)))
            .unwrap();

        assert_eq!(registry.broadcast(ConnectionState::Disconnected), 1);
        assert_eq!(*log.lock(), vec![(1, ConnectionState::Disconnected)]);
    }

    #[test]
    fn test_listener_added_mid_broadcast_waits_for_next() {
        let registry = ListenerRegistry::new();
        let late_calls = Arc::new(AtomicUsize::new(0));

        let r = registry.clone();
        let l = Arc::clone(&late_calls);
        let added = Arc::new(AtomicBool::new(false));
        registry.add(move |_| {
            if !added.swap(true, Ordering::SeqCst) {
                let l = Arc::clone(&l);
                r.add(move |_| {
                    l.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        registry.broadcast(ConnectionState::SyncConnected);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        registry.broadcast(ConnectionState::SyncConnected);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cross_unsubscribe_from_two_threads() {
        use std::sync::mpsc;
        use std::sync::Barrier;
        use std::time::Duration;

        let registry = ListenerRegistry::new();
        let a_slot: Arc<OnceLock<Unsubscribe>> = Arc::new(OnceLock::new());
        let b_slot: Arc<OnceLock<Unsubscribe>> = Arc::new(OnceLock::new());
        let both_inside = Arc::new(Barrier::new(2));
        let (b_entered_tx, b_entered_rx) = mpsc::channel();
        let b_entered_tx = Mutex::new(Some(b_entered_tx));

        let on_thread = |name: &str| std::thread::current().name() == Some(name);

        // A acts only on "first": it removes B while B runs on "second".
        let barrier = Arc::clone(&both_inside);
        let victim = Arc::clone(&b_slot);
        let a = registry.add(move |_| {
            if on_thread("first") {
                barrier.wait();
                if let Some(b) = victim.get() {
                    b.unsubscribe();
                }
            }
        });
        a_slot.set(a).unwrap();

        // B acts only on "second": it removes A while A runs on "first".
        let barrier = Arc::clone(&both_inside);
        let victim = Arc::clone(&a_slot);
        let b = registry.add(move |_| {
            if on_thread("second") {
                if let Some(tx) = b_entered_tx.lock().take() {
                    let _ = tx.send(());
                }
                barrier.wait();
                if let Some(a) = victim.get() {
                    a.unsubscribe();
                }
            }
        });
        b_slot.set(b).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let spawn = |name: &str| {
            let registry = registry.clone();
            let done = done_tx.clone();
            std::thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    registry.broadcast(ConnectionState::SyncConnected);
                    let _ = done.send(());
                })
                .unwrap()
        };

        // "second" passes A and parks in B before "first" enters A.
        let second = spawn("second");
        b_entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("B never ran on the second thread");
        let first = spawn("first");

        for _ in 0..2 {
            done_rx
                .recv_timeout(Duration::from_secs(2))
                .expect("broadcasts deadlocked on each other's gates");
        }
        first.join().unwrap();
        second.join().unwrap();

        assert!(registry.is_empty());
        assert_eq!(registry.broadcast(ConnectionState::SyncConnected), 0);
    }

    #[test]
    fn test_no_invocation_after_unsubscribe_returns() {
        let registry = ListenerRegistry::new();
        let unsubscribed = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&unsubscribed);
        let v = Arc::clone(&violations);
        let unsubscribe = registry.add(move |_| {
            if flag.load(Ordering::SeqCst) {
                v.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::yield_now();
        });

        let broadcasters: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        registry.broadcast(ConnectionState::SyncConnected);
                    }
                })
            })
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(20));
        unsubscribe.unsubscribe();
        unsubscribed.store(true, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);

        for handle in broadcasters {
            handle.join().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }
}
