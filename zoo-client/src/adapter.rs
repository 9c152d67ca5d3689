//! Callback-to-future adapter
//!
//! [`adapt`] turns a callback-accepting call into an [`Operation`] future
//! that settles exactly once. Completion and cancellation race for the same
//! compare-and-swap on a settled flag:
//!
//! - the first [`Resolver::settle`] wins; later calls (a driver firing twice,
//!   a watcher firing after cancellation) are discarded
//! - [`Canceller::cancel`], or dropping an unsettled `Operation`, runs the
//!   cancel hook synchronously and settles the operation as [`Interrupted`]
//! - the cancel hook never runs once the operation has resolved
//!
//! ```
//! use zoo_client::adapter::{adapt, Interrupted};
//!
//! #[derive(Debug, PartialEq)]
//! struct Failed;
//! impl From<Interrupted> for Failed {
//!     fn from(_: Interrupted) -> Self { Failed }
//! }
//!
//! # tokio_test::block_on(async {
//! let op = adapt::<u32, Failed, _>(|resolver| {
//!     resolver.succeed(7);
//!     resolver.succeed(8); // ignored
//!     None
//! });
//! assert_eq!(op.await, Ok(7));
//! # });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Terminal outcome of a cancelled operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation interrupted")]
pub struct Interrupted;

/// Hook run when an operation is cancelled before it settles
pub type CancelHook = Box<dyn FnOnce() + Send + 'static>;

struct Shared<T, E> {
    settled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<Result<T, E>>>>,
    on_cancel: Mutex<Option<CancelHook>>,
}

impl<T, E> Shared<T, E> {
    /// Claim the right to settle; true for exactly one caller
    fn claim(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn deliver(&self, outcome: Result<T, E>) {
        let sender = self.sender.lock().take();
        if let Some(sender) = sender {
            // The receiver is gone only when the operation was dropped.
            let _ = sender.send(outcome);
        }
    }
}

fn interrupt<T, E: From<Interrupted>>(shared: &Shared<T, E>) -> bool {
    if !shared.claim() {
        return false;
    }
    let hook = shared.on_cancel.lock().take();
    if let Some(hook) = hook {
        hook();
    }
    shared.deliver(Err(E::from(Interrupted)));
    true
}

/// Completion side of a pending operation
///
/// Cheap to clone; all clones share one settle-once guard.
pub struct Resolver<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Resolver<T, E> {
    /// Settle the operation. Returns `false` if it had already settled, in
    /// which case `outcome` is dropped.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        if !self.shared.claim() {
            tracing::trace!("Discarding resolution of an already settled operation");
            return false;
        }
        let hook = self.shared.on_cancel.lock().take();
        drop(hook);
        self.shared.deliver(outcome);
        true
    }

    pub fn succeed(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn fail(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.shared.settled.load(Ordering::Acquire)
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Cancellation side of a pending operation, usable from any task or thread
pub struct Canceller<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E: From<Interrupted>> Canceller<T, E> {
    /// Cancel the operation if it has not settled yet.
    ///
    /// The cancel hook has run by the time this returns `true`.
    pub fn cancel(&self) -> bool {
        interrupt(&self.shared)
    }
}

impl<T, E> Clone for Canceller<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A callback-driven operation awaiting its single resolution
///
/// Dropping it before it settles cancels it.
#[must_use = "dropping an operation cancels it"]
pub struct Operation<T, E: From<Interrupted>> {
    shared: Arc<Shared<T, E>>,
    receiver: oneshot::Receiver<Result<T, E>>,
    done: bool,
}

impl<T, E: From<Interrupted>> Operation<T, E> {
    /// A handle that cancels this operation
    pub fn canceller(&self) -> Canceller<T, E> {
        Canceller {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.shared.settled.load(Ordering::Acquire)
    }
}

impl<T, E: From<Interrupted>> Future for Operation<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                this.done = true;
                Poll::Ready(outcome)
            }
            Poll::Ready(Err(_)) => {
                this.done = true;
                Poll::Ready(Err(E::from(Interrupted)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E: From<Interrupted>> Drop for Operation<T, E> {
    fn drop(&mut self) {
        if !self.done && interrupt(&self.shared) {
            tracing::debug!("Operation dropped before settling, cancelled");
        }
    }
}

/// Start a callback-style call and return it as an [`Operation`].
///
/// `register` receives the [`Resolver`] to hand to the callback and may
/// return a hook to run if the operation is cancelled before it settles.
/// It runs immediately, so the side effect has been issued by the time
/// `adapt` returns.
pub fn adapt<T, E, F>(register: F) -> Operation<T, E>
where
    E: From<Interrupted>,
    F: FnOnce(Resolver<T, E>) -> Option<CancelHook>,
{
    let (sender, receiver) = oneshot::channel();
    let shared = Arc::new(Shared {
        settled: AtomicBool::new(false),
        sender: Mutex::new(Some(sender)),
        on_cancel: Mutex::new(None),
    });

    let hook = register(Resolver {
        shared: Arc::clone(&shared),
    });

    if let Some(hook) = hook {
        let mut slot = shared.on_cancel.lock();
        // A resolution that raced ahead of us has already claimed the flag.
        if !shared.settled.load(Ordering::Acquire) {
            *slot = Some(hook);
        }
    }

    Operation {
        shared,
        receiver,
        done: false,
    }
}
