//! # zoo-sdk client
//!
//! An async facade over a callback-based coordination-service driver.
//!
//! ## Overview
//!
//! A native driver reports connection progress on one multiplexed stream of
//! raw states and completes every request through a one-shot callback. This
//! crate turns that into:
//!
//! - **Connection supervision**: [`ClientFacade::connect`] resolves on the
//!   first conclusive handshake state and never retries
//! - **Independent observers**: [`ClientFacade::listen`] hands out
//!   [`Unsubscribe`] handles that can be cancelled one at a time, from any
//!   thread, including from inside a callback
//! - **Futures that settle once**: every coordination call goes through
//!   [`adapter::adapt`], so a driver that fires twice, or a cancellation
//!   racing a completion, yields exactly one outcome
//! - **Guaranteed release**: [`ManagedSession`] and [`with_session`] dispose
//!   the native connection exactly once on every exit path
//!
//! ## Usage
//!
//! ```
//! use zoo_client::{ManagedSession, ZooError};
//! use zoo_driver::{ClientConfig, CreateMode, MemoryEnsemble};
//!
//! # tokio_test::block_on(async {
//! let ensemble = MemoryEnsemble::new();
//! let zk = ManagedSession::acquire(&ensemble, &ClientConfig::new("memory:2181")).await?;
//!
//! zk.mkdirp("/x/y").await?;
//! zk.create("/x/y/node", CreateMode::Persistent, None).await?;
//!
//! let children = zk.get_children("/x/y").await?;
//! assert_eq!(children.paths, vec!["node"]);
//!
//! drop(zk); // closes the session
//! assert_eq!(ensemble.open_sessions(), 0);
//! # Ok::<_, ZooError>(())
//! # }).unwrap();
//! ```
//!
//! ## Logging
//!
//! All components log through `tracing`. See [`logging`] for ready-made
//! subscriber presets driven by `ZOO_LOG_MODE` and `ZOO_LOG_LEVEL`.

pub mod adapter;
pub mod client;
pub mod error;
pub mod listeners;
pub mod logging;
pub mod session;
pub mod state_machine;
pub mod types;

// Re-export main types for convenience
pub use adapter::{adapt, Canceller, Interrupted, Operation, Resolver};
pub use client::ClientFacade;
pub use error::{Cause, ErrorKind, Result, ZooError};
pub use listeners::{ListenerHandle, ListenerRegistry, Unsubscribe};
pub use session::{with_session, ManagedSession, SessionFuture};
pub use state_machine::{classify, ConnectionStateMachine, Phase, Verdict};
pub use types::{ChildList, CreatedNode, DeletionObserved, Mkdirp, NodeId};

// Re-export driver types that appear in this crate's API
pub use zoo_driver::{
    Bytes, ClientConfig, ConnectionState, CreateMode, Driver, DriverFactory, DriverOptions,
    MemoryEnsemble,
};

/// Everything needed to open a session and run coordination calls
pub mod prelude {
    pub use crate::{
        with_session, ClientConfig, ClientFacade, ConnectionState, CreateMode, ManagedSession,
        MemoryEnsemble, Unsubscribe, ZooError,
    };
}
