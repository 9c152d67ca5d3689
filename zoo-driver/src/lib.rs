//! Native driver boundary for zoo-sdk.
//!
//! This crate defines what the client expects from a coordination-service
//! driver and nothing more: a callback-based [`Driver`] trait, the plain
//! types that cross it, the [`ClientConfig`] handed to a [`DriverFactory`],
//! and [`MemoryEnsemble`], an in-process service that speaks the same
//! contract.
//!
//! # Example
//!
//! ```
//! use zoo_driver::{CreateMode, Driver, MemoryEnsemble};
//!
//! let ensemble = MemoryEnsemble::new();
//! let session = ensemble.session();
//!
//! session.mkdirp("/app/config", Box::new(|result| {
//!     assert_eq!(result.unwrap(), "/app/config");
//! }));
//! session.create("/app/config/flag", None, CreateMode::Ephemeral, Box::new(|result| {
//!     assert!(result.is_ok());
//! }));
//!
//! assert!(ensemble.exists("/app/config/flag"));
//! session.close().unwrap();
//! assert!(!ensemble.exists("/app/config/flag"));
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod memory;
pub mod types;

pub use config::{ClientConfig, ConfigError, DriverOptions};
pub use driver::{Driver, DriverFactory};
pub use error::{DriverError, ErrorCode, Result};
pub use memory::{MemoryDriver, MemoryEnsemble};
pub use types::{
    Callback, ConnectionState, CreateMode, EventType, StateListener, WatchEvent, WatchId, Watcher,
};

// Payload type used by `create` and `set_data`
pub use bytes::Bytes;
