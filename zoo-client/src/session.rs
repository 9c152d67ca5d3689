//! Scoped session acquisition
//!
//! [`ManagedSession`] ties a connected [`ClientFacade`] to a scope: the
//! session is disposed exactly once when the guard goes away, whether the
//! scope returned normally, failed, was cancelled or panicked.

use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;

use zoo_driver::{ClientConfig, DriverFactory};

use crate::client::ClientFacade;
use crate::error::{Cause, Result, ZooError};

/// Future returned by a [`with_session`] body, borrowing the facade
pub type SessionFuture<'a, T, E> =
    Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 'a>>;

/// A connected facade that disposes itself on drop
#[derive(Debug)]
pub struct ManagedSession {
    facade: ClientFacade,
}

impl ManagedSession {
    /// Validate `config`, build a driver with `factory` and connect it.
    ///
    /// Configuration and factory failures surface as [`ZooError::Connect`].
    /// If the handshake fails the driver is disposed before returning.
    pub async fn acquire<F>(factory: &F, config: &ClientConfig) -> Result<Self>
    where
        F: DriverFactory + ?Sized,
    {
        config
            .validate()
            .map_err(|e| ZooError::Connect(Cause::Message(e.to_string())))?;
        let driver = factory
            .create_driver(config)
            .map_err(|e| ZooError::Connect(e.into()))?;

        tracing::debug!("Acquiring session for {}", config.connection_string);
        let session = ManagedSession {
            facade: ClientFacade::new(driver),
        };
        session.facade.connect().await?;
        Ok(session)
    }

    pub fn facade(&self) -> &ClientFacade {
        &self.facade
    }

    /// Dispose now instead of at the end of the scope
    pub fn close(self) {
        drop(self);
    }
}

impl Deref for ManagedSession {
    type Target = ClientFacade;

    fn deref(&self) -> &Self::Target {
        &self.facade
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        tracing::debug!("Releasing managed session");
        self.facade.dispose();
    }
}

/// Run `body` against a freshly connected session, then dispose it.
///
/// ```
/// use zoo_client::{with_session, ZooError};
/// use zoo_driver::{ClientConfig, CreateMode, MemoryEnsemble};
///
/// # tokio_test::block_on(async {
/// let ensemble = MemoryEnsemble::new();
/// let config = ClientConfig::new("memory:2181");
///
/// let children = with_session(&ensemble, &config, |zk| {
///     Box::pin(async move {
///         zk.mkdirp("/jobs").await?;
///         zk.create("/jobs/b", CreateMode::Persistent, None).await?;
///         zk.create("/jobs/a", CreateMode::Persistent, None).await?;
///         Ok::<_, ZooError>(zk.get_children("/jobs").await?.paths)
///     })
/// })
/// .await
/// .unwrap();
///
/// assert_eq!(children, vec!["a", "b"]);
/// assert_eq!(ensemble.open_sessions(), 0);
/// # });
/// ```
pub async fn with_session<F, B, T, E>(
    factory: &F,
    config: &ClientConfig,
    body: B,
) -> std::result::Result<T, E>
where
    F: DriverFactory + ?Sized,
    B: for<'a> FnOnce(&'a ClientFacade) -> SessionFuture<'a, T, E>,
    E: From<ZooError>,
{
    let session = ManagedSession::acquire(factory, config).await?;
    body(session.facade()).await
}
