//! Remote object-store backend

use super::{Location, StoreBackend};
use crate::Result;
use memokit_remote::{HttpObjectStore, ObjectStore, RemoteConfig, RemoteUri, Transaction};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Memo storage inside a remote object store
#[derive(Clone)]
pub struct RemoteBackend {
    base: RemoteUri,
    store: Arc<dyn ObjectStore>,
}

impl RemoteBackend {
    /// Wrap an object store rooted at `base`
    #[must_use]
    pub fn new(base: RemoteUri, store: Arc<dyn ObjectStore>) -> Self {
        Self { base, store }
    }

    /// Parse `base` and connect an HTTP object store for it
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is malformed or the client cannot be built.
    pub fn connect(base: &str, config: &RemoteConfig) -> Result<Self> {
        let uri = RemoteUri::parse(base, &config.scheme)?;
        let store = HttpObjectStore::new(config)?;
        Ok(Self::new(uri, Arc::new(store)))
    }

    /// The base URI
    #[must_use]
    pub fn base(&self) -> &RemoteUri {
        &self.base
    }

    fn uri_for(&self, location: &Location) -> RemoteUri {
        self.base.join(&location.relative())
    }
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("base", &self.base.to_string())
            .finish_non_exhaustive()
    }
}

impl StoreBackend for RemoteBackend {
    fn read(&self, location: &Location) -> Result<Option<Vec<u8>>> {
        let uri = self.uri_for(location);
        match self.store.get(&uri) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_not_found() => {
                debug!(%uri, "Remote memo not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        let uri = self.uri_for(location);
        let mut tx = Transaction::begin(self.store.as_ref());
        tx.stage(uri, bytes.to_vec())?;
        tx.commit()?;
        Ok(())
    }

    fn supports_transaction(&self) -> bool {
        true
    }

    fn resolve(&self, location: &Location) -> String {
        self.uri_for(location).to_string()
    }
}
