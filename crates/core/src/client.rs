//! Client providers
//!
//! A [`ClientProvider`] hands out the [`StorageClient`] for a root. Real
//! providers may perform a network round trip (bucket region lookup) the first
//! time a root is seen and cache the result.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FileSystemConfig;
use crate::error::Result;
use crate::root::RootId;
use crate::traits::StorageClient;

/// Produces the storage client used for operations against a root
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Get (or build) the client for `root`
    async fn client(&self, root: &RootId) -> Result<Arc<dyn StorageClient>>;
}

/// Builds the client provider for a newly created file system
pub trait ClientProviderFactory: Send + Sync {
    fn create(&self, config: &FileSystemConfig) -> Result<Arc<dyn ClientProvider>>;
}

/// Provider that always returns the same client
#[derive(Clone)]
pub struct FixedClientProvider {
    client: Arc<dyn StorageClient>,
}

impl FixedClientProvider {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientProvider for FixedClientProvider {
    async fn client(&self, _root: &RootId) -> Result<Arc<dyn StorageClient>> {
        Ok(Arc::clone(&self.client))
    }
}

impl ClientProviderFactory for FixedClientProvider {
    fn create(&self, _config: &FileSystemConfig) -> Result<Arc<dyn ClientProvider>> {
        Ok(Arc::new(self.clone()))
    }
}
