//! URI front for file system sessions
//!
//! [`FileSystemProvider`] turns `s3://bucket/key` URIs into sessions and
//! paths. Sessions are created through a [`ClientProviderFactory`] and kept
//! in a [`FileSystemRegistry`], the global one unless another is given.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::client::ClientProviderFactory;
use crate::config::{Config, FileSystemConfig};
use crate::error::{Error, Result};
use crate::filesystem::S3FileSystem;
use crate::path::{S3Path, SEPARATOR};
use crate::registry::FileSystemRegistry;
use crate::root::{self, RootId, SCHEME};

/// Creates and looks up sessions by URI
pub struct FileSystemProvider {
    registry: Arc<FileSystemRegistry>,
    factory: Arc<dyn ClientProviderFactory>,
    config: Config,
}

impl FileSystemProvider {
    pub fn new(factory: Arc<dyn ClientProviderFactory>) -> Self {
        Self {
            registry: FileSystemRegistry::global(),
            factory,
            config: Config::default(),
        }
    }

    /// Use `registry` instead of the global registry
    pub fn with_registry(mut self, registry: Arc<FileSystemRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Defaults and bucket profiles applied to new sessions
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<FileSystemRegistry> {
        &self.registry
    }

    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    /// Open a new session for the bucket of `uri`
    ///
    /// `options` override the configured profile (see [`crate::config::keys`]).
    /// Fails with `AlreadyExists` while an open session holds the bucket.
    pub fn new_file_system(
        &self,
        uri: &str,
        options: &HashMap<String, String>,
    ) -> Result<Arc<S3FileSystem>> {
        let parsed = root::parse_uri(uri)?;
        if self.registry.get(&parsed.root).is_some() {
            return Err(Error::AlreadyExists(parsed.root.to_uri()));
        }
        self.open(parsed.root, options)
    }

    /// The open session for the bucket of `uri`
    pub fn get_file_system(&self, uri: &str) -> Result<Arc<S3FileSystem>> {
        let parsed = root::parse_uri(uri)?;
        self.registry
            .get(&parsed.root)
            .ok_or_else(|| Error::FileSystemNotFound(parsed.root.to_uri()))
    }

    /// The open session for the bucket of `uri`, opened with defaults if absent
    pub fn get_or_create(&self, uri: &str) -> Result<Arc<S3FileSystem>> {
        let parsed = root::parse_uri(uri)?;
        self.get_or_open(parsed.root)
    }

    /// Path for `uri`, opening its session if needed
    ///
    /// No request is made to the store.
    pub fn get_path(&self, uri: &str) -> Result<S3Path> {
        let parsed = root::parse_uri(uri)?;
        let fs = self.get_or_open(parsed.root)?;
        fs.get_path(&format!("{SEPARATOR}{}", parsed.key), &[])
    }

    fn get_or_open(&self, root: RootId) -> Result<Arc<S3FileSystem>> {
        if let Some(fs) = self.registry.get(&root) {
            return Ok(fs);
        }
        match self.open(root.clone(), &HashMap::new()) {
            // another caller opened it first
            Err(Error::AlreadyExists(_)) => self
                .registry
                .get(&root)
                .ok_or_else(|| Error::FileSystemNotFound(root.to_uri())),
            other => other,
        }
    }

    fn open(&self, root: RootId, options: &HashMap<String, String>) -> Result<Arc<S3FileSystem>> {
        let config =
            FileSystemConfig::from_config(&self.config, root.bucket()).with_options(options)?;
        let client_provider = self.factory.create(&config)?;
        debug!(root = %root, options = options.len(), "creating file system");
        S3FileSystem::open(&self.registry, root, config, client_provider)
    }
}

impl std::fmt::Debug for FileSystemProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemProvider")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
