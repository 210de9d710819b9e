//! File system sessions
//!
//! An [`S3FileSystem`] owns one bucket root, the channels opened against it
//! and a swappable [`ClientProvider`]. Its lifecycle is one-way: OPEN, then
//! CLOSED after the first [`close`](S3FileSystem::close). Closing again is a
//! no-op; every other operation on a closed session fails with
//! [`Error::ClosedFileSystem`]. Pure queries (`separator`, `is_open`,
//! `is_read_only`, `bucket_name`, `root_id`, `config`, `client_provider`)
//! keep answering after close.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::attributes;
use crate::channel::{Channel, OpenChannelRegistry, OpenChannels};
use crate::client::ClientProvider;
use crate::config::FileSystemConfig;
use crate::error::{Error, Result};
use crate::matcher::PathMatcher;
use crate::path::{S3Path, SEPARATOR};
use crate::registry::FileSystemRegistry;
use crate::root::RootId;
use crate::traits::StorageClient;

/// A file system session over one bucket
pub struct S3FileSystem {
    root: RootId,
    config: FileSystemConfig,
    client_provider: RwLock<Arc<dyn ClientProvider>>,
    open: AtomicBool,
    channels: OpenChannelRegistry,
    registry: Option<Arc<FileSystemRegistry>>,
}

impl S3FileSystem {
    /// Create a session that is not tracked by any registry
    pub fn new(
        root: RootId,
        config: FileSystemConfig,
        client_provider: Arc<dyn ClientProvider>,
    ) -> Self {
        Self {
            root,
            config,
            client_provider: RwLock::new(client_provider),
            open: AtomicBool::new(true),
            channels: OpenChannelRegistry::default(),
            registry: None,
        }
    }

    /// Create a session and register it in `registry`
    ///
    /// Fails with `AlreadyExists` if an open session holds the same root.
    pub fn open(
        registry: &Arc<FileSystemRegistry>,
        root: RootId,
        config: FileSystemConfig,
        client_provider: Arc<dyn ClientProvider>,
    ) -> Result<Arc<Self>> {
        let mut fs = Self::new(root, config, client_provider);
        fs.registry = Some(Arc::clone(registry));
        let fs = Arc::new(fs);
        registry.insert(Arc::clone(&fs))?;
        info!(root = %fs.root, read_only = fs.config.read_only, "opened file system");
        Ok(fs)
    }

    /// Path separator, always `/`
    pub fn separator(&self) -> &'static str {
        SEPARATOR
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn bucket_name(&self) -> &str {
        self.root.bucket()
    }

    pub fn root_id(&self) -> &RootId {
        &self.root
    }

    pub fn config(&self) -> &FileSystemConfig {
        &self.config
    }

    /// The provider in effect right now
    pub fn client_provider(&self) -> Arc<dyn ClientProvider> {
        let guard = self
            .client_provider
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the provider for subsequent operations
    ///
    /// Operations already holding a client keep using it; the last write wins.
    pub fn set_client_provider(&self, provider: Arc<dyn ClientProvider>) -> Result<()> {
        self.ensure_open()?;
        *self
            .client_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = provider;
        debug!(root = %self.root, "client provider replaced");
        Ok(())
    }

    /// Acquire the storage client for this root from the current provider
    pub async fn client(&self) -> Result<Arc<dyn StorageClient>> {
        self.ensure_open()?;
        let provider = self.client_provider();
        provider.client(&self.root).await
    }

    /// The single root directory `/`
    pub fn root_directories(self: &Arc<Self>) -> Result<Vec<S3Path>> {
        Ok(vec![self.get_path(SEPARATOR, &[])?])
    }

    /// Names of the discrete stores behind this file system; a bucket has none
    pub fn file_stores(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(Vec::new())
    }

    pub fn supported_file_attribute_views(&self) -> Result<BTreeSet<&'static str>> {
        self.ensure_open()?;
        Ok(attributes::supported_views())
    }

    /// Build a path from `first` and `more`, joined with `/`
    pub fn get_path(self: &Arc<Self>, first: &str, more: &[&str]) -> Result<S3Path> {
        self.ensure_open()?;
        S3Path::parse(Arc::clone(self), first, more)
    }

    /// Compile a `glob:` or `regex:` matcher
    pub fn path_matcher(&self, syntax_and_pattern: &str) -> Result<PathMatcher> {
        self.ensure_open()?;
        PathMatcher::new(syntax_and_pattern)
    }

    /// Snapshot of the channels currently open against this file system
    pub fn open_channels(&self) -> Result<OpenChannels> {
        self.ensure_open()?;
        Ok(self.channels.snapshot())
    }

    /// Track a newly opened channel
    ///
    /// Fails with `ClosedFileSystem` once close has begun; the caller then
    /// owns the channel and must not hand it out.
    pub fn register_channel(&self, channel: Arc<dyn Channel>) -> Result<()> {
        self.ensure_open()?;
        self.channels.register(channel)
    }

    /// Stop tracking a channel; called by channels as they close
    pub fn deregister_channel(&self, channel: &dyn Channel) {
        self.channels.deregister(channel);
    }

    /// Close the session
    ///
    /// The first call force-closes every open channel, removes the session
    /// from its registry and leaves it CLOSED. Channel close failures do not
    /// stop the sequence; they are reported together as
    /// [`Error::ChannelClose`] once it has completed. Later calls do nothing.
    pub async fn close(&self) -> Result<()> {
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let results = self.channels.close_all().await;
        let total = results.len();
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(channel, result)| {
                result.err().map(|e| {
                    warn!(root = %self.root, path = %channel.path(), error = %e, "failed to close channel");
                    format!("{}: {e}", channel.path())
                })
            })
            .collect();

        if let Some(registry) = &self.registry {
            registry.remove(self);
        }

        info!(root = %self.root, channels = total, failed = failures.len(), "closed file system");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ChannelClose(failures))
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::ClosedFileSystem(self.root.to_uri()))
        }
    }

    pub(crate) fn ensure_writable(&self, path: &S3Path) -> Result<()> {
        self.ensure_open()?;
        if self.is_read_only() {
            return Err(Error::UnsupportedOperation(format!(
                "{} is read-only: cannot modify '{path}'",
                self.root
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn open_channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl std::fmt::Debug for S3FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3FileSystem")
            .field("root", &self.root)
            .field("open", &self.is_open())
            .field("read_only", &self.is_read_only())
            .field("registered", &self.registry.is_some())
            .finish()
    }
}
