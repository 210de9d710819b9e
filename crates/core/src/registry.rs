//! Identity registry: at most one open file system per root
//!
//! [`FileSystemRegistry::global`] is the process-wide instance, empty at
//! start; sessions remove themselves on close. Tests build isolated
//! instances with `FileSystemRegistry::default()`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::filesystem::S3FileSystem;
use crate::root::RootId;

static GLOBAL: LazyLock<Arc<FileSystemRegistry>> =
    LazyLock::new(|| Arc::new(FileSystemRegistry::default()));

/// Map from root identifier to its open session
#[derive(Default)]
pub struct FileSystemRegistry {
    file_systems: Mutex<HashMap<RootId, Arc<S3FileSystem>>>,
}

impl FileSystemRegistry {
    /// The process-wide registry
    pub fn global() -> Arc<FileSystemRegistry> {
        Arc::clone(&GLOBAL)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RootId, Arc<S3FileSystem>>> {
        self.file_systems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session; a closed leftover for the same root is replaced
    pub(crate) fn insert(&self, fs: Arc<S3FileSystem>) -> Result<()> {
        let mut map = self.lock();
        if let Some(existing) = map.get(fs.root_id()) {
            if existing.is_open() && !Arc::ptr_eq(existing, &fs) {
                return Err(Error::AlreadyExists(fs.root_id().to_uri()));
            }
        }
        map.insert(fs.root_id().clone(), fs);
        Ok(())
    }

    /// Look up the open session for a root
    pub fn get(&self, root: &RootId) -> Option<Arc<S3FileSystem>> {
        self.lock().get(root).filter(|fs| fs.is_open()).cloned()
    }

    /// Remove `fs` if it is the registered instance for its root
    pub(crate) fn remove(&self, fs: &S3FileSystem) -> bool {
        let mut map = self.lock();
        let same = map
            .get(fs.root_id())
            .is_some_and(|registered| std::ptr::eq(registered.as_ref(), fs));
        if same {
            map.remove(fs.root_id());
        }
        same
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Roots currently registered
    pub fn roots(&self) -> Vec<RootId> {
        let mut roots: Vec<RootId> = self.lock().keys().cloned().collect();
        roots.sort();
        roots
    }
}

impl std::fmt::Debug for FileSystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemRegistry")
            .field("roots", &self.roots())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FixedClientProvider;
    use crate::config::FileSystemConfig;
    use crate::traits::MockStorageClient;

    fn open(registry: &Arc<FileSystemRegistry>, bucket: &str) -> Result<Arc<S3FileSystem>> {
        S3FileSystem::open(
            registry,
            RootId::new(bucket),
            FileSystemConfig::new(bucket),
            Arc::new(FixedClientProvider::new(Arc::new(MockStorageClient::new()))),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let registry = Arc::new(FileSystemRegistry::default());
        assert!(registry.is_empty());

        let fs = open(&registry, "mybucket").unwrap();
        let found = registry.get(&RootId::new("mybucket")).unwrap();
        assert!(Arc::ptr_eq(&fs, &found));
        assert_eq!(registry.roots(), vec![RootId::new("mybucket")]);
        assert!(registry.get(&RootId::new("other")).is_none());
    }

    #[test]
    fn test_duplicate_root_rejected() {
        let registry = Arc::new(FileSystemRegistry::default());
        open(&registry, "mybucket").unwrap();
        assert!(matches!(
            open(&registry, "mybucket").unwrap_err(),
            Error::AlreadyExists(_)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_close_removes_and_frees_root() {
        let registry = Arc::new(FileSystemRegistry::default());
        let first = open(&registry, "mybucket").unwrap();
        first.close().await.unwrap();
        assert!(registry.get(&RootId::new("mybucket")).is_none());
        assert!(registry.is_empty());

        let second = open(&registry, "mybucket").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        // closing the stale instance again must not evict the new one
        first.close().await.unwrap();
        assert!(registry.get(&RootId::new("mybucket")).is_some());
    }

    #[test]
    fn test_remove_ignores_other_instances() {
        let registry = Arc::new(FileSystemRegistry::default());
        let _registered = open(&registry, "mybucket").unwrap();
        let detached = S3FileSystem::new(
            RootId::new("mybucket"),
            FileSystemConfig::new("mybucket"),
            Arc::new(FixedClientProvider::new(Arc::new(MockStorageClient::new()))),
        );
        assert!(!registry.remove(&detached));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_isolated_from_global() {
        let registry = Arc::new(FileSystemRegistry::default());
        open(&registry, "isolated-registry-bucket").unwrap();
        assert!(FileSystemRegistry::global()
            .get(&RootId::new("isolated-registry-bucket"))
            .is_none());
    }
}
