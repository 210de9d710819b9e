//! Session lifecycle, registry and path behaviour against an in-memory store

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use bucketfs_core::config::keys;
use bucketfs_core::{
    Channel, ClientProvider, Error, FileSystemConfig, FixedClientProvider, RootId, StorageClient,
};
use common::{MemoryStorage, init_tracing, open, provider};

#[test]
fn test_fresh_session_is_open_without_channels() {
    init_tracing();
    let fs = open(MemoryStorage::with_bucket("mybucket"), "mybucket");
    assert!(fs.is_open());
    assert!(fs.open_channels().unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_session_leaves_registry() {
    let provider = provider(MemoryStorage::with_bucket("mybucket"));
    let fs = provider
        .new_file_system("s3://mybucket", &HashMap::new())
        .unwrap();
    assert!(provider.get_file_system("s3://mybucket").is_ok());

    fs.close().await.unwrap();
    assert!(!fs.is_open());
    assert!(matches!(
        provider.get_file_system("s3://mybucket"),
        Err(Error::FileSystemNotFound(_))
    ));
    assert!(provider.registry().get(&RootId::new("mybucket")).is_none());

    // the root is free again
    let reopened = provider
        .new_file_system("s3://mybucket", &HashMap::new())
        .unwrap();
    assert!(!Arc::ptr_eq(&fs, &reopened));
}

#[tokio::test]
async fn test_open_channels_view_rejects_mutation() {
    let storage = MemoryStorage::with_bucket("mybucket");
    storage.insert("mybucket", "a.txt", b"abc");
    let fs = open(storage, "mybucket");

    let channel = fs
        .open_read(&fs.get_path("/a.txt", &[]).unwrap())
        .await
        .unwrap();
    let view = fs.open_channels().unwrap();
    assert!(view.contains(channel.as_ref()));

    assert!(matches!(
        view.insert(channel.clone()),
        Err(Error::UnsupportedOperation(_))
    ));
    assert!(matches!(
        view.remove(channel.as_ref()),
        Err(Error::UnsupportedOperation(_))
    ));
    assert_eq!(fs.open_channels().unwrap().len(), 1);
    channel.close().await.unwrap();
}

#[test]
fn test_separator_ignores_configuration() {
    let storage = MemoryStorage::with_bucket("mybucket");
    let options = HashMap::from([
        (keys::READ_ONLY.to_string(), "true".to_string()),
        (keys::ENDPOINT.to_string(), "http://localhost:9000".to_string()),
        (keys::FORCE_PATH_STYLE.to_string(), "true".to_string()),
    ]);
    let fs = provider(storage)
        .new_file_system("s3://mybucket", &options)
        .unwrap();
    assert_eq!(fs.separator(), "/");
    assert!(fs.is_read_only());
}

#[test]
fn test_single_root_directory() {
    let fs = open(MemoryStorage::with_bucket("mybucket"), "mybucket");
    let roots = fs.root_directories().unwrap();
    let mut iter = roots.iter();
    assert_eq!(iter.next().map(ToString::to_string).as_deref(), Some("/"));
    assert!(iter.next().is_none());
}

#[test]
fn test_client_provider_is_identity_preserving() {
    let fs = open(MemoryStorage::with_bucket("mybucket"), "mybucket");
    let storage: Arc<dyn StorageClient> = MemoryStorage::with_bucket("mybucket");
    let p1: Arc<dyn ClientProvider> = Arc::new(FixedClientProvider::new(Arc::clone(&storage)));
    let p2: Arc<dyn ClientProvider> = Arc::new(FixedClientProvider::new(storage));

    fs.set_client_provider(Arc::clone(&p1)).unwrap();
    assert!(Arc::ptr_eq(&fs.client_provider(), &p1));
    fs.set_client_provider(Arc::clone(&p2)).unwrap();
    assert!(Arc::ptr_eq(&fs.client_provider(), &p2));
    assert!(!Arc::ptr_eq(&fs.client_provider(), &p1));
}

#[test]
fn test_glob_star_dot_star() {
    let fs = open(MemoryStorage::with_bucket("mybucket"), "mybucket");
    let matcher = fs.path_matcher("glob:*.*").unwrap();

    for name in ["a.b", "file.txt", ".hidden", "a.", "a.b.c", "archive.tar.gz"] {
        assert!(matcher.matches_str(name), "{name} should match");
    }
    for name in ["abc", "", "dir/a.b", "/a.b", "a/b.c"] {
        assert!(!matcher.matches_str(name), "{name} should not match");
    }

    let path = fs.get_path("report.pdf", &[]).unwrap();
    assert!(matcher.matches(&path));
    let nested = fs.get_path("dir", &["report.pdf"]).unwrap();
    assert!(!matcher.matches(&nested));
}

#[test]
fn test_bucket_name() {
    let fs = open(MemoryStorage::with_bucket("mybucket"), "mybucket");
    assert_eq!(fs.bucket_name(), "mybucket");
    assert_eq!(FileSystemConfig::new("mybucket").bucket_name, "mybucket");
}

#[tokio::test]
async fn test_missing_bucket_never_exists() {
    // the store knows no buckets at all
    let fs = open(Arc::new(MemoryStorage::default()), "no-such-bucket");

    let path = fs.get_path("/some/key.txt", &[]).unwrap();
    assert_eq!(path.to_string(), "/some/key.txt");

    let err = fs.exists(&path).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");

    let root = fs.get_path("/", &[]).unwrap();
    assert!(!fs.exists(&root).await.unwrap());
}

#[test]
fn test_basic_view_supported() {
    let fs = open(MemoryStorage::with_bucket("mybucket"), "mybucket");
    assert!(fs.supported_file_attribute_views().unwrap().contains("basic"));
}

#[test]
fn test_get_path_resolves_parent_segments() {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(path: &bucketfs_core::S3Path) -> u64 {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish()
    }

    let provider = provider(MemoryStorage::with_bucket("mybucket"));

    let above_root = provider.get_path("s3://mybucket/..").unwrap();
    let root = provider.get_path("s3://mybucket/").unwrap();
    assert!(above_root.is_root());
    assert_eq!(above_root.to_string(), "/");
    assert_eq!(above_root, root);
    assert_eq!(hash_of(&above_root), hash_of(&root));

    let folded = provider.get_path("s3://mybucket/a/../b").unwrap();
    let direct = provider.get_path("s3://mybucket/b").unwrap();
    assert_eq!(folded, direct);
    assert_eq!(hash_of(&folded), hash_of(&direct));
    assert_eq!(folded.key(), "b");
}

#[tokio::test]
async fn test_get_path_through_provider() {
    let provider = provider(MemoryStorage::with_bucket("mybucket"));
    let path = provider.get_path("s3://mybucket/a/b/../c.txt").unwrap();
    assert_eq!(path.normalize().to_string(), "/a/c.txt");
    assert_eq!(path.normalize().to_uri(), "s3://mybucket/a/c.txt");

    let fs = provider.get_or_create("s3://mybucket").unwrap();
    assert!(Arc::ptr_eq(path.file_system(), &fs));

    fs.close().await.unwrap();
    assert!(matches!(
        path.file_system().get_path("/x", &[]),
        Err(Error::ClosedFileSystem(_))
    ));
}
