//! Shared helpers for bucketfs-core integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bucketfs_core::{
    Error, FileSystemProvider, FileSystemRegistry, FixedClientProvider, ListOptions, ListResult,
    ObjectInfo, Result, S3FileSystem, StorageClient,
};

/// Install a test-writer subscriber once; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

#[derive(Default)]
struct Buckets {
    objects: HashMap<String, BTreeMap<String, StoredObject>>,
    puts: HashMap<(String, String), usize>,
}

/// In-memory object store with S3 listing semantics
#[derive(Default)]
pub struct MemoryStorage {
    buckets: Mutex<Buckets>,
}

impl MemoryStorage {
    pub fn with_bucket(bucket: &str) -> Arc<Self> {
        let storage = Self::default();
        storage
            .buckets
            .lock()
            .unwrap()
            .objects
            .insert(bucket.to_string(), BTreeMap::new());
        Arc::new(storage)
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.buckets
            .lock()
            .unwrap()
            .objects
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    content_type: None,
                },
            );
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .objects
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of uploads of `key`
    pub fn put_count(&self, bucket: &str, key: &str) -> usize {
        self.buckets
            .lock()
            .unwrap()
            .puts
            .get(&(bucket.to_string(), key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn with_objects<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut BTreeMap<String, StoredObject>) -> Result<T>,
    ) -> Result<T> {
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .objects
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))?;
        f(objects)
    }
}

fn info(key: &str, object: &StoredObject) -> ObjectInfo {
    let mut info = ObjectInfo::file(key, object.data.len() as u64);
    info.content_type = object.content_type.clone();
    info.etag = Some(format!("\"{:x}\"", object.data.len()));
    info
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.lock().unwrap().objects.contains_key(bucket))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        self.with_objects(bucket, |objects| Ok(objects.get(key).map(|o| info(key, o))))
    }

    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ListResult> {
        self.with_objects(bucket, |objects| {
            let prefix = options.prefix.clone().unwrap_or_default();
            let delimiter = options.delimiter.clone().filter(|_| !options.recursive);

            let mut entries: Vec<ObjectInfo> = Vec::new();
            for (key, object) in objects.range(prefix.clone()..) {
                if !key.starts_with(&prefix) {
                    break;
                }
                let rest = &key[prefix.len()..];
                match delimiter.as_deref().and_then(|d| rest.find(d).map(|i| i + d.len())) {
                    Some(end) => {
                        let common = format!("{prefix}{}", &rest[..end]);
                        if entries.last().map(|e| e.key.as_str()) != Some(common.as_str()) {
                            entries.push(ObjectInfo::dir(common));
                        }
                    }
                    None => entries.push(info(key, object)),
                }
            }
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            entries.dedup_by(|a, b| a.key == b.key);

            if let Some(token) = &options.continuation_token {
                entries.retain(|e| e.key.as_str() > token.as_str());
            }

            let max = options.max_keys.unwrap_or(1000).max(1) as usize;
            let truncated = entries.len() > max;
            entries.truncate(max);
            let continuation_token = truncated
                .then(|| entries.last().map(|e| e.key.clone()))
                .flatten();

            Ok(ListResult {
                items: entries,
                truncated,
                continuation_token,
            })
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>> {
        self.with_objects(bucket, |objects| {
            let object = objects
                .get(key)
                .ok_or_else(|| Error::NotFound(format!("Object not found: {key}")))?;
            let start = (offset as usize).min(object.data.len());
            let end = start.saturating_add(len as usize).min(object.data.len());
            Ok(object.data[start..end].to_vec())
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectInfo> {
        let result = self.with_objects(bucket, |objects| {
            let object = StoredObject { data, content_type };
            let result = info(key, &object);
            objects.insert(key.to_string(), object);
            Ok(result)
        })?;
        *self
            .buckets
            .lock()
            .unwrap()
            .puts
            .entry((bucket.to_string(), key.to_string()))
            .or_default() += 1;
        Ok(result)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.with_objects(bucket, |objects| {
            objects.remove(key);
            Ok(())
        })
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let object = self.with_objects(src_bucket, |objects| {
            objects
                .get(src_key)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Object not found: {src_key}")))
        })?;
        self.with_objects(dst_bucket, |objects| {
            objects.insert(dst_key.to_string(), object);
            Ok(())
        })
    }
}

/// Provider over `storage` with its own registry
pub fn provider(storage: Arc<MemoryStorage>) -> FileSystemProvider {
    FileSystemProvider::new(Arc::new(FixedClientProvider::new(storage)))
        .with_registry(Arc::new(FileSystemRegistry::default()))
}

/// Open a session on `bucket` backed by `storage`
pub fn open(storage: Arc<MemoryStorage>, bucket: &str) -> Arc<S3FileSystem> {
    provider(storage)
        .new_file_system(&format!("s3://{bucket}"), &HashMap::new())
        .unwrap()
}
