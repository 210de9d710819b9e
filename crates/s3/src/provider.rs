//! Client providers backed by aws-sdk-s3
//!
//! [`S3ClientProvider`] builds one [`S3StorageClient`] per bucket, in the
//! bucket's own region. The region comes from the configuration when set;
//! otherwise it is looked up with `GetBucketLocation`, falling back to the
//! region reported by `HeadBucket`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use bucketfs_core::{
    ClientProvider, ClientProviderFactory, ConfigManager, Error, FileSystemConfig,
    FileSystemProvider, Result, RootId, S3FileSystem, StorageClient,
};

use crate::client::{S3StorageClient, map_sdk_error};

/// Region used for lookups and for buckets without a location constraint
pub const DEFAULT_REGION: &str = "us-east-1";

const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// Map a `GetBucketLocation` constraint to a region name
pub fn region_from_location(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => DEFAULT_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

/// Provider that caches one client per bucket
pub struct S3ClientProvider {
    config: FileSystemConfig,
    clients: Mutex<HashMap<String, Arc<S3StorageClient>>>,
}

impl S3ClientProvider {
    pub fn new(config: FileSystemConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &FileSystemConfig {
        &self.config
    }

    async fn resolve_region(&self, bucket: &str) -> Result<String> {
        if let Some(region) = &self.config.region {
            return Ok(region.clone());
        }

        let lookup = S3StorageClient::new(&self.config, DEFAULT_REGION).await;
        let location = lookup
            .inner()
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await;

        let err = match location {
            Ok(response) => {
                let constraint = response.location_constraint().map(|c| c.as_str());
                return Ok(region_from_location(constraint));
            }
            Err(e) => map_sdk_error(&e, bucket),
        };
        if err.is_not_found() {
            return Err(err);
        }
        warn!(bucket, error = %err, "GetBucketLocation failed, trying HeadBucket");

        match lookup.inner().head_bucket().bucket(bucket).send().await {
            Ok(response) => Ok(response
                .bucket_region()
                .map_or_else(|| DEFAULT_REGION.to_string(), str::to_string)),
            // redirects and 403s still carry the region header
            Err(e) => e
                .raw_response()
                .and_then(|r| r.headers().get(BUCKET_REGION_HEADER))
                .map(str::to_string)
                .ok_or_else(|| map_sdk_error(&e, bucket)),
        }
    }
}

#[async_trait]
impl ClientProvider for S3ClientProvider {
    async fn client(&self, root: &RootId) -> Result<Arc<dyn StorageClient>> {
        let bucket = root.bucket();
        if let Some(client) = self.clients.lock().await.get(bucket) {
            return Ok(Arc::clone(client) as Arc<dyn StorageClient>);
        }

        // the lookup runs unlocked; a client cached meanwhile wins
        let region = self.resolve_region(bucket).await?;
        let created = Arc::new(S3StorageClient::new(&self.config, &region).await);
        let client = Arc::clone(
            self.clients
                .lock()
                .await
                .entry(bucket.to_string())
                .or_insert_with(|| {
                    debug!(bucket, region = %region, "created S3 client");
                    created
                }),
        );
        Ok(client as Arc<dyn StorageClient>)
    }
}

/// Factory handing each new file system its own [`S3ClientProvider`]
#[derive(Debug, Clone, Copy, Default)]
pub struct S3ClientProviderFactory;

impl ClientProviderFactory for S3ClientProviderFactory {
    fn create(&self, config: &FileSystemConfig) -> Result<Arc<dyn ClientProvider>> {
        Ok(Arc::new(S3ClientProvider::new(config.clone())))
    }
}

/// Provider over the global registry, configured from the user config file
pub fn default_provider() -> Result<FileSystemProvider> {
    let config = ConfigManager::new()?.load()?;
    Ok(FileSystemProvider::new(Arc::new(S3ClientProviderFactory)).with_config(config))
}

/// Session for `bucket` with built-in defaults, not tracked by any registry
#[deprecated(note = "use `FileSystemProvider::new_file_system` with an `s3://` URI")]
pub fn file_system_for_bucket(bucket: &str) -> Result<Arc<S3FileSystem>> {
    if bucket.is_empty() {
        return Err(Error::InvalidArgument("Bucket name must not be empty".into()));
    }
    let config = FileSystemConfig::new(bucket);
    let client_provider = S3ClientProviderFactory.create(&config)?;
    Ok(Arc::new(S3FileSystem::new(
        RootId::new(bucket),
        config,
        client_provider,
    )))
}

/// Session for the bucket of `uri`, shared through `provider`'s registry
#[deprecated(note = "use `FileSystemProvider::get_or_create`")]
pub fn file_system_for_uri(uri: &str, provider: &FileSystemProvider) -> Result<Arc<S3FileSystem>> {
    provider.get_or_create(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_location() {
        assert_eq!(region_from_location(None), "us-east-1");
        assert_eq!(region_from_location(Some("")), "us-east-1");
        assert_eq!(region_from_location(Some("EU")), "eu-west-1");
        assert_eq!(region_from_location(Some("ap-south-1")), "ap-south-1");
    }

    #[test]
    #[allow(deprecated)]
    fn test_file_system_for_bucket() {
        let fs = file_system_for_bucket("mybucket").unwrap();
        assert_eq!(fs.bucket_name(), "mybucket");
        assert_eq!(fs.config().bucket_name, "mybucket");
        assert!(fs.is_open());
        assert!(file_system_for_bucket("").is_err());
    }

    #[test]
    fn test_factory_keeps_config() {
        let config = FileSystemConfig::new("mybucket").region("eu-central-1");
        let provider = S3ClientProvider::new(config.clone());
        assert_eq!(provider.config(), &config);
        assert!(S3ClientProviderFactory.create(&config).is_ok());
    }

    #[tokio::test]
    async fn test_client_cached_per_bucket() {
        let provider =
            S3ClientProvider::new(FileSystemConfig::new("mybucket").region("eu-central-1"));
        let first = provider.client(&RootId::new("mybucket")).await.unwrap();
        let second = provider.client(&RootId::new("mybucket")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = provider.client(&RootId::new("otherbucket")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(provider.clients.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_shares_client() {
        let provider = Arc::new(S3ClientProvider::new(
            FileSystemConfig::new("mybucket").region("eu-central-1"),
        ));
        let root = RootId::new("mybucket");
        let (a, b) = tokio::join!(provider.client(&root), provider.client(&root));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(provider.clients.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_region_skips_lookup() {
        let provider =
            S3ClientProvider::new(FileSystemConfig::new("mybucket").region("eu-central-1"));
        assert_eq!(
            provider.resolve_region("mybucket").await.unwrap(),
            "eu-central-1"
        );
    }
}
