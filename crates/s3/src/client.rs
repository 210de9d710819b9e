//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the StorageClient trait from bucketfs-core.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use url::Url;

use bucketfs_core::{
    Error, FileSystemConfig, ListOptions, ListResult, ObjectInfo, Result, StorageClient,
};

/// Name attached to static credentials from the configuration
const CREDENTIALS_PROVIDER_NAME: &str = "bucketfs-static-credentials";

/// S3 client wrapper bound to one region
pub struct S3StorageClient {
    inner: aws_sdk_s3::Client,
}

impl S3StorageClient {
    /// Create a client for `region` from a file system configuration
    pub async fn new(config: &FileSystemConfig, region: &str) -> Self {
        let retry = RetryConfig::standard()
            .with_max_attempts(config.retry.max_attempts.max(1))
            .with_initial_backoff(Duration::from_millis(config.retry.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(config.retry.max_backoff_ms));
        let timeout = TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(config.timeout.connect_ms))
            .operation_timeout(Duration::from_millis(config.timeout.operation_ms))
            .build();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .retry_config(retry)
            .timeout_config(timeout);

        // Without static credentials the default provider chain applies
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                credentials.session_token.clone(),
                None, // expiry
                CREDENTIALS_PROVIDER_NAME,
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self::from_client(aws_sdk_s3::Client::from_conf(s3_config))
    }

    /// Wrap an already configured SDK client
    pub fn from_client(inner: aws_sdk_s3::Client) -> Self {
        Self { inner }
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

/// Map an SDK failure onto the bucketfs error kinds
pub(crate) fn map_sdk_error<E>(err: &SdkError<E, HttpResponse>, target: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let transport = matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    );
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = format!("{target}: {}", DisplayErrorContext(err));
    classify(transport, status, err.code(), message)
}

fn classify(transport: bool, status: Option<u16>, code: Option<&str>, message: String) -> Error {
    if transport {
        return Error::Network(message);
    }
    match (status, code) {
        (_, Some("NoSuchKey" | "NoSuchBucket" | "NotFound")) | (Some(404), _) => {
            Error::NotFound(message)
        }
        (
            _,
            Some(
                "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"
                | "InvalidToken",
            ),
        )
        | (Some(401 | 403), _) => Error::Auth(message),
        _ => Error::Network(message),
    }
}

fn timestamp(dt: &aws_smithy_types::DateTime) -> Option<jiff::Timestamp> {
    jiff::Timestamp::from_second(dt.secs()).ok()
}

fn etag(raw: &str) -> String {
    raw.trim_matches('"').to_string()
}

/// `bucket/key` with every segment percent-encoded for `x-amz-copy-source`
fn copy_source(bucket: &str, key: &str) -> Result<String> {
    let mut url = Url::parse("s3://copy-source")?;
    url.path_segments_mut()
        .map_err(|_| Error::General("copy source URL cannot hold a path".into()))?
        .push(bucket)
        .extend(key.split('/'));
    Ok(url.path().trim_start_matches('/').to_string())
}

#[async_trait]
impl StorageClient for S3StorageClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.inner.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => match map_sdk_error(&e, bucket) {
                Error::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        let response = match self.inner.head_object().bucket(bucket).key(key).send().await {
            Ok(response) => response,
            Err(e) => {
                return match map_sdk_error(&e, &format!("{bucket}/{key}")) {
                    Error::NotFound(_) => Ok(None),
                    other => Err(other),
                };
            }
        };

        let size = response.content_length().unwrap_or(0).max(0) as u64;
        let mut info = ObjectInfo::file(key, size);
        info.last_modified = response.last_modified().and_then(timestamp);
        info.etag = response.e_tag().map(etag);
        info.content_type = response.content_type().map(str::to_string);
        info.storage_class = response.storage_class().map(|sc| sc.as_str().to_string());
        info.is_dir = key.ends_with('/');

        Ok(Some(info))
    }

    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ListResult> {
        let mut request = self.inner.list_objects_v2().bucket(bucket);

        if let Some(prefix) = &options.prefix {
            request = request.prefix(prefix);
        }

        // Set delimiter (for non-recursive listing)
        if !options.recursive {
            request = request.delimiter(options.delimiter.as_deref().unwrap_or("/"));
        }

        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }

        if let Some(token) = &options.continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, bucket))?;

        let mut items = Vec::new();

        // Add common prefixes (directories)
        for prefix in response.common_prefixes() {
            if let Some(p) = prefix.prefix() {
                items.push(ObjectInfo::dir(p));
            }
        }

        for object in response.contents() {
            let key = object.key().unwrap_or_default();
            let size = object.size().unwrap_or(0).max(0) as u64;
            let mut info = ObjectInfo::file(key, size);
            info.last_modified = object.last_modified().and_then(timestamp);
            info.etag = object.e_tag().map(etag);
            info.storage_class = object.storage_class().map(|sc| sc.as_str().to_string());
            info.is_dir = key.ends_with('/');
            items.push(info);
        }

        items.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(ListResult {
            items,
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes={}-{}", offset, offset.saturating_add(len - 1));

        let response = match self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .send()
            .await
        {
            Ok(response) => response,
            // reading at or past the end of the object
            Err(e) if e.code() == Some("InvalidRange") => return Ok(Vec::new()),
            Err(e) => return Err(map_sdk_error(&e, &format!("{bucket}/{key}"))),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectInfo> {
        let size = data.len() as u64;
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(content_type.clone())
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &format!("{bucket}/{key}")))?;

        let mut info = ObjectInfo::file(key, size);
        info.etag = response.e_tag().map(etag);
        info.content_type = content_type;
        info.last_modified = Some(jiff::Timestamp::now());

        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &format!("{bucket}/{key}")))?;

        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.inner
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key)?)
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &format!("{src_bucket}/{src_key}")))?;

        Ok(())
    }
}
