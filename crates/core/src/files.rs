//! File operations on an open session
//!
//! Directories are key prefixes: `a/b/` exists if an object `a/b/` (a marker
//! written by [`S3FileSystem::create_directory`]) or any object below it
//! exists. Every operation acquires its client from the session's current
//! provider and propagates acquisition failures unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::attributes::FileAttributes;
use crate::error::{Error, Result};
use crate::filesystem::S3FileSystem;
use crate::io::{ReadChannel, WriteChannel};
use crate::path::S3Path;
use crate::traits::{ListOptions, StorageClient};

impl S3FileSystem {
    fn check_owner(&self, path: &S3Path) -> Result<()> {
        self.ensure_open()?;
        if std::ptr::eq(path.file_system().as_ref(), self) {
            Ok(())
        } else {
            Err(Error::InvalidPath(format!(
                "'{}' belongs to another file system than {}",
                path.to_uri(),
                self.root_id()
            )))
        }
    }

    /// Whether the object or directory at `path` exists
    ///
    /// A missing bucket is an error (`NotFound` from the store), never `false`.
    pub async fn exists(&self, path: &S3Path) -> Result<bool> {
        self.check_owner(path)?;
        let client = self.client().await?;
        Ok(self.lookup(client.as_ref(), path).await?.is_some())
    }

    /// Attributes of the object or directory at `path`
    pub async fn read_attributes(&self, path: &S3Path) -> Result<FileAttributes> {
        self.check_owner(path)?;
        let client = self.client().await?;
        self.lookup(client.as_ref(), path)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_uri()))
    }

    /// Attributes selected by `[view:]names`, e.g. `basic:size,lastModifiedTime` or `s3:*`
    pub async fn read_attribute_map(
        &self,
        path: &S3Path,
        attributes: &str,
    ) -> Result<BTreeMap<String, Value>> {
        self.read_attributes(path).await?.to_map(attributes)
    }

    async fn lookup(
        &self,
        client: &dyn StorageClient,
        path: &S3Path,
    ) -> Result<Option<FileAttributes>> {
        let bucket = self.bucket_name();
        let key = path.key();

        if key.is_empty() {
            return Ok(client
                .bucket_exists(bucket)
                .await?
                .then(FileAttributes::directory));
        }

        if !path.is_directory() {
            if let Some(info) = client.head_object(bucket, &key).await? {
                return Ok(Some(FileAttributes::from_object(&info)));
            }
        }

        let prefix = format!("{}/", key.trim_end_matches('/'));
        let listing = client
            .list_objects(
                bucket,
                ListOptions {
                    prefix: Some(prefix),
                    max_keys: Some(1),
                    recursive: true,
                    ..Default::default()
                },
            )
            .await?;

        Ok((!listing.items.is_empty()).then(FileAttributes::directory))
    }

    /// Entries directly below the directory `dir`
    pub async fn read_dir(self: &Arc<Self>, dir: &S3Path) -> Result<Vec<S3Path>> {
        self.check_owner(dir)?;
        let client = self.client().await?;
        let bucket = self.bucket_name();
        let key = dir.key();
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key.trim_end_matches('/'))
        };

        let mut entries = Vec::new();
        let mut continuation_token = None;
        loop {
            let page = client
                .list_objects(
                    bucket,
                    ListOptions {
                        prefix: (!prefix.is_empty()).then(|| prefix.clone()),
                        delimiter: Some("/".into()),
                        continuation_token: continuation_token.take(),
                        ..Default::default()
                    },
                )
                .await?;

            for item in page.items {
                if item.key == prefix {
                    continue;
                }
                entries.push(self.get_path(&format!("/{}", item.key), &[])?);
            }

            match page.continuation_token {
                Some(token) if page.truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        if entries.is_empty() && !prefix.is_empty() {
            // an empty listing is only fine for an existing (marker) directory
            if self.lookup(client.as_ref(), dir).await?.is_none() {
                return Err(Error::NotFound(dir.to_uri()));
            }
        }

        debug!(dir = %dir, entries = entries.len(), "listed directory");
        Ok(entries)
    }

    /// Entries of `dir` accepted by `glob:`/`regex:` pattern
    pub async fn read_dir_matching(
        self: &Arc<Self>,
        dir: &S3Path,
        syntax_and_pattern: &str,
    ) -> Result<Vec<S3Path>> {
        let matcher = self.path_matcher(syntax_and_pattern)?;
        let entries = self.read_dir(dir).await?;
        Ok(entries.into_iter().filter(|p| matcher.matches(p)).collect())
    }

    /// Create a directory marker object `key/`
    pub async fn create_directory(&self, dir: &S3Path) -> Result<()> {
        self.check_owner(dir)?;
        self.ensure_writable(dir)?;
        let client = self.client().await?;
        let key = dir.key();
        if key.is_empty() {
            return Err(Error::FileAlreadyExists(dir.to_uri()));
        }
        if self.lookup(client.as_ref(), dir).await?.is_some() {
            return Err(Error::FileAlreadyExists(dir.to_uri()));
        }

        let marker = format!("{}/", key.trim_end_matches('/'));
        client
            .put_object(self.bucket_name(), &marker, Vec::new(), None)
            .await?;
        debug!(dir = %dir, "created directory marker");
        Ok(())
    }

    /// Delete an object or an empty directory
    pub async fn delete(&self, path: &S3Path) -> Result<()> {
        self.check_owner(path)?;
        self.ensure_writable(path)?;
        let client = self.client().await?;
        let bucket = self.bucket_name();
        let key = path.key();
        if key.is_empty() {
            return Err(Error::UnsupportedOperation(format!(
                "Cannot delete the root of {}",
                self.root_id()
            )));
        }

        let attrs = self
            .lookup(client.as_ref(), path)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_uri()))?;

        if !attrs.is_directory {
            return client.delete_object(bucket, &key).await;
        }

        let marker = format!("{}/", key.trim_end_matches('/'));
        let listing = client
            .list_objects(
                bucket,
                ListOptions {
                    prefix: Some(marker.clone()),
                    max_keys: Some(2),
                    recursive: true,
                    ..Default::default()
                },
            )
            .await?;
        if listing.items.iter().any(|item| item.key != marker) {
            return Err(Error::DirectoryNotEmpty(path.to_uri()));
        }
        if !listing.items.is_empty() {
            client.delete_object(bucket, &marker).await?;
        }
        Ok(())
    }

    /// Server-side copy of one object; `replace` allows overwriting `target`
    pub async fn copy(&self, source: &S3Path, target: &S3Path, replace: bool) -> Result<()> {
        self.check_owner(source)?;
        self.check_owner(target)?;
        self.ensure_writable(target)?;
        let client = self.client().await?;

        let attrs = self
            .lookup(client.as_ref(), source)
            .await?
            .ok_or_else(|| Error::NotFound(source.to_uri()))?;
        if attrs.is_directory {
            return Err(Error::UnsupportedOperation(format!(
                "Copying directories is not supported: '{source}'"
            )));
        }
        if !replace && self.lookup(client.as_ref(), target).await?.is_some() {
            return Err(Error::FileAlreadyExists(target.to_uri()));
        }

        let bucket = self.bucket_name();
        client
            .copy_object(bucket, &source.key(), bucket, &target.key())
            .await
    }

    /// Open a read channel on an existing object
    pub async fn open_read(&self, path: &S3Path) -> Result<Arc<ReadChannel>> {
        self.check_owner(path)?;
        if path.is_directory() {
            return Err(Error::InvalidPath(format!("'{path}' is a directory")));
        }
        let client = self.client().await?;
        let info = client
            .head_object(self.bucket_name(), &path.key())
            .await?
            .ok_or_else(|| Error::NotFound(path.to_uri()))?;

        let channel = Arc::new(ReadChannel::new(
            path.clone(),
            client,
            info.size_bytes.unwrap_or(0),
        ));
        self.register_channel(channel.clone())?;
        Ok(channel)
    }

    /// Open a write channel; the object is created or replaced on close
    pub async fn open_write(&self, path: &S3Path) -> Result<Arc<WriteChannel>> {
        self.check_owner(path)?;
        self.ensure_writable(path)?;
        if path.is_directory() {
            return Err(Error::InvalidPath(format!("'{path}' is a directory")));
        }
        let client = self.client().await?;

        let channel = Arc::new(WriteChannel::new(path.clone(), client));
        self.register_channel(channel.clone())?;
        Ok(channel)
    }

    /// Read a whole object
    pub async fn read(&self, path: &S3Path) -> Result<Vec<u8>> {
        use crate::channel::Channel as _;

        let channel = self.open_read(path).await?;
        let data = channel.read_to_end().await;
        channel.close().await?;
        data
    }

    /// Create or replace an object with `data`
    pub async fn write(&self, path: &S3Path, data: &[u8]) -> Result<()> {
        use crate::channel::Channel as _;

        let channel = self.open_write(path).await?;
        channel.write(data).await?;
        channel.close().await
    }
}
