//! Byte channels over objects
//!
//! [`ReadChannel`] serves reads from ranged GETs of `max_fragment_size` bytes,
//! keeping up to `max_fragment_number` fragments (least recently used are
//! evicted) and fetching the following fragment together with a miss.
//! [`WriteChannel`] buffers everything and uploads the object on close.
//! Both deregister from their file system when closed.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::path::S3Path;
use crate::traits::StorageClient;

struct ReadState {
    position: u64,
    fragments: LruCache<u64, Arc<Vec<u8>>>,
}

/// Seekable read channel over one object
pub struct ReadChannel {
    path: S3Path,
    key: String,
    client: Arc<dyn StorageClient>,
    size: u64,
    fragment_size: u64,
    open: AtomicBool,
    state: Mutex<ReadState>,
}

impl ReadChannel {
    pub(crate) fn new(path: S3Path, client: Arc<dyn StorageClient>, size: u64) -> Self {
        let config = path.file_system().config();
        let fragment_size = config.max_fragment_size.max(1);
        let capacity = NonZeroUsize::new(config.max_fragment_number).unwrap_or(NonZeroUsize::MIN);
        Self {
            key: path.key(),
            path,
            client,
            size,
            fragment_size,
            open: AtomicBool::new(true),
            state: Mutex::new(ReadState {
                position: 0,
                fragments: LruCache::new(capacity),
            }),
        }
    }

    /// Object size at the time the channel was opened
    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn position(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.state.lock().await.position)
    }

    /// Move the read position; positions past the end read nothing
    pub async fn seek(&self, position: u64) -> Result<()> {
        self.ensure_open()?;
        self.state.lock().await.position = position;
        Ok(())
    }

    /// Read into `buf`, returning the number of bytes read (0 at end of object)
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let mut copied = 0;

        while copied < buf.len() && state.position < self.size {
            let index = state.position / self.fragment_size;
            let fragment = self.fragment(&mut state, index).await?;
            let offset = (state.position - index * self.fragment_size) as usize;
            if offset >= fragment.len() {
                // object shrank since open
                break;
            }
            let n = (fragment.len() - offset).min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&fragment[offset..offset + n]);
            copied += n;
            state.position += n as u64;
        }

        Ok(copied)
    }

    /// Read from the current position to the end of the object
    pub async fn read_to_end(&self) -> Result<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.position().await?);
        let mut out = vec![0u8; remaining as usize];
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read(&mut out[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }

    async fn fragment(&self, state: &mut ReadState, index: u64) -> Result<Arc<Vec<u8>>> {
        if let Some(fragment) = state.fragments.get(&index) {
            return Ok(Arc::clone(fragment));
        }

        let bucket = self.path.file_system().bucket_name();
        let next = index + 1;
        let prefetch = state.fragments.cap().get() > 1
            && next * self.fragment_size < self.size
            && !state.fragments.contains(&next);

        let current = self.client.get_object_range(
            bucket,
            &self.key,
            index * self.fragment_size,
            self.fragment_size,
        );
        let (data, ahead) = if prefetch {
            let ahead = self.client.get_object_range(
                bucket,
                &self.key,
                next * self.fragment_size,
                self.fragment_size,
            );
            let (data, ahead) = futures::future::try_join(current, ahead).await?;
            (data, Some(ahead))
        } else {
            (current.await?, None)
        };

        debug!(path = %self.path, index, prefetched = ahead.is_some(), "fetched read fragment");

        let data = Arc::new(data);
        if let Some(ahead) = ahead {
            state.fragments.put(next, Arc::new(ahead));
        }
        state.fragments.put(index, Arc::clone(&data));
        Ok(data)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::ClosedChannel(self.path.to_string()))
        }
    }
}

#[async_trait]
impl Channel for ReadChannel {
    fn path(&self) -> &S3Path {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.path.file_system().deregister_channel(self);
            self.state.lock().await.fragments.clear();
        }
        Ok(())
    }
}

/// Write channel that uploads the object when closed
pub struct WriteChannel {
    path: S3Path,
    key: String,
    client: Arc<dyn StorageClient>,
    content_type: Option<String>,
    open: AtomicBool,
    buffer: Mutex<Vec<u8>>,
}

impl WriteChannel {
    pub(crate) fn new(path: S3Path, client: Arc<dyn StorageClient>) -> Self {
        let key = path.key();
        let content_type = mime_guess::from_path(&key)
            .first_raw()
            .map(str::to_string);
        Self {
            key,
            path,
            client,
            content_type,
            open: AtomicBool::new(true),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Append `data`, returning the number of bytes written
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::ClosedChannel(self.path.to_string()));
        }
        self.buffer.lock().await.extend_from_slice(data);
        Ok(data.len())
    }

    /// Number of bytes written so far
    pub async fn position(&self) -> Result<u64> {
        if !self.is_open() {
            return Err(Error::ClosedChannel(self.path.to_string()));
        }
        Ok(self.buffer.lock().await.len() as u64)
    }
}

#[async_trait]
impl Channel for WriteChannel {
    fn path(&self) -> &S3Path {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.path.file_system().deregister_channel(self);

        let data = std::mem::take(&mut *self.buffer.lock().await);
        let size = data.len();
        self.client
            .put_object(
                self.path.file_system().bucket_name(),
                &self.key,
                data,
                self.content_type.clone(),
            )
            .await?;
        debug!(path = %self.path, size, "uploaded object");
        Ok(())
    }
}
