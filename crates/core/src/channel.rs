//! Open channel tracking
//!
//! Every byte channel opened against a file system registers here so the
//! session can force-close it on shutdown. The registry lock only guards map
//! mutation; channels are closed after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::{Error, Result};
use crate::path::S3Path;

/// An open stream bound to one object key
#[async_trait]
pub trait Channel: Send + Sync {
    /// Path the channel was opened on
    fn path(&self) -> &S3Path;

    fn is_open(&self) -> bool;

    /// Close the channel; closing twice is a no-op
    async fn close(&self) -> Result<()>;
}

/// Handle identity: the address of the channel value
type ChannelKey = usize;

fn channel_key(channel: &dyn Channel) -> ChannelKey {
    channel as *const dyn Channel as *const () as usize
}

#[derive(Default)]
struct RegistryState {
    closed: bool,
    channels: HashMap<ChannelKey, Arc<dyn Channel>>,
}

/// Thread-safe set of open channels owned by one session
#[derive(Default)]
pub(crate) struct OpenChannelRegistry {
    state: Mutex<RegistryState>,
}

impl OpenChannelRegistry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a channel; fails once `close_all` has started
    pub(crate) fn register(&self, channel: Arc<dyn Channel>) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ClosedFileSystem(
                channel.path().file_system().root_id().to_uri(),
            ));
        }
        state.channels.insert(channel_key(channel.as_ref()), channel);
        Ok(())
    }

    /// Stop tracking a channel; unknown channels are ignored
    pub(crate) fn deregister(&self, channel: &dyn Channel) -> bool {
        self.lock().channels.remove(&channel_key(channel)).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().channels.len()
    }

    pub(crate) fn snapshot(&self) -> OpenChannels {
        OpenChannels {
            channels: self.lock().channels.values().cloned().collect(),
        }
    }

    /// Refuse further registrations and close everything tracked so far
    ///
    /// Returns every channel with the outcome of its close. The registry is
    /// empty afterwards.
    pub(crate) async fn close_all(&self) -> Vec<(Arc<dyn Channel>, Result<()>)> {
        let drained: Vec<Arc<dyn Channel>> = {
            let mut state = self.lock();
            state.closed = true;
            state.channels.drain().map(|(_, c)| c).collect()
        };

        let results = join_all(drained.iter().map(|c| c.close())).await;
        drained.into_iter().zip(results).collect()
    }
}

/// Read-only snapshot of the channels open at the time it was taken
#[derive(Clone, Default)]
pub struct OpenChannels {
    channels: Vec<Arc<dyn Channel>>,
}

impl OpenChannels {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Channel>> {
        self.channels.iter()
    }

    pub fn contains(&self, channel: &dyn Channel) -> bool {
        let key = channel_key(channel);
        self.channels.iter().any(|c| channel_key(c.as_ref()) == key)
    }

    /// The view cannot be modified; always fails with `UnsupportedOperation`
    pub fn insert(&self, _channel: Arc<dyn Channel>) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "open channel set is read-only".into(),
        ))
    }

    /// The view cannot be modified; always fails with `UnsupportedOperation`
    pub fn remove(&self, _channel: &dyn Channel) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "open channel set is read-only".into(),
        ))
    }
}

impl std::fmt::Debug for OpenChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.channels.iter().map(|c| c.path().to_string()))
            .finish()
    }
}
