//! Error types for bucketfs-core
//!
//! Filesystem-level failures (closed session, bad path, duplicate root) are
//! kept apart from store-level ones (`NotFound`, `Auth`, `Network`) so callers
//! can tell them apart without string matching.

use thiserror::Error;

/// Result type alias for bucketfs-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bucketfs-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A session is already registered and open for this root
    #[error("File system already exists: {0}")]
    AlreadyExists(String),

    /// No open session is registered for this root
    #[error("File system not found: {0}")]
    FileSystemNotFound(String),

    /// Operation attempted on a closed session
    #[error("File system is closed: {0}")]
    ClosedFileSystem(String),

    /// Operation attempted on a closed channel
    #[error("Channel is closed: {0}")]
    ClosedChannel(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Malformed argument (pattern, attribute name, option value)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bucket or object absent in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Target of a create or copy already exists
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    /// Directory still holds objects
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Mutation of a read-only view or write to a read-only session
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// One or more channels failed to close during session shutdown
    #[error("Failed to close {} channel(s): {}", .0.len(), .0.join("; "))]
    ChannelClose(Vec<String>),

    /// Configuration file or option error
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this is a store-level not-found (bucket or object)
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether retrying the operation may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Whether the error originates from the storage service or its client
    pub const fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Auth(_) | Error::Network(_)
        )
    }
}
