//! bucketfs-core: Core library for bucketfs
//!
//! This crate provides the session layer that exposes one S3 bucket as a
//! hierarchical file system, including:
//! - File system sessions with a one-way OPEN/CLOSED lifecycle
//! - The identity registry keeping one open session per bucket
//! - Path parsing, resolution and glob/regex matching
//! - Channel tracking and forced close on shutdown
//! - Configuration management
//! - StorageClient and ClientProvider traits for S3 operations
//!
//! This crate is designed to be independent of any specific S3 SDK;
//! the aws-sdk-s3 adapter lives in bucketfs-s3.

pub mod attributes;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
mod files;
pub mod filesystem;
pub mod io;
pub mod matcher;
pub mod path;
pub mod provider;
pub mod registry;
pub mod root;
pub mod traits;

pub use attributes::FileAttributes;
pub use channel::{Channel, OpenChannels};
pub use client::{ClientProvider, ClientProviderFactory, FixedClientProvider};
pub use config::{
    Config, ConfigManager, Credentials, FileSystemConfig, RetryConfig, TimeoutConfig,
};
pub use error::{Error, Result};
pub use filesystem::S3FileSystem;
pub use io::{ReadChannel, WriteChannel};
pub use matcher::PathMatcher;
pub use path::{S3Path, SEPARATOR};
pub use provider::FileSystemProvider;
pub use registry::FileSystemRegistry;
pub use root::{RootId, S3Uri, SCHEME, parse_uri};
pub use traits::{ListOptions, ListResult, ObjectInfo, StorageClient};
