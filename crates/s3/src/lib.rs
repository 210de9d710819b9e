//! bucketfs-s3: S3 SDK adapter for bucketfs
//!
//! This crate provides the implementation of the StorageClient and
//! ClientProvider traits using the aws-sdk-s3 crate. It is the only crate
//! that directly depends on the AWS SDK.

pub mod client;
pub mod provider;

pub use client::S3StorageClient;
#[allow(deprecated)]
pub use provider::{file_system_for_bucket, file_system_for_uri};
pub use provider::{
    DEFAULT_REGION, S3ClientProvider, S3ClientProviderFactory, default_provider,
    region_from_location,
};
