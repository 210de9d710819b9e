//! Root identifiers and `s3://` URI parsing
//!
//! A file system is identified by its `(scheme, bucket)` pair. Everything
//! after the bucket in a URI is an object key and never part of the identity.

use url::Url;

use crate::error::{Error, Result};

/// URI scheme served by this crate
pub const SCHEME: &str = "s3";

/// Identity of one file system: scheme plus bucket name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId {
    scheme: String,
    bucket: String,
}

impl RootId {
    /// Create a root identifier for a bucket
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            scheme: SCHEME.to_string(),
            bucket: bucket.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// URI of the bucket root, e.g. `s3://mybucket`
    pub fn to_uri(&self) -> String {
        format!("{}://{}", self.scheme, self.bucket)
    }
}

impl std::fmt::Display for RootId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// A parsed `s3://bucket[/key]` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    /// Root identifier derived from the host component
    pub root: RootId,
    /// Decoded object key without the leading slash (empty for the bucket root)
    pub key: String,
}

/// Parse an `s3://` URI into its root identifier and key
pub fn parse_uri(uri: &str) -> Result<S3Uri> {
    let url = Url::parse(uri)?;

    if !url.scheme().eq_ignore_ascii_case(SCHEME) {
        return Err(Error::InvalidPath(format!(
            "URI scheme '{}' is not '{SCHEME}': {uri}",
            url.scheme()
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::InvalidPath(format!(
            "URI must not carry a query or fragment: {uri}"
        )));
    }

    let bucket = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => {
            return Err(Error::InvalidPath(format!(
                "URI has no bucket name: {uri}"
            )));
        }
    };

    let raw_key = url.path().trim_start_matches('/');
    let key = urlencoding::decode(raw_key)
        .map_err(|e| Error::InvalidPath(format!("Key '{raw_key}' is not valid UTF-8: {e}")))?
        .into_owned();

    Ok(S3Uri {
        root: RootId::new(bucket),
        key,
    })
}
