//! File attribute views
//!
//! Objects carry little metadata, so the `basic` view derives every time
//! attribute from the last-modified timestamp. The `s3` view adds ETag,
//! content type and storage class.

use std::collections::{BTreeMap, BTreeSet};

use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::traits::ObjectInfo;

pub const BASIC_VIEW: &str = "basic";
pub const S3_VIEW: &str = "s3";

const BASIC_ATTRIBUTES: &[&str] = &[
    "size",
    "lastModifiedTime",
    "lastAccessTime",
    "creationTime",
    "isRegularFile",
    "isDirectory",
    "isSymbolicLink",
    "isOther",
    "fileKey",
];

const S3_ATTRIBUTES: &[&str] = &[
    "size",
    "lastModifiedTime",
    "etag",
    "contentType",
    "storageClass",
    "isDirectory",
];

/// Names of the supported attribute views
pub fn supported_views() -> BTreeSet<&'static str> {
    BTreeSet::from([BASIC_VIEW, S3_VIEW])
}

/// Attributes of an object or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    pub size: u64,
    pub last_modified: Option<Timestamp>,
    pub is_directory: bool,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub storage_class: Option<String>,
}

impl FileAttributes {
    pub fn from_object(info: &ObjectInfo) -> Self {
        Self {
            size: info.size_bytes.unwrap_or(0),
            last_modified: info.last_modified,
            is_directory: info.is_dir,
            etag: info.etag.clone(),
            content_type: info.content_type.clone(),
            storage_class: info.storage_class.clone(),
        }
    }

    /// Attributes of a prefix that has no object of its own
    pub fn directory() -> Self {
        Self {
            size: 0,
            last_modified: None,
            is_directory: true,
            etag: None,
            content_type: None,
            storage_class: None,
        }
    }

    pub fn is_regular_file(&self) -> bool {
        !self.is_directory
    }

    pub fn is_symbolic_link(&self) -> bool {
        false
    }

    pub fn is_other(&self) -> bool {
        false
    }

    /// Stable identity of the object contents
    pub fn file_key(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Select attributes by `[view:]name,name` or `[view:]*`; the view defaults to `basic`
    pub fn to_map(&self, attributes: &str) -> Result<BTreeMap<String, Value>> {
        let (view, names) = attributes.split_once(':').unwrap_or((BASIC_VIEW, attributes));
        let known = match view {
            BASIC_VIEW => BASIC_ATTRIBUTES,
            S3_VIEW => S3_ATTRIBUTES,
            other => {
                return Err(Error::UnsupportedOperation(format!(
                    "Attribute view '{other}' is not supported"
                )));
            }
        };

        let mut map = BTreeMap::new();
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                for known_name in known {
                    map.insert(known_name.to_string(), self.value(known_name));
                }
            } else if known.contains(&name) {
                map.insert(name.to_string(), self.value(name));
            } else {
                return Err(Error::InvalidArgument(format!(
                    "'{name}' is not an attribute of view '{view}'"
                )));
            }
        }
        Ok(map)
    }

    fn value(&self, name: &str) -> Value {
        let time = || {
            self.last_modified
                .map_or(Value::Null, |t| Value::String(t.to_string()))
        };
        let text = |v: &Option<String>| v.clone().map_or(Value::Null, Value::String);

        match name {
            "size" => Value::from(self.size),
            "lastModifiedTime" | "lastAccessTime" | "creationTime" => time(),
            "isRegularFile" => Value::Bool(self.is_regular_file()),
            "isDirectory" => Value::Bool(self.is_directory),
            "isSymbolicLink" => Value::Bool(self.is_symbolic_link()),
            "isOther" => Value::Bool(self.is_other()),
            "fileKey" | "etag" => text(&self.etag),
            "contentType" => text(&self.content_type),
            "storageClass" => text(&self.storage_class),
            _ => Value::Null,
        }
    }
}
