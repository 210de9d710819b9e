//! Paths inside one bucket
//!
//! An [`S3Path`] is an immutable sequence of key segments bound to the
//! [`S3FileSystem`] that created it. Construction drops empty and `.`
//! segments and resolves `..`; above the root of an absolute path it is
//! dropped, while a relative path keeps its leading `..`. Equality, ordering
//! and hashing use the root identifier and the resolved segment sequence,
//! never the raw input string.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filesystem::S3FileSystem;
use crate::root::{self, SCHEME};

/// Path separator of every bucketfs path
pub const SEPARATOR: &str = "/";

const CURRENT: &str = ".";
const PARENT: &str = "..";

/// A location within one bucket
#[derive(Clone)]
pub struct S3Path {
    fs: Arc<S3FileSystem>,
    segments: Vec<String>,
    absolute: bool,
    /// Input ended with `/`; directories are keyed `prefix/` in the store
    dir_hint: bool,
}

impl S3Path {
    /// Join `first` and `more` with the separator and parse the result
    pub(crate) fn parse(fs: Arc<S3FileSystem>, first: &str, more: &[&str]) -> Result<Self> {
        let parts: Vec<&str> = std::iter::once(first)
            .chain(more.iter().copied())
            .filter(|p| !p.is_empty())
            .collect();

        if parts.iter().any(|p| p.contains('\0')) {
            return Err(Error::InvalidPath(format!(
                "Path contains a NUL character: {:?}",
                parts.join(SEPARATOR)
            )));
        }

        let mut joined = String::new();
        for (i, part) in parts.iter().enumerate() {
            let part = if part.contains("://") {
                if i != 0 {
                    return Err(Error::InvalidPath(format!(
                        "URI '{part}' can only be the first path element"
                    )));
                }
                uri_to_absolute(&fs, part)?
            } else {
                part.to_string()
            };
            if i > 0 && !joined.ends_with('/') && !part.starts_with('/') {
                joined.push('/');
            }
            joined.push_str(&part);
        }

        Ok(Self::from_str_unchecked(fs, &joined))
    }

    fn from_str_unchecked(fs: Arc<S3FileSystem>, path: &str) -> Self {
        let absolute = path.starts_with('/');
        let segments = resolve_parents(
            path.split('/')
                .filter(|s| !s.is_empty() && *s != CURRENT)
                .map(str::to_string),
            absolute,
        );
        let last = path.rsplit('/').next().unwrap_or_default();
        let dir_hint = path.ends_with('/') || last == CURRENT || last == PARENT;

        Self {
            fs,
            segments,
            absolute,
            dir_hint,
        }
    }

    fn with_segments(&self, segments: Vec<String>, absolute: bool, dir_hint: bool) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
            segments,
            absolute,
            dir_hint,
        }
    }

    /// The file system this path belongs to
    pub fn file_system(&self) -> &Arc<S3FileSystem> {
        &self.fs
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether the path denotes a directory: the root, or input ending with `/`
    pub fn is_directory(&self) -> bool {
        self.dir_hint || self.segments.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    /// The root path `/` for absolute paths
    pub fn root(&self) -> Option<S3Path> {
        self.absolute
            .then(|| self.with_segments(Vec::new(), true, true))
    }

    /// Last segment as a relative path
    pub fn file_name(&self) -> Option<S3Path> {
        self.segments
            .last()
            .map(|name| self.with_segments(vec![name.clone()], false, self.dir_hint))
    }

    /// Parent directory; `None` for the root and single-segment relative paths
    pub fn parent(&self) -> Option<S3Path> {
        match (self.segments.len(), self.absolute) {
            (0, _) | (1, false) => None,
            (n, absolute) => {
                Some(self.with_segments(self.segments[..n - 1].to_vec(), absolute, true))
            }
        }
    }

    pub fn name_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment at `index` as a relative path
    pub fn name(&self, index: usize) -> Option<S3Path> {
        let last = index + 1 == self.segments.len();
        self.segments
            .get(index)
            .map(|name| self.with_segments(vec![name.clone()], false, last && self.dir_hint))
    }

    /// Iterate over the segments
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Relative path made of segments `begin..end`
    pub fn subpath(&self, begin: usize, end: usize) -> Result<S3Path> {
        if begin >= end || end > self.segments.len() {
            return Err(Error::InvalidArgument(format!(
                "Invalid subpath range {begin}..{end} for '{self}'"
            )));
        }
        let dir_hint = end == self.segments.len() && self.dir_hint;
        Ok(self.with_segments(self.segments[begin..end].to_vec(), false, dir_hint))
    }

    /// Whether `other` is a segment-wise prefix of this path
    pub fn starts_with(&self, other: &S3Path) -> bool {
        self.fs.root_id() == other.fs.root_id()
            && self.absolute == other.absolute
            && self.segments.starts_with(&other.segments)
    }

    /// Whether `other` is a segment-wise suffix of this path
    pub fn ends_with(&self, other: &S3Path) -> bool {
        if self.fs.root_id() != other.fs.root_id() {
            return false;
        }
        if other.absolute {
            return self.absolute && self.segments == other.segments;
        }
        self.segments.ends_with(&other.segments)
    }

    /// Resolve `..` segments; above the root of an absolute path they are dropped
    ///
    /// Parsed paths are already resolved; paths built by [`S3Path::resolve`]
    /// or [`S3Path::relativize`] may still carry `..`.
    pub fn normalize(&self) -> S3Path {
        let out = self.resolved_segments();
        let dir_hint = self.dir_hint || out.is_empty();
        self.with_segments(out, self.absolute, dir_hint)
    }

    fn resolved_segments(&self) -> Vec<String> {
        resolve_parents(self.segments.iter().cloned(), self.absolute)
    }

    /// Resolve `other` against this path
    pub fn resolve(&self, other: &S3Path) -> S3Path {
        if other.absolute {
            return other.clone();
        }
        if other.segments.is_empty() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        self.with_segments(segments, self.absolute, other.dir_hint)
    }

    /// Parse `other` with this path's file system and resolve it
    pub fn resolve_str(&self, other: &str) -> Result<S3Path> {
        let other = S3Path::parse(Arc::clone(&self.fs), other, &[])?;
        Ok(self.resolve(&other))
    }

    /// Resolve `other` against this path's parent
    pub fn resolve_sibling(&self, other: &S3Path) -> S3Path {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// Relative path from this path to `other`
    pub fn relativize(&self, other: &S3Path) -> Result<S3Path> {
        if self.fs.root_id() != other.fs.root_id() {
            return Err(Error::InvalidPath(format!(
                "Cannot relativize paths of different buckets: '{}' and '{}'",
                self.fs.root_id(),
                other.fs.root_id()
            )));
        }
        if self.absolute != other.absolute {
            return Err(Error::InvalidPath(format!(
                "Cannot relativize '{other}' against '{self}': only one is absolute"
            )));
        }

        let base = self.normalize();
        let target = other.normalize();
        let common = base
            .segments
            .iter()
            .zip(&target.segments)
            .take_while(|(a, b)| a == b)
            .count();

        let mut segments: Vec<String> = std::iter::repeat_n(PARENT.to_string(), base.segments.len() - common)
            .collect();
        segments.extend(target.segments[common..].iter().cloned());
        let dir_hint = target.dir_hint && common < target.segments.len();
        Ok(self.with_segments(segments, false, dir_hint))
    }

    /// Resolve against the root; the working directory of a bucket is `/`
    pub fn to_absolute_path(&self) -> S3Path {
        if self.absolute {
            self.clone()
        } else {
            self.with_segments(self.segments.clone(), true, self.dir_hint)
        }
    }

    /// Object key of this path: no leading `/`, trailing `/` for directories
    pub fn key(&self) -> String {
        let normalized = self.to_absolute_path().normalize();
        let mut key = normalized.segments.join(SEPARATOR);
        if normalized.dir_hint && !key.is_empty() {
            key.push('/');
        }
        key
    }

    /// Full `s3://bucket/key` URI
    pub fn to_uri(&self) -> String {
        format!("{}/{}", self.fs.root_id().to_uri(), self.key())
    }
}

/// Fold `..` into the preceding segment; at the root of an absolute path it is dropped
fn resolve_parents(segments: impl Iterator<Item = String>, absolute: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for segment in segments {
        if segment != PARENT {
            out.push(segment);
            continue;
        }
        match out.last() {
            Some(last) if last != PARENT => {
                out.pop();
            }
            _ if absolute => {}
            _ => out.push(segment),
        }
    }
    out
}

fn uri_to_absolute(fs: &S3FileSystem, uri: &str) -> Result<String> {
    let parsed = root::parse_uri(uri)?;
    if parsed.root.scheme() != SCHEME || parsed.root.bucket() != fs.bucket_name() {
        return Err(Error::InvalidPath(format!(
            "URI '{uri}' does not belong to file system {}",
            fs.root_id()
        )));
    }
    Ok(format!("/{}", parsed.key))
}

impl std::fmt::Display for S3Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.absolute {
            f.write_str(SEPARATOR)?;
        }
        f.write_str(&self.segments.join(SEPARATOR))?;
        if self.dir_hint && !self.segments.is_empty() {
            f.write_str(SEPARATOR)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for S3Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("S3Path")
            .field(&format_args!("{}{}", self.fs.root_id(), self))
            .finish()
    }
}

impl PartialEq for S3Path {
    fn eq(&self, other: &Self) -> bool {
        self.absolute == other.absolute
            && self.fs.root_id() == other.fs.root_id()
            && self.resolved_segments() == other.resolved_segments()
    }
}

impl Eq for S3Path {}

impl Hash for S3Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fs.root_id().hash(state);
        self.absolute.hash(state);
        self.resolved_segments().hash(state);
    }
}

impl PartialOrd for S3Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for S3Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fs
            .root_id()
            .cmp(other.fs.root_id())
            .then_with(|| other.absolute.cmp(&self.absolute))
            .then_with(|| self.resolved_segments().cmp(&other.resolved_segments()))
    }
}
