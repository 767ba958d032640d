//! Validated `gs://bucket/object` paths.
//!
//! Parsing and formatting round-trip: any accepted input formats back
//! to itself. Helpers derive sibling and child objects without going
//! back through a string.

use std::fmt;

use crate::error::{StoreError, StoreResult};

/// A validated object-store location.
///
/// The bucket is always non-empty; the object may be empty (the bucket
/// root). The raw path is kept as parsed so `to_string` reproduces the
/// input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GcsPath {
    bucket: String,
    /// Either empty or starting with `/`.
    path: String,
}

impl GcsPath {
    /// Parse and validate a `gs://bucket/object` URL.
    pub fn parse(input: &str) -> StoreResult<Self> {
        let invalid = |reason: &str| StoreError::InvalidPath {
            url: input.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "gs" {
            return Err(invalid("scheme must be gs"));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("opaque path is not allowed"));
        }
        if url.port().is_some() {
            return Err(invalid("bucket must not carry a port"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("user info is not allowed"));
        }
        if url.query().is_some() {
            return Err(invalid("query is not allowed"));
        }
        if url.fragment().is_some() {
            return Err(invalid("fragment is not allowed"));
        }
        let bucket = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(invalid("empty bucket")),
        };
        if bucket.contains(':') {
            return Err(invalid("bucket must not contain ':'"));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            path: url.path().to_string(),
        })
    }

    /// Build a path from a bucket and an object key.
    pub fn from_parts(bucket: impl Into<String>, object: &str) -> Self {
        let object = object.trim_start_matches('/');
        let path = if object.is_empty() {
            String::new()
        } else {
            format!("/{object}")
        };
        Self {
            bucket: bucket.into(),
            path,
        }
    }

    /// The bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The object key, without a leading `/`. Empty for the bucket root.
    pub fn object(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    /// Replace the last path segment with `name`.
    pub fn sibling(&self, name: &str) -> Self {
        let base = match self.path.rfind('/') {
            Some(idx) => &self.path[..=idx],
            None => "/",
        };
        Self {
            bucket: self.bucket.clone(),
            path: format!("{base}{name}"),
        }
    }

    /// Append a path segment (keeps a trailing `/` on `name`, so
    /// `child("artifacts/")` yields a directory-like path).
    pub fn child(&self, name: &str) -> Self {
        let path = if self.path.is_empty() || self.path.ends_with('/') {
            format!("{}{name}", self.path)
        } else {
            format!("{}/{name}", self.path)
        };
        Self {
            bucket: self.bucket.clone(),
            path,
        }
    }

    /// The same location with a trailing `/`, for prefix listings.
    pub fn as_dir(&self) -> Self {
        if self.path.ends_with('/') {
            self.clone()
        } else {
            Self {
                bucket: self.bucket.clone(),
                path: format!("{}/", self.path),
            }
        }
    }

    /// Final path segment, ignoring a trailing `/`. Empty at the root.
    pub fn basename(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }
}

impl fmt::Display for GcsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}{}", self.bucket, self.path)
    }
}

impl std::str::FromStr for GcsPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
