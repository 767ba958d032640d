//! Error types for storage operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed object-store URL.
    #[error("invalid object path '{url}': {reason}")]
    InvalidPath { url: String, reason: String },

    /// Object not found.
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// Object is larger than the caller allows.
    #[error("object too large: {path} is {size} > {limit} bytes")]
    TooLarge { path: String, size: u64, limit: u64 },

    /// Short write, length mismatch, or finalization error on upload.
    #[error("upload to {path} failed: {message}")]
    Upload { path: String, message: String },

    /// Network or I/O error.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic error from the underlying object store.
    #[error("object store error: {0}")]
    ObjectStore(#[source] object_store::Error),
}

impl StoreError {
    /// Returns true if this error indicates the object was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the caller's size guard rejected the object.
    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::TooLarge { .. })
    }

    /// Create from an `object_store` error with the path for context.
    pub fn from_object_store(err: object_store::Error, path: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StoreError::NotFound {
                path: path.to_string(),
            },
            other => StoreError::ObjectStore(other),
        }
    }
}
