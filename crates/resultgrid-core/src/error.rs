//! Error kinds for the update pipeline.
//!
//! One enum carries every failure the pipeline distinguishes. Only
//! `BuildNotStarted` is recovered locally (the group driver logs it and
//! skips the build); every other kind aborts the group it occurred in.

use resultgrid_store::StoreError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Errors produced while updating a test group.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Malformed object-store URL.
    #[error("invalid object path '{url}': {reason}")]
    InvalidPath { url: String, reason: String },

    /// The build has no `started.json`; skipped, not fatal.
    #[error("build has not started: {prefix}")]
    BuildNotStarted { prefix: String },

    /// `started.json` or `finished.json` did not decode.
    #[error("corrupt build metadata at {path}: {detail}")]
    CorruptMetadata { path: String, detail: String },

    /// Unparseable JUnit XML or unsupported character set.
    #[error("bad test artifact {path}: {detail}")]
    BadArtifact { path: String, detail: String },

    /// Artifact body exceeds the per-artifact size ceiling.
    #[error("artifact too large: {path} is {size} > {limit} bytes")]
    ArtifactTooLarge { path: String, size: u64, limit: u64 },

    /// The per-build deadline elapsed.
    #[error("deadline exceeded reading build {prefix}")]
    Timeout { prefix: String },

    /// A sibling task failed and this one was torn down.
    #[error("cancelled: {detail}")]
    Cancelled { detail: String },

    /// Short write, length mismatch, or close error on the output.
    #[error("upload failed: {message}")]
    Upload { message: String },

    /// Invalid option or disallowed target.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Storage transport failure.
    #[error(transparent)]
    Store(StoreError),
}

impl UpdateError {
    /// True for the one kind the group driver recovers from.
    pub fn is_build_not_started(&self) -> bool {
        matches!(self, Self::BuildNotStarted { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidPath { .. } => 2,
            Self::Upload { .. } => 3,
            _ => 1,
        }
    }
}

impl From<StoreError> for UpdateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath { url, reason } => Self::InvalidPath { url, reason },
            StoreError::Upload { path, message } => Self::Upload {
                message: format!("{path}: {message}"),
            },
            other => Self::Store(other),
        }
    }
}
