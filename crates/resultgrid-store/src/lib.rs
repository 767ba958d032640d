//! Object-store access for resultgrid.
//!
//! Two pieces live here: the validated `gs://` path model and the
//! storage adapter over the `object_store` crate. The adapter speaks to
//! Google Cloud Storage in production and to an in-memory backend in
//! tests; nothing above this crate knows which one it got.

pub mod client;
pub mod error;
pub mod path;

pub use client::{ObjectClient, UploadProgress};
pub use error::{StoreError, StoreResult};
pub use path::GcsPath;

pub use bytes::Bytes;
