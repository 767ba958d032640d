//! The storage adapter.
//!
//! `ObjectClient` hands out one `object_store` handle per bucket and
//! wraps the handful of operations the updater needs: size-guarded
//! reads, delimiter listings, full listings, and checksum-tagged
//! uploads. All transport error mapping happens here; callers never see
//! `object_store::Error` variants directly.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, PutPayload, WriteMultipart,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::path::GcsPath;

/// Progress callback for uploads: `(bytes_handed_off, total_bytes)`.
pub type UploadProgress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Upload chunk granularity; also the progress reporting interval.
const UPLOAD_CHUNK: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Gcs,
    Memory,
}

/// A shared, read-mostly object-store client.
///
/// Buckets are materialized lazily and cached, so one client can serve
/// a group spread over several buckets. The in-memory flavor keeps a
/// separate `InMemory` store per bucket and is the test double for the
/// whole pipeline.
pub struct ObjectClient {
    kind: BackendKind,
    buckets: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectClient {
    /// A client backed by Google Cloud Storage, authenticated from the
    /// environment (application-default credentials).
    pub fn gcs() -> Self {
        Self {
            kind: BackendKind::Gcs,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// An in-memory client for tests.
    pub fn memory() -> Self {
        Self {
            kind: BackendKind::Memory,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn bucket(&self, name: &str) -> StoreResult<Arc<dyn ObjectStore>> {
        let mut buckets = self.buckets.lock().expect("bucket cache poisoned");
        if let Some(store) = buckets.get(name) {
            return Ok(store.clone());
        }
        let store: Arc<dyn ObjectStore> = match self.kind {
            BackendKind::Memory => Arc::new(InMemory::new()),
            BackendKind::Gcs => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(name)
                    .build()
                    .map_err(|e| StoreError::Io {
                        message: format!("failed to create GCS client for {name}: {e}"),
                    })?,
            ),
        };
        buckets.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Download an object. With `limit` set, the declared size is
    /// checked before the body is pulled and oversized objects are
    /// rejected with [`StoreError::TooLarge`].
    pub async fn get(&self, path: &GcsPath, limit: Option<u64>) -> StoreResult<Bytes> {
        let store = self.bucket(path.bucket())?;
        let location = Path::from(path.object());
        let result = store
            .get(&location)
            .await
            .map_err(|e| StoreError::from_object_store(e, &path.to_string()))?;
        let size = result.meta.size as u64;
        if let Some(limit) = limit {
            if size > limit {
                return Err(StoreError::TooLarge {
                    path: path.to_string(),
                    size,
                    limit,
                });
            }
        }
        result.bytes().await.map_err(|e| StoreError::Io {
            message: format!("failed to read {path}: {e}"),
        })
    }

    /// List the immediate "subdirectories" of a prefix (delimiter
    /// listing). Returned paths carry a trailing `/`.
    pub async fn list_prefixes(&self, dir: &GcsPath) -> StoreResult<Vec<GcsPath>> {
        let dir = dir.as_dir();
        let store = self.bucket(dir.bucket())?;
        let location = Path::from(dir.object());
        let listing = store
            .list_with_delimiter(Some(&location))
            .await
            .map_err(|e| StoreError::from_object_store(e, &dir.to_string()))?;
        debug!(dir = %dir, prefixes = listing.common_prefixes.len(), "listed build prefixes");
        Ok(listing
            .common_prefixes
            .iter()
            .map(|p| GcsPath::from_parts(dir.bucket(), &format!("{}/", p.as_ref())))
            .collect())
    }

    /// List every object key under a prefix (recursive).
    pub async fn list(&self, dir: &GcsPath) -> StoreResult<Vec<String>> {
        let dir = dir.as_dir();
        let store = self.bucket(dir.bucket())?;
        let location = Path::from(dir.object());
        let entries: Vec<_> = store
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| StoreError::from_object_store(e, &dir.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|meta| meta.location.as_ref().to_string())
            .collect())
    }

    /// Write an object without ceremony (config seeding, tests).
    pub async fn put(&self, path: &GcsPath, bytes: Bytes) -> StoreResult<()> {
        let store = self.bucket(path.bucket())?;
        let location = Path::from(path.object());
        store
            .put(&location, PutPayload::from_bytes(bytes))
            .await
            .map_err(|e| StoreError::from_object_store(e, &path.to_string()))?;
        Ok(())
    }

    /// Upload a payload with its CRC32C as an integrity tag, reporting
    /// progress per chunk and verifying the stored length afterwards.
    /// A length mismatch is a short write and fails the upload.
    pub async fn upload(
        &self,
        path: &GcsPath,
        bytes: Bytes,
        crc32c: u32,
        progress: UploadProgress<'_>,
    ) -> StoreResult<()> {
        let store = self.bucket(path.bucket())?;
        let location = Path::from(path.object());
        let total = bytes.len() as u64;

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::Metadata(Cow::Borrowed("crc32c")),
            base64::engine::general_purpose::STANDARD
                .encode(crc32c.to_be_bytes())
                .into(),
        );
        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };

        let multipart = store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(|e| StoreError::Upload {
                path: path.to_string(),
                message: format!("failed to start upload: {e}"),
            })?;
        let mut writer = WriteMultipart::new(multipart);
        let mut written = 0u64;
        for chunk in bytes.chunks(UPLOAD_CHUNK) {
            writer.write(chunk);
            written += chunk.len() as u64;
            progress(written, total);
        }
        writer.finish().await.map_err(|e| StoreError::Upload {
            path: path.to_string(),
            message: format!("failed to finish upload: {e}"),
        })?;

        let head = store
            .head(&location)
            .await
            .map_err(|e| StoreError::from_object_store(e, &path.to_string()))?;
        let stored = head.size as u64;
        if stored != total {
            return Err(StoreError::Upload {
                path: path.to_string(),
                message: format!("short write: stored {stored} of {total} bytes"),
            });
        }
        Ok(())
    }
}
