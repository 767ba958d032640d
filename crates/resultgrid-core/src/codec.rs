//! Grid serialization and upload.
//!
//! Wire encoding, then zlib at the default level, then a Castagnoli
//! CRC32C over the compressed bytes. The checksum rides along as the
//! store's integrity tag so the receiver can verify what it stored.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;
use resultgrid_store::{GcsPath, ObjectClient, UploadProgress};

use crate::error::{UpdateError, UpdateResult};
use crate::state::Grid;

/// Writes to this bucket are always refused.
pub const PROD_BUCKET: &str = "k8s-testgrid";

/// A serialized, compressed grid and its checksum.
#[derive(Debug, Clone)]
pub struct EncodedGrid {
    pub bytes: Bytes,
    pub crc32c: u32,
}

/// Serialize and compress a grid.
pub fn encode(grid: &Grid) -> UpdateResult<EncodedGrid> {
    let raw = grid.encode_to_vec();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .and_then(|()| encoder.finish())
        .map(|compressed| EncodedGrid {
            crc32c: crc32c::crc32c(&compressed),
            bytes: Bytes::from(compressed),
        })
        .map_err(|e| UpdateError::Upload {
            message: format!("failed to compress grid: {e}"),
        })
}

/// Reverse of [`encode`]; used to verify uploads round-trip.
pub fn decode(buf: &[u8]) -> UpdateResult<Grid> {
    let mut raw = Vec::new();
    ZlibDecoder::new(buf)
        .read_to_end(&mut raw)
        .map_err(|e| UpdateError::Upload {
            message: format!("grid payload does not decompress: {e}"),
        })?;
    Grid::decode(raw.as_slice()).map_err(|e| UpdateError::Upload {
        message: format!("grid payload does not decode: {e}"),
    })
}

/// Encode and upload a grid. Returns the checksum that was attached.
pub async fn write_grid(
    client: &ObjectClient,
    path: &GcsPath,
    grid: &Grid,
    progress: UploadProgress<'_>,
) -> UpdateResult<u32> {
    if path.bucket() == PROD_BUCKET {
        return Err(UpdateError::Config {
            message: format!("refusing to write to the production bucket {PROD_BUCKET}"),
        });
    }
    let encoded = encode(grid)?;
    client
        .upload(path, encoded.bytes, encoded.crc32c, progress)
        .await
        .map_err(UpdateError::from)?;
    Ok(encoded.crc32c)
}
