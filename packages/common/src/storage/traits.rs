use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;
use super::hash::ContentHash;

pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Content-addressed storage for uploaded files (category images).
///
/// Identical content is stored once; callers keep the returned hash as the
/// reference and are responsible for any naming metadata.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Consume `reader` into the store, enforcing the configured size limit.
    async fn put_stream(&self, reader: BoxReader) -> Result<ContentHash, StorageError>;

    async fn open(&self, hash: &ContentHash) -> Result<BoxReader, StorageError>;

    /// Returns `false` when there was nothing to remove.
    async fn remove(&self, hash: &ContentHash) -> Result<bool, StorageError>;
}
