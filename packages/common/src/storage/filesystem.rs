use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::{BlobStore, BoxReader};

const READ_CHUNK: usize = 64 * 1024;

/// Blob store rooted at a local directory.
///
/// Layout: `{root}/{shard}/{leaf}`, with in-flight uploads written to
/// `{root}/.partial/` and renamed into place once fully hashed.
pub struct FilesystemBlobStore {
    root: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    pub async fn new(root: impl Into<PathBuf>, max_size: u64) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join(".partial")).await?;
        Ok(Self { root, max_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard()).join(hash.leaf())
    }

    fn partial_path(&self) -> PathBuf {
        self.root
            .join(".partial")
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn discard(path: &Path) {
        let _ = fs::remove_file(path).await;
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_stream(&self, mut reader: BoxReader) -> Result<ContentHash, StorageError> {
        let partial = self.partial_path();
        let mut file = fs::File::create(&partial).await?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    Self::discard(&partial).await;
                    return Err(e.into());
                }
            };
            written += n as u64;
            if written > self.max_size {
                drop(file);
                Self::discard(&partial).await;
                return Err(StorageError::SizeLimitExceeded {
                    actual: written,
                    limit: self.max_size,
                });
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
        }
        file.flush().await?;
        drop(file);

        let hash = ContentHash::from_bytes(hasher.finalize().into());
        let target = self.blob_path(&hash);

        if fs::try_exists(&target).await? {
            Self::discard(&partial).await;
            return Ok(hash);
        }
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).await?;
        }
        if let Err(e) = fs::rename(&partial, &target).await {
            Self::discard(&partial).await;
            return Err(e.into());
        }

        Ok(hash)
    }

    async fn open(&self, hash: &ContentHash) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.blob_path(hash)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
