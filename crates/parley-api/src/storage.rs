use std::path::PathBuf;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::info;

/// Where file message bytes live. Keys are produced by [`blob_key`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Storage key for a file message: the message id plus the original
/// extension when it is short and plain ASCII alphanumeric.
pub fn blob_key(message_id: u64, extension: Option<&str>) -> String {
    match extension.filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric())) {
        Some(ext) => format!("{}.{}", message_id, ext.to_ascii_lowercase()),
        None => message_id.to_string(),
    }
}

/// Each blob is a flat file at `{dir}/{key}`.
pub struct DiskBlobStore {
    dir: PathBuf,
}

impl DiskBlobStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') || key.starts_with('.') {
            bail!("invalid blob key {:?}", key);
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = fs::File::open(self.path(key)?).await?;
        Ok(Box::new(file))
    }
}
