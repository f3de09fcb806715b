//! Readable container handles
//!
//! A source is read through [`ContainerReader`] regardless of where it lives: a local file
//! (including a freshly staged download) or an object in object storage. Opening a source means
//! getting a reader and locating the HDF5 superblock signature in it.

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Format signature that starts an HDF5 superblock
pub const SIGNATURE: [u8; 8] = *b"\x89HDF\r\n\x1a\n";

/// Positional read access to a container
#[async_trait]
pub trait ContainerReader: Send + Sync {
    /// Total size in bytes
    fn size(&self) -> u64;

    /// Read up to `len` bytes starting at `offset`; shorter only at end of data
    async fn read_at(&self, offset: u64, len: usize) -> anyhow::Result<bytes::Bytes>;
}

/// Clamp a read request to the data size
pub(crate) fn read_len(size: u64, offset: u64, len: usize) -> usize {
    let available = size.saturating_sub(offset);
    usize::try_from(available).map_or(len, |available| available.min(len))
}

#[derive(Debug)]
pub struct LocalReader {
    path: std::path::PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
    size: u64,
}

impl LocalReader {
    pub async fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {path:?} for reading"))?;
        let metadata = file
            .metadata()
            .await
            .with_context(|| format!("failed reading metadata from {path:?}"))?;
        if !metadata.is_file() {
            return Err(anyhow::anyhow!("{path:?} is not a regular file"));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: tokio::sync::Mutex::new(file),
            size: metadata.len(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ContainerReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, len: usize) -> anyhow::Result<bytes::Bytes> {
        let mut buf = vec![0u8; read_len(self.size, offset, len)];
        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .with_context(|| format!("failed seeking {:?} to {offset}", self.path))?;
        file.read_exact(&mut buf)
            .await
            .with_context(|| format!("failed reading {:?} at {offset}", self.path))?;
        Ok(bytes::Bytes::from(buf))
    }
}

/// Find the superblock: the signature sits at offset 0, 512, 1024, 2048, ... (doubling)
pub async fn find_superblock(reader: &dyn ContainerReader) -> anyhow::Result<Option<u64>> {
    let size = reader.size();
    let mut offset = 0u64;
    while offset.saturating_add(SIGNATURE.len() as u64) <= size {
        let bytes = reader.read_at(offset, SIGNATURE.len()).await?;
        if bytes.as_ref() == SIGNATURE {
            tracing::debug!("found superblock at offset {offset}");
            return Ok(Some(offset));
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    Ok(None)
}
