//! Filesystem capability trait consumed by the substrate layer.
//!
//! Every operation carries path context on failure, and "not found" is a
//! distinguishable error kind (`PsycheError::NotFound`).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{PsycheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> Result<String>;
    async fn write(&self, path: &Path, contents: &str) -> Result<()>;
    async fn append(&self, path: &Path, contents: &str) -> Result<()>;
    async fn stat(&self, path: &Path) -> Result<FileStat>;
    async fn create_dir_all(&self, path: &Path) -> Result<()>;
    async fn exists(&self, path: &Path) -> bool;
    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    /// File names (not full paths) of the directory's entries.
    async fn read_dir(&self, path: &Path) -> Result<Vec<String>>;
    async fn remove(&self, path: &Path) -> Result<()>;
    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// Production filesystem on tokio::fs.
pub struct TokioFs;

impl TokioFs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TokioFs {
    fn default() -> Self {
        Self::new()
    }
}

fn ctx(path: &Path, e: std::io::Error) -> PsycheError {
    PsycheError::from_io(PathBuf::from(path), e)
}

#[async_trait]
impl FileSystem for TokioFs {
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path).await.map_err(|e| ctx(path, e))
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<()> {
        tokio::fs::write(path, contents).await.map_err(|e| ctx(path, e))
    }

    async fn append(&self, path: &Path, contents: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ctx(path, e))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| ctx(path, e))?;
        file.flush().await.map_err(|e| ctx(path, e))
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| ctx(path, e))?;
        let modified = meta.modified().map_err(|e| ctx(path, e))?;
        Ok(FileStat {
            size: meta.len(),
            modified,
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await.map_err(|e| ctx(path, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| ctx(from, e))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await.map_err(|e| ctx(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| ctx(path, e))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await.map_err(|e| ctx(path, e))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_dir_all(path).await.map_err(|e| ctx(path, e))
    }
}
