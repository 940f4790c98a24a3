//! Substrate reader with an mtime-validated content cache.
//!
//! A cache entry is valid iff its recorded modification time equals the
//! live filesystem timestamp. Writers invalidate the matching entry after
//! every successful mutation, so a read that follows a write always sees
//! the new content.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use super::{FileMetadata, SubstrateFile, SubstrateLayout};
use crate::error::Result;
use crate::infra::FileSystem;

struct CacheEntry {
    content: String,
    modified: SystemTime,
    hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub metadata: FileMetadata,
    pub markdown: String,
}

pub struct SubstrateReader {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    cache: parking_lot::Mutex<HashMap<PathBuf, CacheEntry>>,
    caching: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SubstrateReader {
    pub fn new(fs: Arc<dyn FileSystem>, layout: SubstrateLayout) -> Self {
        Self::with_caching(fs, layout, true)
    }

    pub fn with_caching(fs: Arc<dyn FileSystem>, layout: SubstrateLayout, caching: bool) -> Self {
        Self {
            fs,
            layout,
            cache: parking_lot::Mutex::new(HashMap::new()),
            caching,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn layout(&self) -> &SubstrateLayout {
        &self.layout
    }

    pub async fn read(&self, file: SubstrateFile) -> Result<Snapshot> {
        let path = self.layout.path_for(file);
        let stat = self.fs.stat(&path).await?;

        if self.caching {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&path) {
                if entry.modified == stat.modified {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Snapshot {
                        metadata: FileMetadata {
                            file,
                            path: path.clone(),
                            modified: entry.modified,
                            content_hash: entry.hash.clone(),
                        },
                        markdown: entry.content.clone(),
                    });
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let content = self.fs.read_to_string(&path).await?;
        let hash = digest(&content);

        if self.caching {
            self.cache.lock().insert(
                path.clone(),
                CacheEntry {
                    content: content.clone(),
                    modified: stat.modified,
                    hash: hash.clone(),
                },
            );
        }

        Ok(Snapshot {
            metadata: FileMetadata {
                file,
                path,
                modified: stat.modified,
                content_hash: hash,
            },
            markdown: content,
        })
    }

    /// Drop the cache entry for a path. Called by writers after mutation.
    pub fn invalidate(&self, path: &Path) {
        self.cache.lock().remove(path);
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let out = hasher.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}
