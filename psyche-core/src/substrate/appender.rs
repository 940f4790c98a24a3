//! Append-only writer with PROGRESS rotation.
//!
//! Entries become `[ISO-8601 ms] [ROLE] text\n` lines. When the live
//! PROGRESS file crosses the byte threshold, the current content is copied
//! to `progress/PROGRESS-<ts>Z.md` and the live file restarts with a
//! rotation header. Rotation happens synchronously inside the append, so
//! one caller may observe a slow append per crossing.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::{redact, SubstrateFile, SubstrateLayout, WriteMode};
use crate::error::{PsycheError, Result};
use crate::events::{EventBus, EventType};
use crate::infra::{iso_millis, Clock, FileLockRegistry, FileSystem};
use crate::roles::Role;
use crate::substrate::SubstrateReader;

pub const DEFAULT_ROTATION_THRESHOLD: u64 = 512 * 1024;

pub struct SubstrateAppender {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    locks: Arc<FileLockRegistry>,
    reader: Arc<SubstrateReader>,
    clock: Arc<dyn Clock>,
    rotation_threshold: u64,
    events: Option<Arc<EventBus>>,
}

impl SubstrateAppender {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: SubstrateLayout,
        locks: Arc<FileLockRegistry>,
        reader: Arc<SubstrateReader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fs,
            layout,
            locks,
            reader,
            clock,
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            events: None,
        }
    }

    pub fn with_rotation_threshold(mut self, bytes: u64) -> Self {
        self.rotation_threshold = bytes;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn append(&self, file: SubstrateFile, role: Role, entry: &str) -> Result<()> {
        if file.write_mode() != WriteMode::AppendOnly {
            return Err(PsycheError::ContractViolation(format!(
                "{file} is overwrite-mode; use the writer"
            )));
        }

        let (entry, redacted) = redact::redact_secrets(entry);
        if redacted > 0 {
            warn!("Redacted {redacted} secret(s) while appending to {file}");
        }

        let now = self.clock.now();
        let line = format!("[{}] [{role}] {}\n", iso_millis(now), entry.trim_end());

        let path = self.layout.path_for(file);
        let _guard = self.locks.acquire(file).await;

        if file == SubstrateFile::Progress {
            self.rotate_if_needed(&path).await?;
        }

        self.fs.append(&path, &line).await?;
        self.reader.invalidate(&path);

        if let Some(events) = &self.events {
            events.emit(
                EventType::FileChanged,
                json!({ "file": file.name(), "path": path.display().to_string() }),
            );
        }
        Ok(())
    }

    /// Caller holds the PROGRESS lock.
    async fn rotate_if_needed(&self, path: &Path) -> Result<()> {
        let stat = match self.fs.stat(path).await {
            Ok(stat) => stat,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if stat.size < self.rotation_threshold {
            return Ok(());
        }

        let now = self.clock.now();
        let archive_dir = self.layout.progress_archive_dir();
        self.fs.create_dir_all(&archive_dir).await?;
        let archive_name = format!("PROGRESS-{}Z.md", now.format("%Y%m%dT%H%M%S%.3f"));
        let archive_path = archive_dir.join(&archive_name);
        self.fs.copy(path, &archive_path).await?;

        let header = format!(
            "# Progress Log\n\nRotated at {}. Earlier entries archived to progress/{}.\n\n",
            iso_millis(now),
            archive_name
        );
        self.fs.write(path, &header).await?;
        info!(
            "Rotated PROGRESS at {} bytes into progress/{}",
            stat.size, archive_name
        );
        Ok(())
    }
}
