//! Substrate backups: date-stamped copies with retention pruning.
//!
//! `config/last-backup.txt` persists the last run instant across process
//! restarts.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use super::MaintenanceScheduler;
use crate::error::Result;
use crate::events::{EventBus, EventType};
use crate::infra::{iso_millis, FileSystem};
use crate::substrate::{SubstrateFile, SubstrateLayout};

pub struct BackupScheduler {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    backup_root: PathBuf,
    retention_count: usize,
    interval: Duration,
    events: Arc<EventBus>,
}

impl BackupScheduler {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: SubstrateLayout,
        backup_root: PathBuf,
        retention_count: usize,
        interval: Duration,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            fs,
            layout,
            backup_root,
            retention_count,
            interval,
            events,
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.layout.config_dir().join("last-backup.txt")
    }

    async fn last_backup(&self) -> Option<DateTime<Utc>> {
        let raw = self.fs.read_to_string(&self.marker_path()).await.ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    async fn run_backup(&self, now: DateTime<Utc>) -> Result<usize> {
        let dir = self
            .backup_root
            .join(format!("backup-{}", now.format("%Y%m%dT%H%M%SZ")));
        self.fs.create_dir_all(&dir).await?;

        let mut copied = 0usize;
        for file in SubstrateFile::ALL {
            let source = self.layout.path_for(file);
            if !self.fs.exists(&source).await {
                continue;
            }
            self.fs.copy(&source, &dir.join(file.file_name())).await?;
            copied += 1;
        }

        self.prune().await?;

        self.fs.create_dir_all(&self.layout.config_dir()).await?;
        self.fs
            .write(&self.marker_path(), &format!("{}\n", iso_millis(now)))
            .await?;

        info!("Backup complete: {copied} file(s) into {}", dir.display());
        self.events.emit(
            EventType::BackupComplete,
            json!({ "path": dir.display().to_string(), "files": copied }),
        );
        Ok(copied)
    }

    async fn prune(&self) -> Result<()> {
        let mut dirs = match self.fs.read_dir(&self.backup_root).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        dirs.retain(|n| n.starts_with("backup-"));
        dirs.sort();
        while dirs.len() > self.retention_count {
            let oldest = dirs.remove(0);
            self.fs
                .remove_dir_all(&self.backup_root.join(&oldest))
                .await?;
            info!("Pruned old backup {oldest}");
        }
        Ok(())
    }
}

#[async_trait]
impl MaintenanceScheduler for BackupScheduler {
    fn name(&self) -> &'static str {
        "backup"
    }

    async fn on_tick(&self, now: DateTime<Utc>) -> Result<()> {
        let due = match self.last_backup().await {
            Some(last) => now - last >= self.interval,
            None => true,
        };
        if due {
            self.run_backup(now).await?;
        }
        Ok(())
    }
}
