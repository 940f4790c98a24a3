//! Conversation manager: role gating plus maintenance-on-append.
//!
//! Every append runs the archive and compaction checks first, then goes
//! through the append-only writer. The first append records the compaction
//! baseline; each append at or past baseline + 1 h invokes the compactor
//! exactly once and advances the baseline. Maintenance rewrites bypass the
//! overwrite writer by design (CONVERSATION is append-only for roles) and
//! go straight to the filesystem under the file lock.

pub mod archiver;
pub mod compactor;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::Result;
use crate::infra::{Clock, FileLockRegistry, FileSystem};
use crate::roles::{ensure_permitted, FileOp, Role};
use crate::substrate::{SubstrateAppender, SubstrateFile, SubstrateLayout, SubstrateReader};

pub use archiver::{ArchivePolicy, ConversationArchiver};
pub use compactor::ConversationCompactor;

fn compaction_interval() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceStats {
    pub baseline: Option<DateTime<Utc>>,
    pub last_compaction: Option<DateTime<Utc>>,
    pub last_archive: Option<DateTime<Utc>>,
    pub compactions_run: u64,
    pub archives_run: u64,
}

pub struct ConversationManager {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    locks: Arc<FileLockRegistry>,
    reader: Arc<SubstrateReader>,
    appender: Arc<SubstrateAppender>,
    clock: Arc<dyn Clock>,
    compactor: ConversationCompactor,
    archiver: Option<ConversationArchiver>,
    state: parking_lot::Mutex<MaintenanceStats>,
}

impl ConversationManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: SubstrateLayout,
        locks: Arc<FileLockRegistry>,
        reader: Arc<SubstrateReader>,
        appender: Arc<SubstrateAppender>,
        clock: Arc<dyn Clock>,
        compactor: ConversationCompactor,
        archiver: Option<ConversationArchiver>,
    ) -> Self {
        Self {
            fs,
            layout,
            locks,
            reader,
            appender,
            clock,
            compactor,
            archiver,
            state: parking_lot::Mutex::new(MaintenanceStats::default()),
        }
    }

    pub async fn append(&self, role: Role, entry: &str) -> Result<()> {
        ensure_permitted(role, SubstrateFile::Conversation, FileOp::Append)?;
        let now = self.clock.now();
        self.maybe_archive(now).await?;
        self.maybe_compact(now).await?;
        self.appender
            .append(SubstrateFile::Conversation, role, entry)
            .await
    }

    /// Testing hook: compact now, ignoring the baseline throttle.
    pub async fn force_compaction(&self) -> Result<()> {
        let now = self.clock.now();
        self.run_compaction(now).await
    }

    /// Testing hook: archive now, ignoring thresholds.
    pub async fn force_archive(&self) -> Result<()> {
        let now = self.clock.now();
        self.run_archive(now).await
    }

    /// The most recent of the last compaction and the last archive.
    pub fn last_maintenance_time(&self) -> Option<DateTime<Utc>> {
        let st = self.state.lock();
        match (st.last_compaction, st.last_archive) {
            (Some(c), Some(a)) => Some(c.max(a)),
            (compaction, archive) => compaction.or(archive),
        }
    }

    pub fn stats(&self) -> MaintenanceStats {
        *self.state.lock()
    }

    async fn maybe_compact(&self, now: DateTime<Utc>) -> Result<()> {
        let due = {
            let mut st = self.state.lock();
            match st.baseline {
                None => {
                    st.baseline = Some(now);
                    false
                }
                Some(baseline) => now - baseline >= compaction_interval(),
            }
        };
        if !due {
            return Ok(());
        }
        self.run_compaction(now).await
    }

    async fn run_compaction(&self, now: DateTime<Utc>) -> Result<()> {
        let cutoff = now - compaction_interval();
        if let Some(content) = self.read_live().await? {
            let compacted = self.compactor.compact(&content, cutoff).await;
            if compacted != content {
                self.rewrite_live(&compacted).await?;
                info!("Compacted conversation history older than {cutoff}");
            }
        }
        let mut st = self.state.lock();
        st.compactions_run += 1;
        st.last_compaction = Some(now);
        st.baseline = Some(now);
        Ok(())
    }

    async fn maybe_archive(&self, now: DateTime<Utc>) -> Result<()> {
        let Some(archiver) = &self.archiver else {
            return Ok(());
        };
        if !archiver.enabled() {
            return Ok(());
        }
        let Some(content) = self.read_live().await? else {
            return Ok(());
        };
        let since = {
            let st = self.state.lock();
            st.last_archive.or(st.baseline)
        };
        if !archiver.should_archive(&content, since, now) {
            return Ok(());
        }
        self.run_archive_with(archiver, &content, now).await
    }

    async fn run_archive(&self, now: DateTime<Utc>) -> Result<()> {
        let Some(archiver) = &self.archiver else {
            return Ok(());
        };
        let Some(content) = self.read_live().await? else {
            return Ok(());
        };
        self.run_archive_with(archiver, &content, now).await
    }

    async fn run_archive_with(
        &self,
        archiver: &ConversationArchiver,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let live = archiver.archive(content, now).await?;
        self.rewrite_live(&live).await?;
        let mut st = self.state.lock();
        st.archives_run += 1;
        st.last_archive = Some(now);
        info!("Archived conversation history ({} lines kept live)", live.lines().count());
        Ok(())
    }

    async fn read_live(&self) -> Result<Option<String>> {
        let path = self.layout.path_for(SubstrateFile::Conversation);
        match self.fs.read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn rewrite_live(&self, content: &str) -> Result<()> {
        let path = self.layout.path_for(SubstrateFile::Conversation);
        let _guard = self.locks.acquire(SubstrateFile::Conversation).await;
        self.fs.write(&path, content).await?;
        self.reader.invalidate(&path);
        Ok(())
    }
}
