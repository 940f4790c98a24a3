//! Durable hibernation context.
//!
//! Before sleeping through a provider rate limit, the runtime persists
//! everything a restarted process needs: the hibernation window, the goal
//! and plan at the time, and which task was interrupted. On wake the
//! context resets to a neutral marker.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::infra::{iso_millis, Clock};
use crate::roles::Role;
use crate::substrate::plan;
use crate::substrate::{SubstrateAppender, SubstrateFile, SubstrateReader, SubstrateWriter};

const NEUTRAL_CONTEXT: &str = "# Restart Context\n\nNo hibernation in progress.\n";
const RESET_FIELD: &str = "**Expected Reset**: ";

pub struct RateLimitStateManager {
    reader: Arc<SubstrateReader>,
    writer: Arc<SubstrateWriter>,
    appender: Arc<SubstrateAppender>,
    clock: Arc<dyn Clock>,
}

impl RateLimitStateManager {
    pub fn new(
        reader: Arc<SubstrateReader>,
        writer: Arc<SubstrateWriter>,
        appender: Arc<SubstrateAppender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader,
            writer,
            appender,
            clock,
        }
    }

    pub async fn save_state_before_sleep(
        &self,
        reset: DateTime<Utc>,
        interrupted_task: Option<&str>,
    ) -> Result<()> {
        let now = self.clock.now();
        let plan_snapshot = self.reader.read(SubstrateFile::Plan).await?.markdown;
        let goal = plan::current_goal(&plan_snapshot)
            .unwrap_or_else(|| "(no goal recorded)".to_string());
        let minutes = (reset - now).num_minutes().max(0);

        let mut doc = format!(
            "# Restart Context\n\n\
             **Hibernation Start**: {}\n\
             **Expected Reset**: {}\n\
             **Duration**: ~{} minutes\n\
             **Current Goal**: {}\n",
            iso_millis(now),
            iso_millis(reset),
            minutes,
            goal
        );
        if let Some(task) = interrupted_task {
            doc.push_str(&format!("**Interrupted Task**: {task}\n"));
        }
        doc.push_str(&format!("\n## Plan Snapshot\n\n{plan_snapshot}"));
        self.writer.write(SubstrateFile::RestartContext, &doc).await?;

        let tagged = tag_plan(&plan_snapshot, reset, interrupted_task);
        self.writer.write(SubstrateFile::Plan, &tagged).await?;

        self.appender
            .append(
                SubstrateFile::Progress,
                Role::System,
                &format!(
                    "Rate limit hibernation starting. Reset expected at {} (approx. {} minutes).",
                    iso_millis(reset),
                    minutes
                ),
            )
            .await
    }

    /// Overwrite RESTART_CONTEXT with the neutral marker. Idempotent.
    pub async fn clear_restart_context(&self) -> Result<()> {
        self.writer
            .write(SubstrateFile::RestartContext, NEUTRAL_CONTEXT)
            .await
    }

    /// The persisted reset instant, when a hibernation record exists.
    /// Used by startup recovery after a process restart.
    pub async fn pending_hibernation(&self) -> Result<Option<DateTime<Utc>>> {
        let snapshot = match self.reader.read(SubstrateFile::RestartContext).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let reset = snapshot
            .markdown
            .lines()
            .find_map(|line| line.strip_prefix(RESET_FIELD))
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok(reset)
    }
}

/// Rewrite the PLAN prefix with the hibernation tag, keeping the heading
/// first so the document still validates. Any earlier tag is replaced.
fn tag_plan(plan: &str, reset: DateTime<Utc>, interrupted_task: Option<&str>) -> String {
    let mut lines: Vec<String> = plan
        .lines()
        .filter(|line| {
            !line.starts_with("[RATE LIMITED - resuming at")
                && !(line.starts_with("Task \"") && line.ends_with("\" was interrupted"))
        })
        .map(|l| l.to_string())
        .collect();

    let mut tag = vec![format!("[RATE LIMITED - resuming at {}]", iso_millis(reset))];
    if let Some(task) = interrupted_task {
        tag.push(format!("Task \"{task}\" was interrupted"));
    }

    // Insert right after the heading line.
    let insert_at = if lines.first().map(|l| l.starts_with("# ")).unwrap_or(false) {
        1
    } else {
        0
    };
    for (offset, line) in tag.into_iter().enumerate() {
        lines.insert(insert_at + offset, line);
    }

    let mut out = lines.join("\n");
    if plan.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{FileLockRegistry, FixedClock, FileSystem, TokioFs};
    use crate::substrate::SubstrateLayout;
    use chrono::TimeZone;

    struct Setup {
        _dir: tempfile::TempDir,
        fs: Arc<TokioFs>,
        layout: SubstrateLayout,
        manager: RateLimitStateManager,
    }

    async fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(TokioFs::new());
        let layout = SubstrateLayout::new(dir.path());
        fs.write(
            &layout.path_for(SubstrateFile::Plan),
            "# Build a web scraper\n\n## Tasks\n\n- [ ] Task A\n- [ ] Task B\n",
        )
        .await
        .unwrap();

        let locks = Arc::new(FileLockRegistry::new());
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap(),
        ));
        let reader = Arc::new(SubstrateReader::new(fs.clone(), layout.clone()));
        let writer = Arc::new(SubstrateWriter::new(
            fs.clone(),
            layout.clone(),
            locks.clone(),
            reader.clone(),
        ));
        let appender = Arc::new(SubstrateAppender::new(
            fs.clone(),
            layout.clone(),
            locks,
            reader.clone(),
            clock.clone(),
        ));
        let manager = RateLimitStateManager::new(reader, writer, appender, clock);
        Setup {
            _dir: dir,
            fs,
            layout,
            manager,
        }
    }

    #[tokio::test]
    async fn test_save_state_persists_full_context() {
        let s = setup().await;
        let reset = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        s.manager
            .save_state_before_sleep(reset, Some("task-1"))
            .await
            .unwrap();

        let context = s
            .fs
            .read_to_string(&s.layout.path_for(SubstrateFile::RestartContext))
            .await
            .unwrap();
        assert!(context.contains("Hibernation Start**: 2026-02-15T10:00:00.000Z"));
        assert!(context.contains("Expected Reset**: 2026-02-15T12:00:00.000Z"));
        assert!(context.contains("**Duration**: ~120 minutes"));
        assert!(context.contains("**Current Goal**: Build a web scraper"));
        assert!(context.contains("**Interrupted Task**: task-1"));
        assert!(context.contains("- [ ] Task A"));

        let plan = s
            .fs
            .read_to_string(&s.layout.path_for(SubstrateFile::Plan))
            .await
            .unwrap();
        assert!(plan.starts_with("# Build a web scraper\n[RATE LIMITED - resuming at 2026-02-15T12:00:00.000Z]\nTask \"task-1\" was interrupted\n"));

        let progress = s
            .fs
            .read_to_string(&s.layout.path_for(SubstrateFile::Progress))
            .await
            .unwrap();
        assert!(progress.contains("[SYSTEM] Rate limit hibernation starting"));
        assert!(progress.contains("Reset expected at 2026-02-15T12:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let s = setup().await;
        let reset = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        s.manager.save_state_before_sleep(reset, None).await.unwrap();

        s.manager.clear_restart_context().await.unwrap();
        s.manager.clear_restart_context().await.unwrap();

        let context = s
            .fs
            .read_to_string(&s.layout.path_for(SubstrateFile::RestartContext))
            .await
            .unwrap();
        assert_eq!(context, NEUTRAL_CONTEXT);
        assert!(s.manager.pending_hibernation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_hibernation_roundtrip() {
        let s = setup().await;
        let reset = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        s.manager
            .save_state_before_sleep(reset, None)
            .await
            .unwrap();
        assert_eq!(s.manager.pending_hibernation().await.unwrap(), Some(reset));
    }

    #[tokio::test]
    async fn test_repeated_save_replaces_tag() {
        let s = setup().await;
        let first = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 2, 15, 14, 0, 0).unwrap();
        s.manager.save_state_before_sleep(first, None).await.unwrap();
        s.manager.save_state_before_sleep(second, None).await.unwrap();

        let plan = s
            .fs
            .read_to_string(&s.layout.path_for(SubstrateFile::Plan))
            .await
            .unwrap();
        assert_eq!(plan.matches("[RATE LIMITED").count(), 1);
        assert!(plan.contains("resuming at 2026-02-15T14:00:00.000Z"));
    }
}
