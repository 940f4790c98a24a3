//! Conversation archival.
//!
//! When the live log grows past the size threshold (counted in non-header
//! lines) or the time threshold elapses, history moves to a date-stamped
//! file under `archive/conversation/` and the live file keeps its headers
//! plus the most recent lines.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::infra::FileSystem;
use crate::substrate::SubstrateLayout;

#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    pub enabled: bool,
    pub lines_to_keep: usize,
    /// Non-header line count that triggers archival.
    pub size_threshold: usize,
    pub time_threshold: Duration,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            lines_to_keep: 50,
            size_threshold: 500,
            time_threshold: Duration::days(7),
        }
    }
}

pub struct ConversationArchiver {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    policy: ArchivePolicy,
}

fn non_header_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
        .count()
}

impl ConversationArchiver {
    pub fn new(fs: Arc<dyn FileSystem>, layout: SubstrateLayout, policy: ArchivePolicy) -> Self {
        Self { fs, layout, policy }
    }

    pub fn enabled(&self) -> bool {
        self.policy.enabled
    }

    pub fn should_archive(
        &self,
        content: &str,
        last_archive: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.policy.enabled {
            return false;
        }
        if non_header_lines(content) > self.policy.size_threshold {
            return true;
        }
        match last_archive {
            Some(last) => now - last >= self.policy.time_threshold,
            None => false,
        }
    }

    /// Write history to the date-stamped archive and return the new live
    /// content: headers plus the trailing `lines_to_keep` entries.
    pub async fn archive(&self, content: &str, now: DateTime<Utc>) -> Result<String> {
        let dir = self.layout.conversation_archive_dir();
        self.fs.create_dir_all(&dir).await?;

        let name = format!("CONVERSATION-{}.md", now.format("%Y-%m-%d"));
        let path = dir.join(&name);

        // Same-day re-archives accumulate in one file.
        let archive_doc = if self.fs.exists(&path).await {
            let existing = self.fs.read_to_string(&path).await?;
            format!("{}\n{}", existing.trim_end(), content.trim_end())
        } else {
            format!(
                "# Conversation Archive {}\n\n{}",
                now.format("%Y-%m-%d"),
                content.trim_end()
            )
        };
        self.fs.write(&path, &format!("{archive_doc}\n")).await?;

        let headers: Vec<&str> = content
            .lines()
            .filter(|l| l.trim_start().starts_with('#'))
            .collect();
        let entries: Vec<&str> = content
            .lines()
            .filter(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
            .collect();
        let keep_from = entries.len().saturating_sub(self.policy.lines_to_keep);

        let mut live = headers.join("\n");
        live.push_str("\n\n");
        for line in &entries[keep_from..] {
            live.push_str(line);
            live.push('\n');
        }
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::TokioFs;
    use chrono::TimeZone;

    fn archiver(dir: &tempfile::TempDir, policy: ArchivePolicy) -> ConversationArchiver {
        ConversationArchiver::new(
            Arc::new(TokioFs::new()),
            SubstrateLayout::new(dir.path()),
            policy,
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_size_threshold_counts_non_header_lines() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = archiver(
            &dir,
            ArchivePolicy {
                size_threshold: 2,
                ..Default::default()
            },
        );

        let small = "# Conversation\n\n[t] [EGO] a\n[t] [EGO] b\n";
        assert!(!archiver.should_archive(small, None, now()));

        let big = "# Conversation\n\n[t] [EGO] a\n[t] [EGO] b\n[t] [EGO] c\n";
        assert!(archiver.should_archive(big, None, now()));
    }

    #[test]
    fn test_time_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = archiver(
            &dir,
            ArchivePolicy {
                time_threshold: Duration::days(1),
                ..Default::default()
            },
        );
        let content = "# Conversation\n\n[t] [EGO] a\n";

        assert!(!archiver.should_archive(content, Some(now() - Duration::hours(2)), now()));
        assert!(archiver.should_archive(content, Some(now() - Duration::days(2)), now()));
    }

    #[test]
    fn test_disabled_never_archives() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = archiver(
            &dir,
            ArchivePolicy {
                enabled: false,
                size_threshold: 0,
                ..Default::default()
            },
        );
        assert!(!archiver.should_archive("# C\n\nx\ny\n", Some(now() - Duration::days(30)), now()));
    }

    #[tokio::test]
    async fn test_archive_keeps_last_lines_live() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = archiver(
            &dir,
            ArchivePolicy {
                lines_to_keep: 2,
                ..Default::default()
            },
        );
        let content = "# Conversation\n\n[t1] [EGO] one\n[t2] [EGO] two\n[t3] [EGO] three\n";

        let live = archiver.archive(content, now()).await.unwrap();
        assert!(live.starts_with("# Conversation\n"));
        assert!(!live.contains("one"));
        assert!(live.contains("two"));
        assert!(live.contains("three"));

        let fs = TokioFs::new();
        let archived = fs
            .read_to_string(
                &SubstrateLayout::new(dir.path())
                    .conversation_archive_dir()
                    .join("CONVERSATION-2026-02-15.md"),
            )
            .await
            .unwrap();
        assert!(archived.contains("one"));
    }
}
