//! Conversation compaction.
//!
//! Replaces the pre-cutoff prefix of the log with a model-produced summary
//! while preserving the `#` headers. Lines without a parseable timestamp
//! count as recent, so malformed lines are never silently summarized away.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::infra::iso_millis;
use crate::roles::{PromptBuilder, PromptContext, Role};
use crate::session::{LaunchOptions, SessionLauncher};

pub struct ConversationCompactor {
    launcher: Arc<dyn SessionLauncher>,
    prompts: Arc<dyn PromptBuilder>,
    model: Option<String>,
}

struct Partition<'a> {
    headers: Vec<&'a str>,
    recent: Vec<&'a str>,
    old: Vec<&'a str>,
}

/// Timestamp of a `[ISO-8601] ...` line, if present and parseable.
fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    DateTime::parse_from_rfc3339(&rest[..end])
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn partition(content: &str, cutoff: DateTime<Utc>) -> Partition<'_> {
    let mut headers = Vec::new();
    let mut recent = Vec::new();
    let mut old = Vec::new();

    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            headers.push(line);
        } else if line.trim().is_empty() {
            continue;
        } else {
            match line_timestamp(line) {
                Some(ts) if ts < cutoff => old.push(line),
                _ => recent.push(line),
            }
        }
    }

    Partition {
        headers,
        recent,
        old,
    }
}

impl ConversationCompactor {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        prompts: Arc<dyn PromptBuilder>,
        model: Option<String>,
    ) -> Self {
        Self {
            launcher,
            prompts,
            model,
        }
    }

    /// Compact everything older than the cutoff. Content whose entries are
    /// all newer than the cutoff is returned unchanged; empty content stays
    /// empty.
    pub async fn compact(&self, content: &str, cutoff: DateTime<Utc>) -> String {
        if content.trim().is_empty() {
            return content.to_string();
        }

        let split = partition(content, cutoff);
        if split.old.is_empty() {
            return content.to_string();
        }

        let summary = self
            .summarize(&split.old, cutoff)
            .await
            .unwrap_or_else(|| {
                format!(
                    "[Previous conversation history compacted - {} lines summarized]",
                    split.old.len()
                )
            });

        format!(
            "{}\n\n## Summary of Earlier Conversation\n\n{}\n\n## Recent Conversation (Last Hour)\n\n{}\n",
            split.headers.join("\n"),
            summary.trim(),
            split.recent.join("\n")
        )
    }

    async fn summarize(&self, old: &[&str], cutoff: DateTime<Utc>) -> Option<String> {
        let ctx = PromptContext::for_operation(
            "summarize",
            format!(
                "Summarize this conversation history from before {} in a short paragraph of plain text:\n\n{}",
                iso_millis(cutoff),
                old.join("\n")
            ),
        );
        let request = self.prompts.build(Role::System, &ctx);
        let options = LaunchOptions {
            model: self.model.clone(),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;
        if !outcome.success {
            debug!("summarization failed, using fallback: {:?}", outcome.error);
            return None;
        }
        let text = outcome.text().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
