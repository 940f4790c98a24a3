//! Subconscious - the executing voice. Runs one dispatched task per
//! session and applies the structured mutations its reply requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::extract::parse_payload;
use super::prompt::{PromptBuilder, PromptContext};
use super::{ensure_permitted, FileOp, Role, TaskClassifier};
use crate::conversation::ConversationManager;
use crate::error::{PsycheError, Result};
use crate::session::{LaunchOptions, LogCallback, SessionLauncher};
use crate::substrate::plan::{self, PlanTask};
use crate::substrate::{SubstrateAppender, SubstrateFile, SubstrateReader, SubstrateWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecOutcome {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    Memory,
    Skill,
    Goal,
    #[serde(other)]
    Other,
}

impl Default for ProposalKind {
    fn default() -> Self {
        ProposalKind::Other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(default)]
    pub kind: ProposalKind,
    pub content: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionReply {
    result: ExecOutcome,
    summary: String,
    #[serde(default)]
    progress_entry: Option<String>,
    #[serde(default)]
    skill_updates: Option<String>,
    #[serde(default)]
    memory_updates: Option<String>,
    #[serde(default)]
    proposals: Vec<Proposal>,
}

/// Parsed execution result, after downgrade of any failure.
#[derive(Debug, Clone)]
pub struct Execution {
    pub result: ExecOutcome,
    pub summary: String,
    pub progress_entry: Option<String>,
    pub skill_updates: Option<String>,
    pub memory_updates: Option<String>,
    pub proposals: Vec<Proposal>,
}

impl Execution {
    fn failure(summary: String) -> Self {
        Self {
            result: ExecOutcome::Failure,
            summary,
            progress_entry: None,
            skill_updates: None,
            memory_updates: None,
            proposals: Vec::new(),
        }
    }
}

pub struct Subconscious {
    launcher: Arc<dyn SessionLauncher>,
    prompts: Arc<dyn PromptBuilder>,
    classifier: TaskClassifier,
    reader: Arc<SubstrateReader>,
    writer: Arc<SubstrateWriter>,
    appender: Arc<SubstrateAppender>,
    conversation: Arc<ConversationManager>,
}

impl Subconscious {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        prompts: Arc<dyn PromptBuilder>,
        classifier: TaskClassifier,
        reader: Arc<SubstrateReader>,
        writer: Arc<SubstrateWriter>,
        appender: Arc<SubstrateAppender>,
        conversation: Arc<ConversationManager>,
    ) -> Self {
        Self {
            launcher,
            prompts,
            classifier,
            reader,
            writer,
            appender,
            conversation,
        }
    }

    /// Execute one task. Session failures and unparseable replies downgrade
    /// to a failure execution carrying the error in the summary.
    pub async fn execute(
        &self,
        task: &PlanTask,
        on_log: Option<LogCallback>,
        cancel: Option<CancellationToken>,
    ) -> Execution {
        let mut ctx = PromptContext::for_operation(
            "execute",
            "Execute the task below. Reply with JSON: {\"result\": \"success\" | \"partial\" | \"failure\", \"summary\": \"...\", \"progressEntry\": \"...\", \"skillUpdates\": null, \"memoryUpdates\": null, \"proposals\": []}",
        )
        .with_task(task.clone());
        for file in [SubstrateFile::Skills, SubstrateFile::Memory] {
            if let Ok(snapshot) = self.reader.read(file).await {
                ctx = ctx.with_snippet(file, snapshot.markdown);
            }
        }

        let request = self.prompts.build(Role::Subconscious, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("execute"),
            on_log,
            cancel,
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        if !outcome.success {
            return Execution::failure(
                outcome
                    .error
                    .unwrap_or_else(|| "execution session failed".to_string()),
            );
        }

        match parse_payload::<ExecutionReply>(outcome.text()) {
            Ok(reply) => Execution {
                result: reply.result,
                summary: reply.summary,
                progress_entry: reply.progress_entry.filter(|e| !e.trim().is_empty()),
                skill_updates: reply.skill_updates.filter(|s| !s.trim().is_empty()),
                memory_updates: reply.memory_updates.filter(|m| !m.trim().is_empty()),
                proposals: reply.proposals,
            },
            Err(e) => Execution::failure(format!("failed to parse execution reply: {e}")),
        }
    }

    pub async fn log_progress(&self, entry: &str) -> Result<()> {
        ensure_permitted(Role::Subconscious, SubstrateFile::Progress, FileOp::Append)?;
        self.appender
            .append(SubstrateFile::Progress, Role::Subconscious, entry)
            .await
    }

    pub async fn log_conversation(&self, entry: &str) -> Result<()> {
        self.conversation.append(Role::Subconscious, entry).await
    }

    /// Flip the N-th PLAN checkbox. Idempotent when already done; a missing
    /// ordinal is a caller bug and fails loudly.
    pub async fn mark_task_complete(&self, ordinal: usize) -> Result<()> {
        ensure_permitted(Role::Subconscious, SubstrateFile::Plan, FileOp::Write)?;
        let snapshot = self.reader.read(SubstrateFile::Plan).await?;
        let updated = plan::mark_complete(&snapshot.markdown, ordinal).ok_or_else(|| {
            PsycheError::ContractViolation(format!("no PLAN task at ordinal {ordinal}"))
        })?;
        if updated != snapshot.markdown {
            self.writer.write(SubstrateFile::Plan, &updated).await?;
        }
        Ok(())
    }

    pub async fn update_skills(&self, content: &str) -> Result<()> {
        ensure_permitted(Role::Subconscious, SubstrateFile::Skills, FileOp::Write)?;
        self.writer.write(SubstrateFile::Skills, content).await
    }

    pub async fn update_memory(&self, content: &str) -> Result<()> {
        ensure_permitted(Role::Subconscious, SubstrateFile::Memory, FileOp::Write)?;
        self.writer.write(SubstrateFile::Memory, content).await
    }

    /// Merge an approved proposal into MEMORY or SKILLS.
    pub async fn absorb_proposal(&self, proposal: &Proposal) -> Result<()> {
        let file = match proposal.kind {
            ProposalKind::Memory => SubstrateFile::Memory,
            ProposalKind::Skill => SubstrateFile::Skills,
            _ => {
                return Err(PsycheError::ContractViolation(format!(
                    "proposal kind {:?} has no substrate target",
                    proposal.kind
                )))
            }
        };
        ensure_permitted(Role::Subconscious, file, FileOp::Write)?;
        let current = self.reader.read(file).await?.markdown;
        let merged = format!("{}\n- {}\n", current.trim_end(), proposal.content.trim());
        self.writer.write(file, &merged).await
    }
}
