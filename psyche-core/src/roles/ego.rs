//! Ego - the deciding voice. Chooses the next move, answers user messages,
//! and runs the bounded post-cycle self-evaluation.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::extract::parse_payload;
use super::prompt::{PromptBuilder, PromptContext};
use super::{Role, TaskClassifier};
use crate::error::Result;
use crate::session::{
    InjectionChannel, LaunchOptions, LogCallback, SessionLauncher,
};
use crate::substrate::plan::{self, PlanTask};
use crate::substrate::{SubstrateFile, SubstrateReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EgoAction {
    Dispatch,
    UpdatePlan,
    Converse,
    Idle,
}

#[derive(Debug, Clone)]
pub struct EgoDecision {
    pub action: EgoAction,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideReply {
    action: EgoAction,
    #[serde(default)]
    reason: Option<String>,
}

/// Post-cycle self-evaluation. The conservative default is what the
/// orchestrator falls back to when the evaluation session fails.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconsideration {
    pub outcome_matches_intent: bool,
    pub quality_score: f64,
    pub needs_reassessment: bool,
}

impl Default for Reconsideration {
    fn default() -> Self {
        Self {
            outcome_matches_intent: false,
            quality_score: 0.0,
            needs_reassessment: true,
        }
    }
}

pub struct Ego {
    launcher: Arc<dyn SessionLauncher>,
    prompts: Arc<dyn PromptBuilder>,
    classifier: TaskClassifier,
    reader: Arc<SubstrateReader>,
}

impl Ego {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        prompts: Arc<dyn PromptBuilder>,
        classifier: TaskClassifier,
        reader: Arc<SubstrateReader>,
    ) -> Self {
        Self {
            launcher,
            prompts,
            classifier,
            reader,
        }
    }

    /// Decide the next move. Parse failures never escape; they become an
    /// idle decision carrying the parser message.
    pub async fn decide(&self) -> EgoDecision {
        let mut ctx = PromptContext::for_operation(
            "decide",
            "Decide the next move. Reply with JSON: {\"action\": \"dispatch\" | \"update_plan\" | \"converse\" | \"idle\", \"reason\": \"...\"}",
        );
        if let Ok(snapshot) = self.reader.read(SubstrateFile::Plan).await {
            ctx = ctx.with_snippet(SubstrateFile::Plan, snapshot.markdown);
        }

        let request = self.prompts.build(Role::Ego, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("decide"),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        if !outcome.success {
            return EgoDecision {
                action: EgoAction::Idle,
                reason: outcome.error,
            };
        }
        match parse_payload::<DecideReply>(outcome.text()) {
            Ok(reply) => EgoDecision {
                action: reply.action,
                reason: reply.reason,
            },
            Err(e) => {
                debug!("decide reply unparseable: {e}");
                EgoDecision {
                    action: EgoAction::Idle,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    /// The first pending PLAN task. Deterministic: no session is opened,
    /// and the task id is the ordinal position within the Tasks section.
    pub async fn dispatch_next(&self) -> Result<Option<PlanTask>> {
        let snapshot = self.reader.read(SubstrateFile::Plan).await?;
        Ok(plan::first_pending(&snapshot.markdown))
    }

    /// Conversational flow: plain-text reply, no JSON schema.
    pub async fn respond_to_message(
        &self,
        message: &str,
        on_log: Option<LogCallback>,
        idle_timeout: Option<Duration>,
        injection: Option<Arc<InjectionChannel>>,
        cancel: Option<CancellationToken>,
    ) -> std::result::Result<String, String> {
        let mut ctx = PromptContext::for_operation(
            "respond",
            "Reply to the user message below in plain text.",
        )
        .with_user_message(message);
        for file in [SubstrateFile::Plan, SubstrateFile::Conversation] {
            if let Ok(snapshot) = self.reader.read(file).await {
                ctx = ctx.with_snippet(file, snapshot.markdown);
            }
        }

        let request = self.prompts.build(Role::Ego, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("respond"),
            on_log,
            idle_timeout,
            injection,
            cancel,
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        if !outcome.success {
            return Err(outcome
                .error
                .unwrap_or_else(|| "conversation session failed".to_string()));
        }
        let reply = outcome.text().trim().to_string();
        if reply.is_empty() {
            return Err("conversation session returned no text".to_string());
        }
        Ok(reply)
    }

    /// Bounded self-evaluation after a dispatched task. Errors are
    /// swallowed into the conservative default.
    pub async fn reconsider(&self, task: &PlanTask, summary: &str) -> Reconsideration {
        let ctx = PromptContext::for_operation(
            "reconsider",
            format!(
                "The task \"{}\" finished with summary: {summary}\n\
                 Evaluate the outcome. Reply with JSON: {{\"outcomeMatchesIntent\": bool, \"qualityScore\": 0..1, \"needsReassessment\": bool}}",
                task.title
            ),
        )
        .with_task(task.clone());

        let request = self.prompts.build(Role::Ego, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("reconsider"),
            timeout: Duration::from_secs(120),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        if !outcome.success {
            debug!("reconsideration session failed: {:?}", outcome.error);
            return Reconsideration::default();
        }
        parse_payload(outcome.text()).unwrap_or_else(|e| {
            debug!("reconsideration reply unparseable: {e}");
            Reconsideration::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{FileSystem, TokioFs};
    use crate::roles::StaticPromptBuilder;
    use crate::session::ScriptedLauncher;
    use crate::substrate::SubstrateLayout;

    async fn ego_with_plan(plan: &str) -> (tempfile::TempDir, Arc<ScriptedLauncher>, Ego) {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(TokioFs::new());
        let layout = SubstrateLayout::new(dir.path());
        fs.write(&layout.path_for(SubstrateFile::Plan), plan)
            .await
            .unwrap();
        let reader = Arc::new(SubstrateReader::new(fs, layout));
        let launcher = ScriptedLauncher::new();
        let ego = Ego::new(
            launcher.clone(),
            Arc::new(StaticPromptBuilder),
            TaskClassifier::new(None, None),
            reader,
        );
        (dir, launcher, ego)
    }

    #[tokio::test]
    async fn test_dispatch_next_is_deterministic() {
        let (_dir, launcher, ego) =
            ego_with_plan("# Plan\n\n## Tasks\n\n- [x] Task A\n- [ ] Task B\n").await;
        let task = ego.dispatch_next().await.unwrap().unwrap();
        assert_eq!(task.id, "task-2");
        // No session was consumed.
        assert!(launcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_decide_parses_action() {
        let (_dir, launcher, ego) = ego_with_plan("# Plan\n\n## Tasks\n\n- [ ] A\n").await;
        launcher.enqueue_result(r#"{"action": "dispatch", "reason": "work pending"}"#);
        let decision = ego.decide().await;
        assert_eq!(decision.action, EgoAction::Dispatch);
        assert_eq!(decision.reason.as_deref(), Some("work pending"));
    }

    #[tokio::test]
    async fn test_decide_downgrades_parse_failure_to_idle() {
        let (_dir, launcher, ego) = ego_with_plan("# Plan\n\n## Tasks\n\n").await;
        launcher.enqueue_result("no json here");
        let decision = ego.decide().await;
        assert_eq!(decision.action, EgoAction::Idle);
        assert!(decision.reason.unwrap().contains("parse"));
    }

    #[tokio::test]
    async fn test_reconsider_defaults_are_conservative() {
        let (_dir, launcher, ego) = ego_with_plan("# Plan\n\n## Tasks\n\n- [ ] A\n").await;
        launcher.enqueue_failure("session exploded");
        let task = PlanTask {
            ordinal: 1,
            id: "task-1".into(),
            title: "A".into(),
            done: false,
        };
        let rec = ego.reconsider(&task, "done").await;
        assert!(!rec.outcome_matches_intent);
        assert_eq!(rec.quality_score, 0.0);
        assert!(rec.needs_reassessment);
    }
}
