//! Superego - the governing voice. Audits the substrate and passes
//! judgement on proposals from the subconscious.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::extract::parse_payload;
use super::prompt::{PromptBuilder, PromptContext};
use super::subconscious::Proposal;
use super::{Role, TaskClassifier};
use crate::reports::ReportStore;
use crate::session::{LaunchOptions, SessionLauncher};
use crate::substrate::{SubstrateFile, SubstrateReader};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalEvaluation {
    /// The proposal content being judged.
    pub proposal: String,
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub proposal_evaluations: Vec<ProposalEvaluation>,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct EvaluationsReply {
    #[serde(default)]
    evaluations: Vec<ProposalEvaluation>,
}

pub struct Superego {
    launcher: Arc<dyn SessionLauncher>,
    prompts: Arc<dyn PromptBuilder>,
    classifier: TaskClassifier,
    reader: Arc<SubstrateReader>,
    reports: Arc<ReportStore>,
}

impl Superego {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        prompts: Arc<dyn PromptBuilder>,
        classifier: TaskClassifier,
        reader: Arc<SubstrateReader>,
        reports: Arc<ReportStore>,
    ) -> Self {
        Self {
            launcher,
            prompts,
            classifier,
            reader,
            reports,
        }
    }

    /// Run a governance audit and persist the report. The caller decides
    /// what a failure means; the loop never aborts on one.
    pub async fn audit(&self) -> Result<AuditReport, String> {
        let mut ctx = PromptContext::for_operation(
            "audit",
            "Audit the substrate for integrity, drift, and value alignment. Reply with JSON: {\"findings\": [\"...\"], \"proposalEvaluations\": [], \"summary\": \"...\"}",
        );
        for file in [
            SubstrateFile::Plan,
            SubstrateFile::Values,
            SubstrateFile::Security,
            SubstrateFile::Superego,
        ] {
            if let Ok(snapshot) = self.reader.read(file).await {
                ctx = ctx.with_snippet(file, snapshot.markdown);
            }
        }

        let request = self.prompts.build(Role::Superego, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("audit"),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        if !outcome.success {
            return Err(outcome
                .error
                .unwrap_or_else(|| "audit session failed".to_string()));
        }
        let report: AuditReport =
            parse_payload(outcome.text()).map_err(|e| e.to_string())?;

        if let Err(e) = self.reports.store(&report).await {
            warn!("audit report not persisted: {e}");
        }
        Ok(report)
    }

    /// Judge each proposal. Conservative on failure: anything the session
    /// did not explicitly approve is rejected.
    pub async fn evaluate_proposals(&self, proposals: &[Proposal]) -> Vec<ProposalEvaluation> {
        if proposals.is_empty() {
            return Vec::new();
        }

        let listing = proposals
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. [{:?}] {}", i + 1, p.kind, p.content))
            .collect::<Vec<_>>()
            .join("\n");
        let ctx = PromptContext::for_operation(
            "evaluate_proposals",
            format!(
                "Evaluate these proposals against the agent's values:\n{listing}\n\
                 Reply with JSON: {{\"evaluations\": [{{\"proposal\": \"...\", \"approved\": bool, \"reason\": \"...\"}}]}}"
            ),
        );

        let request = self.prompts.build(Role::Superego, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("evaluate_proposals"),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        let reject_all = |reason: String| {
            proposals
                .iter()
                .map(|p| ProposalEvaluation {
                    proposal: p.content.clone(),
                    approved: false,
                    reason: Some(reason.clone()),
                })
                .collect::<Vec<_>>()
        };

        if !outcome.success {
            return reject_all(
                outcome
                    .error
                    .unwrap_or_else(|| "evaluation session failed".to_string()),
            );
        }
        match parse_payload::<EvaluationsReply>(outcome.text()) {
            Ok(reply) => {
                // Proposals the session skipped are rejected, not assumed.
                let mut evaluations = reply.evaluations;
                for proposal in proposals.iter().skip(evaluations.len()) {
                    evaluations.push(ProposalEvaluation {
                        proposal: proposal.content.clone(),
                        approved: false,
                        reason: Some("not evaluated".to_string()),
                    });
                }
                evaluations
            }
            Err(e) => reject_all(format!("failed to parse evaluations: {e}")),
        }
    }
}
