//! Id - the driving voice. Detects a dry plan and surfaces goal
//! candidates to refill it.

use std::sync::Arc;

use serde::Deserialize;

use super::extract::parse_payload;
use super::prompt::{PromptBuilder, PromptContext};
use super::{Role, TaskClassifier};
use crate::error::Result;
use crate::session::{LaunchOptions, SessionLauncher};
use crate::substrate::plan;
use crate::substrate::{SubstrateFile, SubstrateReader};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveSet {
    #[serde(default)]
    pub goal_candidates: Vec<String>,
}

pub struct IdRole {
    launcher: Arc<dyn SessionLauncher>,
    prompts: Arc<dyn PromptBuilder>,
    classifier: TaskClassifier,
    reader: Arc<SubstrateReader>,
}

impl IdRole {
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

    /// Deterministic: idle means the plan has no pending tasks. No session.
    pub async fn detect_idle(&self) -> Result<bool> {
        let snapshot = self.reader.read(SubstrateFile::Plan).await?;
        Ok(!plan::has_pending(&snapshot.markdown))
    }

    pub async fn generate_drives(&self) -> std::result::Result<DriveSet, String> {
        let mut ctx = PromptContext::for_operation(
            "generate_drives",
            "The plan has run dry. Surface goal candidates worth pursuing. Reply with JSON: {\"goalCandidates\": [\"...\"]}",
        );
        for file in [SubstrateFile::Id, SubstrateFile::Values, SubstrateFile::Memory] {
            if let Ok(snapshot) = self.reader.read(file).await {
                ctx = ctx.with_snippet(file, snapshot.markdown);
            }
        }

        let request = self.prompts.build(Role::Id, &ctx);
        let options = LaunchOptions {
            model: self.classifier.model_for("generate_drives"),
            ..Default::default()
        };
        let outcome = self.launcher.launch(request, options).await;

        if !outcome.success {
            return Err(outcome
                .error
                .unwrap_or_else(|| "drive session failed".to_string()));
        }
        parse_payload(outcome.text()).map_err(|e| e.to_string())
    }
}
