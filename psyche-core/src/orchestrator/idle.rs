//! Idle handling: what happens when the loop keeps finding nothing to do.
//!
//! The default handler asks Id for goal candidates, has Superego judge
//! them, and rebuilds the plan from whatever was approved.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::infra::Clock;
use crate::roles::subconscious::{Proposal, ProposalKind};
use crate::roles::{IdRole, Superego};
use crate::substrate::plan;
use crate::substrate::{SubstrateFile, SubstrateWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleOutcome {
    NotIdle,
    PlanCreated,
    NoGoals,
    AllRejected,
}

#[async_trait]
pub trait IdleHandler: Send + Sync {
    async fn on_idle(&self) -> IdleOutcome;
}

/// Drive-based default: Id surfaces goals, Superego filters them, approved
/// goals become a fresh plan with `[ID-generated]` task suffixes.
pub struct DriveIdleHandler {
    id: Arc<IdRole>,
    superego: Arc<Superego>,
    writer: Arc<SubstrateWriter>,
    clock: Arc<dyn Clock>,
}

impl DriveIdleHandler {
    pub fn new(
        id: Arc<IdRole>,
        superego: Arc<Superego>,
        writer: Arc<SubstrateWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            superego,
            writer,
            clock,
        }
    }
}

#[async_trait]
impl IdleHandler for DriveIdleHandler {
    async fn on_idle(&self) -> IdleOutcome {
        match self.id.detect_idle().await {
            Ok(true) => {}
            Ok(false) => return IdleOutcome::NotIdle,
            Err(e) => {
                warn!("idle detection failed: {e}");
                return IdleOutcome::NotIdle;
            }
        }

        let drives = match self.id.generate_drives().await {
            Ok(drives) => drives,
            Err(e) => {
                warn!("drive generation failed: {e}");
                return IdleOutcome::NoGoals;
            }
        };
        if drives.goal_candidates.is_empty() {
            return IdleOutcome::NoGoals;
        }

        let proposals: Vec<Proposal> = drives
            .goal_candidates
            .iter()
            .map(|goal| Proposal {
                kind: ProposalKind::Goal,
                content: goal.clone(),
                rationale: None,
            })
            .collect();
        let evaluations = self.superego.evaluate_proposals(&proposals).await;
        let approved: Vec<&str> = evaluations
            .iter()
            .filter(|e| e.approved)
            .map(|e| e.proposal.as_str())
            .collect();
        if approved.is_empty() {
            return IdleOutcome::AllRejected;
        }

        let today = self.clock.now().date_naive();
        let mut doc = String::from("# Plan\n\nGenerated from internal drives.\n\n## Tasks\n\n");
        for goal in &approved {
            doc.push_str(&plan::generated_task_line(goal, today));
            doc.push('\n');
        }

        match self.writer.write(SubstrateFile::Plan, &doc).await {
            Ok(()) => {
                info!("Idle handler created a plan with {} task(s)", approved.len());
                IdleOutcome::PlanCreated
            }
            Err(e) => {
                warn!("idle handler could not write the plan: {e}");
                IdleOutcome::NoGoals
            }
        }
    }
}
