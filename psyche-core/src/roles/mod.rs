//! Agent roles, the role/file permission matrix, and model-tier routing.
//!
//! Four LLM-backed roles plus SYSTEM for runtime-originated writes. The
//! permission matrix is a static enum-keyed table consulted before every
//! substrate mutation; a denied operation surfaces `PermissionDenied` and
//! nothing is written.

pub mod ego;
pub mod extract;
pub mod id;
pub mod prompt;
pub mod subconscious;
pub mod superego;

use serde::{Deserialize, Serialize};

use crate::error::{PsycheError, Result};
use crate::substrate::SubstrateFile;

pub use ego::{Ego, EgoAction, EgoDecision, Reconsideration};
pub use id::{DriveSet, IdRole};
pub use prompt::{PromptBuilder, PromptContext, StaticPromptBuilder};
pub use subconscious::{ExecOutcome, Execution, Proposal, ProposalKind, Subconscious};
pub use superego::{AuditReport, ProposalEvaluation, Superego};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Ego,
    Subconscious,
    Superego,
    Id,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Ego => "EGO",
            Role::Subconscious => "SUBCONSCIOUS",
            Role::Superego => "SUPEREGO",
            Role::Id => "ID",
            Role::System => "SYSTEM",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Write,
    Append,
}

impl FileOp {
    fn as_str(self) -> &'static str {
        match self {
            FileOp::Read => "read",
            FileOp::Write => "write",
            FileOp::Append => "append",
        }
    }
}

/// The static permission table. Reads are unrestricted; writes and appends
/// are scoped to the roles that own the file.
pub fn permitted(role: Role, file: SubstrateFile, op: FileOp) -> bool {
    use SubstrateFile as F;

    match op {
        FileOp::Read => true,
        FileOp::Append => match file {
            F::Progress => true,
            // Governance and drives observe the conversation; they do not
            // speak in it.
            F::Conversation => matches!(role, Role::Ego | Role::Subconscious | Role::System),
            _ => false,
        },
        FileOp::Write => match file {
            F::Plan => matches!(
                role,
                Role::Ego | Role::Subconscious | Role::Id | Role::System
            ),
            F::Memory | F::Skills | F::Habits => {
                matches!(role, Role::Subconscious | Role::System)
            }
            F::Values | F::Charter => matches!(role, Role::System),
            F::Id => matches!(role, Role::Id | Role::System),
            F::Security | F::Superego => matches!(role, Role::Superego | Role::System),
            F::RestartContext => matches!(role, Role::System),
            F::Progress | F::Conversation => false,
        },
    }
}

/// Permission check that fails with the taxonomy error.
pub fn ensure_permitted(role: Role, file: SubstrateFile, op: FileOp) -> Result<()> {
    if permitted(role, file, op) {
        Ok(())
    } else {
        Err(PsycheError::PermissionDenied {
            role: role.as_str(),
            op: op.as_str(),
            file: file.name(),
        })
    }
}

// ─── Model tiers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Strategic,
    Tactical,
}

/// Maps operation names to model tiers. Deciding, auditing, and drive
/// generation get the strategic model; execution and conversation run on
/// the tactical one.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    strategic_model: Option<String>,
    tactical_model: Option<String>,
}

impl TaskClassifier {
    pub fn new(strategic_model: Option<String>, tactical_model: Option<String>) -> Self {
        Self {
            strategic_model,
            tactical_model,
        }
    }

    pub fn tier_for(operation: &str) -> ModelTier {
        match operation {
            "decide" | "audit" | "evaluate_proposals" | "generate_drives" | "reconsider" => {
                ModelTier::Strategic
            }
            _ => ModelTier::Tactical,
        }
    }

    pub fn model_for(&self, operation: &str) -> Option<String> {
        match Self::tier_for(operation) {
            ModelTier::Strategic => self.strategic_model.clone(),
            ModelTier::Tactical => self.tactical_model.clone(),
        }
    }
}
