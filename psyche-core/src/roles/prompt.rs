//! Prompt composition seam.
//!
//! Prompt construction proper lives outside the core; the orchestrator and
//! role shims only depend on this trait. The static builder composes a
//! role preamble, substrate snippets, and the operation instruction into a
//! session request.

use super::Role;
use crate::session::SessionRequest;
use crate::substrate::plan::PlanTask;
use crate::substrate::SubstrateFile;

#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub operation: String,
    pub instruction: String,
    pub task: Option<PlanTask>,
    /// Substrate excerpts included in the system prompt.
    pub snippets: Vec<(SubstrateFile, String)>,
    pub user_message: Option<String>,
}

impl PromptContext {
    pub fn for_operation(operation: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: PlanTask) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_snippet(mut self, file: SubstrateFile, content: impl Into<String>) -> Self {
        self.snippets.push((file, content.into()));
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }
}

pub trait PromptBuilder: Send + Sync {
    fn build(&self, role: Role, ctx: &PromptContext) -> SessionRequest;
}

/// Default builder: fixed role preambles plus whatever the context carries.
pub struct StaticPromptBuilder;

impl StaticPromptBuilder {
    fn preamble(role: Role) -> &'static str {
        match role {
            Role::Ego => "You are EGO, the deciding voice of this agent. You choose what happens next.",
            Role::Subconscious => "You are SUBCONSCIOUS, the executing voice of this agent. You carry out one task and report structured results.",
            Role::Superego => "You are SUPEREGO, the governing voice of this agent. You audit the substrate and evaluate proposals.",
            Role::Id => "You are ID, the driving voice of this agent. You surface goals when the plan runs dry.",
            Role::System => "You are part of this agent's runtime.",
        }
    }
}

impl PromptBuilder for StaticPromptBuilder {
    fn build(&self, role: Role, ctx: &PromptContext) -> SessionRequest {
        let mut system_prompt = String::from(Self::preamble(role));
        for (file, content) in &ctx.snippets {
            system_prompt.push_str(&format!("\n\n## {file}\n\n{content}"));
        }

        let mut user_message = ctx.instruction.clone();
        if let Some(task) = &ctx.task {
            user_message.push_str(&format!("\n\nTask ({}): {}", task.id, task.title));
        }
        if let Some(message) = &ctx.user_message {
            user_message.push_str(&format!("\n\nUser message:\n{message}"));
        }

        SessionRequest {
            system_prompt,
            user_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_role_and_context() {
        let builder = StaticPromptBuilder;
        let ctx = PromptContext::for_operation("execute", "Execute the task below.")
            .with_task(PlanTask {
                ordinal: 1,
                id: "task-1".into(),
                title: "Task A".into(),
                done: false,
            })
            .with_snippet(SubstrateFile::Skills, "# Skills\n\n- writing\n");

        let request = builder.build(Role::Subconscious, &ctx);
        assert!(request.system_prompt.contains("SUBCONSCIOUS"));
        assert!(request.system_prompt.contains("## SKILLS"));
        assert!(request.user_message.contains("task-1"));
        assert!(request.user_message.contains("Task A"));
    }
}
