//! Loop state machine.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopState {
    Stopped,
    Running,
    Paused,
    Sleeping,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Stopped => "STOPPED",
            LoopState::Running => "RUNNING",
            LoopState::Paused => "PAUSED",
            LoopState::Sleeping => "SLEEPING",
        }
    }

    /// The transition diagram. Everything not listed is rejected,
    /// including self-transitions.
    pub fn can_transition(self, to: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, to),
            (Stopped, Running)
                | (Stopped, Sleeping)
                | (Running, Paused)
                | (Running, Stopped)
                | (Running, Sleeping)
                | (Paused, Running)
                | (Paused, Stopped)
                | (Sleeping, Running)
                | (Sleeping, Stopped)
        )
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
