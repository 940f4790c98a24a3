//! Runtime event sink.
//!
//! Every event the orchestrator and its collaborators produce is wrapped in
//! a `{type, timestamp, data}` envelope and sent over a broadcast channel.
//! The WebSocket edge fans each envelope out to connected clients; internal
//! consumers subscribe the same way. Send errors (no receivers) are ignored.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::infra::Clock;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChanged,
    CycleComplete,
    Idle,
    Error,
    AuditComplete,
    IdleHandler,
    EvaluationRequested,
    ProcessOutput,
    ConversationMessage,
    ConversationResponse,
    TickStarted,
    TickComplete,
    MessageInjected,
    RestartRequested,
    BackupComplete,
    HealthCheckComplete,
    EmailSent,
    MetricsCollected,
    ReconsiderationComplete,
    AgoraMessage,
    FileChanged,
    ValidationComplete,
    AutonomyReminderInjected,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::StateChanged => "state_changed",
            EventType::CycleComplete => "cycle_complete",
            EventType::Idle => "idle",
            EventType::Error => "error",
            EventType::AuditComplete => "audit_complete",
            EventType::IdleHandler => "idle_handler",
            EventType::EvaluationRequested => "evaluation_requested",
            EventType::ProcessOutput => "process_output",
            EventType::ConversationMessage => "conversation_message",
            EventType::ConversationResponse => "conversation_response",
            EventType::TickStarted => "tick_started",
            EventType::TickComplete => "tick_complete",
            EventType::MessageInjected => "message_injected",
            EventType::RestartRequested => "restart_requested",
            EventType::BackupComplete => "backup_complete",
            EventType::HealthCheckComplete => "health_check_complete",
            EventType::EmailSent => "email_sent",
            EventType::MetricsCollected => "metrics_collected",
            EventType::ReconsiderationComplete => "reconsideration_complete",
            EventType::AgoraMessage => "agora_message",
            EventType::FileChanged => "file_changed",
            EventType::ValidationComplete => "validation_complete",
            EventType::AutonomyReminderInjected => "autonomy_reminder_injected",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeEvent {
    #[serde(rename = "type")]
    pub event: EventType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub data: serde_json::Value,
}

pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, clock }
    }

    pub fn emit(&self, event: EventType, data: serde_json::Value) {
        debug!("event {event}: {data}");
        let envelope = RuntimeEvent {
            event,
            timestamp: self.clock.now(),
            data,
        };
        // No receivers is fine.
        let _ = self.sender.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }
}
