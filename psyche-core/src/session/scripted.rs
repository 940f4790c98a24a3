//! In-memory launcher implementing the same contract from pre-canned
//! sessions. Drives the test suites; also useful for dry-run demos.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::launcher::{LaunchOptions, SessionLauncher, SessionOutcome, SessionRequest};
use super::types::SessionMessage;

#[derive(Debug, Clone)]
pub struct ScriptedSession {
    /// Messages replayed through `on_log` before the outcome resolves.
    pub messages: Vec<SessionMessage>,
    pub outcome: SessionOutcome,
    /// Simulated session duration; lets tests overlap sessions.
    pub delay: Option<Duration>,
}

impl ScriptedSession {
    pub fn succeed(result: impl Into<String>) -> Self {
        let result = result.into();
        Self {
            messages: vec![SessionMessage::Result {
                result: Some(result.clone()),
                error: None,
                is_error: false,
            }],
            outcome: SessionOutcome {
                raw_output: result.clone(),
                exit_code: Some(0),
                duration_ms: 1,
                success: true,
                result: Some(result),
                error: None,
            },
            delay: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            messages: vec![SessionMessage::Result {
                result: None,
                error: Some(error.clone()),
                is_error: true,
            }],
            outcome: SessionOutcome {
                raw_output: String::new(),
                exit_code: Some(1),
                duration_ms: 1,
                success: false,
                result: None,
                error: Some(error),
            },
            delay: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<SessionMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

pub struct ScriptedLauncher {
    script: parking_lot::Mutex<VecDeque<ScriptedSession>>,
    requests: parking_lot::Mutex<Vec<SessionRequest>>,
    injected: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: parking_lot::Mutex::new(VecDeque::new()),
            requests: parking_lot::Mutex::new(Vec::new()),
            injected: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn enqueue(&self, session: ScriptedSession) {
        self.script.lock().push_back(session);
    }

    pub fn enqueue_result(&self, result: impl Into<String>) {
        self.enqueue(ScriptedSession::succeed(result));
    }

    pub fn enqueue_failure(&self, error: impl Into<String>) {
        self.enqueue(ScriptedSession::fail(error));
    }

    /// Every request launched so far, in order.
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().clone()
    }

    /// Every injected message observed by scripted sessions, in order.
    pub fn injected(&self) -> Vec<String> {
        self.injected.lock().clone()
    }

    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, request: SessionRequest, options: LaunchOptions) -> SessionOutcome {
        self.requests.lock().push(request);

        let session = self.script.lock().pop_front();
        let Some(session) = session else {
            return SessionOutcome::failure("no scripted session enqueued", 0);
        };

        if let Some(delay) = session.delay {
            tokio::time::sleep(delay).await;
        }

        // A scripted session observes whatever was queued for injection,
        // including messages queued before it started.
        if let Some(channel) = &options.injection {
            let mut injected = self.injected.lock();
            injected.extend(channel.drain());
        }

        if let Some(on_log) = &options.on_log {
            for message in &session.messages {
                for entry in message.log_entries() {
                    on_log(entry);
                }
            }
        }

        session.outcome
    }
}
