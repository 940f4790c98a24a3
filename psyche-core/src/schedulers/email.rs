//! Email digest scheduler.
//!
//! Composes a digest from the PROGRESS tail and hands it to a transport.
//! Delivery itself is peripheral; the default transport just logs.
//! `config/email-scheduler-state.json` persists cadence state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::MaintenanceScheduler;
use crate::error::{PsycheError, Result};
use crate::events::{EventBus, EventType};
use crate::infra::FileSystem;
use crate::substrate::{SubstrateFile, SubstrateLayout};

const DIGEST_LINES: usize = 40;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSchedulerState {
    pub last_email_time: Option<DateTime<Utc>>,
    pub emails_sent: u64,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Default transport: logs the digest instead of delivering it.
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(
            "Email digest for {recipient}: {subject} ({} chars)",
            body.len()
        );
        Ok(())
    }
}

pub struct EmailScheduler {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    transport: Arc<dyn EmailTransport>,
    recipient: String,
    interval: Duration,
    events: Arc<EventBus>,
}

impl EmailScheduler {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: SubstrateLayout,
        transport: Arc<dyn EmailTransport>,
        recipient: String,
        interval: Duration,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            fs,
            layout,
            transport,
            recipient,
            interval,
            events,
        }
    }

    fn state_path(&self) -> std::path::PathBuf {
        self.layout.config_dir().join("email-scheduler-state.json")
    }

    pub async fn load_state(&self) -> EmailSchedulerState {
        match self.fs.read_to_string(&self.state_path()).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => EmailSchedulerState::default(),
        }
    }

    async fn save_state(&self, state: &EmailSchedulerState) -> Result<()> {
        self.fs.create_dir_all(&self.layout.config_dir()).await?;
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| PsycheError::Parse(e.to_string()))?;
        self.fs.write(&self.state_path(), &raw).await
    }

    async fn compose_digest(&self) -> String {
        let progress = self
            .fs
            .read_to_string(&self.layout.path_for(SubstrateFile::Progress))
            .await
            .unwrap_or_default();
        let lines: Vec<&str> = progress.lines().collect();
        let tail_from = lines.len().saturating_sub(DIGEST_LINES);
        lines[tail_from..].join("\n")
    }
}

#[async_trait]
impl MaintenanceScheduler for EmailScheduler {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn on_tick(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.load_state().await;
        let due = match state.last_email_time {
            Some(last) => now - last >= self.interval,
            None => true,
        };
        if !due {
            return Ok(());
        }

        let body = self.compose_digest().await;
        let subject = format!("Agent digest {}", now.format("%Y-%m-%d"));
        self.transport
            .send(&self.recipient, &subject, &body)
            .await?;

        state.last_email_time = Some(now);
        state.emails_sent += 1;
        self.save_state(&state).await?;

        self.events.emit(
            EventType::EmailSent,
            json!({ "recipient": self.recipient, "emailsSent": state.emails_sent }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{SystemClock, TokioFs};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_state_roundtrip_and_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(TokioFs::new());
        let layout = SubstrateLayout::new(dir.path());
        fs.create_dir_all(layout.root()).await.unwrap();
        let events = Arc::new(EventBus::new(Arc::new(SystemClock)));
        let scheduler = EmailScheduler::new(
            fs.clone(),
            layout.clone(),
            Arc::new(LogEmailTransport),
            "keeper@example.org".to_string(),
            Duration::hours(24),
            events,
        );

        let now = Utc.with_ymd_and_hms(2026, 2, 15, 9, 0, 0).unwrap();
        scheduler.on_tick(now).await.unwrap();

        let state = scheduler.load_state().await;
        assert_eq!(state.emails_sent, 1);
        assert_eq!(state.last_email_time, Some(now));

        // Within the interval nothing new is sent.
        scheduler.on_tick(now + Duration::hours(1)).await.unwrap();
        assert_eq!(scheduler.load_state().await.emails_sent, 1);

        scheduler.on_tick(now + Duration::hours(25)).await.unwrap();
        assert_eq!(scheduler.load_state().await.emails_sent, 2);
    }

    #[test]
    fn test_state_wire_format() {
        let state = EmailSchedulerState {
            last_email_time: None,
            emails_sent: 3,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("lastEmailTime").is_some());
        assert!(json.get("emailsSent").is_some());
    }
}
