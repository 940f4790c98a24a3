//! Structural health checks over the substrate and the loop.
//!
//! Feeds `/api/health` and `/api/health/critical`; the critical view only
//! considers checks the runtime cannot operate without.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::MaintenanceScheduler;
use crate::error::Result;
use crate::events::{EventBus, EventType};
use crate::infra::FileSystem;
use crate::orchestrator::Orchestrator;
use crate::substrate::{validate, SubstrateFile, SubstrateLayout};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub healthy: bool,
    pub critical: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub critical_healthy: bool,
    pub checks: Vec<HealthCheck>,
    pub timestamp: DateTime<Utc>,
}

pub struct HealthMonitor {
    fs: Arc<dyn FileSystem>,
    layout: SubstrateLayout,
    orchestrator: Arc<Orchestrator>,
    events: Arc<EventBus>,
}

impl HealthMonitor {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: SubstrateLayout,
        orchestrator: Arc<Orchestrator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            fs,
            layout,
            orchestrator,
            events,
        }
    }

    pub async fn report(&self, now: DateTime<Utc>) -> HealthReport {
        let mut checks = Vec::new();

        let root_ok = self.fs.exists(self.layout.root()).await;
        checks.push(HealthCheck {
            name: "substrate_root".to_string(),
            healthy: root_ok,
            critical: true,
            detail: self.layout.root().display().to_string(),
        });

        let mut valid = 0usize;
        let mut invalid = Vec::new();
        for file in SubstrateFile::ALL {
            match self.fs.read_to_string(&self.layout.path_for(file)).await {
                Ok(content) => match validate::validate(file, &content) {
                    Ok(()) => valid += 1,
                    Err(reason) => invalid.push(format!("{file}: {reason}")),
                },
                Err(e) => invalid.push(format!("{file}: {e}")),
            }
        }
        checks.push(HealthCheck {
            name: "substrate_files".to_string(),
            healthy: invalid.is_empty(),
            critical: true,
            detail: if invalid.is_empty() {
                format!("{valid} files valid")
            } else {
                invalid.join("; ")
            },
        });
        self.events.emit(
            EventType::ValidationComplete,
            json!({ "valid": valid, "invalid": invalid.len() }),
        );

        let metrics = self.orchestrator.metrics();
        checks.push(HealthCheck {
            name: "metrics_consistent".to_string(),
            healthy: metrics.is_consistent(),
            critical: false,
            detail: format!(
                "total={} successful={} failed={} idle={}",
                metrics.total, metrics.successful, metrics.failed, metrics.idle
            ),
        });

        checks.push(HealthCheck {
            name: "loop_state".to_string(),
            healthy: true,
            critical: false,
            detail: self.orchestrator.state().to_string(),
        });

        HealthReport {
            healthy: checks.iter().all(|c| c.healthy),
            critical_healthy: checks.iter().filter(|c| c.critical).all(|c| c.healthy),
            checks,
            timestamp: now,
        }
    }
}

#[async_trait]
impl MaintenanceScheduler for HealthMonitor {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn on_tick(&self, now: DateTime<Utc>) -> Result<()> {
        let report = self.report(now).await;
        self.events.emit(
            EventType::HealthCheckComplete,
            json!({ "healthy": report.healthy, "criticalHealthy": report.critical_healthy }),
        );
        self.events.emit(
            EventType::MetricsCollected,
            serde_json::to_value(self.orchestrator.metrics()).unwrap_or_default(),
        );
        Ok(())
    }
}
