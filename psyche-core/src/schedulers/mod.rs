//! Supporting schedulers: backup, email digest, health checks.
//!
//! Each receives clock ticks from one runtime task and decides on its own
//! cadence whether work is due. Scheduler internals are peripheral; the
//! orchestrator only observes their events.

pub mod backup;
pub mod email;
pub mod health;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Result;
use crate::infra::Clock;

pub use backup::BackupScheduler;
pub use email::{EmailScheduler, EmailSchedulerState, EmailTransport, LogEmailTransport};
pub use health::{HealthCheck, HealthMonitor, HealthReport};

#[async_trait]
pub trait MaintenanceScheduler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn on_tick(&self, now: DateTime<Utc>) -> Result<()>;
}

/// Drive all schedulers from one interval task. Errors are logged and the
/// ticking continues; a broken scheduler never takes the runtime down.
pub fn spawn_scheduler_ticks(
    schedulers: Vec<Arc<dyn MaintenanceScheduler>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    info!("Starting scheduler ticks for {} scheduler(s)", schedulers.len());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so schedulers do not
        // run before startup has settled.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = clock.now();
            for scheduler in &schedulers {
                if let Err(e) = scheduler.on_tick(now).await {
                    error!("Tick error in '{}': {e}", scheduler.name());
                }
            }
        }
    })
}
