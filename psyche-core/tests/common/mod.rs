//! Shared fixture: a full runtime stack over a temp substrate, a fixed
//! clock, and a scripted launcher.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use psyche_core::conversation::{ConversationCompactor, ConversationManager};
use psyche_core::events::{EventBus, EventType, RuntimeEvent};
use psyche_core::infra::{FileLockRegistry, FileSystem, FixedClock, LoopTimer, TokioFs};
use psyche_core::orchestrator::{Orchestrator, OrchestratorConfig, RoleSet};
use psyche_core::ratelimit::RateLimitStateManager;
use psyche_core::reports::ReportStore;
use psyche_core::roles::{
    Ego, IdRole, PromptBuilder, StaticPromptBuilder, Subconscious, Superego, TaskClassifier,
};
use psyche_core::session::{InjectionChannel, ScriptedLauncher, SessionLauncher};
use psyche_core::substrate::{
    SubstrateAppender, SubstrateFile, SubstrateLayout, SubstrateReader, SubstrateWriter,
};

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub fs: Arc<dyn FileSystem>,
    pub layout: SubstrateLayout,
    pub clock: Arc<FixedClock>,
    pub launcher: Arc<ScriptedLauncher>,
    pub events: Arc<EventBus>,
    pub injection: Arc<InjectionChannel>,
    pub conversation: Arc<ConversationManager>,
    pub rate_limits: Arc<RateLimitStateManager>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap()
}

/// Fast loop settings for tests; audits and reminders are opt-in.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        cycle_delay: Duration::from_millis(1),
        max_consecutive_idle: 3,
        superego_audit_interval: 0,
        autonomy_reminder_interval: 0,
        conversation_idle_timeout: Duration::from_secs(1),
        conversation_max_duration: Duration::from_secs(2),
        ..Default::default()
    }
}

pub async fn fixture(plan: &str) -> Fixture {
    fixture_full(test_config(), plan, None).await
}

pub async fn fixture_with(config: OrchestratorConfig, plan: &str) -> Fixture {
    fixture_full(config, plan, None).await
}

pub async fn fixture_full(
    config: OrchestratorConfig,
    plan: &str,
    idle_handler: Option<Arc<dyn psyche_core::orchestrator::IdleHandler>>,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(TokioFs::new());
    let layout = SubstrateLayout::new(dir.path());
    let clock = Arc::new(FixedClock::at(start_instant()));

    fs.write(&layout.path_for(SubstrateFile::Plan), plan)
        .await
        .unwrap();
    for (file, seed) in [
        (SubstrateFile::Memory, "# Memory\n\n"),
        (SubstrateFile::Skills, "# Skills\n\n"),
        (SubstrateFile::Values, "# Values\n\n"),
        (SubstrateFile::Id, "# Id\n\n"),
        (SubstrateFile::Security, "# Security\n\n"),
        (SubstrateFile::Superego, "# Superego\n\n"),
        (
            SubstrateFile::RestartContext,
            "# Restart Context\n\nNo hibernation in progress.\n",
        ),
    ] {
        fs.write(&layout.path_for(file), seed).await.unwrap();
    }

    let events = Arc::new(EventBus::new(clock.clone()));
    let locks = Arc::new(FileLockRegistry::new());
    let reader = Arc::new(SubstrateReader::new(fs.clone(), layout.clone()));
    let writer = Arc::new(SubstrateWriter::new(
        fs.clone(),
        layout.clone(),
        locks.clone(),
        reader.clone(),
    ));
    let appender = Arc::new(SubstrateAppender::new(
        fs.clone(),
        layout.clone(),
        locks.clone(),
        reader.clone(),
        clock.clone(),
    ));

    let launcher = ScriptedLauncher::new();
    let launcher_dyn: Arc<dyn SessionLauncher> = launcher.clone();
    let prompts: Arc<dyn PromptBuilder> = Arc::new(StaticPromptBuilder);
    let classifier = TaskClassifier::new(None, None);

    let compactor = ConversationCompactor::new(launcher_dyn.clone(), prompts.clone(), None);
    let conversation = Arc::new(ConversationManager::new(
        fs.clone(),
        layout.clone(),
        locks.clone(),
        reader.clone(),
        appender.clone(),
        clock.clone(),
        compactor,
        None,
    ));

    let reports = Arc::new(ReportStore::new(fs.clone(), layout.clone(), clock.clone()));
    let ego = Arc::new(Ego::new(
        launcher_dyn.clone(),
        prompts.clone(),
        classifier.clone(),
        reader.clone(),
    ));
    let subconscious = Arc::new(Subconscious::new(
        launcher_dyn.clone(),
        prompts.clone(),
        classifier.clone(),
        reader.clone(),
        writer.clone(),
        appender.clone(),
        conversation.clone(),
    ));
    let superego = Arc::new(Superego::new(
        launcher_dyn.clone(),
        prompts.clone(),
        classifier.clone(),
        reader.clone(),
        reports,
    ));
    let id = Arc::new(IdRole::new(
        launcher_dyn.clone(),
        prompts.clone(),
        classifier,
        reader.clone(),
    ));

    let rate_limits = Arc::new(RateLimitStateManager::new(
        reader,
        writer,
        appender,
        clock.clone(),
    ));

    let injection = Arc::new(InjectionChannel::new());
    let mut orchestrator = Orchestrator::new(
        config,
        clock.clone(),
        events.clone(),
        Arc::new(LoopTimer::new()),
        RoleSet {
            ego,
            subconscious,
            superego,
            id,
        },
        conversation.clone(),
        rate_limits.clone(),
        launcher_dyn,
        prompts,
        injection.clone(),
    );
    if let Some(handler) = idle_handler {
        orchestrator = orchestrator.with_idle_handler(handler);
    }
    let orchestrator = Arc::new(orchestrator);

    Fixture {
        dir,
        fs,
        layout,
        clock,
        launcher,
        events,
        injection,
        conversation,
        rate_limits,
        orchestrator,
    }
}

impl Fixture {
    pub async fn substrate(&self, file: SubstrateFile) -> String {
        self.fs
            .read_to_string(&self.layout.path_for(file))
            .await
            .unwrap_or_default()
    }
}

/// Drain everything currently buffered on an event receiver.
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<RuntimeEvent>,
) -> Vec<RuntimeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_events(events: &[RuntimeEvent], kind: EventType) -> usize {
    events.iter().filter(|e| e.event == kind).count()
}
