//! End-to-end cycle loop behavior: dispatch, idle exhaustion, audits,
//! reminders, and the metrics identity.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{count_events, drain_events, fixture, fixture_with, test_config};
use psyche_core::events::EventType;
use psyche_core::orchestrator::{CycleAction, IdleHandler, IdleOutcome, LoopState, OrchestratorConfig};
use psyche_core::substrate::SubstrateFile;

const EXEC_SUCCESS: &str = r#"{"result":"success","summary":"Done","progressEntry":"Did A","skillUpdates":null,"proposals":[]}"#;
const RECONSIDER_OK: &str =
    r#"{"outcomeMatchesIntent":true,"qualityScore":0.9,"needsReassessment":false}"#;

#[tokio::test]
async fn test_dispatch_marks_task_complete() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [ ] Task A\n- [ ] Task B\n").await;
    f.launcher.enqueue_result(EXEC_SUCCESS);
    f.launcher.enqueue_result(RECONSIDER_OK);

    f.orchestrator.start().unwrap();
    let result = f.orchestrator.run_one_cycle().await;

    assert_eq!(result.action, CycleAction::Dispatch);
    assert_eq!(result.task_id.as_deref(), Some("task-1"));
    assert!(result.success);
    assert_eq!(result.summary, "Done");

    let plan = f.substrate(SubstrateFile::Plan).await;
    assert!(plan.contains("- [x] Task A"));
    assert!(plan.contains("- [ ] Task B"));

    let progress = f.substrate(SubstrateFile::Progress).await;
    assert!(progress.contains("[SUBCONSCIOUS] Did A"));

    let conversation = f.substrate(SubstrateFile::Conversation).await;
    assert!(conversation.contains("[SUBCONSCIOUS] Done"));

    let metrics = f.orchestrator.metrics();
    assert_eq!(metrics.total, 1);
    assert_eq!(metrics.successful, 1);
    assert!(metrics.is_consistent());
}

#[tokio::test]
async fn test_idle_exhaustion_stops_the_loop() {
    let config = OrchestratorConfig {
        max_consecutive_idle: 1,
        ..test_config()
    };
    let f = fixture_with(config, "# Plan\n\n## Tasks\n\n- [x] Task A\n").await;

    f.orchestrator.start().unwrap();
    f.orchestrator.run_loop().await;

    assert_eq!(f.orchestrator.state(), LoopState::Stopped);
    let metrics = f.orchestrator.metrics();
    assert_eq!(metrics.idle, 1);
    assert_eq!(metrics.total, 1);
    assert!(metrics.is_consistent());
    // No session was ever opened.
    assert!(f.launcher.requests().is_empty());
}

#[tokio::test]
async fn test_audit_interval_fires_exactly_once() {
    let config = OrchestratorConfig {
        superego_audit_interval: 3,
        max_consecutive_idle: 3,
        ..test_config()
    };
    let f = fixture_with(config, "# Plan\n\n## Tasks\n\n- [x] Task A\n").await;
    f.launcher
        .enqueue_result(r#"{"findings":[],"proposalEvaluations":[],"summary":"All sound"}"#);

    let mut rx = f.events.subscribe();
    f.orchestrator.start().unwrap();
    f.orchestrator.run_loop().await;

    // The audit is fire-and-forget; give the spawned task a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let metrics = f.orchestrator.metrics();
    assert_eq!(metrics.audits, 1);
    assert_eq!(metrics.idle, 3);

    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::AuditComplete), 1);
}

#[tokio::test]
async fn test_failed_execution_counts_as_failure() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [ ] Task A\n").await;
    f.launcher.enqueue_failure("tooling broke");

    let result = f.orchestrator.run_one_cycle().await;
    assert!(!result.success);
    assert_eq!(result.summary, "tooling broke");

    // Task is untouched and the failure is logged to the conversation.
    let plan = f.substrate(SubstrateFile::Plan).await;
    assert!(plan.contains("- [ ] Task A"));
    let conversation = f.substrate(SubstrateFile::Conversation).await;
    assert!(conversation.contains("Task task-1 failed"));

    let metrics = f.orchestrator.metrics();
    assert_eq!(metrics.failed, 1);
    assert!(metrics.is_consistent());
}

#[tokio::test]
async fn test_proposals_route_through_superego() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [ ] Task A\n").await;
    f.launcher.enqueue_result(
        r#"{"result":"success","summary":"Done","progressEntry":"entry","proposals":[{"kind":"memory","content":"remember the docs layout"}]}"#,
    );
    f.launcher.enqueue_result(
        r#"{"evaluations":[{"proposal":"remember the docs layout","approved":true,"reason":"useful"}]}"#,
    );
    f.launcher.enqueue_result(RECONSIDER_OK);

    let mut rx = f.events.subscribe();
    let result = f.orchestrator.run_one_cycle().await;
    assert!(result.success);

    let memory = f.substrate(SubstrateFile::Memory).await;
    assert!(memory.contains("remember the docs layout"));

    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::EvaluationRequested), 1);
    assert_eq!(count_events(&events, EventType::ReconsiderationComplete), 1);
}

#[tokio::test]
async fn test_autonomy_reminder_on_interval() {
    let config = OrchestratorConfig {
        autonomy_reminder_interval: 1,
        ..test_config()
    };
    let f = fixture_with(config, "# Plan\n\n## Tasks\n\n- [x] Task A\n").await;

    let mut rx = f.events.subscribe();
    f.orchestrator.run_one_cycle().await;

    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::AutonomyReminderInjected), 1);
    assert_eq!(count_events(&events, EventType::MessageInjected), 1);
    assert_eq!(f.injection.len(), 1);
}

struct OnePlanHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl IdleHandler for OnePlanHandler {
    async fn on_idle(&self) -> IdleOutcome {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            IdleOutcome::PlanCreated
        } else {
            IdleOutcome::NoGoals
        }
    }
}

#[tokio::test]
async fn test_plan_created_keeps_the_loop_running() {
    // plan_created resets the idle streak and the loop continues even with
    // idle sleep on offer; only the later no_goals outcome ends the run.
    let config = OrchestratorConfig {
        max_consecutive_idle: 1,
        ..test_config()
    };
    let handler = Arc::new(OnePlanHandler {
        calls: AtomicUsize::new(0),
    });
    let f = common::fixture_full(
        config,
        "# Plan\n\n## Tasks\n\n- [x] Task A\n",
        Some(handler.clone()),
    )
    .await;

    let mut rx = f.events.subscribe();
    f.orchestrator.start().unwrap();
    f.orchestrator.run_loop().await;

    assert_eq!(f.orchestrator.state(), LoopState::Stopped);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    // Two idle cycles ran: the first streak was absorbed by plan_created.
    assert_eq!(f.orchestrator.metrics().idle, 2);

    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::IdleHandler), 2);
}
