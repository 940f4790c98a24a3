//! Conversation routing, tick deferral, and message injection.

mod common;

use std::time::Duration;

use common::{count_events, drain_events, fixture};
use psyche_core::events::EventType;
use psyche_core::session::ScriptedSession;
use psyche_core::substrate::SubstrateFile;

#[tokio::test]
async fn test_user_message_gets_a_reply_and_is_logged() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [x] Task A\n").await;
    f.launcher.enqueue_result("Hi there");

    let mut rx = f.events.subscribe();
    f.orchestrator.handle_user_message("Hello").await;

    let conversation = f.substrate(SubstrateFile::Conversation).await;
    assert!(conversation.contains("[EGO] Hi there"));

    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::ConversationMessage), 1);
    assert_eq!(count_events(&events, EventType::ConversationResponse), 1);
    let response = events
        .iter()
        .find(|e| e.event == EventType::ConversationResponse)
        .unwrap();
    assert_eq!(
        response.data.get("response").and_then(|v| v.as_str()),
        Some("Hi there")
    );
}

#[tokio::test]
async fn test_tick_defers_while_conversation_runs_then_fires() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [x] Task A\n").await;
    // A slow conversation session, then the tick session that follows it.
    f.launcher
        .enqueue(ScriptedSession::succeed("Slow reply").with_delay(Duration::from_millis(200)));
    f.launcher.enqueue_result("tick outcome");

    let mut rx = f.events.subscribe();
    let orchestrator = f.orchestrator.clone();
    let conversation = tokio::spawn(async move {
        orchestrator.handle_user_message("Another").await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.orchestrator.is_conversation_active());

    let tick = f.orchestrator.run_one_tick().await;
    assert!(!tick.started);
    assert_eq!(tick.error.as_deref(), Some("Deferred"));
    assert!(f.orchestrator.is_tick_requested());

    conversation.await.unwrap();

    // On session close the deferred tick ran immediately.
    assert!(!f.orchestrator.is_tick_requested());
    assert!(!f.orchestrator.is_tick_in_progress());
    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::TickStarted), 1);
    assert_eq!(count_events(&events, EventType::TickComplete), 1);
}

#[tokio::test]
async fn test_message_during_tick_is_injected() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [x] Task A\n").await;
    f.launcher
        .enqueue(ScriptedSession::succeed("tick outcome").with_delay(Duration::from_millis(200)));

    let mut rx = f.events.subscribe();
    let orchestrator = f.orchestrator.clone();
    let tick = tokio::spawn(async move { orchestrator.run_one_tick().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.orchestrator.is_tick_in_progress());

    f.orchestrator.handle_user_message("mid-tick note").await;

    let events = drain_events(&mut rx);
    let response = events
        .iter()
        .find(|e| e.event == EventType::ConversationResponse)
        .unwrap();
    assert_eq!(
        response.data.get("response").and_then(|v| v.as_str()),
        Some("injected")
    );

    let result = tick.await.unwrap();
    assert!(result.started);
    // The scripted tick session observed the queued injection.
    assert_eq!(f.launcher.injected(), vec!["mid-tick note"]);
}

#[tokio::test]
async fn test_injection_without_session_is_queued_for_the_next_one() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [x] Task A\n").await;

    let mut rx = f.events.subscribe();
    f.orchestrator.inject_message("queued note");
    let events = drain_events(&mut rx);
    assert_eq!(count_events(&events, EventType::MessageInjected), 1);
    assert_eq!(f.injection.len(), 1);

    // The next session start observes the queued message.
    f.launcher.enqueue_result("tick outcome");
    let result = f.orchestrator.run_one_tick().await;
    assert!(result.started);
    assert_eq!(f.launcher.injected(), vec!["queued note"]);
    assert!(f.injection.is_empty());
}

#[tokio::test]
async fn test_conversation_failure_surfaces_error_event() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [x] Task A\n").await;
    f.launcher.enqueue_failure("model offline");

    let mut rx = f.events.subscribe();
    f.orchestrator.handle_user_message("Hello?").await;

    let events = drain_events(&mut rx);
    let response = events
        .iter()
        .find(|e| e.event == EventType::ConversationResponse)
        .unwrap();
    assert_eq!(
        response.data.get("error").and_then(|v| v.as_str()),
        Some("model offline")
    );
    // Nothing was appended to the conversation log.
    assert!(!f
        .substrate(SubstrateFile::Conversation)
        .await
        .contains("[EGO]"));
}

#[tokio::test]
async fn test_conversation_exceeding_max_duration_is_terminated() {
    let f = fixture("# Plan\n\n## Tasks\n\n- [x] Task A\n").await;
    // The fixture caps conversations at 2 s; this session would run 5 s.
    f.launcher
        .enqueue(ScriptedSession::succeed("too slow").with_delay(Duration::from_secs(5)));

    let mut rx = f.events.subscribe();
    f.orchestrator.handle_user_message("are you there").await;

    let events = drain_events(&mut rx);
    let response = events
        .iter()
        .find(|e| e.event == EventType::ConversationResponse)
        .unwrap();
    assert_eq!(
        response.data.get("error").and_then(|v| v.as_str()),
        Some("Conversation exceeded max duration")
    );
    assert!(!f.orchestrator.is_conversation_active());
}
