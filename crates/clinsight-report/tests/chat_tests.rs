//! Chat side-channel tests: transcript shape and failure handling.

use clinsight_report::{ChatRole, ReportOrchestrator};
use clinsight_test_utils::{
    init_test_logging, temp_cache, ScriptedChat, ScriptedGenerator, StaticVerifier,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

fn setup(chat: Arc<ScriptedChat>) -> (TempDir, ReportOrchestrator) {
    init_test_logging();
    let (dir, cache) = temp_cache();
    let orchestrator = ReportOrchestrator::new(
        Arc::new(ScriptedGenerator::new()),
        Arc::new(StaticVerifier::verified()),
        chat,
        cache,
    );
    (dir, orchestrator)
}

#[tokio::test]
async fn greeting_and_replies_build_the_transcript() {
    let chat = ScriptedChat::new("Hello, ask me anything about this report.");
    chat.push_reply(Ok("The care plan targets BP below 130/80."));
    let (_dir, orchestrator) = setup(Arc::clone(&chat));

    let mut handle = orchestrator.start_chat_session("Patient A: hypertension.");
    let greeting = handle.initial_greeting().await;
    assert_eq!(greeting, "Hello, ask me anything about this report.");

    let reply = handle.send_message("What is the BP target?").await;
    assert_eq!(reply, "The care plan targets BP below 130/80.");

    let transcript = handle.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0].role, ChatRole::Assistant);
    assert_eq!(transcript[1].role, ChatRole::User);
    assert_eq!(transcript[1].text, "What is the BP target?");
    assert_eq!(transcript[2].role, ChatRole::Assistant);
    assert_eq!(chat.sessions_started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn provider_failure_becomes_error_turn_and_session_survives() {
    let chat = ScriptedChat::new("Hello.");
    chat.push_reply(Err("quota exceeded"));
    chat.push_reply(Ok("Back online."));
    let (_dir, orchestrator) = setup(Arc::clone(&chat));

    let mut handle = orchestrator.start_chat_session("Patient A.");
    handle.initial_greeting().await;

    let failed = handle.send_message("first question").await;
    assert!(failed.starts_with("Error: "), "got: {failed}");

    // The handle stays usable after the failure.
    let recovered = handle.send_message("second question").await;
    assert_eq!(recovered, "Back online.");

    let transcript = handle.transcript();
    assert_eq!(transcript.len(), 5);
    assert!(transcript[2].text.starts_with("Error: "));
    assert_eq!(transcript[2].role, ChatRole::Assistant);
    assert_eq!(chat.sessions_started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn session_start_failure_is_retried_on_the_next_call() {
    let chat = ScriptedChat::new("Hello.");
    chat.fail_next_session_start();
    chat.push_reply(Ok("Ready now."));
    let (_dir, orchestrator) = setup(Arc::clone(&chat));

    let mut handle = orchestrator.start_chat_session("Patient A.");
    let greeting = handle.initial_greeting().await;
    assert!(greeting.starts_with("Error: "), "got: {greeting}");
    assert_eq!(chat.sessions_started.load(Ordering::SeqCst), 0);

    // Setup is retried lazily on the next call.
    let reply = handle.send_message("still there?").await;
    assert_eq!(reply, "Ready now.");
    assert_eq!(chat.sessions_started.load(Ordering::SeqCst), 1);
}
