//! Conversation orchestrator integration tests

use std::time::Duration;

use tokio::sync::broadcast;

use voice_companion::conversation::{
    CANCEL_LINE, ExtractedData, FALLBACK_REPLIES, GOODBYE_LINE, Priority, Role, Task,
};
use voice_companion::voice::{DetectorState, RecognitionEvent};
use voice_companion::{ConversationEvent, ConversationState, ConversationSummary};

mod common;

use common::{Harness, settle};

/// Wait long enough for the silence debounce to fire
async fn pause_speaking() {
    tokio::time::sleep(Duration::from_millis(1600)).await;
}

fn ended(events: &mut broadcast::Receiver<ConversationEvent>) -> Option<ConversationSummary> {
    while let Ok(event) = events.try_recv() {
        if let ConversationEvent::Ended(summary) = event {
            return Some(summary);
        }
    }
    None
}

#[tokio::test(start_paused = true)]
async fn test_debounce_fires_once_with_last_text() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();

    assert!(orchestrator.start_conversation("Sora").await);
    assert_eq!(orchestrator.state().await, ConversationState::Listening);
    assert_eq!(h.recognizer.starts(), 1);

    h.recognizer
        .emit(RecognitionEvent::Partial("remind me".to_string()));
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.recognizer
        .emit(RecognitionEvent::Partial("remind me to call".to_string()));
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.recognizer
        .emit(RecognitionEvent::Final("remind me to call Bob".to_string()));

    tokio::time::sleep(Duration::from_millis(1400)).await;
    assert!(h.backend.messages().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        h.backend.messages(),
        vec![("remind me to call Bob".to_string(), None)]
    );
    assert_eq!(h.synthesizer.spoken(), vec!["You said: remind me to call Bob"]);

    let transcript = orchestrator.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript.turns()[0].role, Role::User);
    assert_eq!(transcript.turns()[1].role, Role::Assistant);

    assert_eq!(orchestrator.state().await, ConversationState::Listening);
    assert_eq!(h.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_speech_at_debounce_deadline_restarts_wait() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.emit(RecognitionEvent::Partial("remind".to_string()));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    h.recognizer
        .emit(RecognitionEvent::Partial("remind me to call Bob".to_string()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.backend.messages().is_empty());
    assert_eq!(orchestrator.state().await, ConversationState::Listening);

    tokio::time::sleep(Duration::from_millis(1400)).await;
    assert!(h.backend.messages().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        h.backend.messages(),
        vec![("remind me to call Bob".to_string(), None)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_conversation_id_is_reused() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("what's the weather");
    pause_speaking().await;
    h.recognizer.say("and tomorrow");
    pause_speaking().await;

    let messages = h.backend.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].1, None);
    assert_eq!(messages[1].1.as_deref(), Some("conv-1"));
    assert_eq!(orchestrator.conversation_id().await.as_deref(), Some("conv-1"));
}

#[tokio::test(start_paused = true)]
async fn test_only_one_session() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();

    assert!(orchestrator.start_conversation("Sora").await);
    assert!(!orchestrator.start_conversation("Sora").await);

    assert!(orchestrator.is_active().await);
    assert_eq!(h.recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silence_without_speech_listens_again() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.emit(RecognitionEvent::End);
    settle().await;

    tokio::time::sleep(Duration::from_millis(1400)).await;
    assert_eq!(h.recognizer.starts(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.recognizer.starts(), 2);
    assert!(h.backend.messages().is_empty());
    assert_eq!(orchestrator.state().await, ConversationState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_closing_phrase_extracts_with_fallback() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();
    let mut events = orchestrator.events();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("remind me to call Bob");
    pause_speaking().await;
    h.recognizer.say("thanks, that's all");
    pause_speaking().await;

    assert_eq!(h.backend.messages().len(), 1);
    assert_eq!(
        h.synthesizer.spoken(),
        vec!["You said: remind me to call Bob", GOODBYE_LINE]
    );

    let reminders = h.backend.reminders();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].message, "remind me to call Bob");
    assert!(h.backend.tasks().is_empty());
    assert!(h.backend.events().is_empty());

    let conversations = h.backend.conversations();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].transcript.len(), 3);
    assert_eq!(conversations[0].conversation_id.as_deref(), Some("conv-1"));

    let summary = ended(&mut events).unwrap();
    assert_eq!(summary.reminders, 1);
    assert_eq!(summary.persistence_failures, 0);
    assert_eq!(summary.describe(), "Saved 1 reminder.");

    assert!(!orchestrator.is_active().await);
    assert!(orchestrator.transcript().await.is_empty());
    assert_eq!(
        h.assistant.detector().state().await,
        DetectorState::Listening
    );
}

#[tokio::test(start_paused = true)]
async fn test_backend_extraction_is_preferred() {
    let h = Harness::new();
    h.backend.set_extraction(Some(ExtractedData {
        tasks: vec![Task {
            title: "Buy milk".to_string(),
            description: None,
            priority: Priority::High,
            due_date: None,
        }],
        ..ExtractedData::default()
    }));
    let orchestrator = h.assistant.conversation();
    let mut events = orchestrator.events();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("remind me to buy milk, bye");
    pause_speaking().await;

    assert!(h.backend.messages().is_empty());
    assert_eq!(h.backend.tasks().len(), 1);
    assert!(h.backend.reminders().is_empty());

    let summary = ended(&mut events).unwrap();
    assert_eq!(summary.tasks, 1);
    assert_eq!(
        summary.source,
        voice_companion::conversation::ExtractionSource::Backend
    );
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failures_are_counted() {
    let h = Harness::new();
    h.backend.set_reject_items(true);
    let orchestrator = h.assistant.conversation();
    let mut events = orchestrator.events();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("I need to renew my passport, that's all");
    pause_speaking().await;

    let summary = ended(&mut events).unwrap();
    assert_eq!(summary.tasks, 1);
    assert_eq!(summary.persistence_failures, 2);
    assert!(!orchestrator.is_active().await);
}

#[tokio::test(start_paused = true)]
async fn test_dialogue_failure_keeps_conversation_going() {
    let h = Harness::new();
    h.backend.set_dialogue_fails(true);
    let orchestrator = h.assistant.conversation();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("what's the weather");
    pause_speaking().await;
    h.recognizer.say("what's the weather like");
    pause_speaking().await;

    assert_eq!(
        h.synthesizer.spoken(),
        vec![FALLBACK_REPLIES[0], FALLBACK_REPLIES[1]]
    );
    assert!(orchestrator.is_active().await);
    assert_eq!(orchestrator.state().await, ConversationState::Listening);
    assert_eq!(orchestrator.conversation_id().await, None);
    assert_eq!(orchestrator.transcript().await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_skips_extraction() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();
    let mut events = orchestrator.events();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("schedule a meeting tomorrow");
    settle().await;
    assert!(orchestrator.cancel_conversation().await);
    assert!(!orchestrator.cancel_conversation().await);

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.synthesizer.spoken(), vec![CANCEL_LINE]);
    assert!(h.backend.messages().is_empty());
    assert!(h.backend.events().is_empty());
    assert!(h.backend.conversations().is_empty());
    assert!(h.recognizer.cancels() >= 1);

    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, ConversationEvent::Ended(_)));
        cancelled |= event == ConversationEvent::Cancelled;
    }
    assert!(cancelled);
    assert!(!orchestrator.is_active().await);
    assert!(h.assistant.detector().is_listening().await);
}

#[tokio::test(start_paused = true)]
async fn test_reply_after_cancel_is_ignored() {
    let h = Harness::new();
    h.backend.set_reply_delay(Duration::from_secs(2));
    let orchestrator = h.assistant.conversation();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("hello there");
    pause_speaking().await;
    assert_eq!(h.backend.messages().len(), 1);
    assert_eq!(orchestrator.state().await, ConversationState::Processing);

    assert!(orchestrator.cancel_conversation().await);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(h.synthesizer.spoken(), vec![CANCEL_LINE]);
    assert!(!orchestrator.is_active().await);
    assert!(orchestrator.transcript().await.is_empty());
    assert!(h.backend.conversations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_without_microphone() {
    let h = Harness::new();
    h.recognizer.set_permission(false);
    let orchestrator = h.assistant.conversation();

    assert!(!orchestrator.start_conversation("Sora").await);
    assert!(!orchestrator.is_active().await);

    h.recognizer.set_permission(true);
    assert!(orchestrator.start_conversation("Sora").await);
}

#[tokio::test(start_paused = true)]
async fn test_lost_microphone_ends_with_extraction() {
    let h = Harness::new();
    let orchestrator = h.assistant.conversation();
    let mut events = orchestrator.events();
    assert!(orchestrator.start_conversation("Sora").await);

    h.recognizer.say("remind me to water the plants");
    settle().await;
    h.recognizer.set_available(false);
    pause_speaking().await;

    assert_eq!(h.backend.messages().len(), 1);
    assert_eq!(h.backend.reminders().len(), 1);
    assert_eq!(h.backend.conversations().len(), 1);
    assert!(ended(&mut events).is_some());
    assert!(!orchestrator.is_active().await);
}
