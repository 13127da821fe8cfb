//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voice_companion::backend::{
    ApiResponse, ConversationRecord, DialogueBackend, DialogueMode, DialogueReply,
    ExtractionBackend, PersistenceBackend,
};
use voice_companion::conversation::{Event, ExtractedData, Reminder, Task};
use voice_companion::notify::{
    Alert, AlertSink, IndicatorKind, Notification, NotificationId, NotificationService,
};
use voice_companion::voice::{
    EventHub, MemoryPreferences, RecognitionEngine, RecognitionError, RecognitionEvent,
    SpeakOptions, SpeechOutcome, Subscription, SynthesisEngine,
};
use voice_companion::{Assistant, AssistantConfig, Backends, Collaborators, Error, Result};

/// Let spawned tasks run without crossing any timer of interest
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Recognition engine driven by the test
pub struct ScriptedRecognizer {
    hub: EventHub,
    available: AtomicBool,
    permission: AtomicBool,
    fail_start: AtomicBool,
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    cancels: AtomicUsize,
    permission_requests: AtomicUsize,
}

impl Default for ScriptedRecognizer {
    fn default() -> Self {
        Self {
            hub: EventHub::new(),
            available: AtomicBool::new(true),
            permission: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            running: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            permission_requests: AtomicUsize::new(0),
        }
    }
}

impl ScriptedRecognizer {
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn emit(&self, event: RecognitionEvent) {
        self.hub.emit(&event);
    }

    /// A complete utterance followed by the end of the pass
    pub fn say(&self, text: &str) {
        self.emit(RecognitionEvent::Final(text.to_string()));
        self.emit(RecognitionEvent::End);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedRecognizer {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.load(Ordering::SeqCst)
    }

    async fn start(&self, _locale: &str) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RecognitionError::Network("recognizer offline".to_string()).into());
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

/// Synthesis engine that records what it was asked to say
#[derive(Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<(String, SpeakOptions)>>,
    stops: AtomicUsize,
}

impl RecordingSynthesizer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn last_options(&self) -> Option<SpeakOptions> {
        self.spoken.lock().unwrap().last().map(|(_, o)| o.clone())
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisEngine for RecordingSynthesizer {
    async fn speak(&self, text: &str, options: &SpeakOptions) -> Result<SpeechOutcome> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), options.clone()));
        Ok(SpeechOutcome::Done)
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Dialogue, extraction and persistence backend with scripted outcomes
pub struct ScriptedBackend {
    dialogue_fails: AtomicBool,
    reply_delay: Mutex<Duration>,
    extraction: Mutex<Option<ExtractedData>>,
    reject_items: AtomicBool,
    messages: Mutex<Vec<(String, Option<String>)>>,
    tasks: Mutex<Vec<Task>>,
    events: Mutex<Vec<Event>>,
    reminders: Mutex<Vec<Reminder>>,
    conversations: Mutex<Vec<ConversationRecord>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            dialogue_fails: AtomicBool::new(false),
            reply_delay: Mutex::new(Duration::ZERO),
            extraction: Mutex::new(None),
            reject_items: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            reminders: Mutex::new(Vec::new()),
            conversations: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    pub fn set_dialogue_fails(&self, fails: bool) {
        self.dialogue_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = delay;
    }

    /// Successful extraction result; `None` makes extraction fail
    pub fn set_extraction(&self, data: Option<ExtractedData>) {
        *self.extraction.lock().unwrap() = data;
    }

    pub fn set_reject_items(&self, reject: bool) {
        self.reject_items.store(reject, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(String, Option<String>)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn reminders(&self) -> Vec<Reminder> {
        self.reminders.lock().unwrap().clone()
    }

    pub fn conversations(&self) -> Vec<ConversationRecord> {
        self.conversations.lock().unwrap().clone()
    }

    fn stored(&self) -> Result<ApiResponse<serde_json::Value>> {
        if self.reject_items.load(Ordering::SeqCst) {
            Ok(ApiResponse::failed("storage full"))
        } else {
            Ok(ApiResponse::ok(serde_json::json!({ "id": "item-1" })))
        }
    }
}

#[async_trait]
impl DialogueBackend for ScriptedBackend {
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
        _mode: DialogueMode,
    ) -> Result<ApiResponse<DialogueReply>> {
        self.messages
            .lock()
            .unwrap()
            .push((text.to_string(), conversation_id.map(str::to_string)));

        let delay = *self.reply_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.dialogue_fails.load(Ordering::SeqCst) {
            return Err(Error::Backend("dialogue unavailable".to_string()));
        }
        Ok(ApiResponse::ok(DialogueReply {
            conversation_id: "conv-1".to_string(),
            ai_response: format!("You said: {text}"),
        }))
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    async fn extract_from_transcript(&self, _transcript: &str) -> Result<ApiResponse<ExtractedData>> {
        match self.extraction.lock().unwrap().clone() {
            Some(data) => Ok(ApiResponse::ok(data)),
            None => Ok(ApiResponse::failed("extraction model unavailable")),
        }
    }
}

#[async_trait]
impl PersistenceBackend for ScriptedBackend {
    async fn create_task(&self, task: &Task) -> Result<ApiResponse<serde_json::Value>> {
        self.tasks.lock().unwrap().push(task.clone());
        self.stored()
    }

    async fn create_event(&self, event: &Event) -> Result<ApiResponse<serde_json::Value>> {
        self.events.lock().unwrap().push(event.clone());
        self.stored()
    }

    async fn create_reminder(&self, reminder: &Reminder) -> Result<ApiResponse<serde_json::Value>> {
        self.reminders.lock().unwrap().push(reminder.clone());
        self.stored()
    }

    async fn save_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<ApiResponse<serde_json::Value>> {
        self.conversations.lock().unwrap().push(record.clone());
        self.stored()
    }
}

/// Notification service that tracks which notifications are visible
pub struct RecordingNotifications {
    permission: AtomicBool,
    permission_requests: AtomicUsize,
    next_id: AtomicUsize,
    scheduled: AtomicUsize,
    visible: Mutex<HashMap<NotificationId, IndicatorKind>>,
}

impl Default for RecordingNotifications {
    fn default() -> Self {
        Self {
            permission: AtomicBool::new(true),
            permission_requests: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            scheduled: AtomicUsize::new(0),
            visible: Mutex::new(HashMap::new()),
        }
    }
}

impl RecordingNotifications {
    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub fn visible(&self) -> Vec<IndicatorKind> {
        self.visible.lock().unwrap().values().copied().collect()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifications {
    async fn request_permission(&self) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.load(Ordering::SeqCst)
    }

    async fn schedule(&self, notification: &Notification) -> Result<NotificationId> {
        // Yield so concurrent shows interleave
        tokio::task::yield_now().await;
        let id = NotificationId(format!("n{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.visible
            .lock()
            .unwrap()
            .insert(id.clone(), notification.kind);
        Ok(id)
    }

    async fn dismiss(&self, id: &NotificationId) -> Result<()> {
        tokio::task::yield_now().await;
        self.visible.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Alert sink that records alerts
#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// An assistant wired to fakes
pub struct Harness {
    pub recognizer: Arc<ScriptedRecognizer>,
    pub synthesizer: Arc<RecordingSynthesizer>,
    pub backend: Arc<ScriptedBackend>,
    pub notifications: Arc<RecordingNotifications>,
    pub alerts: Arc<RecordingAlerts>,
    pub preferences: Arc<MemoryPreferences>,
    pub assistant: Assistant,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AssistantConfig::default())
    }

    pub fn with_config(config: AssistantConfig) -> Self {
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let synthesizer = Arc::new(RecordingSynthesizer::default());
        let backend = Arc::new(ScriptedBackend::default());
        let notifications = Arc::new(RecordingNotifications::default());
        let alerts = Arc::new(RecordingAlerts::default());
        let preferences = Assistant::default_preferences(&config);

        let assistant = Assistant::new(
            config,
            Collaborators {
                recognizer: recognizer.clone(),
                synthesizer: synthesizer.clone(),
                transcriber: None,
                notifications: notifications.clone(),
                alerts: alerts.clone(),
                preferences: preferences.clone(),
                backends: Backends::shared(backend.clone()),
            },
        );

        Self {
            recognizer,
            synthesizer,
            backend,
            notifications,
            alerts,
            preferences,
            assistant,
        }
    }
}
