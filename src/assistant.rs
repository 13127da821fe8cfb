//! Session owner wiring speech, wake word, notifier and conversations
//!
//! There is no global state: every component is built here from explicit
//! collaborators and handed to whoever needs it.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};

use crate::Result;
use crate::config::AssistantConfig;
use crate::conversation::{Backends, ConversationEvent, ConversationOrchestrator};
use crate::notify::{AlertSink, NotificationService, StatusNotifier};
use crate::voice::{
    Activation, MemoryPreferences, PreferenceStore, RecognitionEngine, SpeechIo, SynthesisEngine,
    TranscriptionService, WakeWordDetector,
};

/// Platform services and backends the assistant runs on
pub struct Collaborators {
    /// Speech recognition engine
    pub recognizer: Arc<dyn RecognitionEngine>,
    /// Speech synthesis engine
    pub synthesizer: Arc<dyn SynthesisEngine>,
    /// Audio file transcription, if available
    pub transcriber: Option<Arc<dyn TranscriptionService>>,
    /// Platform notifications
    pub notifications: Arc<dyn NotificationService>,
    /// Direct user alerts
    pub alerts: Arc<dyn AlertSink>,
    /// User preferences
    pub preferences: Arc<dyn PreferenceStore>,
    /// Dialogue, extraction and persistence
    pub backends: Backends,
}

/// Whether the host app is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// App in the foreground
    Foreground,
    /// App in the background
    Background,
}

struct Lifecycle {
    app_state: AppState,
    wake_enabled: bool,
}

/// The assistant: one detector, one notifier, one conversation at a time
#[derive(Clone)]
pub struct Assistant {
    config: AssistantConfig,
    speech: SpeechIo,
    detector: WakeWordDetector,
    notifier: StatusNotifier,
    conversation: ConversationOrchestrator,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Assistant {
    /// Build every component
    #[must_use]
    pub fn new(config: AssistantConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            recognizer,
            synthesizer,
            transcriber,
            notifications,
            alerts,
            preferences,
            backends,
        } = collaborators;

        let speech = SpeechIo::new(
            recognizer,
            synthesizer,
            transcriber,
            Arc::clone(&preferences),
            config.locale.clone(),
        );
        let detector =
            WakeWordDetector::new(speech.clone(), preferences, alerts, config.timing.wake);
        let notifier = StatusNotifier::new(notifications);
        let conversation = ConversationOrchestrator::with_debounce(
            speech.clone(),
            backends,
            notifier.clone(),
            detector.clone(),
            config.timing.silence_debounce,
        );

        Self {
            config,
            speech,
            detector,
            notifier,
            conversation,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                app_state: AppState::Foreground,
                wake_enabled: false,
            })),
        }
    }

    /// In-memory preferences seeded with the configured voice
    #[must_use]
    pub fn default_preferences(config: &AssistantConfig) -> Arc<MemoryPreferences> {
        let preferences = MemoryPreferences::new();
        preferences.set_voice(config.voice.clone());
        Arc::new(preferences)
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Speech I/O façade
    #[must_use]
    pub const fn speech(&self) -> &SpeechIo {
        &self.speech
    }

    /// Wake word detector
    #[must_use]
    pub const fn detector(&self) -> &WakeWordDetector {
        &self.detector
    }

    /// Status notifier
    #[must_use]
    pub const fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    /// Conversation orchestrator
    #[must_use]
    pub const fn conversation(&self) -> &ConversationOrchestrator {
        &self.conversation
    }

    /// Configure the detector from config, then from stored preferences
    ///
    /// # Errors
    ///
    /// Returns error if stored preferences cannot be read
    pub async fn setup(&self) -> Result<()> {
        let name = &self.config.assistant_name;
        self.detector.initialize(name).await;

        if !self.detector.load_config().await? && self.config.wake_phrase.is_some() {
            self.detector.update_config(self.config.wake_word()).await?;
        }

        let wake = self.detector.config().await;
        tracing::info!(
            assistant = %wake.assistant_name,
            wake_phrase = %wake.wake_phrase,
            enabled = wake.enabled,
            "assistant ready"
        );
        Ok(())
    }

    /// Start wake listening and show the listening indicator
    ///
    /// Returns whether the detector is listening
    pub async fn enable(&self) -> bool {
        self.lifecycle.lock().await.wake_enabled = true;

        if self.conversation.is_active().await {
            return true;
        }

        let listening = self.detector.start_listening().await;
        if listening {
            self.show_listening().await;
        }
        listening
    }

    /// Cancel any conversation, stop wake listening and hide the indicator
    pub async fn disable(&self) {
        self.lifecycle.lock().await.wake_enabled = false;
        self.detector.stop_listening().await;
        self.conversation.cancel_without_resume().await;
        self.notifier.hide().await;
    }

    /// React to the host app moving between foreground and background
    ///
    /// Backgrounding keeps everything running. On returning to the
    /// foreground the detector is resumed if wake listening was enabled and
    /// no conversation is active.
    pub async fn handle_app_state(&self, state: AppState) {
        let wake_enabled = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.app_state == state {
                return;
            }
            lifecycle.app_state = state;
            lifecycle.wake_enabled
        };

        tracing::debug!(?state, wake_enabled, "app state changed");

        if state == AppState::Foreground
            && wake_enabled
            && !self.conversation.is_active().await
            && !self.detector.is_listening().await
            && self.detector.start_listening().await
        {
            self.show_listening().await;
        }
    }

    /// Hand activations to the orchestrator until `shutdown_rx` fires
    ///
    /// Wake listening is disabled on the way out.
    pub async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        let mut activations = self.detector.activations();
        let mut events = self.conversation.events();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                activation = activations.recv() => match activation {
                    Ok(activation) => self.on_activation(&activation).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "activations dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = events.recv() => match event {
                    Ok(ConversationEvent::Ended(_) | ConversationEvent::Cancelled) => {
                        self.on_conversation_closed().await;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.disable().await;
    }

    async fn on_activation(&self, activation: &Activation) {
        tracing::info!(
            assistant = %activation.assistant_name,
            transcript = %activation.transcript,
            "activated"
        );

        self.notifier.show_activated(&activation.assistant_name).await;

        if !self
            .conversation
            .start_conversation(&activation.assistant_name)
            .await
        {
            tracing::debug!("conversation not started, resuming wake listening");
            if self.detector.start_listening().await {
                self.show_listening().await;
            } else {
                self.notifier.hide().await;
            }
        }
    }

    async fn on_conversation_closed(&self) {
        if self.detector.is_listening().await && !self.conversation.is_active().await {
            self.show_listening().await;
        }
    }

    async fn show_listening(&self) {
        let name = self.detector.config().await.assistant_name;
        self.notifier.show_listening(&name).await;
    }
}
