//! Wake word detection
//!
//! Keeps a recognition pass running while idle and checks every completed
//! utterance for the wake phrase. The detector restarts itself after each
//! utterance until it is stopped or the phrase is heard.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use super::adapter::{Listening, SpeechIo};
use super::engine::{RecognitionError, RecognitionEvent};
use super::settings::PreferenceStore;
use crate::config::{DEFAULT_ERROR_BACKOFF, DEFAULT_RESTART_DELAY};
use crate::error::Permission;
use crate::notify::{Alert, AlertSink};
use crate::timer::{CancellableTimer, Generation};
use crate::{Error, Result};

/// Capacity of the activation broadcast channel
const ACTIVATION_CAPACITY: usize = 8;

/// Wake-word settings owned by the detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeWordConfig {
    /// Phrase that activates the assistant (e.g. "hey sora")
    pub wake_phrase: String,
    /// Name the assistant answers to
    pub assistant_name: String,
    /// Whether wake listening should run at all
    pub enabled: bool,
}

impl WakeWordConfig {
    /// Default configuration for an assistant name
    #[must_use]
    pub fn for_assistant(assistant_name: &str) -> Self {
        let name = assistant_name.trim();
        Self {
            wake_phrase: format!("hey {}", name.to_lowercase()),
            assistant_name: name.to_string(),
            enabled: true,
        }
    }
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self::for_assistant(crate::config::DEFAULT_ASSISTANT_NAME)
    }
}

/// Decides whether an utterance contains the wake phrase
pub trait WakePhraseMatcher: Send + Sync {
    /// Check `utterance` against the configured phrase
    fn matches(&self, config: &WakeWordConfig, utterance: &str) -> bool;
}

/// Containment match against a few variants of the wake phrase
///
/// Accepts the configured phrase and "hey <name>", "hello <name>" and the
/// bare name, compared case-insensitively with and without punctuation. The
/// bare name makes this permissive: "i don't know sora" activates "Sora".
#[derive(Debug, Default, Clone, Copy)]
pub struct VariantMatcher;

impl VariantMatcher {
    /// Lowercased variants accepted for a configuration
    #[must_use]
    pub fn variants(config: &WakeWordConfig) -> Vec<String> {
        let name = config.assistant_name.trim().to_lowercase();
        let mut variants = vec![config.wake_phrase.trim().to_lowercase()];
        if !name.is_empty() {
            variants.push(format!("hey {name}"));
            variants.push(format!("hello {name}"));
            variants.push(name);
        }
        variants.retain(|v| !v.is_empty());
        variants.dedup();
        variants
    }
}

impl WakePhraseMatcher for VariantMatcher {
    fn matches(&self, config: &WakeWordConfig, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        let stripped = strip_punctuation(&lower);

        Self::variants(config).iter().any(|variant| {
            let variant_stripped = strip_punctuation(variant);
            lower.contains(variant.as_str())
                || (!variant_stripped.is_empty() && stripped.contains(&variant_stripped))
        })
    }
}

/// Drop punctuation and collapse whitespace
fn strip_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Emitted once each time the wake phrase is heard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Utterance that contained the wake phrase
    pub transcript: String,
    /// Name of the assistant that was woken
    pub assistant_name: String,
}

/// State of the wake word detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Not listening
    Idle,
    /// Listening for the wake phrase, restarting after every utterance
    Listening,
    /// Wake phrase heard, handing off
    Detected,
}

/// Delays used when restarting recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTiming {
    /// Delay after a normal end of utterance
    pub restart_delay: Duration,
    /// Delay after a recognition error
    pub error_backoff: Duration,
}

impl Default for WakeTiming {
    fn default() -> Self {
        Self {
            restart_delay: DEFAULT_RESTART_DELAY,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

/// Continuously listens for the wake phrase
#[derive(Clone)]
pub struct WakeWordDetector {
    inner: Arc<Inner>,
}

struct Inner {
    speech: SpeechIo,
    preferences: Arc<dyn PreferenceStore>,
    alerts: Arc<dyn AlertSink>,
    matcher: Arc<dyn WakePhraseMatcher>,
    timing: WakeTiming,
    shared: Mutex<Shared>,
    activations: broadcast::Sender<Activation>,
}

struct Shared {
    config: WakeWordConfig,
    state: DetectorState,
    generation: Generation,
    restart: CancellableTimer,
    permission_alerted: bool,
}

impl Shared {
    fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation && self.state == DetectorState::Listening
    }
}

impl WakeWordDetector {
    /// Create a detector using [`VariantMatcher`]
    #[must_use]
    pub fn new(
        speech: SpeechIo,
        preferences: Arc<dyn PreferenceStore>,
        alerts: Arc<dyn AlertSink>,
        timing: WakeTiming,
    ) -> Self {
        Self::with_matcher(speech, preferences, alerts, timing, Arc::new(VariantMatcher))
    }

    /// Create a detector with a custom phrase matcher
    #[must_use]
    pub fn with_matcher(
        speech: SpeechIo,
        preferences: Arc<dyn PreferenceStore>,
        alerts: Arc<dyn AlertSink>,
        timing: WakeTiming,
        matcher: Arc<dyn WakePhraseMatcher>,
    ) -> Self {
        let (activations, _) = broadcast::channel(ACTIVATION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                speech,
                preferences,
                alerts,
                matcher,
                timing,
                shared: Mutex::new(Shared {
                    config: WakeWordConfig::default(),
                    state: DetectorState::Idle,
                    generation: Generation::default(),
                    restart: CancellableTimer::new(),
                    permission_alerted: false,
                }),
                activations,
            }),
        }
    }

    /// Configure for an assistant name without starting to listen
    pub async fn initialize(&self, assistant_name: &str) {
        let config = WakeWordConfig::for_assistant(assistant_name);
        tracing::debug!(wake_phrase = %config.wake_phrase, "wake word detector initialized");
        self.inner.shared.lock().await.config = config;
    }

    /// Replace the configuration with the stored one, if any
    ///
    /// Returns true if a stored configuration was applied
    ///
    /// # Errors
    ///
    /// Returns error if the preference store cannot be read
    pub async fn load_config(&self) -> Result<bool> {
        let Some(config) = self.inner.preferences.load_wake_word().await? else {
            return Ok(false);
        };
        tracing::debug!(wake_phrase = %config.wake_phrase, enabled = config.enabled, "loaded wake word config");
        self.inner.shared.lock().await.config = config;
        Ok(true)
    }

    /// Replace and persist the configuration
    ///
    /// Disabling the detector while it listens stops it.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration cannot be persisted
    pub async fn update_config(&self, config: WakeWordConfig) -> Result<()> {
        if config.assistant_name.trim().is_empty() && config.wake_phrase.trim().is_empty() {
            return Err(Error::Config("wake phrase and assistant name are both empty".to_string()));
        }

        let enabled = config.enabled;
        self.inner.shared.lock().await.config = config.clone();
        self.inner.preferences.save_wake_word(&config).await?;

        if !enabled {
            self.stop_listening().await;
        }
        Ok(())
    }

    /// Current configuration
    pub async fn config(&self) -> WakeWordConfig {
        self.inner.shared.lock().await.config.clone()
    }

    /// Current state
    pub async fn state(&self) -> DetectorState {
        self.inner.shared.lock().await.state
    }

    /// Whether the detector is listening for the wake phrase
    pub async fn is_listening(&self) -> bool {
        self.state().await == DetectorState::Listening
    }

    /// Subscribe to activations
    #[must_use]
    pub fn activations(&self) -> broadcast::Receiver<Activation> {
        self.inner.activations.subscribe()
    }

    /// Start listening for the wake phrase
    ///
    /// Returns true if listening (or already listening). Returns false when
    /// the detector is disabled, the engine is unavailable, or microphone
    /// permission is refused; none of these is retried.
    pub async fn start_listening(&self) -> bool {
        let mut shared = self.inner.shared.lock().await;

        if shared.state == DetectorState::Listening {
            tracing::debug!("wake word detector already listening");
            return true;
        }

        if !shared.config.enabled {
            tracing::debug!("wake word detection disabled");
            return false;
        }

        shared.generation.advance();
        shared.state = DetectorState::Listening;

        match self.begin_pass(&shared).await {
            Ok(()) => {
                tracing::info!(wake_phrase = %shared.config.wake_phrase, "listening for wake phrase");
                true
            }
            Err(e) => self.handle_start_failure(&mut shared, e),
        }
    }

    /// Stop listening; safe to call in any state
    pub async fn stop_listening(&self) {
        let mut shared = self.inner.shared.lock().await;
        shared.restart.cancel();

        if shared.state == DetectorState::Idle {
            return;
        }

        shared.generation.advance();
        shared.state = DetectorState::Idle;
        self.inner.speech.stop_listening().await;
        tracing::info!("wake word listening stopped");
    }

    async fn begin_pass(&self, shared: &Shared) -> Result<()> {
        let listening = self.inner.speech.start_listening().await?;
        self.spawn_pump(shared.generation, listening);
        Ok(())
    }

    fn spawn_pump(&self, generation: Generation, listening: Listening) {
        let detector = self.clone();
        tokio::spawn(async move { detector.pump(generation, listening).await });
    }

    /// Returns true if a retry was scheduled
    fn handle_start_failure(&self, shared: &mut Shared, err: Error) -> bool {
        match err {
            Error::EngineUnavailable(reason) => {
                tracing::info!(%reason, "wake word listening unavailable");
                shared.state = DetectorState::Idle;
                false
            }
            Error::PermissionDenied(permission) => {
                self.alert_permission(shared, permission);
                shared.state = DetectorState::Idle;
                false
            }
            other => {
                tracing::warn!(error = %other, "wake word pass failed to start, retrying");
                self.schedule_restart(shared, self.inner.timing.error_backoff);
                true
            }
        }
    }

    fn alert_permission(&self, shared: &mut Shared, permission: Permission) {
        if shared.permission_alerted {
            tracing::debug!(%permission, "permission still denied");
            return;
        }
        shared.permission_alerted = true;
        tracing::warn!(%permission, "permission denied, wake word listening disabled");
        self.inner.alerts.alert(Alert::PermissionDenied(permission));
    }

    fn schedule_restart(&self, shared: &mut Shared, delay: Duration) {
        let detector = self.clone();
        let generation = shared.generation;
        shared
            .restart
            .schedule(delay, async move { detector.restart(generation).await });
    }

    async fn restart(&self, generation: Generation) {
        let mut shared = self.inner.shared.lock().await;
        if !shared.is_current(generation) {
            return;
        }

        tracing::trace!("restarting wake word pass");
        if let Err(e) = self.begin_pass(&shared).await {
            self.handle_start_failure(&mut shared, e);
        }
    }

    async fn pump(self, generation: Generation, mut listening: Listening) {
        while let Some(event) = listening.next().await {
            match event {
                RecognitionEvent::Partial(_) => {}
                RecognitionEvent::Final(text) => {
                    self.on_utterance(generation, &text).await;
                    return;
                }
                RecognitionEvent::Error(err) => {
                    self.on_error(generation, &err).await;
                    return;
                }
                // A final result may still follow, until the restart replaces this pass
                RecognitionEvent::End => self.on_end(generation).await,
            }
        }
    }

    async fn on_utterance(&self, generation: Generation, text: &str) {
        let mut shared = self.inner.shared.lock().await;
        if !shared.is_current(generation) {
            return;
        }

        if !self.inner.matcher.matches(&shared.config, text) {
            tracing::trace!(transcript = text, "no wake phrase");
            self.schedule_restart(&mut shared, self.inner.timing.restart_delay);
            return;
        }

        tracing::info!(transcript = text, "wake phrase detected");
        shared.restart.cancel();
        let detected = shared.generation.advance();
        shared.state = DetectorState::Detected;
        self.inner.speech.stop_listening().await;

        let activation = Activation {
            transcript: text.to_string(),
            assistant_name: shared.config.assistant_name.clone(),
        };
        drop(shared);

        if self.inner.activations.send(activation).is_err() {
            tracing::warn!("wake phrase detected but no activation subscriber");
        }

        let mut shared = self.inner.shared.lock().await;
        if shared.generation == detected && shared.state == DetectorState::Detected {
            shared.state = DetectorState::Idle;
        }
    }

    async fn on_error(&self, generation: Generation, err: &RecognitionError) {
        let mut shared = self.inner.shared.lock().await;
        if !shared.is_current(generation) {
            return;
        }

        if *err == RecognitionError::PermissionDenied {
            self.alert_permission(&mut shared, Permission::Microphone);
            shared.generation.advance();
            shared.state = DetectorState::Idle;
            self.inner.speech.stop_listening().await;
            return;
        }

        tracing::debug!(error = %err, "wake word pass failed, backing off");
        self.schedule_restart(&mut shared, self.inner.timing.error_backoff);
    }

    async fn on_end(&self, generation: Generation) {
        let mut shared = self.inner.shared.lock().await;
        if shared.is_current(generation) {
            self.schedule_restart(&mut shared, self.inner.timing.restart_delay);
        }
    }
}
