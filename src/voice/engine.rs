//! Speech engine contracts
//!
//! Platform recognition and synthesis engines sit behind these traits. The
//! core never talks to an engine directly; it goes through [`SpeechIo`].
//!
//! [`SpeechIo`]: super::SpeechIo

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::settings::SpeakOptions;
use crate::Result;

/// Recognition failure reported by an engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    /// Nothing intelligible was heard
    #[error("no speech detected")]
    NoSpeech,
    /// Microphone or recognition permission refused
    #[error("microphone permission denied")]
    PermissionDenied,
    /// Recognition service unreachable
    #[error("network error: {0}")]
    Network(String),
    /// Pass aborted by the engine or the platform
    #[error("recognition aborted")]
    Aborted,
    /// Any other engine failure
    #[error("{0}")]
    Other(String),
}

/// Event emitted while a recognition pass is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Interim hypothesis, replaced by each newer one
    Partial(String),
    /// Final text for a completed utterance
    Final(String),
    /// The pass failed
    Error(RecognitionError),
    /// The engine stopped listening
    End,
}

/// How a synthesis request finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Playback ran to completion
    Done,
    /// Playback was interrupted by `stop`
    Stopped,
}

/// Result of transcribing a recorded audio file
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Transcription {
    /// Recognized text
    pub text: String,
    /// Confidence in `0.0..=1.0`
    pub confidence: f32,
}

/// Platform speech recognition engine
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Whether a usable engine exists on this host
    async fn is_available(&self) -> bool;

    /// Ask the platform for microphone access, returning whether it was granted
    async fn request_permission(&self) -> bool;

    /// Begin a recognition pass for the given locale
    async fn start(&self, locale: &str) -> Result<()>;

    /// Stop the current pass, delivering any pending final result
    async fn stop(&self);

    /// Abort the current pass without a result
    async fn cancel(&self);

    /// Register for recognition events
    fn subscribe(&self) -> Subscription;
}

/// Platform text-to-speech engine
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Speak `text`, resolving once playback finishes or is stopped
    async fn speak(&self, text: &str, options: &SpeakOptions) -> Result<SpeechOutcome>;

    /// Interrupt any in-progress playback immediately
    async fn stop(&self);
}

/// Backend service for transcribing recorded audio
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe the audio file at `path`
    async fn transcribe(&self, path: &Path) -> Result<Transcription>;
}

type Subscribers = Arc<Mutex<Vec<(u64, mpsc::UnboundedSender<RecognitionEvent>)>>>;

/// Fan-out of recognition events to registered subscribers
///
/// Engines embed a hub and call [`EventHub::emit`] from their platform
/// callbacks.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Subscribers,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

impl EventHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, tx));

        Subscription {
            id,
            rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Deliver an event to every live subscriber
    pub fn emit(&self, event: &RecognitionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Registration with an [`EventHub`], removed when dropped
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    subscribers: Subscribers,
}

impl Subscription {
    /// Wait for the next event; `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<RecognitionEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let id = self.id;
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sub_id, _)| *sub_id != id);
    }
}
