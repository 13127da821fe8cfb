//! Terminal stand-ins for the platform engines
//!
//! Typed lines act as final recognition results and synthesized speech is
//! printed, so the whole assistant can run from a terminal.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::engine::{
    EventHub, RecognitionEngine, RecognitionEvent, SpeechOutcome, Subscription, SynthesisEngine,
};
use super::settings::SpeakOptions;
use crate::Result;
use crate::notify::{Notification, NotificationId, NotificationService};

/// Recognition engine fed with lines of text
#[derive(Debug, Default)]
pub struct ConsoleRecognizer {
    hub: EventHub,
    running: AtomicBool,
}

impl ConsoleRecognizer {
    /// Create an idle recognizer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a typed line as one complete utterance
    ///
    /// Returns false if no recognition pass was running, in which case the
    /// line is dropped.
    pub fn hear(&self, line: &str) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!(line, "not listening, input ignored");
            return false;
        }

        self.hub.emit(&RecognitionEvent::Final(line.to_string()));
        self.hub.emit(&RecognitionEvent::End);
        true
    }

    /// Whether a recognition pass is waiting for input
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for ConsoleRecognizer {
    async fn is_available(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> bool {
        true
    }

    async fn start(&self, locale: &str) -> Result<()> {
        tracing::trace!(locale, "console recognition started");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

/// Synthesis engine that prints what it would say
#[derive(Debug, Clone)]
pub struct ConsoleSynthesizer {
    speaker: String,
}

impl ConsoleSynthesizer {
    /// Print lines prefixed with `speaker`
    #[must_use]
    pub fn new(speaker: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
        }
    }
}

#[async_trait]
impl SynthesisEngine for ConsoleSynthesizer {
    async fn speak(&self, text: &str, options: &SpeakOptions) -> Result<SpeechOutcome> {
        tracing::trace!(pitch = options.pitch, rate = options.rate, "console speech");
        println!("{}: {text}", self.speaker);
        Ok(SpeechOutcome::Done)
    }

    async fn stop(&self) {}
}

/// Notification service that logs instead of posting
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifications;

#[async_trait]
impl NotificationService for LogNotifications {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn schedule(&self, notification: &Notification) -> Result<NotificationId> {
        let id = NotificationId(uuid::Uuid::new_v4().to_string());
        tracing::info!(
            %id,
            title = %notification.title,
            body = %notification.body,
            "status"
        );
        Ok(id)
    }

    async fn dismiss(&self, id: &NotificationId) -> Result<()> {
        tracing::debug!(%id, "status cleared");
        Ok(())
    }
}
