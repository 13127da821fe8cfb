//! Speech I/O façade over the platform engines
//!
//! Owns the exclusive recognition channel. Every recognition pass gets an id;
//! a [`Listening`] handle only yields events while its pass is the current
//! one, so results from a stopped or superseded pass never reach a caller.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, watch};

use super::engine::{
    RecognitionEngine, RecognitionEvent, SpeechOutcome, Subscription, SynthesisEngine,
    Transcription, TranscriptionService,
};
use super::settings::{PreferenceStore, SpeakOptions};
use crate::error::Permission;
use crate::{Error, Result};

/// Pass id meaning "nothing is listening"
const IDLE_PASS: u64 = 0;

/// Confidence reported for canned transcriptions
const CANNED_CONFIDENCE: f32 = 0.5;

/// Offline stand-ins used when the transcription service cannot answer
const CANNED_TRANSCRIPTS: &[&str] = &[
    "Remind me to call the dentist tomorrow",
    "Schedule a meeting with the team on Friday",
    "I need to finish the quarterly report",
    "What's on my calendar today?",
];

/// Speech recognition, synthesis and transcription behind one handle
#[derive(Clone)]
pub struct SpeechIo {
    inner: Arc<Inner>,
}

struct Inner {
    recognizer: Arc<dyn RecognitionEngine>,
    synthesizer: Arc<dyn SynthesisEngine>,
    transcriber: Option<Arc<dyn TranscriptionService>>,
    preferences: Arc<dyn PreferenceStore>,
    locale: String,
    control: Mutex<Control>,
    current_pass: watch::Sender<u64>,
    canned_cursor: AtomicUsize,
}

#[derive(Default)]
struct Control {
    last_pass: u64,
    permission_granted: bool,
}

impl SpeechIo {
    /// Create the façade
    ///
    /// `transcriber` is optional; without one, file transcription always uses
    /// the canned responses.
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn RecognitionEngine>,
        synthesizer: Arc<dyn SynthesisEngine>,
        transcriber: Option<Arc<dyn TranscriptionService>>,
        preferences: Arc<dyn PreferenceStore>,
        locale: impl Into<String>,
    ) -> Self {
        let (current_pass, _) = watch::channel(IDLE_PASS);
        Self {
            inner: Arc::new(Inner {
                recognizer,
                synthesizer,
                transcriber,
                preferences,
                locale: locale.into(),
                control: Mutex::new(Control::default()),
                current_pass,
                canned_cursor: AtomicUsize::new(0),
            }),
        }
    }

    /// Locale used for recognition and synthesis
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.inner.locale
    }

    /// Whether a recognition pass is currently held
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.current_pass() != IDLE_PASS
    }

    fn current_pass(&self) -> u64 {
        *self.inner.current_pass.borrow()
    }

    /// Begin a single recognition pass
    ///
    /// Any pass already running is stopped first. Microphone permission is
    /// requested on first use.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the host has no recognition engine,
    /// `PermissionDenied` if microphone access is refused, or the engine's
    /// error if the pass fails to start
    pub async fn start_listening(&self) -> Result<Listening> {
        let mut control = self.inner.control.lock().await;

        if self.current_pass() != IDLE_PASS {
            tracing::debug!(pass = self.current_pass(), "stopping previous recognition pass");
            self.inner.current_pass.send_replace(IDLE_PASS);
            self.inner.recognizer.stop().await;
        }

        if !self.inner.recognizer.is_available().await {
            return Err(Error::EngineUnavailable(
                "speech recognition is not supported on this host".to_string(),
            ));
        }

        if !control.permission_granted {
            if !self.inner.recognizer.request_permission().await {
                tracing::warn!("microphone permission denied");
                return Err(Error::PermissionDenied(Permission::Microphone));
            }
            control.permission_granted = true;
        }

        control.last_pass += 1;
        let pass = control.last_pass;

        // Subscribe before starting so no early result is missed
        let subscription = self.inner.recognizer.subscribe();
        self.inner.current_pass.send_replace(pass);

        if let Err(e) = self.inner.recognizer.start(&self.inner.locale).await {
            self.inner.current_pass.send_replace(IDLE_PASS);
            tracing::warn!(error = %e, "recognition pass failed to start");
            return Err(e);
        }

        tracing::debug!(pass, locale = %self.inner.locale, "recognition pass started");

        Ok(Listening {
            pass,
            current: self.inner.current_pass.subscribe(),
            subscription,
        })
    }

    /// Stop the current pass; safe to call when not listening
    pub async fn stop_listening(&self) {
        let _control = self.inner.control.lock().await;
        let pass = self.inner.current_pass.send_replace(IDLE_PASS);
        if pass != IDLE_PASS {
            tracing::debug!(pass, "recognition pass stopped");
            self.inner.recognizer.stop().await;
        }
    }

    /// Abort the current pass without a result; safe to call when not listening
    pub async fn cancel_listening(&self) {
        let _control = self.inner.control.lock().await;
        let pass = self.inner.current_pass.send_replace(IDLE_PASS);
        if pass != IDLE_PASS {
            tracing::debug!(pass, "recognition pass cancelled");
            self.inner.recognizer.cancel().await;
        }
    }

    /// Options for the user's preferred voice
    pub async fn speak_options(&self) -> SpeakOptions {
        let voice = match self.inner.preferences.voice_id().await {
            Ok(voice) => voice,
            Err(e) => {
                tracing::debug!(error = %e, "voice preference unavailable, using neutral profile");
                None
            }
        };
        SpeakOptions::resolve(&self.inner.locale, voice)
    }

    /// Speak `text` with the user's preferred voice, waiting for playback
    ///
    /// Synthesis failures are logged and swallowed.
    pub async fn speak(&self, text: &str) {
        let options = self.speak_options().await;
        self.speak_with(text, &options).await;
    }

    /// Speak `text` with explicit options
    pub async fn speak_with(&self, text: &str, options: &SpeakOptions) {
        if text.trim().is_empty() {
            return;
        }

        tracing::debug!(text, voice = ?options.voice, "speaking");

        match self.inner.synthesizer.speak(text, options).await {
            Ok(SpeechOutcome::Done) => {}
            Ok(SpeechOutcome::Stopped) => tracing::debug!("speech interrupted"),
            Err(e) => tracing::warn!(error = %e, "speech synthesis failed"),
        }
    }

    /// Interrupt any in-progress playback
    pub async fn stop_speaking(&self) {
        self.inner.synthesizer.stop().await;
    }

    /// Transcribe a recorded audio file
    ///
    /// Returns `None` if the file does not exist. When the transcription
    /// service fails or is not configured, one of a fixed set of canned
    /// transcripts is returned instead of an error.
    pub async fn transcribe_audio_file(&self, path: &Path) -> Option<Transcription> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(path = %path.display(), "audio file not found");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "audio file not readable");
                return None;
            }
        }

        if let Some(service) = &self.inner.transcriber {
            match service.transcribe(path).await {
                Ok(result) if !result.text.trim().is_empty() => {
                    tracing::info!(transcript = %result.text, "transcription complete");
                    return Some(result);
                }
                Ok(_) => tracing::warn!("transcription service returned no text"),
                Err(e) => tracing::warn!(error = %e, "transcription service failed"),
            }
        }

        Some(self.canned_transcription())
    }

    fn canned_transcription(&self) -> Transcription {
        let index = self.inner.canned_cursor.fetch_add(1, Ordering::Relaxed) % CANNED_TRANSCRIPTS.len();
        let text = CANNED_TRANSCRIPTS[index].to_string();
        tracing::info!(transcript = %text, "using canned transcription");
        Transcription {
            text,
            confidence: CANNED_CONFIDENCE,
        }
    }
}

/// Handle to one recognition pass
///
/// Yields the pass's events until the pass is stopped or replaced.
#[derive(Debug)]
pub struct Listening {
    pass: u64,
    current: watch::Receiver<u64>,
    subscription: Subscription,
}

impl Listening {
    /// Id of this pass
    #[must_use]
    pub const fn pass(&self) -> u64 {
        self.pass
    }

    /// Whether this pass still holds the recognition channel
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self.current.borrow() == self.pass
    }

    /// Next event of this pass, or `None` once it is no longer current
    pub async fn next(&mut self) -> Option<RecognitionEvent> {
        if !self.is_current() {
            return None;
        }

        let pass = self.pass;
        let event = tokio::select! {
            event = self.subscription.recv() => event,
            _ = self.current.wait_for(move |current| *current != pass) => None,
        };

        event.filter(|_| self.is_current())
    }
}
