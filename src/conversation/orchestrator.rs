//! Conversation session state machine
//!
//! One session at a time: listen, wait for the user to stop talking, send the
//! utterance to the dialogue backend, speak the reply, listen again. A closing
//! phrase ends the session with extraction and persistence; cancellation ends
//! it without either. Every async completion checks that its session is still
//! the active one before touching state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};

use super::extract::{
    ConversationSummary, ExtractedData, ExtractionSource, FallbackExtractor, KeywordExtractor,
};
use super::phrases::{CANCEL_LINE, GOODBYE_LINE, fallback_reply, is_closing};
use super::transcript::{ConversationTurn, Role, Transcript};
use crate::backend::{
    ApiResponse, ConversationRecord, DialogueBackend, DialogueMode, ExtractionBackend,
    OfflineBackend, PersistenceBackend,
};
use crate::config::DEFAULT_SILENCE_DEBOUNCE;
use crate::notify::StatusNotifier;
use crate::timer::{CancellableTimer, Generation};
use crate::voice::{Listening, RecognitionError, RecognitionEvent, SpeechIo, WakeWordDetector};
use crate::{Error, Result};

/// Capacity of the conversation event channel
const EVENT_CAPACITY: usize = 64;

/// Phase of the active conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// No conversation
    #[default]
    Idle,
    /// Waiting for the user to speak
    Listening,
    /// Waiting for the dialogue backend
    Processing,
    /// Speaking the reply
    Speaking,
    /// Extracting and saving items after a closing phrase
    Extracting,
}

/// Progress notifications for a UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A session began
    Started {
        /// Assistant the session is with
        assistant_name: String,
    },
    /// The session changed phase
    StateChanged(ConversationState),
    /// A turn was added to the transcript
    TurnAppended(ConversationTurn),
    /// The session ended normally
    Ended(ConversationSummary),
    /// The session was cancelled
    Cancelled,
}

/// External services the orchestrator talks to
#[derive(Clone)]
pub struct Backends {
    /// Produces replies
    pub dialogue: Arc<dyn DialogueBackend>,
    /// Primary extractor
    pub extraction: Arc<dyn ExtractionBackend>,
    /// Stores extracted items and conversation records
    pub persistence: Arc<dyn PersistenceBackend>,
    /// Used when the extraction backend fails
    pub fallback: Arc<dyn FallbackExtractor>,
}

impl Backends {
    /// Backends with the keyword fallback extractor
    #[must_use]
    pub fn new(
        dialogue: Arc<dyn DialogueBackend>,
        extraction: Arc<dyn ExtractionBackend>,
        persistence: Arc<dyn PersistenceBackend>,
    ) -> Self {
        Self {
            dialogue,
            extraction,
            persistence,
            fallback: Arc::new(KeywordExtractor),
        }
    }

    /// Same backend for dialogue, extraction and persistence
    #[must_use]
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: DialogueBackend + ExtractionBackend + PersistenceBackend + 'static,
    {
        let dialogue = Arc::clone(&backend) as Arc<dyn DialogueBackend>;
        let extraction = Arc::clone(&backend) as Arc<dyn ExtractionBackend>;
        Self::new(dialogue, extraction, backend)
    }

    /// Backends that always fail, leaving only local fallbacks
    #[must_use]
    pub fn offline() -> Self {
        Self::shared(Arc::new(OfflineBackend))
    }

    /// Replace the fallback extractor
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackExtractor>) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Runs voice conversations, one at a time
#[derive(Clone)]
pub struct ConversationOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    speech: SpeechIo,
    backends: Backends,
    notifier: StatusNotifier,
    detector: WakeWordDetector,
    silence_debounce: Duration,
    shared: Mutex<Shared>,
    events: broadcast::Sender<ConversationEvent>,
}

#[derive(Default)]
struct Shared {
    generation: Generation,
    session: Option<Session>,
    silence: CancellableTimer,
}

impl Shared {
    fn session_mut(&mut self, generation: Generation) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.generation == generation)
    }
}

struct Session {
    generation: Generation,
    assistant_name: String,
    conversation_id: Option<String>,
    pending: String,
    /// Bumped on every debounce schedule; only the latest timer may act
    debounce: u64,
    state: ConversationState,
    transcript: Transcript,
    failed_replies: usize,
}

impl ConversationOrchestrator {
    /// Create an orchestrator using the default silence debounce
    #[must_use]
    pub fn new(
        speech: SpeechIo,
        backends: Backends,
        notifier: StatusNotifier,
        detector: WakeWordDetector,
    ) -> Self {
        Self::with_debounce(speech, backends, notifier, detector, DEFAULT_SILENCE_DEBOUNCE)
    }

    /// Create an orchestrator with an explicit silence debounce
    #[must_use]
    pub fn with_debounce(
        speech: SpeechIo,
        backends: Backends,
        notifier: StatusNotifier,
        detector: WakeWordDetector,
        silence_debounce: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                speech,
                backends,
                notifier,
                detector,
                silence_debounce,
                shared: Mutex::new(Shared::default()),
                events,
            }),
        }
    }

    /// Subscribe to conversation events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    /// Phase of the current session, `Idle` when there is none
    pub async fn state(&self) -> ConversationState {
        self.inner
            .shared
            .lock()
            .await
            .session
            .as_ref()
            .map_or(ConversationState::Idle, |s| s.state)
    }

    /// Whether a session is active
    pub async fn is_active(&self) -> bool {
        self.inner.shared.lock().await.session.is_some()
    }

    /// Transcript of the current session; empty when idle
    pub async fn transcript(&self) -> Transcript {
        self.inner
            .shared
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.transcript.clone())
            .unwrap_or_default()
    }

    /// Dialogue backend conversation id of the current session
    pub async fn conversation_id(&self) -> Option<String> {
        self.inner
            .shared
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|s| s.conversation_id.clone())
    }

    /// Start a session and begin listening
    ///
    /// Returns false without touching the running session if one is already
    /// active, or if the first listening pass cannot start.
    pub async fn start_conversation(&self, assistant_name: &str) -> bool {
        let generation = {
            let mut shared = self.inner.shared.lock().await;
            if shared.session.is_some() {
                tracing::warn!(error = %Error::SessionConflict, "conversation start ignored");
                return false;
            }

            let generation = shared.generation.advance();
            shared.session = Some(Session {
                generation,
                assistant_name: assistant_name.to_string(),
                conversation_id: None,
                pending: String::new(),
                debounce: 0,
                state: ConversationState::Idle,
                transcript: Transcript::new(),
                failed_replies: 0,
            });
            generation
        };

        tracing::info!(assistant = assistant_name, "conversation started");
        self.emit(ConversationEvent::Started {
            assistant_name: assistant_name.to_string(),
        });

        // The microphone is exclusive
        self.inner.detector.stop_listening().await;

        if let Err(e) = self.listen(generation).await {
            tracing::warn!(error = %e, "conversation could not start listening");
            let mut shared = self.inner.shared.lock().await;
            if shared.session_mut(generation).is_some() {
                shared.session = None;
                self.emit(ConversationEvent::StateChanged(ConversationState::Idle));
            }
            return false;
        }

        true
    }

    /// Abandon the current session without extraction or persistence
    ///
    /// Wake listening resumes afterwards. Returns false if no session was
    /// active.
    pub async fn cancel_conversation(&self) -> bool {
        self.abandon(true).await
    }

    /// Abandon the current session and leave wake listening off
    ///
    /// Returns false if no session was active.
    pub async fn cancel_without_resume(&self) -> bool {
        self.abandon(false).await
    }

    async fn abandon(&self, resume_detector: bool) -> bool {
        let session = {
            let mut shared = self.inner.shared.lock().await;
            shared.silence.cancel();
            let Some(session) = shared.session.take() else {
                return false;
            };
            session
        };

        tracing::info!(
            assistant = %session.assistant_name,
            turns = session.transcript.len(),
            "conversation cancelled"
        );

        self.inner.speech.cancel_listening().await;
        self.inner.speech.stop_speaking().await;
        self.inner.speech.speak(CANCEL_LINE).await;

        self.emit(ConversationEvent::StateChanged(ConversationState::Idle));
        self.inner.notifier.hide().await;
        if resume_detector {
            self.inner.detector.start_listening().await;
        }
        self.emit(ConversationEvent::Cancelled);
        true
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscriber is fine
        let _ = self.inner.events.send(event);
    }

    fn set_state(&self, session: &mut Session, state: ConversationState) {
        if session.state != state {
            tracing::debug!(from = ?session.state, to = ?state, "conversation state");
            session.state = state;
            self.emit(ConversationEvent::StateChanged(state));
        }
    }

    fn append(&self, session: &mut Session, role: Role, content: &str) {
        let turn = session.transcript.push(role, content).clone();
        self.emit(ConversationEvent::TurnAppended(turn));
    }

    /// Start a listening pass for the session, if it is still current
    async fn listen(&self, generation: Generation) -> Result<()> {
        let mut shared = self.inner.shared.lock().await;
        match shared.session_mut(generation) {
            Some(session) if session.state != ConversationState::Extracting => {}
            _ => return Ok(()),
        }

        let listening = self.inner.speech.start_listening().await?;

        if let Some(session) = shared.session_mut(generation) {
            session.pending.clear();
            self.set_state(session, ConversationState::Listening);
        }
        self.spawn_pump(generation, listening);
        Ok(())
    }

    /// Listen again, ending the session if the microphone is lost
    async fn resume_listening(&self, generation: Generation) {
        if let Err(e) = self.listen(generation).await {
            tracing::warn!(error = %e, "listening restart failed, ending conversation");
            self.finish(generation).await;
        }
    }

    fn spawn_pump(&self, generation: Generation, listening: Listening) {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.pump(generation, listening).await });
    }

    fn schedule_silence(&self, shared: &mut Shared, generation: Generation) {
        let Some(session) = shared.session_mut(generation) else {
            return;
        };
        session.debounce += 1;
        let debounce = session.debounce;

        let orchestrator = self.clone();
        shared.silence.schedule(self.inner.silence_debounce, async move {
            orchestrator.on_silence(generation, debounce).await;
        });
    }

    async fn pump(self, generation: Generation, mut listening: Listening) {
        while let Some(event) = listening.next().await {
            match event {
                RecognitionEvent::Partial(text) | RecognitionEvent::Final(text) => {
                    self.on_speech(generation, text).await;
                }
                RecognitionEvent::Error(RecognitionError::PermissionDenied) => {
                    tracing::warn!("microphone permission revoked, ending conversation");
                    self.finish(generation).await;
                    return;
                }
                RecognitionEvent::Error(err) => {
                    tracing::debug!(error = %err, "conversation pass failed");
                    self.on_pass_closed(generation).await;
                    return;
                }
                RecognitionEvent::End => {
                    self.on_pass_closed(generation).await;
                    return;
                }
            }
        }
    }

    async fn on_speech(&self, generation: Generation, text: String) {
        let mut shared = self.inner.shared.lock().await;
        let Some(session) = shared.session_mut(generation) else {
            return;
        };
        if session.state != ConversationState::Listening {
            return;
        }

        tracing::trace!(text = %text, "utterance updated");
        session.pending = text;
        self.schedule_silence(&mut shared, generation);
    }

    /// Pass ended; if nothing was heard, let the debounce restart listening
    async fn on_pass_closed(&self, generation: Generation) {
        let mut shared = self.inner.shared.lock().await;
        let Some(session) = shared.session_mut(generation) else {
            return;
        };
        if session.state != ConversationState::Listening || !session.pending.trim().is_empty() {
            return;
        }
        self.schedule_silence(&mut shared, generation);
    }

    async fn on_silence(&self, generation: Generation, debounce: u64) {
        let text = {
            let mut shared = self.inner.shared.lock().await;
            let Some(session) = shared.session_mut(generation) else {
                return;
            };
            // A newer utterance rescheduled the debounce after this one fired
            if session.debounce != debounce || session.state != ConversationState::Listening {
                return;
            }

            let text = std::mem::take(&mut session.pending).trim().to_string();
            if !text.is_empty() {
                self.set_state(session, ConversationState::Processing);
            }
            self.inner.speech.stop_listening().await;
            text
        };

        if text.is_empty() {
            tracing::trace!("silence without speech, listening again");
            self.resume_listening(generation).await;
            return;
        }

        if is_closing(&text) {
            tracing::info!(utterance = %text, "closing phrase heard");
            {
                let mut shared = self.inner.shared.lock().await;
                let Some(session) = shared.session_mut(generation) else {
                    return;
                };
                self.append(session, Role::User, &text);
            }
            self.finish(generation).await;
            return;
        }

        self.process_turn(generation, &text).await;
    }

    async fn process_turn(&self, generation: Generation, text: &str) {
        let conversation_id = {
            let mut shared = self.inner.shared.lock().await;
            let Some(session) = shared.session_mut(generation) else {
                return;
            };
            self.append(session, Role::User, text);
            session.conversation_id.clone()
        };

        let response = self
            .inner
            .backends
            .dialogue
            .send_message(text, conversation_id.as_deref(), DialogueMode::Voice)
            .await
            .and_then(ApiResponse::into_data);

        let reply = {
            let mut shared = self.inner.shared.lock().await;
            let Some(session) = shared.session_mut(generation) else {
                tracing::debug!("dropping reply for a conversation that has ended");
                return;
            };

            let reply = match response {
                Ok(reply) if !reply.ai_response.trim().is_empty() => {
                    session.conversation_id = Some(reply.conversation_id);
                    reply.ai_response
                }
                Ok(_) => {
                    tracing::warn!("dialogue backend returned an empty reply");
                    Self::next_fallback(session)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dialogue backend failed, using fallback reply");
                    Self::next_fallback(session)
                }
            };

            self.append(session, Role::Assistant, &reply);
            self.set_state(session, ConversationState::Speaking);
            reply
        };

        self.inner.speech.speak(&reply).await;
        self.resume_listening(generation).await;
    }

    fn next_fallback(session: &mut Session) -> String {
        let reply = fallback_reply(session.failed_replies);
        session.failed_replies += 1;
        reply.to_string()
    }

    /// End the session: goodbye, extraction, persistence, teardown
    async fn finish(&self, generation: Generation) {
        let (transcript, conversation_id) = {
            let mut shared = self.inner.shared.lock().await;
            let Some(session) = shared.session_mut(generation) else {
                return;
            };
            if session.state == ConversationState::Extracting {
                return;
            }
            self.set_state(session, ConversationState::Extracting);
            let snapshot = (session.transcript.clone(), session.conversation_id.clone());
            shared.silence.cancel();
            self.inner.speech.stop_listening().await;
            snapshot
        };

        self.inner.speech.speak(GOODBYE_LINE).await;

        let (data, source) = self.extract(&transcript).await;

        if !self.is_current(generation).await {
            tracing::debug!("conversation cancelled during extraction, nothing saved");
            return;
        }

        let mut summary = ConversationSummary::new(&data, source);
        summary.persistence_failures = self.persist(data, transcript, conversation_id).await;

        {
            let mut shared = self.inner.shared.lock().await;
            if shared.session_mut(generation).is_none() {
                return;
            }
            shared.silence.cancel();
            shared.session = None;
        }

        tracing::info!(
            summary = %summary,
            source = ?summary.source,
            persistence_failures = summary.persistence_failures,
            "conversation ended"
        );

        self.emit(ConversationEvent::StateChanged(ConversationState::Idle));
        self.inner.notifier.hide().await;
        self.inner.detector.start_listening().await;
        self.emit(ConversationEvent::Ended(summary));
    }

    async fn is_current(&self, generation: Generation) -> bool {
        self.inner
            .shared
            .lock()
            .await
            .session_mut(generation)
            .is_some()
    }

    async fn extract(&self, transcript: &Transcript) -> (ExtractedData, ExtractionSource) {
        let backends = &self.inner.backends;
        match backends
            .extraction
            .extract_from_transcript(&transcript.render())
            .await
            .and_then(ApiResponse::into_data)
        {
            Ok(data) => {
                tracing::debug!(items = data.total(), "extraction backend succeeded");
                (data, ExtractionSource::Backend)
            }
            Err(e) => {
                tracing::warn!(error = %e, "extraction backend failed, using keyword fallback");
                let data = backends.fallback.extract(transcript, Utc::now());
                (data, ExtractionSource::Fallback)
            }
        }
    }

    /// Save every item and the conversation record; returns the failure count
    async fn persist(
        &self,
        data: ExtractedData,
        transcript: Transcript,
        conversation_id: Option<String>,
    ) -> usize {
        let store = &self.inner.backends.persistence;
        let mut failures = 0;

        for task in &data.tasks {
            if !accepted("task", store.create_task(task).await) {
                failures += 1;
            }
        }
        for event in &data.events {
            if !accepted("event", store.create_event(event).await) {
                failures += 1;
            }
        }
        for reminder in &data.reminders {
            if !accepted("reminder", store.create_reminder(reminder).await) {
                failures += 1;
            }
        }

        let record = ConversationRecord {
            conversation_id,
            transcript,
            extracted_data: data,
        };
        if !accepted("conversation", store.save_conversation(&record).await) {
            failures += 1;
        }

        failures
    }
}

/// Whether the persistence backend accepted an item, logging if not
fn accepted(item: &str, result: Result<ApiResponse<serde_json::Value>>) -> bool {
    match result {
        Ok(response) if response.success => true,
        Ok(response) => {
            tracing::warn!(
                item,
                error = response.error.as_deref().unwrap_or("unknown"),
                "backend rejected item"
            );
            false
        }
        Err(e) => {
            tracing::warn!(item, error = %e, "failed to save item");
            false
        }
    }
}
