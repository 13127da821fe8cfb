//! Voice processing module
//!
//! Speech recognition and synthesis behind [`SpeechIo`], plus the wake word
//! detector that runs on top of it while no conversation is active.

mod adapter;
pub mod console;
mod engine;
mod settings;
mod wake_word;

pub use adapter::{Listening, SpeechIo};
pub use engine::{
    EventHub, RecognitionEngine, RecognitionError, RecognitionEvent, SpeechOutcome, Subscription,
    SynthesisEngine, Transcription, TranscriptionService,
};
pub use settings::{MemoryPreferences, PreferenceStore, SpeakOptions, VoiceProfile};
pub use wake_word::{
    Activation, DetectorState, VariantMatcher, WakePhraseMatcher, WakeTiming, WakeWordConfig,
    WakeWordDetector,
};
