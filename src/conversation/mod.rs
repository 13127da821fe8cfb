//! Voice conversations after the wake phrase
//!
//! The orchestrator drives a listen/reply loop against the dialogue backend
//! and, when the user signs off, extracts tasks, events and reminders from
//! the transcript.

mod extract;
mod orchestrator;
mod phrases;
mod transcript;

pub use extract::{
    ConversationSummary, Event, ExtractedData, ExtractionSource, FallbackExtractor,
    KeywordExtractor, Priority, Reminder, Task,
};
pub use orchestrator::{Backends, ConversationEvent, ConversationOrchestrator, ConversationState};
pub use phrases::{CANCEL_LINE, CLOSING_PHRASES, FALLBACK_REPLIES, GOODBYE_LINE, is_closing};
pub use transcript::{ConversationTurn, Role, Transcript};
