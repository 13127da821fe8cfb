//! Voice Companion - voice interaction core for a spoken personal assistant
//!
//! This library provides:
//! - Speech I/O over pluggable recognition and synthesis engines
//! - Wake word detection with automatic restart
//! - A status notifier mirroring assistant state
//! - Conversation orchestration with extraction of tasks, events and reminders
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Assistant                        │
//! │   Wake Word  │  Conversation  │  Status Notifier    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Speech I/O                       │
//! │   Recognition  │  Synthesis  │  Transcription        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Assistant REST API                   │
//! │   Dialogue  │  Extraction  │  Persistence            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod notify;
pub mod timer;
pub mod voice;

pub use assistant::{AppState, Assistant, Collaborators};
pub use backend::{HttpBackend, OfflineBackend};
pub use config::AssistantConfig;
pub use conversation::{
    Backends, ConversationEvent, ConversationOrchestrator, ConversationState, ConversationSummary,
};
pub use error::{Error, Permission, Result};
pub use notify::{LogAlerts, StatusNotifier};
pub use voice::{SpeechIo, WakeWordDetector};
