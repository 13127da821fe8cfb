//! AI and persistence backend contracts
//!
//! The orchestrator only sees these traits. [`HttpBackend`] talks to the
//! assistant REST API; [`OfflineBackend`] fails every call so the local
//! fallbacks take over.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpBackend;

use crate::conversation::{Event, ExtractedData, Reminder, Task, Transcript};
use crate::{Error, Result};

/// Envelope returned by every backend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload on success
    pub data: Option<T>,
    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Payload if the call reported success
    ///
    /// # Errors
    ///
    /// Returns `Backend` error if `success` is false or no data was sent
    pub fn into_data(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(Error::Backend("response carried no data".to_string())),
            (false, _) => Err(Error::Backend(
                self.error.unwrap_or_else(|| "request was not successful".to_string()),
            )),
        }
    }
}

/// How the dialogue backend should treat a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueMode {
    /// Spoken conversation: short replies suited to speech
    #[default]
    Voice,
    /// Typed chat
    Text,
}

/// Reply from the dialogue backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueReply {
    /// Conversation id to pass on the next turn
    pub conversation_id: String,
    /// Text to speak
    pub ai_response: String,
}

/// Record of a finished conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Dialogue backend conversation id, if one was assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Every turn
    pub transcript: Transcript,
    /// Items extracted from it
    pub extracted_data: ExtractedData,
}

/// AI dialogue backend
#[async_trait]
pub trait DialogueBackend: Send + Sync {
    /// Send one user utterance; `conversation_id` is `None` on the first turn
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
        mode: DialogueMode,
    ) -> Result<ApiResponse<DialogueReply>>;
}

/// AI extraction backend
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Extract tasks, events and reminders from a rendered transcript
    async fn extract_from_transcript(&self, transcript: &str) -> Result<ApiResponse<ExtractedData>>;
}

/// Persistence backend
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Store a task
    async fn create_task(&self, task: &Task) -> Result<ApiResponse<serde_json::Value>>;

    /// Store a calendar event
    async fn create_event(&self, event: &Event) -> Result<ApiResponse<serde_json::Value>>;

    /// Store a reminder
    async fn create_reminder(&self, reminder: &Reminder) -> Result<ApiResponse<serde_json::Value>>;

    /// Store the conversation with its extracted data
    async fn save_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<ApiResponse<serde_json::Value>>;
}

/// Backend used when no API is configured; every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

impl OfflineBackend {
    fn unavailable<T>() -> Result<ApiResponse<T>> {
        Err(Error::Backend("no assistant API configured".to_string()))
    }
}

#[async_trait]
impl DialogueBackend for OfflineBackend {
    async fn send_message(
        &self,
        _text: &str,
        _conversation_id: Option<&str>,
        _mode: DialogueMode,
    ) -> Result<ApiResponse<DialogueReply>> {
        Self::unavailable()
    }
}

#[async_trait]
impl ExtractionBackend for OfflineBackend {
    async fn extract_from_transcript(&self, _transcript: &str) -> Result<ApiResponse<ExtractedData>> {
        Self::unavailable()
    }
}

#[async_trait]
impl PersistenceBackend for OfflineBackend {
    async fn create_task(&self, _task: &Task) -> Result<ApiResponse<serde_json::Value>> {
        Self::unavailable()
    }

    async fn create_event(&self, _event: &Event) -> Result<ApiResponse<serde_json::Value>> {
        Self::unavailable()
    }

    async fn create_reminder(&self, _reminder: &Reminder) -> Result<ApiResponse<serde_json::Value>> {
        Self::unavailable()
    }

    async fn save_conversation(
        &self,
        _record: &ConversationRecord,
    ) -> Result<ApiResponse<serde_json::Value>> {
        Self::unavailable()
    }
}
