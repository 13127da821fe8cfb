//! HTTP client for the assistant REST API

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    ApiResponse, ConversationRecord, DialogueBackend, DialogueMode, DialogueReply,
    ExtractionBackend, PersistenceBackend,
};
use crate::conversation::{Event, ExtractedData, Reminder, Task};
use crate::voice::{Transcription, TranscriptionService};
use crate::{Error, Result};

/// Request timeout for every call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    message: &'a str,
    conversation_id: Option<&'a str>,
    mode: DialogueMode,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    transcript: &'a str,
}

/// Client for the assistant REST API
///
/// Implements every backend contract the core consumes plus audio file
/// transcription.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Create a client for `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("assistant API URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<ApiResponse<T>>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "backend request");

        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%url, error = %e, "backend request failed");
                e
            })?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<ApiResponse<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "backend API error");
            return Err(Error::Backend(format!("API error {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DialogueBackend for HttpBackend {
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
        mode: DialogueMode,
    ) -> Result<ApiResponse<DialogueReply>> {
        let request = ChatRequest {
            message: text,
            conversation_id,
            mode,
        };
        self.post("/ai/chat", &request).await
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn extract_from_transcript(&self, transcript: &str) -> Result<ApiResponse<ExtractedData>> {
        self.post("/ai/extract", &ExtractRequest { transcript }).await
    }
}

#[async_trait]
impl PersistenceBackend for HttpBackend {
    async fn create_task(&self, task: &Task) -> Result<ApiResponse<serde_json::Value>> {
        self.post("/tasks", task).await
    }

    async fn create_event(&self, event: &Event) -> Result<ApiResponse<serde_json::Value>> {
        self.post("/events", event).await
    }

    async fn create_reminder(&self, reminder: &Reminder) -> Result<ApiResponse<serde_json::Value>> {
        self.post("/reminders", reminder).await
    }

    async fn save_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<ApiResponse<serde_json::Value>> {
        self.post("/conversations", record).await
    }
}

#[async_trait]
impl TranscriptionService for HttpBackend {
    async fn transcribe(&self, path: &Path) -> Result<Transcription> {
        let audio = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "audio.m4a".to_string(), |n| n.to_string_lossy().into_owned());
        tracing::debug!(audio_bytes = audio.len(), %file_name, "uploading audio for transcription");

        let form = reqwest::multipart::Form::new().part(
            "audio",
            reqwest::multipart::Part::bytes(audio).file_name(file_name),
        );

        let url = format!("{}/speech/transcribe", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "transcription request failed");
                e
            })?;

        Self::parse::<Transcription>(response)
            .await?
            .into_data()
            .map_err(|e| Error::Transcription(e.to_string()))
    }
}
