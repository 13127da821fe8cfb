//! Voice settings and user preference storage

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::wake_word::WakeWordConfig;
use crate::Result;

/// Pitch and rate applied to synthesized speech
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceProfile {
    /// Pitch multiplier (1.0 = engine default)
    pub pitch: f32,
    /// Speaking rate multiplier (1.0 = engine default)
    pub rate: f32,
}

impl VoiceProfile {
    /// Engine defaults, used when no preference is stored
    pub const NEUTRAL: Self = Self {
        pitch: 1.0,
        rate: 1.0,
    };

    /// Map a symbolic voice identity to its profile
    ///
    /// Unknown identities resolve to [`VoiceProfile::NEUTRAL`]
    #[must_use]
    pub fn for_voice(voice_id: &str) -> Self {
        match voice_id.trim().to_lowercase().as_str() {
            "warm" => Self {
                pitch: 0.9,
                rate: 0.95,
            },
            "bright" => Self {
                pitch: 1.15,
                rate: 1.05,
            },
            "calm" => Self {
                pitch: 0.95,
                rate: 0.85,
            },
            "energetic" => Self {
                pitch: 1.1,
                rate: 1.15,
            },
            _ => Self::NEUTRAL,
        }
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Options passed to the synthesis engine for one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakOptions {
    /// BCP 47 language tag (e.g. "en-US")
    pub language: String,
    /// Pitch multiplier
    pub pitch: f32,
    /// Rate multiplier
    pub rate: f32,
    /// Symbolic voice identity, if one is selected
    pub voice: Option<String>,
}

impl SpeakOptions {
    /// Build options for a language and an optional voice identity
    #[must_use]
    pub fn resolve(language: &str, voice: Option<String>) -> Self {
        let profile = voice
            .as_deref()
            .map_or(VoiceProfile::NEUTRAL, VoiceProfile::for_voice);
        Self {
            language: language.to_string(),
            pitch: profile.pitch,
            rate: profile.rate,
            voice,
        }
    }
}

/// External store for user preferences
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Selected voice identity, if any
    async fn voice_id(&self) -> Result<Option<String>>;

    /// Stored wake-word configuration, if any
    async fn load_wake_word(&self) -> Result<Option<WakeWordConfig>>;

    /// Persist the wake-word configuration
    async fn save_wake_word(&self, config: &WakeWordConfig) -> Result<()>;
}

/// In-memory preference store
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    voice_id: Mutex<Option<String>>,
    wake_word: Mutex<Option<WakeWordConfig>>,
}

impl MemoryPreferences {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a voice identity selected
    #[must_use]
    pub fn with_voice(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: Mutex::new(Some(voice_id.into())),
            wake_word: Mutex::new(None),
        }
    }

    /// Select a voice identity
    pub fn set_voice(&self, voice_id: Option<String>) {
        *self.voice_id.lock().unwrap_or_else(PoisonError::into_inner) = voice_id;
    }

    /// Last saved wake-word configuration
    #[must_use]
    pub fn wake_word(&self) -> Option<WakeWordConfig> {
        self.wake_word
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn voice_id(&self) -> Result<Option<String>> {
        Ok(self
            .voice_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn load_wake_word(&self) -> Result<Option<WakeWordConfig>> {
        Ok(self.wake_word())
    }

    async fn save_wake_word(&self, config: &WakeWordConfig) -> Result<()> {
        *self.wake_word.lock().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(())
    }
}
