//! Configuration management for the voice companion
//!
//! Precedence is env > TOML file > defaults.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::voice::{WakeTiming, WakeWordConfig};
use crate::{Error, Result};

/// Assistant name used when none is configured
pub const DEFAULT_ASSISTANT_NAME: &str = "Sora";

/// Locale used when none is configured
pub const DEFAULT_LOCALE: &str = "en-US";

/// Quiet period after the last recognition result before a turn is processed
pub const DEFAULT_SILENCE_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Wake listening restart delay after a normal end of utterance
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Wake listening restart delay after a recognition error
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Timer durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Silence debounce for conversation turns
    pub silence_debounce: Duration,
    /// Wake-word restart timing
    pub wake: WakeTiming,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            silence_debounce: DEFAULT_SILENCE_DEBOUNCE,
            wake: WakeTiming::default(),
        }
    }
}

/// Assistant REST API settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL; `None` runs offline
    pub base_url: Option<String>,
    /// Bearer key
    pub api_key: Option<String>,
}

/// Voice companion configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Name the assistant answers to
    pub assistant_name: String,

    /// Wake phrase override; `None` means "hey <name>"
    pub wake_phrase: Option<String>,

    /// Recognition and synthesis locale
    pub locale: String,

    /// Preferred voice profile id
    pub voice: Option<String>,

    /// Assistant REST API
    pub api: ApiConfig,

    /// Timer durations
    pub timing: TimingConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
            wake_phrase: None,
            locale: DEFAULT_LOCALE.to_string(),
            voice: None,
            api: ApiConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl AssistantConfig {
    /// Load configuration
    ///
    /// Reads `path` if given, otherwise the standard config file location,
    /// then applies `COMPANION_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given file cannot be read or parsed, or
    /// if the resulting configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };

        let mut config = Self::default();
        config.apply_file(fc);
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a config file
    pub fn apply_file(&mut self, fc: file::CompanionConfigFile) {
        let assistant = fc.assistant;
        if let Some(name) = assistant.name {
            self.assistant_name = name;
        }
        if assistant.wake_phrase.is_some() {
            self.wake_phrase = assistant.wake_phrase;
        }
        if let Some(locale) = assistant.locale {
            self.locale = locale;
        }
        if assistant.voice.is_some() {
            self.voice = assistant.voice;
        }

        if fc.api.base_url.is_some() {
            self.api.base_url = fc.api.base_url;
        }
        if fc.api.api_key.is_some() {
            self.api.api_key = fc.api.api_key;
        }

        let timing = fc.timing;
        if let Some(ms) = timing.silence_debounce_ms {
            self.timing.silence_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.wake_restart_delay_ms {
            self.timing.wake.restart_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.wake_error_backoff_ms {
            self.timing.wake.error_backoff = Duration::from_millis(ms);
        }
    }

    /// Overlay values from environment variables, read through `lookup`
    ///
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = var("COMPANION_ASSISTANT_NAME") {
            self.assistant_name = name;
        }
        if let Some(phrase) = var("COMPANION_WAKE_PHRASE") {
            self.wake_phrase = Some(phrase);
        }
        if let Some(locale) = var("COMPANION_LOCALE") {
            self.locale = locale;
        }
        if let Some(voice) = var("COMPANION_VOICE") {
            self.voice = Some(voice);
        }
        if let Some(url) = var("COMPANION_API_URL") {
            self.api.base_url = Some(url);
        }
        if let Some(key) = var("COMPANION_API_KEY") {
            self.api.api_key = Some(key);
        }
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns `Config` error if the assistant name or locale is empty
    pub fn validate(&self) -> Result<()> {
        if self.assistant_name.trim().is_empty() {
            return Err(Error::Config("assistant name must not be empty".to_string()));
        }
        if self.locale.trim().is_empty() {
            return Err(Error::Config("locale must not be empty".to_string()));
        }
        Ok(())
    }

    /// Wake-word configuration derived from these settings
    #[must_use]
    pub fn wake_word(&self) -> WakeWordConfig {
        let mut config = WakeWordConfig::for_assistant(&self.assistant_name);
        if let Some(phrase) = &self.wake_phrase {
            config.wake_phrase = phrase.trim().to_lowercase();
        }
        config
    }
}
