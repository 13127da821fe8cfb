//! TOML configuration file loading
//!
//! Supports `config.toml` in the platform config directory as a persistent
//! config source. All fields are optional; the file is a partial overlay on
//! top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CompanionConfigFile {
    /// Assistant configuration
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Assistant REST API
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Timing overrides
    #[serde(default)]
    pub timing: TimingFileConfig,
}

/// Assistant identity and voice
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Name the assistant answers to (e.g. "Sora")
    pub name: Option<String>,

    /// Wake phrase override (defaults to "hey <name>")
    pub wake_phrase: Option<String>,

    /// Recognition and synthesis locale (e.g. "en-US")
    pub locale: Option<String>,

    /// Voice profile id ("warm", "bright", "calm", "energetic")
    pub voice: Option<String>,
}

/// Assistant REST API
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL
    pub base_url: Option<String>,

    /// Bearer key
    pub api_key: Option<String>,
}

/// Timing overrides, in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct TimingFileConfig {
    pub silence_debounce_ms: Option<u64>,
    pub wake_restart_delay_ms: Option<u64>,
    pub wake_error_backoff_ms: Option<u64>,
}

/// Read a config file
///
/// A missing file yields the empty overlay.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed
pub fn read_config_file(path: &Path) -> Result<CompanionConfigFile> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file");
        return Ok(CompanionConfigFile::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Load the TOML config file from the standard path
///
/// Returns `CompanionConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CompanionConfigFile {
    let Some(path) = config_file_path() else {
        return CompanionConfigFile::default();
    };

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            CompanionConfigFile::default()
        }
    }
}

/// Return the config file path, e.g. `~/.config/voice-companion/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "companion", "voice-companion")
        .map(|d| d.config_dir().join("config.toml"))
}
