use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::audio::resample::TARGET_SAMPLE_RATE;
use crate::error::{ParleyError, Result};

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    60
}

const fn default_target_rate() -> u32 {
    TARGET_SAMPLE_RATE
}

fn default_language_code() -> String {
    "en-US".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    /// Overrides where persisted settings are stored.
    pub settings_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub device: Option<String>,

    #[serde(default = "default_target_rate")]
    pub target_rate: u32,

    #[serde(default = "default_language_code")]
    pub language_code: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            target_rate: default_target_rate(),
            language_code: default_language_code(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml_ng::from_str(&contents).map_err(|e| {
            ParleyError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        if config.audio.target_rate == 0 {
            return Err(ParleyError::Config(format!(
                "audio.target_rate must be non-zero in {}",
                path.display()
            )));
        }

        Ok(config)
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        config_dir.join("parley/config.yaml")
    }

    /// Where the persisted settings file lives.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path.as_deref().map_or_else(
            || {
                let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
                config_dir.join("parley/settings.yaml")
            },
            Self::expand_path,
        )
    }

    /// Expand `~` in a path string to the user's home directory.
    #[must_use]
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}
