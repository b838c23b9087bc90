use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

pub const DEFAULT_TIMEOUT_SECS: u32 = 240;
pub const DEFAULT_RECORD_SECS: u32 = 5;

/// How the user answers: typed text or recorded speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Chat,
    Voice,
}

impl InputMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Chat => "Chat",
            Self::Voice => "Voice",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chat => "chat",
            Self::Voice => "voice",
        })
    }
}

impl FromStr for InputMode {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "voice" => Ok(Self::Voice),
            other => Err(ParleyError::Settings(format!(
                "unknown input mode: {other} (expected chat or voice)"
            ))),
        }
    }
}

/// User preferences that survive restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeout_seconds: u32,

    /// Unset until the user (or the server default) provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_seconds: Option<u32>,

    pub tts_enabled: bool,

    pub input_mode: InputMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            record_seconds: None,
            tts_enabled: false,
            input_mode: InputMode::Chat,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn record_seconds(&self) -> u32 {
        self.record_seconds.unwrap_or(DEFAULT_RECORD_SECS)
    }

    #[must_use]
    pub const fn has_record_seconds(&self) -> bool {
        self.record_seconds.is_some()
    }

    /// Zero falls back to the default.
    pub fn set_timeout_seconds(&mut self, secs: u32) {
        self.timeout_seconds = if secs == 0 { DEFAULT_TIMEOUT_SECS } else { secs };
    }

    /// Zero falls back to the default.
    pub fn set_record_seconds(&mut self, secs: u32) {
        self.record_seconds = Some(if secs == 0 { DEFAULT_RECORD_SECS } else { secs });
    }
}

/// A partial change to [`Settings`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsUpdate {
    pub timeout_seconds: Option<u32>,
    pub record_seconds: Option<u32>,
    pub tts_enabled: Option<bool>,
    pub input_mode: Option<InputMode>,
}

impl SettingsUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.timeout_seconds.is_none()
            && self.record_seconds.is_none()
            && self.tts_enabled.is_none()
            && self.input_mode.is_none()
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(secs) = self.timeout_seconds {
            settings.set_timeout_seconds(secs);
        }
        if let Some(secs) = self.record_seconds {
            settings.set_record_seconds(secs);
        }
        if let Some(enabled) = self.tts_enabled {
            settings.tts_enabled = enabled;
        }
        if let Some(mode) = self.input_mode {
            settings.input_mode = mode;
        }
    }
}

/// Reads and writes [`Settings`] as YAML.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted settings. Never fails: a missing or damaged file yields
    /// the defaults.
    #[must_use]
    pub fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_yaml_ng::from_str::<Settings>(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("failed to parse settings {}: {e}", self.path.display());
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!("failed to read settings {}: {e}", self.path.display());
                Settings::default()
            }
        }
    }

    /// Write settings atomically through a temp file in the same directory.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ParleyError::Settings(format!(
                    "failed to create settings directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let contents = serde_yaml_ng::to_string(settings)
            .map_err(|e| ParleyError::Settings(format!("failed to serialize settings: {e}")))?;

        let tmp_path = self.path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, contents).map_err(|e| {
            ParleyError::Settings(format!(
                "failed to write settings {}: {e}",
                tmp_path.display()
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            ParleyError::Settings(format!(
                "failed to move settings into place at {}: {e}",
                self.path.display()
            ))
        })?;

        tracing::debug!("settings saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let store = SettingsStore::new(dir.path().join("parley/settings.yaml"));
        (dir, store)
    }

    #[test]
    fn missing_file_gives_defaults() {
        let (_dir, store) = store();
        let settings = store.load();
        assert_eq!(settings.timeout_seconds, 240);
        assert_eq!(settings.record_seconds(), 5);
        assert!(!settings.has_record_seconds());
        assert!(!settings.tts_enabled);
        assert_eq!(settings.input_mode, InputMode::Chat);
    }

    #[test]
    fn save_then_load() {
        let (_dir, store) = store();
        let mut settings = Settings::default();
        SettingsUpdate {
            timeout_seconds: Some(120),
            record_seconds: Some(8),
            tts_enabled: Some(true),
            input_mode: Some(InputMode::Voice),
        }
        .apply(&mut settings);

        store.save(&settings).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(store.load(), settings);
        assert!(!store.path().with_extension("yaml.tmp").exists());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap_or_else(|| panic!("no parent")))
            .unwrap_or_else(|e| panic!("{e}"));
        std::fs::write(store.path(), "timeout_seconds: [oops").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap_or_else(|| panic!("no parent")))
            .unwrap_or_else(|e| panic!("{e}"));
        std::fs::write(store.path(), "input_mode: voice\n").unwrap_or_else(|e| panic!("{e}"));
        let settings = store.load();
        assert_eq!(settings.input_mode, InputMode::Voice);
        assert_eq!(settings.timeout_seconds, 240);
        assert!(!settings.has_record_seconds());
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let mut settings = Settings::default();
        settings.set_timeout_seconds(0);
        settings.set_record_seconds(0);
        assert_eq!(settings.timeout_seconds, 240);
        assert_eq!(settings.record_seconds, Some(5));
    }

    #[test]
    fn empty_update_changes_nothing() {
        let update = SettingsUpdate::default();
        assert!(update.is_empty());
        let mut settings = Settings::default();
        update.apply(&mut settings);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn input_mode_parsing() {
        assert_eq!("Voice".parse::<InputMode>().ok(), Some(InputMode::Voice));
        assert_eq!(" chat ".parse::<InputMode>().ok(), Some(InputMode::Chat));
        assert!("video".parse::<InputMode>().is_err());
        assert_eq!(InputMode::Voice.to_string(), "voice");
    }
}
