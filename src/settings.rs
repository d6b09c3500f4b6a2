use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{CaptureLimits, MAX_SAMPLE_RATE};

const SETTINGS_FILE_NAME: &str = "settings.json";

pub const ENV_SERVER_URL: &str = "SPEAKUP_SERVER_URL";
pub const ENV_SESSION_COOKIE: &str = "SPEAKUP_SESSION_COOKIE";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("Failed to create config directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Write settings {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the practice backend.
    pub server_url: String,

    /// Session cookie sent with every request (`name=value`); the backend requires login.
    pub session_cookie: Option<String>,

    /// Requested microphone sample rate (mono).
    pub sample_rate: u32,

    /// Recordings shorter than this are rejected before upload.
    pub min_capture_ms: u64,

    /// Encoded WAVs smaller than this are rejected as silent/corrupt.
    pub min_encoded_bytes: usize,

    /// Upload requests are cancelled after this long.
    pub upload_timeout_ms: u64,

    /// Wait after stopping the device before reading the samples, so an
    /// in-flight audio callback can finish.
    pub settle_delay_ms: u64,

    /// Level meter refresh interval.
    pub level_frame_ms: u64,

    /// Keep a local copy of each encoded recording.
    pub keep_recordings: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            session_cookie: None,
            sample_rate: 44_100,
            min_capture_ms: 1000,
            min_encoded_bytes: 1000,
            upload_timeout_ms: 30_000,
            settle_delay_ms: 100,
            level_frame_ms: 33,
            keep_recordings: false,
        }
    }
}

impl AppSettings {
    pub fn limits(&self) -> CaptureLimits {
        CaptureLimits {
            min_capture_ms: self.min_capture_ms,
            min_encoded_bytes: self.min_encoded_bytes,
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn level_frame(&self) -> Duration {
        Duration::from_millis(self.level_frame_ms.max(1))
    }

    /// Replace values the encoder cannot represent with defaults.
    fn sanitized(mut self) -> Self {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            let fallback = AppSettings::default().sample_rate;
            log::warn!(
                "Settings: sample_rate {} out of range (1..={}), using {}",
                self.sample_rate,
                MAX_SAMPLE_RATE,
                fallback
            );
            self.sample_rate = fallback;
        }
        self
    }

    /// Apply overrides from the process environment (after `.env` is loaded).
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.is_empty()) {
            log::debug!("Settings: server_url from {}", ENV_SERVER_URL);
            self.server_url = url;
        }
        if let Some(cookie) = lookup(ENV_SESSION_COOKIE).filter(|v| !v.is_empty()) {
            log::debug!("Settings: session cookie from {}", ENV_SESSION_COOKIE);
            self.session_cookie = Some(cookie);
        }
    }
}

/// Returns: ~/.config/speakup-capture/settings.json
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(dir.join("speakup-capture").join(SETTINGS_FILE_NAME))
}

/// Load settings, falling back to defaults when the file is missing or unreadable.
pub fn load_settings(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(settings)?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents).map_err(|source| SettingsError::Write {
        path: tmp_path.clone(),
        source,
    })?;

    // On Windows, rename fails if the destination exists.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(SettingsError::Write {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }

    std::fs::rename(&tmp_path, path).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
