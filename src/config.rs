// Configuration for the mood detector

use crate::error::{MoodDetectorError, Result};
use crate::mood::TieBreak;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable overriding `server_url`
pub const SERVER_URL_ENV: &str = "MOOD_DETECTOR_SERVER_URL";

/// Per-stage deadlines, in milliseconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub model_load_ms: u64,
    pub camera_access_ms: u64,
    pub playback_start_ms: u64,
    pub inference_ms: u64,
    pub report_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            model_load_ms: 30_000,
            camera_access_ms: 30_000,
            playback_start_ms: 10_000,
            inference_ms: 10_000,
            report_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn model_load(&self) -> Duration {
        Duration::from_millis(self.model_load_ms)
    }

    pub fn camera_access(&self) -> Duration {
        Duration::from_millis(self.camera_access_ms)
    }

    pub fn playback_start(&self) -> Duration {
        Duration::from_millis(self.playback_start_ms)
    }

    pub fn inference(&self) -> Duration {
        Duration::from_millis(self.inference_ms)
    }

    pub fn report(&self) -> Duration {
        Duration::from_millis(self.report_ms)
    }
}

/// Top-level configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodConfig {
    /// Base URL of the mood decision service
    pub server_url: String,
    /// Path of the mood submission endpoint
    pub mood_endpoint: String,
    /// Directory the four model artifacts are loaded from
    pub model_base_path: String,
    pub camera_index: u32,
    /// Minimum detector score for a face to count
    pub min_face_confidence: f32,
    pub tie_break: TieBreak,
    pub timeouts: Timeouts,
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            mood_endpoint: "/detect_mood".to_string(),
            model_base_path: "assets/models".to_string(),
            camera_index: 0,
            min_face_confidence: 0.5,
            tie_break: TieBreak::PreferEarlier,
            timeouts: Timeouts::default(),
        }
    }
}

impl MoodConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {:?} doesn't exist, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: MoodConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(server_url) = std::env::var(SERVER_URL_ENV) {
            info!("Using server URL from {}", SERVER_URL_ENV);
            self.server_url = server_url;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&self.server_url).map_err(|e| {
            MoodDetectorError::Config(format!("invalid server_url {:?}: {e}", self.server_url))
        })
    }

    fn validate(&self) -> Result<()> {
        self.server_url()?;
        if !(0.0..=1.0).contains(&self.min_face_confidence) {
            return Err(MoodDetectorError::Config(format!(
                "min_face_confidence must be within [0, 1], got {}",
                self.min_face_confidence
            )));
        }
        if self.model_base_path.is_empty() {
            return Err(MoodDetectorError::Config(
                "model_base_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
