use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
const GEMINI_DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process settings read once from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub request_timeout: Duration,
    pub heuristics_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_url: GEMINI_DEFAULT_URL.to_string(),
            gemini_model: GEMINI_DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(GEMINI_DEFAULT_TIMEOUT_SECS),
            heuristics_path: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let request_timeout = match env::var("GEMINI_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    log::warn!(
                        "Ignoring invalid GEMINI_TIMEOUT_SECS={:?}, using {}s",
                        raw,
                        GEMINI_DEFAULT_TIMEOUT_SECS
                    );
                    Duration::from_secs(GEMINI_DEFAULT_TIMEOUT_SECS)
                }
            },
            Err(_) => Duration::from_secs(GEMINI_DEFAULT_TIMEOUT_SECS),
        };

        Self {
            gemini_api_key,
            gemini_api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| GEMINI_DEFAULT_URL.to_string()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| GEMINI_DEFAULT_MODEL.to_string()),
            request_timeout,
            heuristics_path: env::var("HEURISTICS_CONFIG").ok().map(PathBuf::from),
        }
    }
}

/// Calibration data for the heuristic scorer.
///
/// These values are hand-tuned, not derived. Revise them here (or in
/// `config/heuristics.yaml`) rather than in the scoring code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicConfig {
    pub version: f32,
    pub weights: HeuristicWeights,
    pub square_tolerance: f64,
    pub square_multiple: u32,
    pub photo_envelope: PhotoEnvelope,
    pub aspect_ratio_tolerance: f64,
    pub photo_aspect_ratios: Vec<(u32, u32)>,
    pub generator_dimensions: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicWeights {
    pub camera_exif: f64,
    pub generator_dimensions: f64,
    pub square_multiple: f64,
    pub irregular: f64,
    pub base_offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhotoEnvelope {
    pub min_side: u32,
    pub max_side: u32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            camera_exif: -0.7,
            generator_dimensions: 0.6,
            square_multiple: 0.4,
            irregular: -0.4,
            base_offset: 0.3,
        }
    }
}

impl Default for PhotoEnvelope {
    fn default() -> Self {
        Self {
            min_side: 500,
            max_side: 2100,
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            version: 1.0,
            weights: HeuristicWeights::default(),
            square_tolerance: 0.01,
            square_multiple: 64,
            photo_envelope: PhotoEnvelope::default(),
            aspect_ratio_tolerance: 0.1,
            photo_aspect_ratios: vec![(1, 1), (16, 9), (9, 16), (4, 3), (3, 4), (2, 1), (1, 2)],
            generator_dimensions: vec![
                (512, 512),
                (768, 768),
                (1024, 1024),
                (512, 768),
                (768, 512),
                (1024, 1792),
                (1792, 1024),
                (1456, 816),
                (816, 1456),
                (2048, 2048),
            ],
        }
    }
}

impl HeuristicConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: HeuristicConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the calibration file named by the settings, or the repository
    /// default next to the crate. A missing or broken file keeps the
    /// compiled-in defaults so the scorer is always usable.
    pub fn load_or_default(settings: &Settings) -> Self {
        let path = match &settings.heuristics_path {
            Some(path) => path.clone(),
            None => match env::var("CARGO_MANIFEST_DIR") {
                Ok(manifest_dir) => PathBuf::from(format!(
                    "{}/../config/heuristics.yaml",
                    manifest_dir
                )),
                Err(_) => PathBuf::from("config/heuristics.yaml"),
            },
        };

        if !path.exists() {
            log::info!(
                "No heuristics config at {}, using built-in calibration",
                path.display()
            );
            return Self::default();
        }

        match Self::from_file(&path) {
            Ok(config) => {
                log::info!("Loaded heuristics config from {}", path.display());
                config
            }
            Err(e) => {
                log::error!(
                    "Failed to load heuristics config {}: {}; using built-in calibration",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.square_multiple == 0 {
            return Err(ConfigError::Invalid("square_multiple must be positive".into()));
        }
        if self.square_tolerance < 0.0 || self.aspect_ratio_tolerance < 0.0 {
            return Err(ConfigError::Invalid("tolerances must not be negative".into()));
        }
        if self.photo_envelope.min_side > self.photo_envelope.max_side {
            return Err(ConfigError::Invalid(
                "photo_envelope.min_side exceeds max_side".into(),
            ));
        }
        if self.photo_aspect_ratios.iter().any(|&(_, h)| h == 0) {
            return Err(ConfigError::Invalid(
                "photo_aspect_ratios entries need a non-zero height".into(),
            ));
        }
        Ok(())
    }
}
