use std::sync::OnceLock;

use super::aggregator::Detector;
use super::config::{HeuristicConfig, Settings};
use super::gemini::GeminiClassifier;
use super::heuristic::HeuristicScorer;

static DETECTOR: OnceLock<DetectorService> = OnceLock::new();

/// What the process knows about the primary classifier. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    pub credential_present: bool,
    /// Credential present and the client was built.
    pub available: bool,
}

pub struct DetectorService {
    config: DetectorConfig,
    detector: Detector<GeminiClassifier>,
}

impl DetectorService {
    pub fn from_settings(settings: &Settings) -> Self {
        let heuristic = HeuristicScorer::new(HeuristicConfig::load_or_default(settings));

        let primary = match &settings.gemini_api_key {
            Some(api_key) => match GeminiClassifier::new(api_key.clone(), settings) {
                Ok(classifier) => {
                    log::info!(
                        "Gemini API configured and ready (model {})",
                        classifier.model()
                    );
                    Some(classifier)
                }
                Err(e) => {
                    log::error!("Failed to configure Gemini client, using heuristics only: {}", e);
                    None
                }
            },
            None => {
                log::warn!("No Gemini API key found, using heuristics only");
                None
            }
        };

        let config = DetectorConfig {
            credential_present: settings.gemini_api_key.is_some(),
            available: primary.is_some(),
        };

        Self {
            config,
            detector: Detector::new(primary, heuristic),
        }
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    pub fn detector(&self) -> &Detector<GeminiClassifier> {
        &self.detector
    }
}

/// Builds the process-wide detector on first call; later calls return the
/// same instance and ignore `settings`.
pub fn init(settings: &Settings) -> &'static DetectorService {
    DETECTOR.get_or_init(|| DetectorService::from_settings(settings))
}
