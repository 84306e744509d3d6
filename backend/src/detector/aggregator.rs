use shared::{DetectionSource, ImageMetadata, Label, PredictionResponse};

use super::gemini::{ClassificationResult, ClassifierError, ImageClassifier};
use super::heuristic::{HeuristicScorer, HeuristicSignals};
use super::normalizer::ImageSample;

const FAKE_THRESHOLD: f64 = 0.5;

/// Why the primary classifier's answer was not used.
#[derive(Debug)]
pub enum FallbackReason {
    Unconfigured,
    Unavailable(ClassifierError),
}

#[derive(Debug)]
pub enum Decision {
    Primary(ClassificationResult),
    Fallback {
        signals: HeuristicSignals,
        reason: FallbackReason,
    },
}

/// Final verdict for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOutcome {
    fake_probability: f64,
    label: Label,
    confidence: f64,
    source: DetectionSource,
}

impl DetectionOutcome {
    pub fn new(fake_probability: f64, source: DetectionSource) -> Self {
        let fake_probability = if fake_probability.is_nan() {
            FAKE_THRESHOLD
        } else {
            fake_probability.clamp(0.0, 1.0)
        };

        let (label, confidence) = if fake_probability > FAKE_THRESHOLD {
            (Label::Fake, fake_probability)
        } else {
            (Label::Real, 1.0 - fake_probability)
        };

        Self {
            fake_probability,
            label,
            confidence: (confidence * 100.0).round() / 100.0,
            source,
        }
    }

    pub fn fake_probability(&self) -> f64 {
        self.fake_probability
    }

    pub fn label(&self) -> Label {
        self.label
    }

    /// Certainty in the returned label, rounded to two decimals.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source(&self) -> DetectionSource {
        self.source
    }

    pub fn to_response(&self, metadata: Option<ImageMetadata>) -> PredictionResponse {
        PredictionResponse {
            label: self.label,
            confidence: self.confidence,
            source: Some(self.source),
            metadata,
        }
    }
}

/// Two-tier detector: the primary classifier when configured, the
/// heuristic scorer otherwise or when the primary call fails.
pub struct Detector<C> {
    primary: Option<C>,
    heuristic: HeuristicScorer,
}

impl<C: ImageClassifier> Detector<C> {
    pub fn new(primary: Option<C>, heuristic: HeuristicScorer) -> Self {
        Self { primary, heuristic }
    }

    pub fn primary_available(&self) -> bool {
        self.primary.is_some()
    }

    /// Makes at most one primary call; never fails. Any completed reply is
    /// a primary decision, a reply without a verdict counting as UNKNOWN/50.
    pub async fn decide(&self, sample: &ImageSample) -> Decision {
        let reason = match &self.primary {
            None => FallbackReason::Unconfigured,
            Some(primary) => match primary.classify(sample).await {
                Ok(reply) => return Decision::Primary(reply.classification()),
                Err(e) => FallbackReason::Unavailable(e),
            },
        };

        Decision::Fallback {
            signals: self.heuristic.signals(sample),
            reason,
        }
    }

    pub fn resolve(&self, decision: &Decision) -> DetectionOutcome {
        match decision {
            Decision::Primary(result) => {
                DetectionOutcome::new(result.fake_probability(), DetectionSource::Primary)
            }
            Decision::Fallback { signals, reason } => {
                match reason {
                    FallbackReason::Unconfigured => {
                        log::debug!("Primary classifier not configured, using heuristics")
                    }
                    FallbackReason::Unavailable(e) => {
                        log::warn!("Primary classifier failed: {}; falling back to heuristics", e)
                    }
                }
                DetectionOutcome::new(self.heuristic.score(signals), DetectionSource::Heuristic)
            }
        }
    }

    pub async fn detect(&self, sample: &ImageSample) -> DetectionOutcome {
        let decision = self.decide(sample).await;
        let outcome = self.resolve(&decision);
        log::info!(
            "Detection result: {} ({:.3} fake, source {})",
            outcome.label(),
            outcome.fake_probability(),
            outcome.source()
        );
        outcome
    }
}
