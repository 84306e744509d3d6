use super::config::HeuristicConfig;
use super::normalizer::ImageSample;

/// Observations the fallback scorer works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicSignals {
    pub width: u32,
    pub height: u32,
    pub camera_exif: bool,
    pub generator_dimensions: bool,
    pub square_multiple: bool,
    pub irregular: bool,
}

/// Deterministic dimension/EXIF scorer used when the primary classifier
/// cannot answer.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer {
    config: HeuristicConfig,
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    pub fn signals(&self, sample: &ImageSample) -> HeuristicSignals {
        self.signals_for(sample.width(), sample.height(), sample.has_camera_exif())
    }

    pub fn signals_for(&self, width: u32, height: u32, camera_exif: bool) -> HeuristicSignals {
        let config = &self.config;
        let aspect_ratio = if height > 0 {
            width as f64 / height as f64
        } else {
            1.0
        };

        let generator_dimensions = config.generator_dimensions.contains(&(width, height));

        let is_square = (aspect_ratio - 1.0).abs() < config.square_tolerance;
        let square_multiple = is_square && width % config.square_multiple == 0 && !camera_exif;

        let envelope = &config.photo_envelope;
        let outside_envelope = width < envelope.min_side
            || height < envelope.min_side
            || width > envelope.max_side
            || height > envelope.max_side;
        let unusual_ratio = !config
            .photo_aspect_ratios
            .iter()
            .any(|&(w, h)| (aspect_ratio - w as f64 / h as f64).abs() < config.aspect_ratio_tolerance);

        HeuristicSignals {
            width,
            height,
            camera_exif,
            generator_dimensions,
            square_multiple,
            irregular: outside_envelope || unusual_ratio,
        }
    }

    /// Maps the signals to a fake probability in `[0, 1]`.
    pub fn score(&self, signals: &HeuristicSignals) -> f64 {
        let weights = &self.config.weights;
        let mut score = 0.0;

        if signals.camera_exif {
            score += weights.camera_exif;
        }
        if signals.generator_dimensions {
            score += weights.generator_dimensions;
        }
        if signals.square_multiple {
            score += weights.square_multiple;
        }
        if signals.irregular {
            score += weights.irregular;
        }

        let fake_probability = (score + weights.base_offset).clamp(0.0, 1.0);

        log::info!(
            "Heuristic detection: {}x{} camera_exif={} generator_size={} square_grid={} irregular={} -> {:.3}",
            signals.width,
            signals.height,
            signals.camera_exif,
            signals.generator_dimensions,
            signals.square_multiple,
            signals.irregular,
            fake_probability
        );

        fake_probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> HeuristicScorer {
        HeuristicScorer::default()
    }

    fn probability(width: u32, height: u32, camera_exif: bool) -> f64 {
        let scorer = scorer();
        scorer.score(&scorer.signals_for(width, height, camera_exif))
    }

    #[test]
    fn square_generator_output_is_fake() {
        let signals = scorer().signals_for(1024, 1024, false);
        assert!(signals.generator_dimensions);
        assert!(signals.square_multiple);
        assert!(!signals.irregular);
        assert_eq!(probability(1024, 1024, false), 1.0);
    }

    #[test]
    fn large_camera_photo_is_real() {
        let signals = scorer().signals_for(4000, 3000, true);
        assert!(signals.irregular);
        assert!(!signals.generator_dimensions);
        assert_eq!(probability(4000, 3000, true), 0.0);
    }

    #[test]
    fn camera_exif_suppresses_square_grid_bonus() {
        let signals = scorer().signals_for(1024, 1024, true);
        assert!(!signals.square_multiple);
        // -0.7 + 0.6 + 0.3
        assert!((probability(1024, 1024, true) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn portrait_generator_size_without_exif() {
        // 1024x1792 sits within tolerance of 9:16: +0.6 + 0.3
        let signals = scorer().signals_for(1024, 1792, false);
        assert!(signals.generator_dimensions);
        assert!(!signals.square_multiple);
        assert!(!signals.irregular);
        assert!((probability(1024, 1792, false) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn odd_ratio_inside_envelope_is_irregular() {
        // 1000x600 is ~1.67, more than 0.1 away from 16:9 and 4:3.
        let signals = scorer().signals_for(1000, 600, false);
        assert!(signals.irregular);
        assert_eq!(probability(1000, 600, false), 0.0);
    }

    #[test]
    fn plain_photo_ratio_gets_only_the_offset() {
        // 1600x1200 is 4:3 inside the envelope.
        let signals = scorer().signals_for(1600, 1200, false);
        assert!(!signals.irregular);
        assert!((probability(1600, 1200, false) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn small_square_not_on_grid() {
        // 300x300: square but 300 % 64 != 0, and below the envelope.
        let signals = scorer().signals_for(300, 300, false);
        assert!(!signals.square_multiple);
        assert!(signals.irregular);
        assert_eq!(probability(300, 300, false), 0.0);
    }

    #[test]
    fn zero_height_is_scored_without_panicking() {
        let p = probability(640, 0, false);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn identical_inputs_score_identically() {
        for &(w, h, exif) in &[(512, 768, false), (1456, 816, true), (777, 333, false)] {
            assert_eq!(probability(w, h, exif), probability(w, h, exif));
        }
    }

    #[test]
    fn sample_signals_follow_sample_exif() {
        let scorer = scorer();
        let sample = ImageSample::synthetic(512, 512, true);
        let signals = scorer.signals(&sample);
        assert!(signals.camera_exif);
        assert!(signals.generator_dimensions);
    }

    #[test]
    fn custom_weights_are_honoured() {
        let mut config = HeuristicConfig::default();
        config.weights.base_offset = 0.0;
        let scorer = HeuristicScorer::new(config);
        assert_eq!(scorer.score(&scorer.signals_for(1600, 1200, false)), 0.0);
    }
}
