//! Configuration parameters for the comping engine.
//!
//! Everything an operator can tune lives in [`CompConfig`] — weight maps,
//! segmentation thresholds, crossfade bounds — passed explicitly into each
//! stage. There is no module-level mutable state and no interactive
//! prompting; a missing or inconsistent value fails [`CompConfig::validate`]
//! with a descriptive error.

use crate::{Error, Result};

/// Weights for the four accuracy sub-scores. Must be supplied as a complete
/// mapping; the struct makes partial overrides unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyWeights {
    /// Weight on the pitch sub-score (default 0.5).
    pub pitch: f32,
    /// Weight on the signal-to-noise sub-score (default 0.2).
    pub snr: f32,
    /// Weight on the de-ess sub-score (default 0.2).
    pub deess: f32,
    /// Weight on the clipping sub-score (default 0.1).
    pub clip: f32,
}

impl Default for AccuracyWeights {
    fn default() -> Self {
        Self {
            pitch: 0.5,
            snr: 0.2,
            deess: 0.2,
            clip: 0.1,
        }
    }
}

/// Weights for the three emotion features (each already in [0, 1]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionWeights {
    /// Weight on vibrato stability (default 0.34).
    pub vibrato: f32,
    /// Weight on dynamics shape (default 0.33).
    pub dyn_shape: f32,
    /// Weight on microtiming (default 0.33).
    pub microtiming: f32,
}

impl Default for EmotionWeights {
    fn default() -> Self {
        Self {
            vibrato: 0.34,
            dyn_shape: 0.33,
            microtiming: 0.33,
        }
    }
}

/// Which stitching algorithm reassembles the comp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StitchMode {
    /// Symmetric crossfade windows centered on each boundary, both operands
    /// read at the same absolute timeline position. Requires all takes to be
    /// time-aligned recordings of the same phrase. Primary mode.
    #[default]
    TimeAligned,
    /// Trim-and-concatenate crossfades. Shifts timing at every splice;
    /// fallback for inputs that are not time-aligned.
    Concatenate,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct CompConfig {
    /// Processing sample rate in Hz (default: 48000). Every take is loaded
    /// at this rate; a take that cannot be brought to it is rejected.
    pub sample_rate: u32,

    /// Frame length for envelope/spectral analysis (default: 2048).
    pub frame_length: usize,
    /// Hop between analysis frames (default: 512).
    pub hop_length: usize,

    /// Accuracy weight alpha in [0, 1]; emotion gets `1 - alpha`
    /// (default: 0.5). Supplied once per run, typically as a percentage
    /// divided by 100.
    pub alpha: f32,
    /// Accuracy sub-score weights.
    pub accuracy_weights: AccuracyWeights,
    /// Emotion feature weights.
    pub emotion_weights: EmotionWeights,

    /// Maximum score gap for a take to qualify as a near-tied alternate
    /// (default: 0.07).
    pub diversity_delta: f32,
    /// Winner plus at most `top_k - 1` alternates per segment (default: 3).
    pub top_k: usize,

    /// Minimum segment duration in seconds (default: 0.45).
    pub min_seg_dur: f32,
    /// Soft maximum segment duration in seconds (default: 5.0). Longer
    /// segments are allowed when no energy valley exists.
    pub max_seg_dur: f32,
    /// Target segment duration when tempo is unknown (default: 1.2 s).
    pub fallback_target_dur: f32,
    /// Minimum spacing between retained valleys in seconds (default: 0.18).
    pub valley_min_spacing: f32,

    /// Crossfade length as a fraction of the shorter adjacent segment
    /// (default: 0.15).
    pub fade_fraction: f32,
    /// Crossfade lower bound in seconds (default: 0.030).
    pub min_fade_s: f32,
    /// Crossfade upper bound in seconds (default: 0.500).
    pub max_fade_s: f32,

    /// Stitching algorithm (default: time-aligned).
    pub stitch_mode: StitchMode,

    /// When false, segmentation is skipped and the whole phrase becomes a
    /// single implicit segment, reducing the pipeline to "pick the best
    /// single take" (default: true).
    pub segmentation: bool,
}

impl Default for CompConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_length: 2048,
            hop_length: 512,
            alpha: 0.5,
            accuracy_weights: AccuracyWeights::default(),
            emotion_weights: EmotionWeights::default(),
            diversity_delta: 0.07,
            top_k: 3,
            min_seg_dur: 0.45,
            max_seg_dur: 5.0,
            fallback_target_dur: 1.2,
            valley_min_spacing: 0.18,
            fade_fraction: 0.15,
            min_fade_s: 0.030,
            max_fade_s: 0.500,
            stitch_mode: StitchMode::default(),
            segmentation: true,
        }
    }
}

impl CompConfig {
    /// Build a config with the accuracy weight given as a percentage
    /// (0..=100), matching how operators express the accuracy/emotion mix.
    pub fn with_alpha_pct(alpha_pct: u32) -> Self {
        Self {
            alpha: (alpha_pct.min(100) as f32) / 100.0,
            ..Self::default()
        }
    }

    /// Validate the configuration, failing fast with the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidSize {
                name: "sample_rate",
                value: 0,
                reason: "must be > 0",
            });
        }
        if self.frame_length == 0 {
            return Err(Error::InvalidSize {
                name: "frame_length",
                value: 0,
                reason: "must be > 0",
            });
        }
        if self.hop_length == 0 {
            return Err(Error::InvalidSize {
                name: "hop_length",
                value: 0,
                reason: "must be > 0",
            });
        }
        if self.top_k == 0 {
            return Err(Error::InvalidSize {
                name: "top_k",
                value: 0,
                reason: "must be >= 1",
            });
        }
        if !self.alpha.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidParameter {
                name: "alpha",
                value: self.alpha.to_string(),
                reason: "must be a finite value in [0, 1]".to_string(),
            });
        }
        if !self.diversity_delta.is_finite() || self.diversity_delta < 0.0 {
            return Err(Error::InvalidParameter {
                name: "diversity_delta",
                value: self.diversity_delta.to_string(),
                reason: "must be finite and non-negative".to_string(),
            });
        }
        for (name, v) in [
            ("min_seg_dur", self.min_seg_dur),
            ("max_seg_dur", self.max_seg_dur),
            ("fallback_target_dur", self.fallback_target_dur),
            ("valley_min_spacing", self.valley_min_spacing),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(Error::InvalidParameter {
                    name,
                    value: v.to_string(),
                    reason: "must be finite and positive".to_string(),
                });
            }
        }
        if self.min_seg_dur >= self.max_seg_dur {
            return Err(Error::InvalidParameter {
                name: "min_seg_dur",
                value: self.min_seg_dur.to_string(),
                reason: format!("must be smaller than max_seg_dur ({})", self.max_seg_dur),
            });
        }
        if !self.fade_fraction.is_finite() || self.fade_fraction < 0.0 {
            return Err(Error::InvalidParameter {
                name: "fade_fraction",
                value: self.fade_fraction.to_string(),
                reason: "must be finite and non-negative".to_string(),
            });
        }
        if self.min_fade_s > self.max_fade_s {
            return Err(Error::InvalidParameter {
                name: "min_fade_s",
                value: self.min_fade_s.to_string(),
                reason: format!("must not exceed max_fade_s ({})", self.max_fade_s),
            });
        }
        for (name, w) in [
            ("accuracy_weights.pitch", self.accuracy_weights.pitch),
            ("accuracy_weights.snr", self.accuracy_weights.snr),
            ("accuracy_weights.deess", self.accuracy_weights.deess),
            ("accuracy_weights.clip", self.accuracy_weights.clip),
            ("emotion_weights.vibrato", self.emotion_weights.vibrato),
            ("emotion_weights.dyn_shape", self.emotion_weights.dyn_shape),
            (
                "emotion_weights.microtiming",
                self.emotion_weights.microtiming,
            ),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidParameter {
                    name: "weights",
                    value: format!("{name}={w}"),
                    reason: "weights must be finite and non-negative".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CompConfig::default().validate().is_ok());
    }

    #[test]
    fn alpha_pct_maps_to_unit_range() {
        let cfg = CompConfig::with_alpha_pct(60);
        assert!((cfg.alpha - 0.6).abs() < 1e-6);
        let cfg = CompConfig::with_alpha_pct(150);
        assert!((cfg.alpha - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_alpha() {
        let cfg = CompConfig {
            alpha: 1.5,
            ..CompConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = CompConfig {
            alpha: f32::NAN,
            ..CompConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_segment_bounds() {
        let cfg = CompConfig {
            min_seg_dur: 6.0,
            ..CompConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_weight() {
        let cfg = CompConfig {
            accuracy_weights: AccuracyWeights {
                pitch: -0.5,
                ..AccuracyWeights::default()
            },
            ..CompConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
