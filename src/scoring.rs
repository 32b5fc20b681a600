//! Normalization and score blending.
//!
//! Raw measurements arrive in physical units (cents, dB, counts, ratios)
//! and leave as sub-scores in [0, 1], where higher is always better. The
//! mappings are fixed piecewise-linear ramps with pinned fallbacks for
//! non-finite inputs, so scores from different runs stay comparable.

use crate::config::{AccuracyWeights, CompConfig, EmotionWeights};
use crate::feature::{FeatureRow, RawFeatures};
use serde::{Deserialize, Serialize};

/// Pitch RMSE treated as the worst case; also the fallback for NaN input.
const RMSE_CEIL_CENTS: f32 = 300.0;

/// SNR values above this saturate the sub-score at 1.0.
const SNR_CEIL_DB: f32 = 40.0;

/// De-ess ratios at or below this score 1.0.
const DEESS_LO: f32 = 0.03;

/// De-ess ratios at or above this score 0.0.
const DEESS_HI: f32 = 0.30;

/// Normalized accuracy sub-scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub pitch: f32,
    pub snr: f32,
    pub deess: f32,
    pub clip: f32,
}

/// Blended scores for one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Weighted accuracy composite in [0, 1].
    pub acc_score: f32,
    /// Weighted emotion composite in [0, 1].
    pub emo_score: f32,
    /// Accuracy weight used for the blend.
    pub alpha: f32,
    /// `alpha * acc + (1 - alpha) * emo`, clamped to [0, 1].
    pub final_score: f32,
}

/// A feature row together with its scores; the unit the ranking tables and
/// comp map are built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    #[serde(flatten)]
    pub row: FeatureRow,
    #[serde(flatten)]
    pub score: Score,
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

// clamp and min pass NaN through, so non-finite values need an explicit
// guard before any ramp.
fn safe01(x: f32) -> f32 {
    if x.is_finite() {
        clamp01(x)
    } else {
        0.0
    }
}

/// Map raw accuracy measurements onto [0, 1] sub-scores.
///
/// NaN pitch error is pinned to the 300-cent ceiling (sub-score 0), NaN
/// de-ess ratio to a fixed mediocre 0.30 (sub-score 0), and non-finite SNR
/// to the worst case 0 dB (sub-score 0). The clip sub-score is binary-ish:
/// a single clipped sample drops it from 1.0 to 0.6.
pub fn normalize(raw: &RawFeatures) -> SubScores {
    let rmse = if raw.f0_rmse_c.is_nan() {
        RMSE_CEIL_CENTS
    } else {
        raw.f0_rmse_c
    };
    let snr = if raw.snr_db.is_finite() {
        raw.snr_db
    } else {
        0.0
    };
    let deess = if raw.deess_ratio.is_nan() {
        DEESS_HI
    } else {
        raw.deess_ratio
    };
    SubScores {
        pitch: 1.0 - clamp01(rmse / RMSE_CEIL_CENTS),
        snr: clamp01(snr.min(SNR_CEIL_DB) / SNR_CEIL_DB),
        deess: 1.0 - clamp01((deess - DEESS_LO) / (DEESS_HI - DEESS_LO)),
        clip: if raw.clip_n == 0 { 1.0 } else { 0.6 },
    }
}

/// Weighted accuracy composite.
pub fn accuracy_score(sub: &SubScores, w: &AccuracyWeights) -> f32 {
    clamp01(w.pitch * sub.pitch + w.snr * sub.snr + w.deess * sub.deess + w.clip * sub.clip)
}

/// Weighted emotion composite over features already in [0, 1]. Non-finite
/// fields contribute 0.0 rather than poisoning the composite.
pub fn emotion_score(raw: &RawFeatures, w: &EmotionWeights) -> f32 {
    clamp01(
        w.vibrato * safe01(raw.vibrato_stability)
            + w.dyn_shape * safe01(raw.dyn_shape)
            + w.microtiming * safe01(raw.microtiming),
    )
}

/// Blend accuracy and emotion with weight `alpha` on accuracy.
pub fn final_blend(acc: f32, emo: f32, alpha: f32) -> f32 {
    let a = clamp01(alpha);
    clamp01(a * acc + (1.0 - a) * emo)
}

/// Score a feature row under the given configuration.
pub fn score_row(row: FeatureRow, config: &CompConfig) -> ScoredRow {
    let sub = normalize(&row.raw);
    let acc = accuracy_score(&sub, &config.accuracy_weights);
    let emo = emotion_score(&row.raw, &config.emotion_weights);
    let final_score = final_blend(acc, emo, config.alpha);
    ScoredRow {
        row,
        score: Score {
            acc_score: acc,
            emo_score: emo,
            alpha: clamp01(config.alpha),
            final_score,
        },
    }
}
