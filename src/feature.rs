//! Raw per-take measurements feeding the scorer.
//!
//! Accuracy-side measurements (pitch error, SNR, sibilance, clipping) and
//! emotion-side measurements (vibrato stability, dynamics shape,
//! microtiming) are computed here in physical units. Mapping them onto
//! [0, 1] sub-scores is the scorer's job; this module never clamps or
//! weighs.
//!
//! The [`FeatureProvider`] trait is the seam for swapping in a heavier
//! external pitch/feature extractor. [`SpectralFeatureProvider`] is the
//! built-in backend over [`crate::pitch`] and [`crate::spectrum`].

use crate::fft::FftPlan;
use crate::pitch::{self, PitchTrack};
use crate::spectrum;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Periodicity at or above this marks a frame as confidently voiced.
const PD_THRESH: f32 = 0.6;

/// Pitch RMSE reported when a region has too few voiced frames to measure.
const RMSE_FALLBACK_CENTS: f32 = 120.0;

/// Samples at or beyond this magnitude count as clipped.
const CLIP_LEVEL: f32 = 0.999;

/// Raw measurements for one take over one region (whole phrase or segment).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    /// Pitch RMSE vs the region's median f0, in cents.
    pub f0_rmse_c: f32,
    /// Fraction of frames with periodicity >= 0.6.
    pub voiced_ratio: f32,
    /// Mean periodicity over all frames.
    pub mean_periodicity: f32,
    /// Percentile-RMS signal-to-noise proxy in dB.
    pub snr_db: f32,
    /// Sibilance band power ratio, 5-10 kHz over 1-5 kHz.
    pub deess_ratio: f32,
    /// Count of samples at or near full scale.
    pub clip_n: u64,
    /// Vibrato regularity in [0, 1].
    pub vibrato_stability: f32,
    /// Dynamics shaping in [0, 1].
    pub dyn_shape: f32,
    /// Onset timing steadiness in [0, 1].
    pub microtiming: f32,
}

/// One row of the feature tables: region identity plus raw measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Phrase identifier, e.g. `"singer01/phrase02"`.
    pub phrase: String,
    /// Take identifier (file stem).
    pub take: String,
    /// Segment index within the phrase; `None` for whole-phrase rows.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub segment_idx: Option<usize>,
    /// Region start in seconds.
    pub start_s: f32,
    /// Region end in seconds.
    pub end_s: f32,
    /// Raw measurements over the region.
    #[serde(flatten)]
    pub raw: RawFeatures,
}

/// Source of pitch tracks and raw measurements.
///
/// Implementations must be deterministic: identical audio in, identical
/// numbers out.
pub trait FeatureProvider {
    /// Track pitch over a whole take.
    fn track_pitch(&self, y: &[f32], sr: u32) -> crate::Result<PitchTrack>;

    /// Measure raw features over `y` using a pitch track already restricted
    /// to the same region.
    fn measure(&self, y: &[f32], sr: u32, track: &PitchTrack) -> crate::Result<RawFeatures>;
}

/// Built-in feature backend using the crate's own YIN tracker and FFT
/// spectrogram.
#[derive(Debug, Clone)]
pub struct SpectralFeatureProvider {
    /// Analysis frame length in samples.
    pub frame_length: usize,
    /// Hop between frames in samples.
    pub hop_length: usize,
    /// Pitch search floor in Hz.
    pub fmin: f32,
    /// Pitch search ceiling in Hz.
    pub fmax: f32,
}

impl Default for SpectralFeatureProvider {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            fmin: 50.0,
            fmax: 1100.0,
        }
    }
}

impl FeatureProvider for SpectralFeatureProvider {
    fn track_pitch(&self, y: &[f32], sr: u32) -> crate::Result<PitchTrack> {
        if y.is_empty() {
            return Err(crate::Error::EmptyAudio);
        }
        Ok(pitch::track(
            y,
            sr,
            self.frame_length,
            self.hop_length,
            self.fmin,
            self.fmax,
        ))
    }

    fn measure(&self, y: &[f32], sr: u32, track: &PitchTrack) -> crate::Result<RawFeatures> {
        if y.is_empty() {
            return Err(crate::Error::EmptyAudio);
        }
        let duration = y.len() as f32 / sr as f32;
        let env = rms_envelope(y, self.frame_length, self.hop_length);
        let frame_rate = if duration > 0.0 {
            track.len() as f32 / duration
        } else {
            0.0
        };
        Ok(RawFeatures {
            f0_rmse_c: pitch_rmse_vs_median(track),
            voiced_ratio: voiced_ratio(&track.periodicity),
            mean_periodicity: mean_periodicity(&track.periodicity),
            snr_db: snr_simple(&env),
            deess_ratio: deess_ratio(y, sr, self.frame_length, self.hop_length)?,
            clip_n: clip_count(y),
            vibrato_stability: vibrato_stability(track, frame_rate),
            dyn_shape: dyn_shape(&env),
            microtiming: microtiming(&env, self.hop_length as f32 / sr as f32),
        })
    }
}

/// Frequency ratio expressed in musical cents (1200 per octave).
pub fn cents(f2: f32, f1: f32) -> f32 {
    let f2 = f2.max(1e-6);
    let f1 = f1.max(1e-6);
    1200.0 * (f2 / f1).log2()
}

/// Periodicity-weighted RMSE of pitch error in cents against the region's
/// median f0. Falls back to 120.0 cents when fewer than 5 frames are
/// confidently voiced, so near-silent regions rank as mediocre rather than
/// perfect.
pub fn pitch_rmse_vs_median(track: &PitchTrack) -> f32 {
    let mut f0v = Vec::new();
    let mut pdv = Vec::new();
    for (&f, &p) in track.f0.iter().zip(track.periodicity.iter()) {
        if f > 0.0 && p >= PD_THRESH {
            f0v.push(f);
            pdv.push(p);
        }
    }
    if f0v.len() < 5 {
        return RMSE_FALLBACK_CENTS;
    }
    let med = median(&f0v);
    let w_sum: f32 = pdv.iter().sum::<f32>() + 1e-9;
    let mse: f32 = f0v
        .iter()
        .zip(pdv.iter())
        .map(|(&f, &p)| {
            let e = cents(f, med);
            (p / w_sum) * e * e
        })
        .sum();
    mse.sqrt()
}

/// Fraction of frames with periodicity at or above 0.6.
pub fn voiced_ratio(pd: &[f32]) -> f32 {
    if pd.is_empty() {
        return 0.0;
    }
    pd.iter().filter(|&&p| p >= PD_THRESH).count() as f32 / pd.len() as f32
}

/// Mean periodicity over all frames; 0.0 for an empty track.
pub fn mean_periodicity(pd: &[f32]) -> f32 {
    if pd.is_empty() {
        return 0.0;
    }
    pd.iter().sum::<f32>() / pd.len() as f32
}

/// Per-frame RMS envelope with centered frames (constant zero padding at
/// the edges).
pub fn rms_envelope(y: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    if y.is_empty() || frame_length == 0 || hop_length == 0 {
        return Vec::new();
    }
    let pad = frame_length / 2;
    let padded_len = y.len() + 2 * pad;
    let n_frames = (padded_len - frame_length) / hop_length + 1;
    let mut env = Vec::with_capacity(n_frames);
    for frame in 0..n_frames {
        let start = frame * hop_length;
        let mut acc = 0.0f64;
        for i in start..start + frame_length {
            // index into the virtual zero-padded signal
            let s = if i >= pad && i - pad < y.len() {
                y[i - pad]
            } else {
                0.0
            };
            acc += (s as f64) * (s as f64);
        }
        env.push((acc / frame_length as f64).sqrt() as f32);
    }
    env
}

/// Linear-interpolated percentile of `values`, `p` in [0, 100].
pub fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f32;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn median(values: &[f32]) -> f32 {
    percentile(values, 50.0)
}

/// Crude SNR proxy from the RMS envelope: 90th percentile over 10th, in dB.
pub fn snr_simple(env: &[f32]) -> f32 {
    if env.is_empty() {
        return 0.0;
    }
    let noise = percentile(env, 10.0);
    let signal = percentile(env, 90.0);
    20.0 * ((signal + 1e-9) / (noise + 1e-9)).log10()
}

/// Sibilance proxy: mean power in 5-10 kHz over mean power in 1-5 kHz.
/// Returns NaN when the sample rate leaves the high band empty; the scorer
/// treats NaN as a fixed mediocre ratio.
pub fn deess_ratio(y: &[f32], sr: u32, n_fft: usize, hop_length: usize) -> crate::Result<f32> {
    let spec = spectrum::power_spectrogram(y, n_fft, hop_length)?;
    let freqs = spectrum::fft_frequencies(sr, n_fft);
    let hi = spectrum::band_power(&spec, &freqs, 5000.0, 10_000.0);
    let mid = spectrum::band_power(&spec, &freqs, 1000.0, 5000.0);
    Ok(match (hi, mid) {
        (Some(hi), Some(mid)) => hi / (mid + 1e-9),
        _ => f32::NAN,
    })
}

/// Count of samples at or near full scale.
pub fn clip_count(y: &[f32]) -> u64 {
    y.iter().filter(|s| s.abs() >= CLIP_LEVEL).count() as u64
}

/// Vibrato regularity in [0, 1].
///
/// The voiced f0 contour (cents vs its median) is transformed with an FFT;
/// the dominant modulation peak is scored for rate (healthy vocal vibrato
/// sits near 4-7 Hz) and depth (20-80 cents), and the two are combined as a
/// geometric mean. Regions with under 16 voiced frames score 0.0.
pub fn vibrato_stability(track: &PitchTrack, frame_rate: f32) -> f32 {
    if frame_rate <= 0.0 {
        return 0.0;
    }
    let voiced: Vec<f32> = track
        .f0
        .iter()
        .zip(track.periodicity.iter())
        .filter(|&(&f, &p)| f > 0.0 && p >= PD_THRESH)
        .map(|(&f, _)| f)
        .collect();
    if voiced.len() < 16 {
        return 0.0;
    }
    let med = median(&voiced);
    let contour: Vec<f32> = voiced.iter().map(|&f| cents(f, med)).collect();
    let mean = contour.iter().sum::<f32>() / contour.len() as f32;

    let n = contour.len();
    let mut buf: Vec<Complex32> = contour
        .iter()
        .map(|&c| Complex32::new(c - mean, 0.0))
        .collect();
    FftPlan::new(n).forward(&mut buf);

    // Dominant modulation component between 2 and 9 Hz.
    let hz_per_bin = frame_rate / n as f32;
    let mut peak_hz = 0.0f32;
    let mut peak_mag = 0.0f32;
    for (bin, c) in buf.iter().enumerate().take(n / 2).skip(1) {
        let hz = bin as f32 * hz_per_bin;
        if hz < 2.0 || hz > 9.0 {
            continue;
        }
        let mag = c.norm();
        if mag > peak_mag {
            peak_mag = mag;
            peak_hz = hz;
        }
    }
    if peak_mag <= 0.0 {
        return 0.0;
    }

    let rate_score = if (4.0..=7.0).contains(&peak_hz) {
        1.0
    } else if peak_hz < 4.0 {
        ((peak_hz - 2.0) / 2.0).clamp(0.0, 1.0)
    } else {
        ((9.0 - peak_hz) / 2.0).clamp(0.0, 1.0)
    };

    // Sinusoidal depth implied by the peak magnitude.
    let depth_cents = 2.0 * peak_mag / n as f32;
    let depth_score = if (20.0..=80.0).contains(&depth_cents) {
        1.0
    } else if depth_cents < 20.0 {
        (depth_cents / 20.0).clamp(0.0, 1.0)
    } else {
        ((150.0 - depth_cents) / 70.0).clamp(0.0, 1.0)
    };

    (rate_score * depth_score).sqrt()
}

/// Dynamics shaping in [0, 1]: half dynamic range, half envelope
/// smoothness. Flat or erratic level rides both score low.
pub fn dyn_shape(env: &[f32]) -> f32 {
    if env.len() < 3 {
        return 0.5;
    }
    let max_r = env.iter().cloned().fold(0.0f32, f32::max);
    if max_r <= 0.0 {
        return 0.0;
    }
    let norm: Vec<f32> = env.iter().map(|&r| r / max_r).collect();
    let range = percentile(&norm, 90.0) - percentile(&norm, 10.0);
    let range_score = (range / 0.6).clamp(0.0, 1.0);
    let roughness = norm
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .sum::<f32>()
        / (norm.len() - 1) as f32;
    let smooth_score = 1.0 - (roughness / 0.05).clamp(0.0, 1.0);
    0.5 * range_score + 0.5 * smooth_score
}

/// Onset timing steadiness in [0, 1] from inter-onset-interval jitter.
///
/// Onsets are rising edges of the RMS envelope crossing an adaptive
/// threshold. Regions with fewer than 3 onsets cannot be judged and score
/// a neutral 0.5.
pub fn microtiming(env: &[f32], hop_s: f32) -> f32 {
    if env.len() < 3 || hop_s <= 0.0 {
        return 0.5;
    }
    let max_r = env.iter().cloned().fold(0.0f32, f32::max);
    if max_r <= 0.0 {
        return 0.5;
    }
    let thresh = 0.3 * max_r;
    let mut onsets = Vec::new();
    let mut above = env[0] >= thresh;
    for (i, &r) in env.iter().enumerate().skip(1) {
        if !above && r >= thresh {
            onsets.push(i as f32 * hop_s);
        }
        above = r >= thresh;
    }
    if onsets.len() < 3 {
        return 0.5;
    }
    let iois: Vec<f32> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = iois.iter().sum::<f32>() / iois.len() as f32;
    if mean <= 0.0 {
        return 0.5;
    }
    let var = iois.iter().map(|&d| (d - mean) * (d - mean)).sum::<f32>() / iois.len() as f32;
    let cv = var.sqrt() / mean;
    1.0 - cv.clamp(0.0, 1.0)
}
