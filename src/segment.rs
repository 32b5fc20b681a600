//! Reference-take segmentation.
//!
//! The best whole-phrase take defines a master cut grid; every other take
//! is sliced at the same times. Boundaries are only ever placed at
//! low-energy valleys of the RMS envelope so sustained vowels are never
//! split, with a tempo-derived target duration steering where in each
//! window the cut lands.

use crate::config::CompConfig;
use crate::feature::{percentile, rms_envelope};

/// A half-open `[start_s, end_s)` slice of the phrase timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start_s: f32,
    pub end_s: f32,
}

impl Segment {
    pub fn duration(&self) -> f32 {
        self.end_s - self.start_s
    }
}

/// Boundaries within 30 ms of either phrase edge are never considered.
const EDGE_GUARD_S: f32 = 0.03;

/// A remaining tail shorter than this is absorbed into the prior segment.
const TAIL_ABSORB_S: f32 = 0.2;

/// Tempo-derived targets are capped at two beats or 4 s, whichever is less.
const TARGET_CAP_S: f32 = 4.0;

/// Segment the reference take at low-energy valleys.
///
/// `bpm`, when known and positive, sets the target segment duration to two
/// beats (clamped to `[min_seg_dur, 4.0]`); otherwise a generic 1.2 s
/// target applies. Phrases too short to segment, and phrases with no
/// usable valleys, come back as a single whole-phrase segment.
///
/// The returned segments are contiguous, ascending, and cover exactly
/// `[0, duration)`.
pub fn segment_reference(y: &[f32], sr: u32, bpm: Option<f32>, config: &CompConfig) -> Vec<Segment> {
    let dur = y.len() as f32 / sr as f32;
    let whole = vec![Segment {
        start_s: 0.0,
        end_s: dur,
    }];

    if !config.segmentation || dur <= 2.0 * config.min_seg_dur {
        return whole;
    }

    let env = rms_envelope(y, config.frame_length, config.hop_length);
    let hop_s = config.hop_length as f32 / sr as f32;
    let valleys = find_valleys(&env, hop_s, dur, config.valley_min_spacing);
    if valleys.is_empty() {
        return whole;
    }

    let target = match bpm {
        Some(bpm) if bpm > 0.0 => {
            (2.0 * 60.0 / bpm).clamp(config.min_seg_dur, TARGET_CAP_S)
        }
        _ => config.fallback_target_dur,
    };

    let mut boundaries = vec![0.0f32];
    let mut last = 0.0f32;
    loop {
        let window_start = last + config.min_seg_dur;
        if dur - window_start < config.min_seg_dur {
            break;
        }
        let window_end = (last + config.max_seg_dur).min(dur - config.min_seg_dur);
        if window_end <= window_start {
            break;
        }

        // Valley closest to the desired cut time inside the window. No
        // valley means the remainder stays one long segment.
        let desired = last + target;
        let mut best: Option<f32> = None;
        for &v in &valleys {
            if v < window_start || v > window_end {
                continue;
            }
            match best {
                Some(b) if (b - desired).abs() <= (v - desired).abs() => {}
                _ => best = Some(v),
            }
        }
        let btime = match best {
            Some(b) => b,
            None => break,
        };
        if btime - last < config.min_seg_dur {
            break;
        }
        boundaries.push(btime);
        last = btime;
    }

    // Close at the phrase end; a tiny tail extends the prior boundary so
    // coverage of [0, dur) is never lost.
    if dur - last >= TAIL_ABSORB_S {
        boundaries.push(dur);
    } else if let Some(b) = boundaries.last_mut() {
        *b = dur;
    }

    // Merge too-short segments into their predecessor.
    let mut merged: Vec<Segment> = Vec::new();
    for pair in boundaries.windows(2) {
        let (s, e) = (pair[0], pair[1]);
        match merged.last_mut() {
            Some(prev) if e - s < config.min_seg_dur => prev.end_s = e,
            _ => merged.push(Segment {
                start_s: s,
                end_s: e,
            }),
        }
    }
    merged.retain(|seg| seg.duration() > 1e-3);

    if merged.is_empty() {
        whole
    } else {
        merged
    }
}

/// Valley candidate times from a normalized RMS envelope.
///
/// A valley is a local minimum under the quiet threshold
/// (25th percentile of the normalized envelope, capped at 0.6), away from
/// the phrase edges. Valleys closer together than `min_spacing` collapse
/// to the quietest point of the cluster.
fn find_valleys(env: &[f32], hop_s: f32, dur: f32, min_spacing: f32) -> Vec<f32> {
    let n = env.len();
    if n < 3 {
        return Vec::new();
    }

    let max_r = env.iter().cloned().fold(0.0f32, f32::max);
    let norm: Vec<f32> = if max_r > 0.0 {
        env.iter().map(|&r| r / max_r).collect()
    } else {
        env.to_vec()
    };

    let quiet_thresh = percentile(&norm, 25.0).min(0.6);

    let mut kept: Vec<(f32, f32)> = Vec::new();
    for i in 1..n - 1 {
        let t = i as f32 * hop_s;
        if t < EDGE_GUARD_S || t > dur - EDGE_GUARD_S {
            continue;
        }
        let r = norm[i];
        if r > quiet_thresh || r > norm[i - 1] || r > norm[i + 1] {
            continue;
        }
        match kept.last_mut() {
            Some((kt, kr)) if t - *kt < min_spacing => {
                if r < *kr {
                    *kt = t;
                    *kr = r;
                }
            }
            _ => kept.push((t, r)),
        }
    }
    kept.into_iter().map(|(t, _)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CompConfig {
        CompConfig::default()
    }

    /// Bursts of tone separated by near-silent gaps.
    fn pulsed(sr: u32, n_bursts: usize, burst_s: f32, gap_s: f32) -> Vec<f32> {
        let mut y = Vec::new();
        for _ in 0..n_bursts {
            let burst = (burst_s * sr as f32) as usize;
            for i in 0..burst {
                y.push(0.6 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin());
            }
            y.extend(vec![0.001f32; (gap_s * sr as f32) as usize]);
        }
        y
    }

    fn assert_partition(segments: &[Segment], dur: f32) {
        assert!(!segments.is_empty());
        assert!((segments[0].start_s - 0.0).abs() < 1e-4);
        assert!((segments.last().unwrap().end_s - dur).abs() < 1e-3);
        for pair in segments.windows(2) {
            assert!((pair[0].end_s - pair[1].start_s).abs() < 1e-6);
            assert!(pair[0].start_s < pair[0].end_s);
        }
    }

    #[test]
    fn short_phrase_is_one_segment() {
        let sr = 16_000;
        let y = vec![0.1f32; (0.8 * sr as f32) as usize];
        let segs = segment_reference(&y, sr as u32, Some(120.0), &config());
        assert_eq!(segs.len(), 1);
        assert_partition(&segs, y.len() as f32 / sr as f32);
    }

    #[test]
    fn pulsed_audio_splits_at_gaps() {
        let sr = 16_000u32;
        let y = pulsed(sr, 6, 1.0, 0.4);
        let dur = y.len() as f32 / sr as f32;
        let segs = segment_reference(&y, sr, Some(120.0), &config());
        assert!(segs.len() > 1, "expected multiple segments, got {segs:?}");
        assert_partition(&segs, dur);
        for seg in &segs[..segs.len() - 1] {
            assert!(seg.duration() >= config().min_seg_dur - 1e-3);
        }
    }

    #[test]
    fn constant_tone_stays_whole() {
        let sr = 16_000u32;
        let y: Vec<f32> = (0..sr as usize * 6)
            .map(|i| 0.6 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin())
            .collect();
        let segs = segment_reference(&y, sr, Some(120.0), &config());
        // No quiet valleys away from the edges, so no cuts are forced.
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn deterministic() {
        let sr = 16_000u32;
        let y = pulsed(sr, 5, 0.9, 0.35);
        let a = segment_reference(&y, sr, Some(100.0), &config());
        let b = segment_reference(&y, sr, Some(100.0), &config());
        assert_eq!(a, b);
    }

    #[test]
    fn segmentation_disabled_yields_whole_phrase() {
        let sr = 16_000u32;
        let y = pulsed(sr, 6, 1.0, 0.4);
        let cfg = CompConfig {
            segmentation: false,
            ..CompConfig::default()
        };
        let segs = segment_reference(&y, sr, Some(120.0), &cfg);
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn unknown_tempo_uses_fallback_target() {
        let sr = 16_000u32;
        let y = pulsed(sr, 6, 1.0, 0.4);
        let segs = segment_reference(&y, sr, None, &config());
        let dur = y.len() as f32 / sr as f32;
        assert_partition(&segs, dur);
    }
}
