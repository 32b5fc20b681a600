//! Reassemble winner segments into one comped waveform.
//!
//! The primary mode works on a fixed global timeline: every take is a
//! time-aligned recording of the same phrase, so a segment's audio is read
//! from its winner at the segment's own absolute position, and crossfades
//! mix the two adjacent winners over a window centered on each boundary.
//! The timeline length never changes. A concatenating mode exists as a
//! fallback for takes that are not time-aligned; it shifts timing at every
//! splice.

use crate::compmap::CompMap;
use crate::config::{CompConfig, StitchMode};
use crate::io::peak_normalize;
use std::collections::HashMap;

/// Output peak target after stitching, in dBFS.
const OUT_PEAK_DBFS: f32 = -1.0;

/// Per-take peak target before compositing, in dBFS. Takes recorded at
/// different input gains would otherwise produce audible level jumps at
/// segment boundaries.
const PER_TAKE_DBFS: f32 = -3.0;

/// Stitch using the mode selected in `config`.
pub fn stitch_with_mode(
    compmap: &CompMap,
    takes: &HashMap<String, Vec<f32>>,
    sr: u32,
    config: &CompConfig,
) -> crate::Result<Vec<f32>> {
    match config.stitch_mode {
        StitchMode::TimeAligned => stitch(compmap, takes, sr, config),
        StitchMode::Concatenate => stitch_concat(compmap, takes, sr, config),
    }
}

/// Time-aligned stitch: hard composite on the absolute timeline, then
/// boundary-centered crossfades, then output normalization to -1 dBFS.
pub fn stitch(
    compmap: &CompMap,
    takes: &HashMap<String, Vec<f32>>,
    sr: u32,
    config: &CompConfig,
) -> crate::Result<Vec<f32>> {
    let (segments, audio) = prepare(compmap, takes)?;

    // Timeline length: compmap end, capped by the shortest winner take.
    let phrase_end_s = segments
        .iter()
        .map(|s| s.end_s)
        .fold(0.0f32, f32::max);
    let min_take_len = audio.values().map(|y| y.len()).min().unwrap_or(0);
    let target = ((phrase_end_s * sr as f32).round() as usize).min(min_take_len);
    if target == 0 {
        return Err(crate::Error::EmptyAudio);
    }

    let mut out = vec![0.0f32; target];

    // Hard composite, no fades yet.
    for seg in &segments {
        let y = &audio[&seg.take];
        let start = ((seg.start_s * sr as f32).round() as usize).min(target);
        let end = ((seg.end_s * sr as f32).round() as usize)
            .min(target)
            .min(y.len())
            .max(start);
        if end <= start {
            log::warn!(
                "skipping empty segment {} ({:.3}s..{:.3}s)",
                seg.index,
                seg.start_s,
                seg.end_s
            );
            continue;
        }
        out[start..end].copy_from_slice(&y[start..end]);
    }

    // Boundary crossfades. Both operands are read at the same absolute
    // timeline position, so a fade only smooths the transition and never
    // time-shifts either take.
    for pair in segments.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let fade_s = match fade_length(a.end_s - a.start_s, b.end_s - b.start_s, config) {
            Some(f) => f,
            None => continue,
        };
        let half = fade_s / 2.0;
        let boundary = a.end_s;

        let start = (((boundary - half) * sr as f32).round() as isize).max(0) as usize;
        let start = start.min(target);
        let end = (((boundary + half) * sr as f32).round() as usize).min(target);
        let y_prev = &audio[&a.take];
        let y_next = &audio[&b.take];
        let end = end.min(y_prev.len()).min(y_next.len());
        if end <= start + 1 {
            continue;
        }

        let len = end - start;
        for i in 0..len {
            let w_next = i as f32 / (len - 1) as f32;
            let w_prev = 1.0 - w_next;
            out[start + i] = y_prev[start + i] * w_prev + y_next[start + i] * w_next;
        }
        log::debug!(
            "crossfade {:.1} ms around {:.3}s between {} and {}",
            len as f32 / sr as f32 * 1000.0,
            boundary,
            a.take,
            b.take
        );
    }

    Ok(finalize(out))
}

/// Concatenating stitch: winner slices are cut out and joined with linear
/// crossfades, shortening the result by one fade length per boundary.
pub fn stitch_concat(
    compmap: &CompMap,
    takes: &HashMap<String, Vec<f32>>,
    sr: u32,
    config: &CompConfig,
) -> crate::Result<Vec<f32>> {
    let (segments, audio) = prepare(compmap, takes)?;

    let mut out: Vec<f32> = Vec::new();
    let mut prev_dur = 0.0f32;
    for seg in &segments {
        let y = &audio[&seg.take];
        let start = ((seg.start_s * sr as f32).round() as usize).min(y.len());
        let end = ((seg.end_s * sr as f32).round() as usize).min(y.len());
        if end <= start {
            log::warn!(
                "skipping empty segment {} ({:.3}s..{:.3}s)",
                seg.index,
                seg.start_s,
                seg.end_s
            );
            continue;
        }
        let slice = &y[start..end];
        let dur = (end - start) as f32 / sr as f32;

        if out.is_empty() {
            out.extend_from_slice(slice);
        } else {
            let fade_s = fade_length(prev_dur, dur, config).unwrap_or(0.0);
            out = crossfade_concat(&out, slice, sr, fade_s);
        }
        prev_dur = dur;
    }

    if out.is_empty() {
        return Err(crate::Error::EmptyAudio);
    }
    Ok(finalize(out))
}

struct WinnerSegment {
    index: usize,
    start_s: f32,
    end_s: f32,
    take: String,
}

/// Sort segments by start time and peak-normalize each referenced winner
/// take to -3 dBFS.
fn prepare(
    compmap: &CompMap,
    takes: &HashMap<String, Vec<f32>>,
) -> crate::Result<(Vec<WinnerSegment>, HashMap<String, Vec<f32>>)> {
    if compmap.segments.is_empty() {
        return Err(crate::Error::MissingInput(
            "comp map has no segments".to_string(),
        ));
    }

    let mut segments: Vec<WinnerSegment> = compmap
        .segments
        .iter()
        .map(|s| WinnerSegment {
            index: s.index,
            start_s: s.start_s,
            end_s: s.end_s,
            take: s.winner.take.clone(),
        })
        .collect();
    segments.sort_by(|a, b| {
        a.start_s
            .partial_cmp(&b.start_s)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut audio = HashMap::new();
    for seg in &segments {
        if audio.contains_key(&seg.take) {
            continue;
        }
        let y = takes
            .get(&seg.take)
            .ok_or_else(|| crate::Error::MissingInput(format!("winner take '{}'", seg.take)))?;
        audio.insert(seg.take.clone(), peak_normalize(y, PER_TAKE_DBFS));
    }

    Ok((segments, audio))
}

/// Crossfade duration for a boundary between segments of duration `d1` and
/// `d2`: `fade_fraction` of the shorter one, clamped to the configured
/// bounds and never longer than the two segments combined. `None` disables
/// the fade.
fn fade_length(d1: f32, d2: f32, config: &CompConfig) -> Option<f32> {
    let base = d1.min(d2);
    if base <= 0.0 || config.fade_fraction <= 0.0 {
        return None;
    }
    let fade = (base * config.fade_fraction)
        .max(config.min_fade_s)
        .min(config.max_fade_s)
        .min(d1 + d2);
    if fade > 0.0 {
        Some(fade)
    } else {
        None
    }
}

fn crossfade_concat(a: &[f32], b: &[f32], sr: u32, fade_s: f32) -> Vec<f32> {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() {
        return a.to_vec();
    }
    let fade_len = ((fade_s * sr as f32).round() as usize)
        .min(a.len())
        .min(b.len());
    if fade_len == 0 {
        let mut out = a.to_vec();
        out.extend_from_slice(b);
        return out;
    }
    let mut out = Vec::with_capacity(a.len() + b.len() - fade_len);
    out.extend_from_slice(&a[..a.len() - fade_len]);
    for i in 0..fade_len {
        let w_in = if fade_len > 1 {
            i as f32 / (fade_len - 1) as f32
        } else {
            1.0
        };
        out.push(a[a.len() - fade_len + i] * (1.0 - w_in) + b[i] * w_in);
    }
    out.extend_from_slice(&b[fade_len..]);
    out
}

/// Output normalization: peak to -1 dBFS, then a hard clamp to [-1, 1].
fn finalize(mut out: Vec<f32>) -> Vec<f32> {
    out = peak_normalize(&out, OUT_PEAK_DBFS);
    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compmap::{CompMapSegment, TakeScore};

    fn score(take: &str) -> TakeScore {
        TakeScore {
            take: take.to_string(),
            final_score: 0.9,
            acc_score: 0.9,
            emo_score: 0.9,
            snr_db: 20.0,
            f0_rmse_c: 30.0,
        }
    }

    fn map(segs: &[(f32, f32, &str)]) -> CompMap {
        CompMap {
            phrase: "p".to_string(),
            alpha: 0.5,
            alpha_pct: 50,
            bpm: None,
            base_dir: None,
            relative_path: None,
            reference_take: segs[0].2.to_string(),
            segments: segs
                .iter()
                .enumerate()
                .map(|(i, &(s, e, t))| CompMapSegment {
                    index: i,
                    start_s: s,
                    end_s: e,
                    winner: score(t),
                    candidates: Vec::new(),
                })
                .collect(),
        }
    }

    fn tone(freq: f32, sr: u32, dur: f32, amp: f32) -> Vec<f32> {
        (0..(dur * sr as f32) as usize)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn single_take_round_trip() {
        // One winner everywhere: output is that take, peak-normalized.
        let sr = 8000u32;
        let y = tone(220.0, sr, 2.0, 0.5);
        let mut takes = HashMap::new();
        takes.insert("t1".to_string(), y.clone());
        let cm = map(&[(0.0, 1.0, "t1"), (1.0, 2.0, "t1")]);
        let out = stitch(&cm, &takes, sr, &CompConfig::default()).unwrap();
        assert_eq!(out.len(), y.len());
        // Same take on both sides of the boundary: crossfade mixes a signal
        // with itself, so shape is preserved exactly up to one global gain.
        let peak_out = out.iter().cloned().fold(0.0f32, |a, b| a.max(b.abs()));
        assert!((peak_out - 10f32.powf(-1.0 / 20.0)).abs() < 1e-3);
        let gain = peak_out / 0.5;
        for (o, s) in out.iter().zip(y.iter()).step_by(97) {
            assert!((o - s * gain).abs() < 1e-3, "{o} vs {}", s * gain);
        }
    }

    #[test]
    fn fade_window_is_150ms_for_one_second_segments() {
        let cfg = CompConfig::default();
        let fade = fade_length(1.0, 1.0, &cfg).unwrap();
        assert!((fade - 0.15).abs() < 1e-6);
    }

    #[test]
    fn fade_clamps_to_bounds() {
        let cfg = CompConfig::default();
        // Tiny segments hit the 30 ms floor.
        assert!((fade_length(0.1, 0.1, &cfg).unwrap() - 0.030).abs() < 1e-6);
        // Huge segments hit the 500 ms ceiling.
        assert!((fade_length(10.0, 10.0, &cfg).unwrap() - 0.500).abs() < 1e-6);
        // Zero fraction disables fading.
        let cfg = CompConfig {
            fade_fraction: 0.0,
            ..CompConfig::default()
        };
        assert!(fade_length(1.0, 1.0, &cfg).is_none());
    }

    #[test]
    fn two_takes_mix_at_the_boundary() {
        let sr = 8000u32;
        // Constant-level signals make the mixed region easy to verify.
        let a = vec![0.5f32; sr as usize * 2];
        let b = vec![-0.5f32; sr as usize * 2];
        let mut takes = HashMap::new();
        takes.insert("a".to_string(), a);
        takes.insert("b".to_string(), b);
        let cm = map(&[(0.0, 1.0, "a"), (1.0, 2.0, "b")]);
        let out = stitch(&cm, &takes, sr, &CompConfig::default()).unwrap();
        assert_eq!(out.len(), sr as usize * 2);

        let gain = 10f32.powf(-1.0 / 20.0) / 10f32.powf(-3.0 / 20.0);
        let norm = 10f32.powf(-3.0 / 20.0);
        // Well before the boundary: pure take a.
        let early = out[(0.5 * sr as f32) as usize];
        assert!((early - norm * gain).abs() < 1e-2, "early {early}");
        // Well after: pure take b.
        let late = out[(1.5 * sr as f32) as usize];
        assert!((late + norm * gain).abs() < 1e-2, "late {late}");
        // At the boundary center the two cancel to about zero.
        let mid = out[sr as usize];
        assert!(mid.abs() < 0.05, "mid {mid}");
    }

    #[test]
    fn missing_winner_take_is_an_error() {
        let cm = map(&[(0.0, 1.0, "ghost")]);
        let takes = HashMap::new();
        let err = stitch(&cm, &takes, 8000, &CompConfig::default());
        assert!(matches!(err, Err(crate::Error::MissingInput(_))));
    }

    #[test]
    fn concat_mode_shortens_by_fade() {
        let sr = 8000u32;
        let a = vec![0.5f32; sr as usize * 2];
        let b = vec![-0.5f32; sr as usize * 2];
        let mut takes = HashMap::new();
        takes.insert("a".to_string(), a);
        takes.insert("b".to_string(), b);
        let cm = map(&[(0.0, 1.0, "a"), (1.0, 2.0, "b")]);
        let cfg = CompConfig {
            stitch_mode: StitchMode::Concatenate,
            ..CompConfig::default()
        };
        let out = stitch_with_mode(&cm, &takes, sr, &cfg).unwrap();
        // Two 1 s slices joined with a 150 ms fade.
        let fade_len = (0.15 * sr as f32).round() as usize;
        assert_eq!(out.len(), sr as usize * 2 - fade_len);
    }

    #[test]
    fn output_is_clamped_after_normalization() {
        let sr = 8000u32;
        let y = tone(220.0, sr, 1.0, 0.9);
        let mut takes = HashMap::new();
        takes.insert("t".to_string(), y);
        let cm = map(&[(0.0, 1.0, "t")]);
        let out = stitch(&cm, &takes, sr, &CompConfig::default()).unwrap();
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}
