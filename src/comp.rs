//! The two-pass comping pipeline.
//!
//! Pass 1 scores every take over the whole phrase and picks the reference.
//! The reference is segmented into sub-phrase chunks, and pass 2 scores
//! every `(take, segment)` pair on the reference's cut grid. The winners
//! become a comp map, which the stitcher renders into one comped waveform.
//!
//! [`comp_phrase`] is the in-memory engine; [`run_comping`] wraps it with
//! take discovery, decoding, and artifact writing.

use crate::compmap::{build_comp_map, CompMap};
use crate::config::CompConfig;
use crate::feature::{FeatureProvider, FeatureRow, SpectralFeatureProvider};
use crate::files::find_takes;
use crate::io::{load_take, save_wav};
use crate::scoring::{score_row, ScoredRow};
use crate::segment::{segment_reference, Segment};
use crate::stitch::stitch_with_mode;
use crate::table::write_score_table;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One loaded take: id, mono waveform, and its sample rate.
#[derive(Debug, Clone)]
pub struct Take {
    pub id: String,
    pub y: Vec<f32>,
    pub sr: u32,
}

/// Everything a comping run produces, in memory.
#[derive(Debug, Clone)]
pub struct CompOutcome {
    /// Whole-phrase scores, best first.
    pub whole_rows: Vec<ScoredRow>,
    /// Per-(take, segment) scores, by segment then best first.
    pub segment_rows: Vec<ScoredRow>,
    /// The reference take's cut grid.
    pub segments: Vec<Segment>,
    /// Winner and alternates per segment.
    pub compmap: CompMap,
    /// The stitched comp.
    pub comped: Vec<f32>,
}

/// Paths of the artifacts written by [`run_comping`].
#[derive(Debug, Clone)]
pub struct CompArtifacts {
    pub features_csv: PathBuf,
    pub segments_csv: PathBuf,
    pub compmap_json: PathBuf,
    pub comped_wav: PathBuf,
}

/// Run the full pipeline on pre-loaded takes.
///
/// Every take must already be mono at `config.sample_rate`; a mismatched
/// rate is fatal since the stitcher assumes one shared absolute timeline.
/// `bpm` steers the segment target duration when known.
pub fn comp_phrase(
    phrase: &str,
    takes: &[Take],
    bpm: Option<f32>,
    config: &CompConfig,
    provider: &dyn FeatureProvider,
) -> crate::Result<CompOutcome> {
    config.validate()?;
    if takes.is_empty() {
        return Err(crate::Error::MissingInput(format!(
            "no takes for phrase `{phrase}`"
        )));
    }
    for take in takes {
        if take.y.is_empty() {
            return Err(crate::Error::EmptyAudio);
        }
        if take.sr != config.sample_rate {
            return Err(crate::Error::SampleRateMismatch {
                take: take.id.clone(),
                got: take.sr,
                expected: config.sample_rate,
            });
        }
    }

    // Pass 1: whole-phrase scores. Pitch is tracked once per take and
    // reused (sliced by time) in pass 2.
    let mut tracks = Vec::with_capacity(takes.len());
    let mut whole_rows = Vec::with_capacity(takes.len());
    for take in takes {
        let track = provider.track_pitch(&take.y, take.sr)?;
        let raw = provider.measure(&take.y, take.sr, &track)?;
        let dur = take.y.len() as f32 / take.sr as f32;
        whole_rows.push(score_row(
            FeatureRow {
                phrase: phrase.to_string(),
                take: take.id.clone(),
                segment_idx: None,
                start_s: 0.0,
                end_s: dur,
                raw,
            },
            config,
        ));
        tracks.push(track);
    }

    // Reference: best whole-phrase final score; ties keep the first take
    // in input order.
    let mut ref_idx = 0usize;
    for (i, row) in whole_rows.iter().enumerate() {
        if row.score.final_score > whole_rows[ref_idx].score.final_score {
            ref_idx = i;
        }
    }
    let reference = &takes[ref_idx];
    log::info!(
        "phrase `{phrase}`: reference take `{}` (final {:.3})",
        reference.id,
        whole_rows[ref_idx].score.final_score
    );

    let segments = segment_reference(&reference.y, reference.sr, bpm, config);
    log::info!("phrase `{phrase}`: {} segment(s)", segments.len());

    // Pass 2: every take scored on the reference's cut grid.
    let mut segment_rows = Vec::new();
    for (take, track) in takes.iter().zip(tracks.iter()) {
        let dur = take.y.len() as f32 / take.sr as f32;
        for (seg_idx, seg) in segments.iter().enumerate() {
            let start = seg.start_s.clamp(0.0, dur);
            let end = seg.end_s.clamp(0.0, dur);
            if end <= start {
                log::warn!(
                    "take `{}` is shorter than segment {seg_idx}; skipping",
                    take.id
                );
                continue;
            }
            let a = (start * take.sr as f32) as usize;
            let b = ((end * take.sr as f32) as usize).min(take.y.len());
            if b <= a {
                continue;
            }
            let y_seg = &take.y[a..b];
            let track_seg = track.slice(start, end, dur);
            let raw = provider.measure(y_seg, take.sr, &track_seg)?;
            segment_rows.push(score_row(
                FeatureRow {
                    phrase: phrase.to_string(),
                    take: take.id.clone(),
                    segment_idx: Some(seg_idx),
                    start_s: start,
                    end_s: end,
                    raw,
                },
                config,
            ));
        }
    }

    let compmap = build_comp_map(&segment_rows, &segments, phrase, &reference.id, bpm, config)?;

    let audio: HashMap<String, Vec<f32>> = takes
        .iter()
        .map(|t| (t.id.clone(), t.y.clone()))
        .collect();
    let comped = stitch_with_mode(&compmap, &audio, config.sample_rate, config)?;

    // Present tables best-first.
    whole_rows.sort_by(|a, b| {
        b.score
            .final_score
            .partial_cmp(&a.score.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    segment_rows.sort_by(|a, b| {
        a.row.segment_idx.cmp(&b.row.segment_idx).then(
            b.score
                .final_score
                .partial_cmp(&a.score.final_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    Ok(CompOutcome {
        whole_rows,
        segment_rows,
        segments,
        compmap,
        comped,
    })
}

/// Discover, decode, comp, and write artifacts.
///
/// `phrase_dir` holds one audio file per take; `phrase` is the label
/// recorded in the tables and comp map. Artifacts land in `out_dir`
/// (created if needed): `features.csv`, `segments.csv`, `compmap.json`,
/// and `comped.wav`.
pub fn run_comping<P, Q>(
    phrase_dir: P,
    out_dir: Q,
    phrase: &str,
    bpm: Option<f32>,
    config: &CompConfig,
) -> crate::Result<CompArtifacts>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    config.validate()?;
    let provider = SpectralFeatureProvider {
        frame_length: config.frame_length,
        hop_length: config.hop_length,
        ..SpectralFeatureProvider::default()
    };

    let mut takes = Vec::new();
    for file in find_takes(&phrase_dir)? {
        log::debug!("loading take `{}` from {}", file.id, file.path.display());
        let y = load_take(&file.path, config.sample_rate)?;
        takes.push(Take {
            id: file.id,
            y,
            sr: config.sample_rate,
        });
    }

    let mut outcome = comp_phrase(phrase, &takes, bpm, config, &provider)?;
    outcome.compmap.base_dir = Some(phrase_dir.as_ref().display().to_string());
    outcome.compmap.relative_path = Some(phrase.to_string());

    let out = out_dir.as_ref();
    std::fs::create_dir_all(out)?;
    let artifacts = CompArtifacts {
        features_csv: out.join("features.csv"),
        segments_csv: out.join("segments.csv"),
        compmap_json: out.join("compmap.json"),
        comped_wav: out.join("comped.wav"),
    };

    write_score_table(&artifacts.features_csv, &outcome.whole_rows)?;
    write_score_table(&artifacts.segments_csv, &outcome.segment_rows)?;
    outcome.compmap.to_json_file(&artifacts.compmap_json)?;
    save_wav(&artifacts.comped_wav, &outcome.comped, config.sample_rate)?;

    log::info!(
        "phrase `{phrase}`: wrote comp ({:.3}s) to {}",
        outcome.comped.len() as f32 / config.sample_rate as f32,
        artifacts.comped_wav.display()
    );
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(id: &str, y: Vec<f32>, sr: u32) -> Take {
        Take {
            id: id.to_string(),
            y,
            sr,
        }
    }

    fn sung(sr: u32, freq: f32, detune_cents: f32, seconds: f32) -> Vec<f32> {
        let f = freq * (2.0f32).powf(detune_cents / 1200.0);
        (0..(seconds * sr as f32) as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * f * i as f32 / sr as f32).sin())
            .collect()
    }

    fn test_config(sr: u32) -> CompConfig {
        CompConfig {
            sample_rate: sr,
            ..CompConfig::default()
        }
    }

    #[test]
    fn rejects_mismatched_sample_rate() {
        let sr = 16_000;
        let cfg = test_config(sr);
        let provider = SpectralFeatureProvider::default();
        let takes = vec![take("t1", sung(sr, 220.0, 0.0, 1.0), 44_100)];
        let err = comp_phrase("p", &takes, None, &cfg, &provider);
        assert!(matches!(
            err,
            Err(crate::Error::SampleRateMismatch { .. })
        ));
    }

    #[test]
    fn rejects_empty_take_list() {
        let cfg = test_config(16_000);
        let provider = SpectralFeatureProvider::default();
        assert!(comp_phrase("p", &[], None, &cfg, &provider).is_err());
    }

    #[test]
    fn single_take_phrase_comps_to_itself() {
        let sr = 16_000;
        let cfg = test_config(sr);
        let provider = SpectralFeatureProvider::default();
        let takes = vec![take("only", sung(sr, 220.0, 0.0, 2.0), sr)];
        let outcome = comp_phrase("p", &takes, Some(120.0), &cfg, &provider).unwrap();
        assert_eq!(outcome.whole_rows.len(), 1);
        assert_eq!(outcome.compmap.reference_take, "only");
        assert!(!outcome.comped.is_empty());
        for seg in &outcome.compmap.segments {
            assert_eq!(seg.winner.take, "only");
        }
    }

    #[test]
    fn cleaner_take_wins_the_phrase() {
        let sr = 16_000;
        let cfg = test_config(sr);
        let provider = SpectralFeatureProvider::default();
        // Steady tone vs a take that wanders a quarter tone sharp halfway.
        let clean = sung(sr, 220.0, 0.0, 2.0);
        let mut wobbly = sung(sr, 220.0, 0.0, 1.0);
        wobbly.extend(sung(sr, 220.0, 150.0, 1.0));
        let takes = vec![take("wobbly", wobbly, sr), take("clean", clean, sr)];
        let outcome = comp_phrase("p", &takes, None, &cfg, &provider).unwrap();
        assert_eq!(outcome.whole_rows[0].row.take, "clean");
        assert_eq!(outcome.compmap.reference_take, "clean");
    }

    #[test]
    fn outcome_rows_are_sorted() {
        let sr = 16_000;
        let cfg = test_config(sr);
        let provider = SpectralFeatureProvider::default();
        let takes = vec![
            take("t1", sung(sr, 220.0, 0.0, 2.0), sr),
            take("t2", sung(sr, 220.0, 80.0, 2.0), sr),
        ];
        let outcome = comp_phrase("p", &takes, Some(90.0), &cfg, &provider).unwrap();
        for pair in outcome.whole_rows.windows(2) {
            assert!(pair[0].score.final_score >= pair[1].score.final_score);
        }
        for pair in outcome.segment_rows.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.row.segment_idx <= b.row.segment_idx);
            if a.row.segment_idx == b.row.segment_idx {
                assert!(a.score.final_score >= b.score.final_score);
            }
        }
    }

    #[test]
    fn end_to_end_run_writes_artifacts() {
        let sr = 16_000;
        let base = std::env::temp_dir().join("vocomp-run-test");
        let phrase_dir = base.join("phrase01");
        let out_dir = base.join("out");
        let _ = std::fs::remove_dir_all(&base);
        std::fs::create_dir_all(&phrase_dir).unwrap();

        crate::io::save_wav(phrase_dir.join("take_1.wav"), &sung(sr, 220.0, 0.0, 2.0), sr)
            .unwrap();
        crate::io::save_wav(phrase_dir.join("take_2.wav"), &sung(sr, 220.0, 60.0, 2.0), sr)
            .unwrap();

        let cfg = test_config(sr);
        let artifacts =
            run_comping(&phrase_dir, &out_dir, "singer01/phrase01", Some(100.0), &cfg).unwrap();

        assert!(artifacts.features_csv.is_file());
        assert!(artifacts.segments_csv.is_file());
        assert!(artifacts.compmap_json.is_file());
        assert!(artifacts.comped_wav.is_file());

        let map = CompMap::from_json_file(&artifacts.compmap_json).unwrap();
        assert_eq!(map.phrase, "singer01/phrase01");
        assert!(!map.segments.is_empty());

        let _ = std::fs::remove_dir_all(&base);
    }
}
