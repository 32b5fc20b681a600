//! Comp map construction and JSON serialization.
//!
//! The comp map is the run's durable artifact: per segment, the winning
//! take plus up to `top_k - 1` near-tied alternates an operator may audition
//! instead. It carries enough score context to be inspected on its own.

use crate::config::CompConfig;
use crate::scoring::ScoredRow;
use crate::segment::Segment;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Score summary for one take over one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeScore {
    pub take: String,
    pub final_score: f32,
    pub acc_score: f32,
    pub emo_score: f32,
    pub snr_db: f32,
    pub f0_rmse_c: f32,
}

impl TakeScore {
    fn from_row(row: &ScoredRow) -> Self {
        Self {
            take: row.row.take.clone(),
            final_score: row.score.final_score,
            acc_score: row.score.acc_score,
            emo_score: row.score.emo_score,
            snr_db: row.row.raw.snr_db,
            f0_rmse_c: row.row.raw.f0_rmse_c,
        }
    }
}

/// One segment's selection: winner plus near-tied alternates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompMapSegment {
    pub index: usize,
    pub start_s: f32,
    pub end_s: f32,
    pub winner: TakeScore,
    pub candidates: Vec<TakeScore>,
}

/// The full per-phrase comp map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompMap {
    pub phrase: String,
    pub alpha: f32,
    pub alpha_pct: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bpm: Option<f32>,
    /// Directory the takes were read from; filled in by the file pipeline.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base_dir: Option<String>,
    /// Phrase path relative to the dataset root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relative_path: Option<String>,
    pub reference_take: String,
    pub segments: Vec<CompMapSegment>,
}

impl CompMap {
    /// Write the comp map as pretty-printed JSON.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a comp map back from JSON.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<CompMap> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Build the comp map from per-segment scored rows.
///
/// Rows are grouped by `segment_idx` and ranked by `final_score`
/// descending; ties keep the earlier take in input order, so the outcome
/// is deterministic for a sorted take list. A candidate qualifies when its
/// score sits within `diversity_delta` of the winner's.
pub fn build_comp_map(
    rows: &[ScoredRow],
    segments: &[Segment],
    phrase: &str,
    reference_take: &str,
    bpm: Option<f32>,
    config: &CompConfig,
) -> crate::Result<CompMap> {
    if rows.is_empty() {
        return Err(crate::Error::MissingInput(
            "no scored segment rows to build a comp map from".to_string(),
        ));
    }

    let mut map_segments = Vec::with_capacity(segments.len());
    for (seg_idx, seg) in segments.iter().enumerate() {
        let mut seg_rows: Vec<&ScoredRow> = rows
            .iter()
            .filter(|r| r.row.segment_idx == Some(seg_idx))
            .collect();
        if seg_rows.is_empty() {
            continue;
        }
        // Stable sort keeps input order among exact ties.
        seg_rows.sort_by(|a, b| {
            b.score
                .final_score
                .partial_cmp(&a.score.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let winner = TakeScore::from_row(seg_rows[0]);
        let best_score = winner.final_score;
        let mut candidates = Vec::new();
        for row in &seg_rows[1..] {
            if candidates.len() + 1 >= config.top_k {
                break;
            }
            if best_score - row.score.final_score <= config.diversity_delta {
                candidates.push(TakeScore::from_row(row));
            }
        }

        map_segments.push(CompMapSegment {
            index: seg_idx,
            start_s: seg.start_s,
            end_s: seg.end_s,
            winner,
            candidates,
        });
    }

    if map_segments.is_empty() {
        return Err(crate::Error::MissingInput(
            "no segment had any scored rows".to_string(),
        ));
    }

    Ok(CompMap {
        phrase: phrase.to_string(),
        alpha: config.alpha,
        alpha_pct: (config.alpha.clamp(0.0, 1.0) * 100.0).round() as u32,
        bpm,
        base_dir: None,
        relative_path: None,
        reference_take: reference_take.to_string(),
        segments: map_segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureRow, RawFeatures};
    use crate::scoring::Score;

    fn scored(take: &str, seg: usize, final_score: f32) -> ScoredRow {
        ScoredRow {
            row: FeatureRow {
                phrase: "singer01/phrase01".to_string(),
                take: take.to_string(),
                segment_idx: Some(seg),
                start_s: seg as f32,
                end_s: seg as f32 + 1.0,
                raw: RawFeatures {
                    f0_rmse_c: 50.0,
                    voiced_ratio: 0.8,
                    mean_periodicity: 0.8,
                    snr_db: 20.0,
                    deess_ratio: 0.1,
                    clip_n: 0,
                    vibrato_stability: 0.5,
                    dyn_shape: 0.5,
                    microtiming: 0.5,
                },
            },
            score: Score {
                acc_score: final_score,
                emo_score: final_score,
                alpha: 0.5,
                final_score,
            },
        }
    }

    fn segs(n: usize) -> Vec<Segment> {
        (0..n)
            .map(|i| Segment {
                start_s: i as f32,
                end_s: i as f32 + 1.0,
            })
            .collect()
    }

    #[test]
    fn winner_is_top_scorer() {
        let rows = vec![
            scored("take1", 0, 0.6),
            scored("take2", 0, 0.9),
            scored("take3", 0, 0.7),
        ];
        let map = build_comp_map(
            &rows,
            &segs(1),
            "singer01/phrase01",
            "take2",
            Some(90.0),
            &CompConfig::default(),
        )
        .unwrap();
        assert_eq!(map.segments.len(), 1);
        assert_eq!(map.segments[0].winner.take, "take2");
    }

    #[test]
    fn candidates_respect_delta_and_top_k() {
        // Scores at 0.90, 0.86, 0.85, 0.70: delta 0.07 admits two, and
        // top_k 3 allows both.
        let rows = vec![
            scored("a", 0, 0.90),
            scored("b", 0, 0.86),
            scored("c", 0, 0.85),
            scored("d", 0, 0.70),
        ];
        let map = build_comp_map(
            &rows,
            &segs(1),
            "p",
            "a",
            None,
            &CompConfig::default(),
        )
        .unwrap();
        let cands = &map.segments[0].candidates;
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].take, "b");
        assert_eq!(cands[1].take, "c");
        for c in cands {
            assert!(map.segments[0].winner.final_score - c.final_score <= 0.07 + 1e-6);
        }
    }

    #[test]
    fn top_k_one_means_no_candidates() {
        let rows = vec![scored("a", 0, 0.9), scored("b", 0, 0.89)];
        let cfg = CompConfig {
            top_k: 1,
            ..CompConfig::default()
        };
        let map = build_comp_map(&rows, &segs(1), "p", "a", None, &cfg).unwrap();
        assert!(map.segments[0].candidates.is_empty());
    }

    #[test]
    fn tie_keeps_input_order() {
        let rows = vec![scored("a", 0, 0.8), scored("b", 0, 0.8)];
        let map = build_comp_map(&rows, &segs(1), "p", "a", None, &CompConfig::default()).unwrap();
        assert_eq!(map.segments[0].winner.take, "a");
    }

    #[test]
    fn empty_rows_are_an_error() {
        let err = build_comp_map(&[], &segs(1), "p", "a", None, &CompConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn json_round_trip() {
        let rows = vec![scored("a", 0, 0.9), scored("b", 0, 0.85), scored("a", 1, 0.7)];
        let map =
            build_comp_map(&rows, &segs(2), "p", "a", Some(120.0), &CompConfig::default()).unwrap();
        let dir = std::env::temp_dir().join("vocomp-compmap-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("compmap.json");
        map.to_json_file(&path).unwrap();
        let back = CompMap::from_json_file(&path).unwrap();
        assert_eq!(map, back);
        std::fs::remove_file(&path).ok();
    }
}
