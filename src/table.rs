//! CSV score tables.
//!
//! Three tables leave a comping run: whole-phrase scores, per-segment
//! scores, and (optionally) learned re-rankings; training pairs for the
//! ranker are a fourth. The format is plain comma-separated text written
//! by hand, with a reader for the feature tables so ranker training can
//! start from a previous run's CSV.

use crate::feature::{FeatureRow, RawFeatures};
use crate::ranker::{Pair, RankedTake, RANKER_FEATURES};
use crate::scoring::{Score, ScoredRow};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const RAW_COLUMNS: [&str; 9] = [
    "f0_rmse_c",
    "voiced_ratio",
    "mean_periodicity",
    "snr_db",
    "deess_ratio",
    "clip_n",
    "vibrato_stability",
    "dyn_shape",
    "microtiming",
];

const SCORE_COLUMNS: [&str; 4] = ["acc_score", "emo_score", "alpha", "final_score"];

fn raw_fields(raw: &RawFeatures) -> [String; 9] {
    [
        raw.f0_rmse_c.to_string(),
        raw.voiced_ratio.to_string(),
        raw.mean_periodicity.to_string(),
        raw.snr_db.to_string(),
        raw.deess_ratio.to_string(),
        raw.clip_n.to_string(),
        raw.vibrato_stability.to_string(),
        raw.dyn_shape.to_string(),
        raw.microtiming.to_string(),
    ]
}

/// Write scored rows as CSV. Rows with a `segment_idx` get a
/// `segment_idx` column; mixing segmented and whole-phrase rows in one
/// table is not supported.
pub fn write_score_table<P: AsRef<Path>>(path: P, rows: &[ScoredRow]) -> crate::Result<()> {
    let segmented = rows.iter().any(|r| r.row.segment_idx.is_some());
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let mut header = vec!["phrase", "take"];
    if segmented {
        header.push("segment_idx");
    }
    header.extend(["start_s", "end_s"]);
    header.extend(RAW_COLUMNS);
    header.extend(SCORE_COLUMNS);
    writeln!(w, "{}", header.join(","))?;

    for row in rows {
        let mut fields = vec![row.row.phrase.clone(), row.row.take.clone()];
        if segmented {
            fields.push(
                row.row
                    .segment_idx
                    .map(|i| i.to_string())
                    .unwrap_or_default(),
            );
        }
        fields.push(row.row.start_s.to_string());
        fields.push(row.row.end_s.to_string());
        fields.extend(raw_fields(&row.row.raw));
        fields.push(row.score.acc_score.to_string());
        fields.push(row.score.emo_score.to_string());
        fields.push(row.score.alpha.to_string());
        fields.push(row.score.final_score.to_string());
        writeln!(w, "{}", fields.join(","))?;
    }
    w.flush()?;
    Ok(())
}

/// Write ranker training pairs as CSV (one `_a`/`_b` column pair per
/// ranker feature).
pub fn write_pair_table<P: AsRef<Path>>(path: P, pairs: &[Pair]) -> crate::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let mut header: Vec<String> = ["phrase", "take_a", "take_b", "label", "is_auto", "delta"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for (name, _) in RANKER_FEATURES {
        header.push(format!("{name}_a"));
    }
    for (name, _) in RANKER_FEATURES {
        header.push(format!("{name}_b"));
    }
    writeln!(w, "{}", header.join(","))?;

    for p in pairs {
        let mut fields = vec![
            p.phrase.clone(),
            p.take_a.clone(),
            p.take_b.clone(),
            p.label.to_string(),
            (p.is_auto as u8).to_string(),
            p.delta.to_string(),
        ];
        for raw in [&p.features_a, &p.features_b] {
            fields.push(raw.f0_rmse_c.to_string());
            fields.push(raw.snr_db.to_string());
            fields.push(raw.deess_ratio.to_string());
            fields.push(raw.clip_n.to_string());
            fields.push(raw.voiced_ratio.to_string());
            fields.push(raw.mean_periodicity.to_string());
        }
        writeln!(w, "{}", fields.join(","))?;
    }
    w.flush()?;
    Ok(())
}

/// Write learned re-rankings as CSV.
pub fn write_ranked_table<P: AsRef<Path>>(path: P, ranked: &[RankedTake]) -> crate::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    writeln!(w, "phrase,take,learned_raw,learned_norm,final_score")?;
    for r in ranked {
        writeln!(
            w,
            "{},{},{},{},{}",
            r.phrase, r.take, r.learned_raw, r.learned_norm, r.final_score
        )?;
    }
    w.flush()?;
    Ok(())
}

/// Read a score table written by [`write_score_table`] back into scored
/// rows. Column order is taken from the header, so tables with extra
/// columns from other tools still parse as long as the required ones are
/// present.
pub fn read_score_table<P: AsRef<Path>>(path: P) -> crate::Result<Vec<ScoredRow>> {
    const KIND: &str = "score table";
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines.next().ok_or(crate::Error::MalformedTable {
        kind: KIND,
        line: 1,
        reason: "empty file".to_string(),
    })??;
    let header: Vec<&str> = header_line.split(',').map(str::trim).collect();
    let col = |name: &str| -> crate::Result<usize> {
        header
            .iter()
            .position(|&h| h == name)
            .ok_or(crate::Error::MalformedTable {
                kind: KIND,
                line: 1,
                reason: format!("missing column `{name}`"),
            })
    };

    let c_phrase = col("phrase")?;
    let c_take = col("take")?;
    let c_segment = header.iter().position(|&h| h == "segment_idx");
    let c_start = col("start_s")?;
    let c_end = col("end_s")?;
    let c_raw: Vec<usize> = RAW_COLUMNS
        .iter()
        .map(|name| col(name))
        .collect::<crate::Result<_>>()?;
    let c_score: Vec<usize> = SCORE_COLUMNS
        .iter()
        .map(|name| col(name))
        .collect::<crate::Result<_>>()?;

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line_no = idx + 2;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let get = |c: usize| -> crate::Result<&str> {
            fields.get(c).copied().ok_or(crate::Error::MalformedTable {
                kind: KIND,
                line: line_no,
                reason: format!("expected at least {} fields, got {}", c + 1, fields.len()),
            })
        };
        let num = |c: usize| -> crate::Result<f32> {
            let s = get(c)?;
            s.parse::<f32>().map_err(|_| crate::Error::MalformedTable {
                kind: KIND,
                line: line_no,
                reason: format!("`{s}` is not a number"),
            })
        };

        let segment_idx = match c_segment {
            Some(c) => {
                let s = get(c)?;
                if s.is_empty() {
                    None
                } else {
                    Some(s.parse::<usize>().map_err(|_| crate::Error::MalformedTable {
                        kind: KIND,
                        line: line_no,
                        reason: format!("`{s}` is not a segment index"),
                    })?)
                }
            }
            None => None,
        };

        rows.push(ScoredRow {
            row: FeatureRow {
                phrase: get(c_phrase)?.to_string(),
                take: get(c_take)?.to_string(),
                segment_idx,
                start_s: num(c_start)?,
                end_s: num(c_end)?,
                raw: RawFeatures {
                    f0_rmse_c: num(c_raw[0])?,
                    voiced_ratio: num(c_raw[1])?,
                    mean_periodicity: num(c_raw[2])?,
                    snr_db: num(c_raw[3])?,
                    deess_ratio: num(c_raw[4])?,
                    clip_n: num(c_raw[5])? as u64,
                    vibrato_stability: num(c_raw[6])?,
                    dyn_shape: num(c_raw[7])?,
                    microtiming: num(c_raw[8])?,
                },
            },
            score: Score {
                acc_score: num(c_score[0])?,
                emo_score: num(c_score[1])?,
                alpha: num(c_score[2])?,
                final_score: num(c_score[3])?,
            },
        });
    }
    Ok(rows)
}
