//! Learned pairwise take ranker.
//!
//! A lightweight alternative head to the heuristic accuracy score: take
//! pairs within a phrase become direction-signed feature delta vectors,
//! provisionally labeled by the heuristic, and a logistic regression is
//! fit on the standardized deltas. At apply time the same linear weights
//! score single takes, and the learned score is blended back into the
//! heuristic.

use crate::feature::RawFeatures;
use crate::scoring::ScoredRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Ranker features and their direction: +1 means higher is better.
pub const RANKER_FEATURES: [(&str, f32); 6] = [
    ("f0_rmse_c", -1.0),
    ("snr_db", 1.0),
    ("deess_ratio", -1.0),
    ("clip_n", -1.0),
    ("voiced_ratio", 1.0),
    ("mean_periodicity", 1.0),
];

const N_FEATURES: usize = RANKER_FEATURES.len();

/// Class balance below this ratio triggers flip augmentation.
const BALANCE_RATIO: f32 = 0.2;

fn feature_values(raw: &RawFeatures) -> [f32; N_FEATURES] {
    [
        raw.f0_rmse_c,
        raw.snr_db,
        raw.deess_ratio,
        raw.clip_n as f32,
        raw.voiced_ratio,
        raw.mean_periodicity,
    ]
}

/// Direction-signed single-take vector: every component is oriented so
/// that larger means better.
pub fn take_vector(raw: &RawFeatures) -> [f32; N_FEATURES] {
    let vals = feature_values(raw);
    let mut v = [0.0f32; N_FEATURES];
    for (i, (_, sign)) in RANKER_FEATURES.iter().enumerate() {
        v[i] = sign * vals[i];
    }
    v
}

/// A labeled training pair within one phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub phrase: String,
    pub take_a: String,
    pub take_b: String,
    /// 1 when A's heuristic accuracy beats B's.
    pub label: u8,
    /// Whether the accuracy gap was wide enough to trust the label.
    pub is_auto: bool,
    /// Absolute heuristic accuracy gap.
    pub delta: f32,
    pub features_a: RawFeatures,
    pub features_b: RawFeatures,
}

impl Pair {
    /// Direction-signed delta vector `sign * (A - B)`; positive components
    /// favor A. The vector for `(B, A)` is the exact negation.
    pub fn delta_vector(&self) -> [f32; N_FEATURES] {
        let a = feature_values(&self.features_a);
        let b = feature_values(&self.features_b);
        let mut v = [0.0f32; N_FEATURES];
        for (i, (_, sign)) in RANKER_FEATURES.iter().enumerate() {
            v[i] = sign * (a[i] - b[i]);
        }
        v
    }
}

/// Build all within-phrase take pairs from whole-phrase scored rows.
///
/// Labels come from the heuristic accuracy score; `is_auto` marks pairs
/// whose gap is at least `delta`. Ambiguous pairs are kept (downstream
/// consumers may filter on `is_auto`). Phrases with fewer than two rows
/// contribute nothing.
pub fn build_pairs(rows: &[ScoredRow], delta: f32) -> Vec<Pair> {
    let mut by_phrase: BTreeMap<&str, Vec<&ScoredRow>> = BTreeMap::new();
    for row in rows {
        by_phrase.entry(&row.row.phrase).or_default().push(row);
    }

    let mut pairs = Vec::new();
    for (phrase, group) in by_phrase {
        if group.len() < 2 {
            continue;
        }
        for i in 0..group.len() {
            for j in i + 1..group.len() {
                let (a, b) = (group[i], group[j]);
                let gap = (a.score.acc_score - b.score.acc_score).abs();
                pairs.push(Pair {
                    phrase: phrase.to_string(),
                    take_a: a.row.take.clone(),
                    take_b: b.row.take.clone(),
                    label: if a.score.acc_score > b.score.acc_score {
                        1
                    } else {
                        0
                    },
                    is_auto: gap >= delta,
                    delta: gap,
                    features_a: a.row.raw,
                    features_b: b.row.raw,
                });
            }
        }
    }
    pairs
}

/// Per-feature mean/std scaling fit on the training deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: [f32; N_FEATURES],
    pub std: [f32; N_FEATURES],
}

impl Standardizer {
    fn fit(xs: &[[f32; N_FEATURES]]) -> Self {
        let n = xs.len().max(1) as f32;
        let mut mean = [0.0f32; N_FEATURES];
        for x in xs {
            for i in 0..N_FEATURES {
                mean[i] += x[i];
            }
        }
        for m in &mut mean {
            *m /= n;
        }
        let mut std = [0.0f32; N_FEATURES];
        for x in xs {
            for i in 0..N_FEATURES {
                let d = x[i] - mean[i];
                std[i] += d * d;
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            // Constant features scale to themselves instead of exploding.
            if *s < 1e-9 {
                *s = 1.0;
            }
        }
        Self { mean, std }
    }

    fn transform(&self, x: &[f32; N_FEATURES]) -> [f32; N_FEATURES] {
        let mut z = [0.0f32; N_FEATURES];
        for i in 0..N_FEATURES {
            z[i] = (x[i] - self.mean[i]) / self.std[i];
        }
        z
    }
}

/// Trained pairwise ranker: standardization plus logistic weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerModel {
    pub standardizer: Standardizer,
    pub weights: [f32; N_FEATURES],
    pub bias: f32,
}

impl RankerModel {
    /// Save the model as JSON.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a model from JSON.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<RankerModel> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Linear decision value for a standardized input.
    fn decision(&self, x: &[f32; N_FEATURES]) -> f32 {
        let z = self.standardizer.transform(x);
        let mut acc = self.bias;
        for i in 0..N_FEATURES {
            acc += self.weights[i] * z[i];
        }
        acc
    }

    /// Raw learned score for a single take (unbounded margin; higher is
    /// better). Per-phrase normalization happens in [`apply`].
    pub fn score_take(&self, raw: &RawFeatures) -> f32 {
        self.decision(&take_vector(raw))
    }

    /// Probability that A beats B for a pair's delta vector.
    pub fn predict_pair(&self, pair: &Pair) -> f32 {
        sigmoid(self.decision(&pair.delta_vector()))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Train a logistic regression on the pairs' delta vectors.
///
/// When the labels are single-class, or the minority class falls under a
/// 0.2 ratio, every pair is mirrored (`-x`, flipped label) to restore
/// balance; by the delta vector's antisymmetry the mirrored sample is the
/// same comparison seen from the other side. Samples are weighted
/// inversely to class frequency during the gradient descent.
pub fn train(pairs: &[Pair]) -> crate::Result<RankerModel> {
    if pairs.is_empty() {
        return Err(crate::Error::MissingInput(
            "no training pairs; need at least two takes in some phrase".to_string(),
        ));
    }

    let mut xs: Vec<[f32; N_FEATURES]> = pairs.iter().map(|p| p.delta_vector()).collect();
    let mut ys: Vec<f32> = pairs.iter().map(|p| p.label as f32).collect();

    let n_pos = ys.iter().filter(|&&y| y > 0.5).count();
    let n_neg = ys.len() - n_pos;
    let minority = n_pos.min(n_neg) as f32;
    let majority = n_pos.max(n_neg) as f32;
    if minority == 0.0 || minority / majority < BALANCE_RATIO {
        log::info!("augmenting {} pairs with flipped copies", xs.len());
        let flipped: Vec<[f32; N_FEATURES]> = xs
            .iter()
            .map(|x| {
                let mut f = [0.0f32; N_FEATURES];
                for i in 0..N_FEATURES {
                    f[i] = -x[i];
                }
                f
            })
            .collect();
        let flipped_y: Vec<f32> = ys.iter().map(|y| 1.0 - y).collect();
        xs.extend(flipped);
        ys.extend(flipped_y);
    }

    let standardizer = Standardizer::fit(&xs);
    let zs: Vec<[f32; N_FEATURES]> = xs.iter().map(|x| standardizer.transform(x)).collect();

    // Balanced sample weights, matching class_weight="balanced".
    let n = ys.len() as f32;
    let n_pos = ys.iter().filter(|&&y| y > 0.5).count() as f32;
    let n_neg = n - n_pos;
    let w_pos = if n_pos > 0.0 { n / (2.0 * n_pos) } else { 0.0 };
    let w_neg = if n_neg > 0.0 { n / (2.0 * n_neg) } else { 0.0 };

    let mut weights = [0.0f32; N_FEATURES];
    let mut bias = 0.0f32;
    let lr = 0.1f32;
    let epochs = 500;

    for _ in 0..epochs {
        let mut grad_w = [0.0f32; N_FEATURES];
        let mut grad_b = 0.0f32;
        for (z, &y) in zs.iter().zip(ys.iter()) {
            let mut m = bias;
            for i in 0..N_FEATURES {
                m += weights[i] * z[i];
            }
            let sw = if y > 0.5 { w_pos } else { w_neg };
            let err = sw * (sigmoid(m) - y);
            for i in 0..N_FEATURES {
                grad_w[i] += err * z[i];
            }
            grad_b += err;
        }
        for i in 0..N_FEATURES {
            weights[i] -= lr * grad_w[i] / n;
        }
        bias -= lr * grad_b / n;
    }

    Ok(RankerModel {
        standardizer,
        weights,
        bias,
    })
}

/// A take re-ranked by the learned model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTake {
    pub phrase: String,
    pub take: String,
    /// Unbounded decision value.
    pub learned_raw: f32,
    /// Min-max normalized within the phrase.
    pub learned_norm: f32,
    /// `blend * learned_norm + (1 - blend) * acc_score`.
    pub final_score: f32,
}

/// Score whole-phrase rows with the trained model and blend against the
/// heuristic accuracy. `blend` is the weight on the learned score.
pub fn apply(rows: &[ScoredRow], model: &RankerModel, blend: f32) -> Vec<RankedTake> {
    let raw_scores: Vec<f32> = rows.iter().map(|r| model.score_take(&r.row.raw)).collect();

    // Per-phrase min-max bounds.
    let mut bounds: BTreeMap<&str, (f32, f32)> = BTreeMap::new();
    for (row, &s) in rows.iter().zip(raw_scores.iter()) {
        let entry = bounds
            .entry(&row.row.phrase)
            .or_insert((f32::INFINITY, f32::NEG_INFINITY));
        entry.0 = entry.0.min(s);
        entry.1 = entry.1.max(s);
    }

    let blend = blend.clamp(0.0, 1.0);
    let mut out: Vec<RankedTake> = rows
        .iter()
        .zip(raw_scores.iter())
        .map(|(row, &s)| {
            let (lo, hi) = bounds[row.row.phrase.as_str()];
            let norm = (s - lo) / (hi - lo + 1e-9);
            RankedTake {
                phrase: row.row.phrase.clone(),
                take: row.row.take.clone(),
                learned_raw: s,
                learned_norm: norm,
                final_score: blend * norm + (1.0 - blend) * row.score.acc_score,
            }
        })
        .collect();

    // Best first within each phrase.
    out.sort_by(|a, b| {
        a.phrase.cmp(&b.phrase).then(
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    out
}
