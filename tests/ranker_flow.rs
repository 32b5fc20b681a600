//! Ranker training and application over score tables on disk.

use vocomp::config::CompConfig;
use vocomp::feature::{FeatureRow, RawFeatures};
use vocomp::ranker::{apply, build_pairs, train, RankerModel};
use vocomp::scoring::score_row;
use vocomp::table::{read_score_table, write_pair_table, write_score_table};

fn row(phrase: &str, take: &str, f0_rmse_c: f32, snr_db: f32, deess_ratio: f32) -> FeatureRow {
    FeatureRow {
        phrase: phrase.to_string(),
        take: take.to_string(),
        segment_idx: None,
        start_s: 0.0,
        end_s: 3.0,
        raw: RawFeatures {
            f0_rmse_c,
            voiced_ratio: 0.8,
            mean_periodicity: 0.8,
            snr_db,
            deess_ratio,
            clip_n: 0,
            vibrato_stability: 0.5,
            dyn_shape: 0.5,
            microtiming: 0.5,
        },
    }
}

#[test]
fn train_from_csv_and_rerank() {
    let dir = std::env::temp_dir().join("vocomp-ranker-flow");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    // Two phrases, three takes each, with clearly ordered quality.
    let cfg = CompConfig::default();
    let rows: Vec<_> = vec![
        row("p1", "good", 15.0, 32.0, 0.05),
        row("p1", "mid", 70.0, 22.0, 0.12),
        row("p1", "rough", 160.0, 9.0, 0.28),
        row("p2", "good", 20.0, 30.0, 0.06),
        row("p2", "mid", 80.0, 20.0, 0.14),
        row("p2", "rough", 170.0, 8.0, 0.26),
    ]
    .into_iter()
    .map(|r| score_row(r, &cfg))
    .collect();

    let features_csv = dir.join("features.csv");
    write_score_table(&features_csv, &rows).unwrap();

    // Training starts from the table a previous run wrote.
    let loaded = read_score_table(&features_csv).unwrap();
    let pairs = build_pairs(&loaded, 0.08);
    // 3 takes per phrase, 2 phrases.
    assert_eq!(pairs.len(), 6);
    write_pair_table(dir.join("pairs.csv"), &pairs).unwrap();

    let model = train(&pairs).unwrap();
    let model_path = dir.join("ranker.json");
    model.to_json_file(&model_path).unwrap();
    let model = RankerModel::from_json_file(&model_path).unwrap();

    let ranked = apply(&loaded, &model, 0.7);
    assert_eq!(ranked.len(), 6);
    for phrase in ["p1", "p2"] {
        let order: Vec<&str> = ranked
            .iter()
            .filter(|r| r.phrase == phrase)
            .map(|r| r.take.as_str())
            .collect();
        assert_eq!(order, vec!["good", "mid", "rough"], "phrase {phrase}");
    }
    for r in &ranked {
        assert!((0.0..=1.0).contains(&r.learned_norm));
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ambiguous_pairs_are_kept_but_flagged() {
    let cfg = CompConfig::default();
    let rows: Vec<_> = vec![
        row("p", "a", 30.0, 25.0, 0.08),
        row("p", "b", 33.0, 24.5, 0.09),
    ]
    .into_iter()
    .map(|r| score_row(r, &cfg))
    .collect();

    let pairs = build_pairs(&rows, 0.08);
    assert_eq!(pairs.len(), 1);
    assert!(!pairs[0].is_auto);
    assert!(pairs[0].delta < 0.08);
}
