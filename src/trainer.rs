use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::artifacts::{ArtifactPaths, EncoderArtifact, ModelArtifact, write_artifacts};
use crate::config::PipelineConfig;
use crate::deliveries::{FilteredDataset, load_deliveries};
use crate::error::Result;
use crate::evaluation::{HoldoutMetrics, evaluate_predictions};
use crate::features::{DerivedDelivery, derive_features};
use crate::forest::RandomForest;
use crate::team_encoder::TeamEncoder;

pub type FeatureRow = [f64; 6];

#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<FeatureRow>,
    pub targets: Vec<f64>,
    /// Rows where at least one feature or the target was null and became 0.
    pub imputed_rows: usize,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn subset(&self, idx: &[usize]) -> (Vec<FeatureRow>, Vec<f64>) {
        let features = idx.iter().map(|&i| self.features[i]).collect();
        let targets = idx.iter().map(|&i| self.targets[i]).collect();
        (features, targets)
    }
}

// Nulls are zero-filled rather than dropped, matching how the model has always
// been trained. A zero team id or over is indistinguishable from a real one.
pub fn build_training_set(rows: &[DerivedDelivery], encoder: &TeamEncoder) -> Result<TrainingSet> {
    let mut set = TrainingSet {
        features: Vec::with_capacity(rows.len()),
        targets: Vec::with_capacity(rows.len()),
        imputed_rows: 0,
    };
    for row in rows {
        let batting = encoder.encode(&row.batting_team)?;
        let bowling = encoder.encode(&row.bowling_team)?;
        let nullable = [row.over, row.ball, row.current_score, row.final_innings_score];
        if nullable.iter().any(Option::is_none) {
            set.imputed_rows += 1;
        }
        set.features.push([
            f64::from(batting),
            f64::from(bowling),
            f64::from(row.over.unwrap_or(0)),
            f64::from(row.ball.unwrap_or(0)),
            f64::from(row.current_score.unwrap_or(0)),
            f64::from(row.wickets),
        ]);
        set.targets.push(f64::from(row.final_innings_score.unwrap_or(0)));
    }
    Ok(set)
}

/// Shuffled (train, test) index partition. The test side gets
/// `ceil(n * test_ratio)` rows but never all of them.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);
    let wanted = (n as f64 * test_ratio.clamp(0.0, 1.0)).ceil() as usize;
    let test_len = wanted.min(n.saturating_sub(1));
    let train = idx.split_off(test_len);
    (train, idx)
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub encoder: EncoderArtifact,
    pub model: ModelArtifact,
    pub imputed_rows: usize,
}

pub fn train_from_dataset(dataset: &FilteredDataset, cfg: &PipelineConfig) -> Result<TrainOutcome> {
    let derived = derive_features(dataset, cfg.target)?;
    let encoder = TeamEncoder::fit_dataset(dataset);
    info!(teams = encoder.len(), rows = derived.len(), target = %cfg.target, "features derived");

    let set = build_training_set(&derived, &encoder)?;
    if set.imputed_rows > 0 {
        warn!(
            rows = set.imputed_rows,
            "null features or targets imputed as 0 before fitting"
        );
    }

    let (train_idx, test_idx) = train_test_split(set.len(), cfg.test_ratio, cfg.split_seed);
    let (x_train, y_train) = set.subset(&train_idx);
    let (x_test, y_test) = set.subset(&test_idx);

    let started = Instant::now();
    let forest = RandomForest::fit(&x_train, &y_train, cfg.forest)?;
    info!(
        trees = forest.n_trees(),
        train = x_train.len(),
        secs = started.elapsed().as_secs_f64(),
        "forest trained"
    );

    let holdout = evaluate_holdout(&forest, &x_test, &y_test)?;
    match &holdout {
        Some(m) => info!(
            samples = m.samples,
            mae = m.mae,
            rmse = m.rmse,
            r2 = m.r2,
            "holdout evaluation"
        ),
        None => warn!("test partition is empty, no holdout metrics"),
    }

    let mut model = ModelArtifact::new(forest, &encoder);
    model.target = cfg.target;
    model.train_samples = x_train.len();
    model.test_samples = x_test.len();
    model.holdout = holdout;

    Ok(TrainOutcome {
        encoder: EncoderArtifact::new(encoder),
        model,
        imputed_rows: set.imputed_rows,
    })
}

fn evaluate_holdout(
    forest: &RandomForest,
    x_test: &[FeatureRow],
    y_test: &[f64],
) -> Result<Option<HoldoutMetrics>> {
    let predictions = forest.predict_batch(x_test)?;
    Ok(evaluate_predictions(&predictions, y_test))
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub teams: Vec<String>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub imputed_rows: usize,
    pub holdout: Option<HoldoutMetrics>,
    pub paths: ArtifactPaths,
}

/// Load, filter, derive, fit and persist. Any failure aborts the whole run;
/// artifacts already on disk are left untouched unless training succeeds.
pub fn run_pipeline(cfg: &PipelineConfig) -> Result<TrainReport> {
    let rows = load_deliveries(&cfg.data_path)?;
    let rows_read = rows.len();
    let dataset = cfg.filter.dataset(rows)?;
    let mut outcome = train_from_dataset(&dataset, cfg)?;
    outcome.model.source = Some(cfg.data_path.display().to_string());
    let paths = write_artifacts(&cfg.artifact_dir, &outcome.encoder, &outcome.model)?;

    Ok(TrainReport {
        rows_read,
        rows_kept: dataset.len(),
        teams: outcome.encoder.encoder.all_names().to_vec(),
        train_samples: outcome.model.train_samples,
        test_samples: outcome.model.test_samples,
        imputed_rows: outcome.imputed_rows,
        holdout: outcome.model.holdout,
        paths,
    })
}
