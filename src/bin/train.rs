use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ipl_score::config::{PipelineConfig, load_dotenv};
use ipl_score::features::TargetSource;
use ipl_score::trainer;

/// Build the score model and team encoder from ball-by-ball data.
#[derive(Debug, Parser)]
#[command(name = "ipl_train")]
struct Args {
    /// Delivery-level CSV or Parquet file.
    #[arg(long, env = "IPL_DATA_PATH")]
    data: Option<PathBuf>,

    /// Directory the artifacts are written to.
    #[arg(long, env = "IPL_ARTIFACT_DIR")]
    artifacts: Option<PathBuf>,

    #[arg(long)]
    season_min: Option<i32>,

    #[arg(long)]
    season_max: Option<i32>,

    /// cumulative-runs or team-runs
    #[arg(long)]
    target: Option<TargetSource>,

    #[arg(long)]
    trees: Option<usize>,

    #[arg(long)]
    max_depth: Option<usize>,

    #[arg(long)]
    test_ratio: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> PipelineConfig {
        let mut cfg = PipelineConfig::from_env();
        if let Some(data) = self.data {
            cfg.data_path = data;
        }
        if let Some(dir) = self.artifacts {
            cfg.artifact_dir = dir;
        }
        if let Some(min) = self.season_min {
            cfg.filter.season_min = min;
        }
        if let Some(max) = self.season_max {
            cfg.filter.season_max = max;
        }
        if let Some(target) = self.target {
            cfg.target = target;
        }
        if let Some(trees) = self.trees {
            cfg.forest.n_trees = trees.max(1);
        }
        if let Some(depth) = self.max_depth {
            cfg.forest.max_depth = Some(depth.max(1));
        }
        if let Some(ratio) = self.test_ratio {
            cfg.test_ratio = ratio.clamp(0.0, 0.9);
        }
        if let Some(seed) = self.seed {
            cfg.split_seed = seed;
            cfg.forest.seed = seed;
        }
        cfg
    }
}

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = Args::parse().into_config();
    let report = trainer::run_pipeline(&cfg)
        .with_context(|| format!("training from {} failed", cfg.data_path.display()))?;

    println!("Training complete");
    println!("Data: {}", cfg.data_path.display());
    println!(
        "Deliveries: {} read, {} kept (seasons {}..={})",
        report.rows_read, report.rows_kept, cfg.filter.season_min, cfg.filter.season_max
    );
    println!("Teams ({}): {}", report.teams.len(), report.teams.join(", "));
    println!(
        "Samples: train={} test={} imputed={}",
        report.train_samples, report.test_samples, report.imputed_rows
    );
    match report.holdout {
        Some(m) => println!(
            "Holdout: MAE {:.2}  RMSE {:.2}  R2 {:.3}",
            m.mae, m.rmse, m.r2
        ),
        None => println!("Holdout: n/a"),
    }
    println!("Model: {}", report.paths.model.display());
    println!("Encoder: {}", report.paths.encoder.display());
    Ok(())
}
