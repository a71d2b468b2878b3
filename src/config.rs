use std::path::PathBuf;
use std::str::FromStr;

use crate::deliveries::DeliveryFilter;
use crate::features::TargetSource;
use crate::forest::ForestParams;

const APP_DIR: &str = "ipl_score";
const DEFAULT_DATA_PATH: &str = "IPL.csv";
const DEFAULT_TEST_RATIO: f64 = 0.2;
const DEFAULT_SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub filter: DeliveryFilter,
    pub target: TargetSource,
    pub test_ratio: f64,
    pub split_seed: u64,
    pub forest: ForestParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            artifact_dir: default_artifact_dir(),
            filter: DeliveryFilter::default(),
            target: TargetSource::default(),
            test_ratio: DEFAULT_TEST_RATIO,
            split_seed: DEFAULT_SPLIT_SEED,
            forest: ForestParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with any `IPL_*` variables present in the environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(path) = env_path("IPL_DATA_PATH") {
            cfg.data_path = path;
        }
        if let Some(min) = env_parse("IPL_SEASON_MIN") {
            cfg.filter.season_min = min;
        }
        if let Some(max) = env_parse("IPL_SEASON_MAX") {
            cfg.filter.season_max = max;
        }
        if let Some(target) = env_parse("IPL_TARGET") {
            cfg.target = target;
        }
        if let Some(ratio) = env_parse::<f64>("IPL_TEST_RATIO") {
            cfg.test_ratio = ratio.clamp(0.0, 0.9);
        }
        if let Some(seed) = env_parse("IPL_SPLIT_SEED") {
            cfg.split_seed = seed;
        }
        if let Some(trees) = env_parse::<usize>("IPL_FOREST_TREES") {
            cfg.forest.n_trees = trees.max(1);
        }
        if let Some(depth) = env_parse::<usize>("IPL_FOREST_MAX_DEPTH") {
            cfg.forest.max_depth = Some(depth.max(1));
        }
        if let Some(seed) = env_parse("IPL_FOREST_SEED") {
            cfg.forest.seed = seed;
        }
        cfg
    }
}

/// Loads `.env.local` then `.env` from the working directory, ignoring missing files.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn default_artifact_dir() -> PathBuf {
    env_path("IPL_ARTIFACT_DIR")
        .or_else(app_cache_dir)
        .unwrap_or_else(|| PathBuf::from("artifacts"))
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Some(base) = env_path("XDG_CACHE_HOME") {
        return Some(base.join(APP_DIR));
    }
    env_path("HOME").map(|home| home.join(".cache").join(APP_DIR))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .map(PathBuf::from)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<T>().ok())
}
