//! IPL final-score prediction.
//!
//! The offline side ([`trainer::run_pipeline`]) turns ball-by-ball records into
//! a random forest and a team encoder on disk. The serving side
//! ([`predictor::ScorePredictor`]) loads that pair once and answers queries
//! until told to [`reload`](predictor::ScorePredictor::reload).

pub mod artifacts;
pub mod config;
pub mod deliveries;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod predictor;
pub mod team_encoder;
pub mod trainer;
pub mod win_prob;

pub use error::{Result, ScoreError};
pub use predictor::{MatchSituation, Prediction, ScorePredictor};
pub use team_encoder::TeamEncoder;
