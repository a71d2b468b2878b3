use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::artifacts::{
    ArtifactStamp, LoadedArtifacts, ModelArtifact, decode_artifacts, read_artifacts, read_raw,
};
use crate::error::{Result, ScoreError};
use crate::features::FEATURE_NAMES;
use crate::team_encoder::TeamEncoder;
use crate::win_prob::approx_win_probability;

pub const MAX_OVER: u32 = 19;
pub const MAX_BALL: u32 = 6;
pub const MAX_WICKETS: u32 = 10;

/// What the form collects from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSituation {
    pub batting_team: String,
    pub bowling_team: String,
    pub over: u32,
    pub ball: u32,
    pub current_score: u32,
    pub wickets: u32,
}

impl MatchSituation {
    pub fn validate(&self) -> Result<()> {
        if self.batting_team == self.bowling_team {
            return Err(ScoreError::prediction_input(
                "batting and bowling team must differ",
            ));
        }
        if self.over > MAX_OVER {
            return Err(ScoreError::prediction_input(format!(
                "over must be 0..={MAX_OVER}, got {}",
                self.over
            )));
        }
        if !(1..=MAX_BALL).contains(&self.ball) {
            return Err(ScoreError::prediction_input(format!(
                "ball must be 1..={MAX_BALL}, got {}",
                self.ball
            )));
        }
        if self.wickets > MAX_WICKETS {
            return Err(ScoreError::prediction_input(format!(
                "wickets must be 0..={MAX_WICKETS}, got {}",
                self.wickets
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub final_score: f64,
    pub win_probability: f64,
}

/// Owns one loaded model/encoder pair. Storage is only touched again on
/// [`ScorePredictor::reload`].
#[derive(Debug, Clone)]
pub struct ScorePredictor {
    dir: PathBuf,
    model: ModelArtifact,
    encoder: TeamEncoder,
    stamp: ArtifactStamp,
}

impl ScorePredictor {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let loaded = read_artifacts(&dir)?;
        info!(
            dir = %dir.display(),
            teams = loaded.encoder.len(),
            generated_at = %loaded.model.generated_at,
            "artifacts loaded"
        );
        Ok(Self::from_loaded(dir, loaded))
    }

    fn from_loaded(dir: PathBuf, loaded: LoadedArtifacts) -> Self {
        Self {
            dir,
            model: loaded.model,
            encoder: loaded.encoder,
            stamp: loaded.stamp,
        }
    }

    /// Re-reads both artifact files and swaps them in if their content changed.
    /// Returns `Ok(true)` on swap. On error the current pair stays in service.
    pub fn reload(&mut self) -> Result<bool> {
        let raw = read_raw(&self.dir)?;
        if raw.stamp == self.stamp {
            return Ok(false);
        }
        let loaded = match decode_artifacts(&self.dir, raw) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(error = %err, "reload rejected, keeping current artifacts");
                return Err(err);
            }
        };
        info!(
            teams = loaded.encoder.len(),
            generated_at = %loaded.model.generated_at,
            "artifacts reloaded"
        );
        let dir = std::mem::take(&mut self.dir);
        *self = Self::from_loaded(dir, loaded);
        Ok(true)
    }

    pub fn predict_final_score(&self, features: &[f64]) -> Result<f64> {
        if features.len() != FEATURE_NAMES.len() {
            return Err(ScoreError::prediction_input(format!(
                "expected {} features ({}), got {}",
                FEATURE_NAMES.len(),
                FEATURE_NAMES.join(", "),
                features.len()
            )));
        }
        for (name, value) in FEATURE_NAMES.iter().zip(features) {
            if !value.is_finite() || *value < 0.0 {
                return Err(ScoreError::prediction_input(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        for (name, value) in FEATURE_NAMES.iter().zip(&features[..2]) {
            if value.fract() != 0.0 || !self.encoder.contains_id(*value as u32) {
                return Err(ScoreError::prediction_input(format!(
                    "{name} {value} is not a known team id (0..{})",
                    self.encoder.len()
                )));
            }
        }
        self.model.forest.predict(features)
    }

    pub fn predict(&self, situation: &MatchSituation) -> Result<Prediction> {
        situation.validate()?;
        let batting = self.encode_team(&situation.batting_team)?;
        let bowling = self.encode_team(&situation.bowling_team)?;
        let features = [
            f64::from(batting),
            f64::from(bowling),
            f64::from(situation.over),
            f64::from(situation.ball),
            f64::from(situation.current_score),
            f64::from(situation.wickets),
        ];
        let final_score = self.predict_final_score(&features)?;
        Ok(Prediction {
            final_score,
            win_probability: approx_win_probability(
                situation.current_score,
                situation.over,
                situation.ball,
                situation.wickets,
            ),
        })
    }

    pub fn get_team_names(&self) -> &[String] {
        self.encoder.all_names()
    }

    pub fn encode_team(&self, name: &str) -> Result<u32> {
        self.encoder.encode(name)
    }

    pub fn stamp(&self) -> &ArtifactStamp {
        &self.stamp
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.dir
    }
}
