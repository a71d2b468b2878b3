use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ScoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("no deliveries left after filtering (seasons {season_min}..={season_max}, innings 1-2)")]
    EmptyDataset { season_min: i32, season_max: i32 },

    #[error("unknown team: {0:?}")]
    UnknownTeam(String),

    #[error("artifact not found: {} (run ipl_train first)", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("artifact {} is unreadable: {reason}", .path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("model was trained with encoder {expected} but encoder on disk is {found}")]
    ArtifactMismatch { expected: String, found: String },

    #[error("invalid prediction input: {0}")]
    PredictionInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScoreError {
    pub fn data_format(msg: impl Into<String>) -> Self {
        ScoreError::DataFormat(msg.into())
    }

    pub fn prediction_input(msg: impl Into<String>) -> Self {
        ScoreError::PredictionInput(msg.into())
    }

    /// Errors the interactive form reports inline instead of ending the session.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ScoreError::UnknownTeam(_)
                | ScoreError::ArtifactNotFound(_)
                | ScoreError::ArtifactMismatch { .. }
                | ScoreError::PredictionInput(_)
        )
    }
}
