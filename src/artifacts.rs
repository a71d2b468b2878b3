use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Result, ScoreError};
use crate::evaluation::HoldoutMetrics;
use crate::features::{FEATURE_NAMES, TargetSource};
use crate::forest::RandomForest;
use crate::team_encoder::{TeamEncoder, hex};

pub const ARTIFACT_VERSION: u32 = 1;
pub const MODEL_FILE: &str = "ipl_score_model.json";
pub const ENCODER_FILE: &str = "team_encoder.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub generated_at: String,
    #[serde(default)]
    pub source: Option<String>,
    pub feature_names: Vec<String>,
    pub target: TargetSource,
    pub train_samples: usize,
    pub test_samples: usize,
    #[serde(default)]
    pub holdout: Option<HoldoutMetrics>,
    pub encoder_fingerprint: String,
    pub forest: RandomForest,
}

impl ModelArtifact {
    pub fn new(forest: RandomForest, encoder: &TeamEncoder) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: None,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            target: TargetSource::default(),
            train_samples: 0,
            test_samples: 0,
            holdout: None,
            encoder_fingerprint: encoder.fingerprint(),
            forest,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderArtifact {
    pub version: u32,
    pub generated_at: String,
    pub fingerprint: String,
    pub encoder: TeamEncoder,
}

impl EncoderArtifact {
    pub fn new(encoder: TeamEncoder) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            fingerprint: encoder.fingerprint(),
            encoder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub encoder: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join(MODEL_FILE),
            encoder: dir.join(ENCODER_FILE),
        }
    }
}

/// SHA-256 of the artifact files as they were read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStamp {
    pub model_sha: String,
    pub encoder_sha: String,
}

#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub model: ModelArtifact,
    pub encoder: TeamEncoder,
    pub stamp: ArtifactStamp,
}

pub struct RawArtifacts {
    model: Vec<u8>,
    encoder: Vec<u8>,
    pub stamp: ArtifactStamp,
}

// The encoder goes first: a reader racing the writer sees either the old pair,
// or a new encoder next to an old model, which the fingerprint check rejects.
pub fn write_artifacts(
    dir: &Path,
    encoder: &EncoderArtifact,
    model: &ModelArtifact,
) -> Result<ArtifactPaths> {
    fs::create_dir_all(dir)?;
    let paths = ArtifactPaths::in_dir(dir);

    let encoder_json =
        serde_json::to_vec_pretty(encoder).map_err(|err| corrupt(&paths.encoder, err))?;
    write_atomic(&paths.encoder, &encoder_json)?;

    let model_json = serde_json::to_vec(model).map_err(|err| corrupt(&paths.model, err))?;
    write_atomic(&paths.model, &model_json)?;

    info!(
        dir = %dir.display(),
        model_bytes = model_json.len(),
        teams = encoder.encoder.len(),
        "artifacts written"
    );
    Ok(paths)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_raw(dir: &Path) -> Result<RawArtifacts> {
    let paths = ArtifactPaths::in_dir(dir);
    let encoder = read_bytes(&paths.encoder)?;
    let model = read_bytes(&paths.model)?;
    let stamp = ArtifactStamp {
        model_sha: sha256_hex(&model),
        encoder_sha: sha256_hex(&encoder),
    };
    Ok(RawArtifacts {
        model,
        encoder,
        stamp,
    })
}

pub fn read_artifacts(dir: &Path) -> Result<LoadedArtifacts> {
    decode_artifacts(dir, read_raw(dir)?)
}

pub fn decode_artifacts(dir: &Path, raw: RawArtifacts) -> Result<LoadedArtifacts> {
    let paths = ArtifactPaths::in_dir(dir);
    let encoder: EncoderArtifact = decode(&paths.encoder, &raw.encoder)?;
    check_version(&paths.encoder, encoder.version)?;
    if !encoder.encoder.is_canonical() {
        return Err(ScoreError::ArtifactCorrupt {
            path: paths.encoder,
            reason: "team names are not trimmed, sorted and unique".to_string(),
        });
    }
    let model: ModelArtifact = decode(&paths.model, &raw.model)?;
    check_version(&paths.model, model.version)?;

    let fingerprint = encoder.encoder.fingerprint();
    if fingerprint != encoder.fingerprint {
        return Err(ScoreError::ArtifactCorrupt {
            path: paths.encoder,
            reason: "stored fingerprint does not match team list".to_string(),
        });
    }
    if model.encoder_fingerprint != fingerprint {
        return Err(ScoreError::ArtifactMismatch {
            expected: model.encoder_fingerprint,
            found: fingerprint,
        });
    }
    if model.forest.n_features() != FEATURE_NAMES.len() {
        return Err(ScoreError::ArtifactCorrupt {
            path: paths.model,
            reason: format!(
                "model expects {} features, pipeline produces {}",
                model.forest.n_features(),
                FEATURE_NAMES.len()
            ),
        });
    }

    if let Err(reason) = model.forest.validate() {
        return Err(ScoreError::ArtifactCorrupt {
            path: paths.model,
            reason,
        });
    }

    Ok(LoadedArtifacts {
        model,
        encoder: encoder.encoder,
        stamp: raw.stamp,
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ScoreError::ArtifactNotFound(path.to_path_buf()),
        _ => ScoreError::Io(err),
    })
}

fn decode<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|err| corrupt(path, err))
}

fn check_version(path: &Path, version: u32) -> Result<()> {
    if version != ARTIFACT_VERSION {
        return Err(ScoreError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason: format!("unsupported artifact version {version}, expected {ARTIFACT_VERSION}"),
        });
    }
    Ok(())
}

fn corrupt(path: &Path, err: serde_json::Error) -> ScoreError {
    ScoreError::ArtifactCorrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex(&Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParams;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ipl_score_artifacts_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn tiny_model(encoder: &TeamEncoder) -> ModelArtifact {
        let x = vec![[0.0, 1.0, 0.0, 1.0, 0.0, 0.0], [1.0, 0.0, 10.0, 3.0, 80.0, 2.0]];
        let y = vec![150.0, 170.0];
        let params = ForestParams {
            n_trees: 2,
            bootstrap: false,
            ..ForestParams::default()
        };
        ModelArtifact::new(RandomForest::fit(&x, &y, params).unwrap(), encoder)
    }

    #[test]
    fn written_artifacts_read_back() {
        let dir = scratch_dir("roundtrip");
        let encoder = TeamEncoder::fit(["MI", "CSK"]);
        let model = tiny_model(&encoder);
        let paths =
            write_artifacts(&dir, &EncoderArtifact::new(encoder.clone()), &model).unwrap();
        assert!(paths.model.exists());
        assert!(!paths.model.with_extension("json.tmp").exists());

        let loaded = read_artifacts(&dir).unwrap();
        assert_eq!(loaded.encoder, encoder);
        assert_eq!(loaded.model.forest, model.forest);
        assert_eq!(loaded.stamp.model_sha.len(), 64);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_artifact_not_found() {
        let dir = scratch_dir("missing");
        let err = read_artifacts(&dir).unwrap_err();
        assert!(matches!(err, ScoreError::ArtifactNotFound(path) if path.ends_with(ENCODER_FILE)));
    }

    #[test]
    fn model_from_other_encoder_is_a_mismatch() {
        let dir = scratch_dir("mismatch");
        let old = TeamEncoder::fit(["MI", "CSK"]);
        let new = TeamEncoder::fit(["MI", "CSK", "GT"]);
        write_artifacts(&dir, &EncoderArtifact::new(new.clone()), &tiny_model(&old)).unwrap();
        let err = read_artifacts(&dir).unwrap_err();
        assert!(matches!(err, ScoreError::ArtifactMismatch { .. }));
        let _ = fs::remove_dir_all(&dir);
    }

    fn rewrite_json(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        edit(&mut value);
        fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    fn written_pair(name: &str) -> PathBuf {
        let dir = scratch_dir(name);
        let encoder = TeamEncoder::fit(["CSK", "MI"]);
        let model = tiny_model(&encoder);
        write_artifacts(&dir, &EncoderArtifact::new(encoder), &model).unwrap();
        dir
    }

    fn corrupt_reason(dir: &Path) -> (PathBuf, String) {
        match read_artifacts(dir).unwrap_err() {
            ScoreError::ArtifactCorrupt { path, reason } => (path, reason),
            other => panic!("expected ArtifactCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn split_on_unknown_feature_is_corrupt() {
        let dir = written_pair("bad_feature");
        rewrite_json(&dir.join(MODEL_FILE), |v| {
            v["forest"]["trees"][0]["nodes"][0]["feature"] = serde_json::json!(7);
        });
        let (path, reason) = corrupt_reason(&dir);
        assert!(path.ends_with(MODEL_FILE));
        assert!(reason.contains("feature 7"), "{reason}");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn split_pointing_back_or_past_the_end_is_corrupt() {
        for (name, field, index) in [("self_loop", "left", 0), ("dangling", "right", 99)] {
            let dir = written_pair(name);
            rewrite_json(&dir.join(MODEL_FILE), |v| {
                v["forest"]["trees"][0]["nodes"][0][field] = serde_json::json!(index);
            });
            let (path, reason) = corrupt_reason(&dir);
            assert!(path.ends_with(MODEL_FILE));
            assert!(reason.contains(&format!("child {index}")), "{reason}");
            let _ = fs::remove_dir_all(&dir);
        }
    }

    #[test]
    fn unsorted_or_duplicate_team_names_are_corrupt() {
        for (name, classes) in [("unsorted", ["MI", "CSK"]), ("duplicate", ["CSK", "CSK"])] {
            let dir = written_pair(name);
            rewrite_json(&dir.join(ENCODER_FILE), |v| {
                v["encoder"]["classes"] = serde_json::json!(classes);
            });
            let (path, _) = corrupt_reason(&dir);
            assert!(path.ends_with(ENCODER_FILE));
            let _ = fs::remove_dir_all(&dir);
        }
    }

    #[test]
    fn garbage_model_is_corrupt() {
        let dir = scratch_dir("garbage");
        let encoder = TeamEncoder::fit(["MI"]);
        let model = tiny_model(&encoder);
        write_artifacts(&dir, &EncoderArtifact::new(encoder), &model).unwrap();
        fs::write(dir.join(MODEL_FILE), b"{not json").unwrap();
        let err = read_artifacts(&dir).unwrap_err();
        assert!(matches!(err, ScoreError::ArtifactCorrupt { .. }));
        let _ = fs::remove_dir_all(&dir);
    }
}
