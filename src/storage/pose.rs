//! Pose lookup for captures
//!
//! Each capture has a JSON pose record written by the telemetry collaborator
//! at capture time. A capture with no resolvable pose is never geolocated;
//! the worker drops the detection and moves on.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{Pose, PoseRecord};
use crate::validation::ValidationError;

/// Failure loading or validating a pose record.
#[derive(Debug, Error)]
pub enum PoseError {
    #[error("failed to read pose record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed pose record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid pose record {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

/// Capability interface for per-capture pose lookup.
pub trait PoseSource: Send + Sync {
    /// Pose for a capture identifier; `Ok(None)` when no record exists.
    fn pose_for(&self, capture: &str) -> Result<Option<Pose>, PoseError>;
}

/// Pose source reading `<dir>/<capture stem>.json` sidecar records.
#[derive(Debug, Clone)]
pub struct JsonPoseSource {
    dir: PathBuf,
}

impl JsonPoseSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, capture: &str) -> PathBuf {
        let stem = Path::new(capture)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| capture.to_string());
        self.dir.join(format!("{stem}.json"))
    }
}

impl PoseSource for JsonPoseSource {
    fn pose_for(&self, capture: &str) -> Result<Option<Pose>, PoseError> {
        let path = self.record_path(capture);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PoseError::Io { path, source }),
        };

        let record: PoseRecord = serde_json::from_str(&contents)
            .map_err(|source| PoseError::Malformed {
                path: path.clone(),
                source,
            })?;

        let pose = Pose::try_from(record).map_err(|source| PoseError::Invalid { path, source })?;
        Ok(Some(pose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "lat": 43.4723, "lon": -80.5449, "alt": 387.0, "rel_alt": 50.0,
        "roll": 0.01, "pitch": -0.02, "yaw": 1.2, "heading": 1.2,
        "position_uncertainty": 1500.0, "alt_uncertainty": 800.0,
        "speed_uncertainty": 200.0, "heading_uncertainty": 50.0
    }"#;

    #[test]
    fn pose_is_loaded_from_sidecar_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001.json"), RECORD).unwrap();

        let source = JsonPoseSource::new(dir.path());
        let pose = source.pose_for("0001.png").unwrap().unwrap();
        assert!((pose.lat - 43.4723).abs() < 1e-12);
        // Millimeter uncertainties converted at ingestion
        assert!((pose.position_uncertainty - 1.5).abs() < 1e-12);
    }

    #[test]
    fn missing_record_is_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonPoseSource::new(dir.path());
        assert!(source.pose_for("0001.png").unwrap().is_none());
    }

    #[test]
    fn malformed_record_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001.json"), "{\"lat\": 1.0}").unwrap();

        let source = JsonPoseSource::new(dir.path());
        assert!(matches!(
            source.pose_for("0001.png"),
            Err(PoseError::Malformed { .. })
        ));
    }

    #[test]
    fn out_of_range_record_names_the_field() {
        let dir = tempfile::tempdir().unwrap();
        let bad = RECORD.replace("43.4723", "143.4723");
        fs::write(dir.path().join("0001.json"), bad).unwrap();

        let source = JsonPoseSource::new(dir.path());
        let err = source.pose_for("0001.png").unwrap_err();
        assert!(err.to_string().contains("invalid pose record"));
    }
}
