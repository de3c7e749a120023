//! System configuration loading and validation

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adjustment::AdjustmentConfig;
use crate::geodesy::CameraIntrinsics;
use crate::pipeline::PipelineConfig;

/// Filesystem layout for a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory new captures land in
    pub image_dir: PathBuf,
    /// Directory of per-capture pose sidecar records
    pub pose_dir: PathBuf,
    /// Directory the per-class target documents are kept in
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
            pose_dir: PathBuf::from("data/poses"),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Whole-system configuration, one JSON document on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub paths: PathsConfig,
    pub camera: CameraIntrinsics,
    pub adjustment: AdjustmentConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config parameter {parameter}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
}

impl SystemConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self).map_err(|source| {
            ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "pipeline.batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.pipeline.poll_interval.is_zero() {
            return Err(ConfigError::InvalidParameter {
                parameter: "pipeline.poll_interval",
                reason: "must be nonzero".into(),
            });
        }
        if self.camera.focal_length_m <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "camera.focal_length_m",
                reason: "must be positive".into(),
            });
        }
        if self.camera.pixel_spacing_mm <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "camera.pixel_spacing_mm",
                reason: "must be positive".into(),
            });
        }
        let alpha = self.adjustment.significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "adjustment.significance_level",
                reason: format!("{alpha} is outside (0, 1)"),
            });
        }
        if self.adjustment.convergence_threshold_m <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "adjustment.convergence_threshold_m",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        SystemConfig::default().validate().unwrap();
    }

    #[test]
    fn configuration_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = SystemConfig::default();
        config.pipeline.batch_size = 6;
        config.save(&path).unwrap();

        let loaded = SystemConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"pipeline": {"batch_size": 4, "poll_interval": {"secs": 1, "nanos": 0}, "shutdown_timeout": {"secs": 5, "nanos": 0}}}"#).unwrap();

        let loaded = SystemConfig::from_file(&path).unwrap();
        assert_eq!(loaded.pipeline.batch_size, 4);
        assert_eq!(loaded.camera, CameraIntrinsics::default());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = SystemConfig::default();
        config.pipeline.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter {
                parameter: "pipeline.batch_size",
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_significance_level_is_rejected() {
        let mut config = SystemConfig::default();
        config.adjustment.significance_level = 1.0;
        assert!(config.validate().is_err());
    }
}
