//! UAS Target Geolocation
//!
//! Turns aerial captures into refined geographic target positions: a
//! concurrent pipeline detects objects in new imagery, photogrammetric
//! resection projects each detection onto the ground, and a parametric
//! least-squares adjustment fuses the accumulated observations per object
//! class into a single refined estimate.

pub mod adjustment;
pub mod core;
pub mod detector;
pub mod geodesy;
pub mod pipeline;
pub mod resolver;
pub mod storage;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use adjustment::{adjust, AdjustmentConfig, AdjustmentError, Observation, PlanarEstimate};
pub use crate::core::{Fix, Pose, PoseRecord, RefinedEstimate, TargetObservation, DEFAULT_BATCH_SIZE};
pub use detector::{Detection, DetectorError, ObjectDetector};
pub use geodesy::{
    resect, to_geographic, to_planar, CameraIntrinsics, PlanarCoordinate, ProjectionError,
    RayInputs, ResectionError,
};
pub use pipeline::{
    CaptureSource, FsCaptureSource, Pipeline, PipelineConfig, PipelineError, Watcher,
};
pub use resolver::{resolve_target, ResolveError};
pub use storage::{JsonPoseSource, PoseError, PoseSource, StoreError, TargetStore};
pub use utils::{ConfigError, SystemConfig};
pub use validation::ValidationError;
