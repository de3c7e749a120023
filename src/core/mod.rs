//! Core module containing fundamental types and constants

pub mod constants;
pub mod types;

pub use constants::DEFAULT_BATCH_SIZE;
pub use types::{Fix, Pose, PoseRecord, RefinedEstimate, TargetObservation};
