//! Per-class target resolution
//!
//! Rebuilds adjustment observations from the persisted per-class history,
//! runs the parametric adjustment, and writes the refined geographic
//! estimate back to the store. A single observation skips the adjustment
//! and its resected fix passes through unrefined.

use thiserror::Error;
use tracing::{info, warn};

use crate::adjustment::{adjust, AdjustmentConfig, AdjustmentError, Observation, PlanarEstimate};
use crate::core::RefinedEstimate;
use crate::geodesy::{
    resect, to_geographic, to_planar, CameraIntrinsics, ProjectionError, RayInputs, ResectionError,
};
use crate::storage::{StoreError, TargetStore};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no observations recorded for class {class}")]
    UnknownClass { class: String },

    #[error(transparent)]
    Adjustment(#[from] AdjustmentError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Resection(#[from] ResectionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Refine the position estimate for one object class.
///
/// On any failure the previously stored refined estimate is left untouched.
/// The planar zone of the first recorded observation anchors the result;
/// flights never straddle a zone boundary in practice.
pub fn resolve_target(
    class: &str,
    store: &TargetStore,
    intrinsics: &CameraIntrinsics,
    config: &AdjustmentConfig,
) -> Result<RefinedEstimate, ResolveError> {
    let records = store
        .observations(class)
        .ok_or_else(|| ResolveError::UnknownClass {
            class: class.to_string(),
        })?;
    if records.is_empty() {
        return Err(ResolveError::Adjustment(
            AdjustmentError::InsufficientObservations {
                available: 0,
                required: 1,
            },
        ));
    }

    let anchor = to_planar(records[0].lat, records[0].lon)?;
    let mut observations = Vec::with_capacity(records.len());
    for record in &records {
        let planar = to_planar(record.lat, record.lon)?;
        let (easting_target, northing_target) = resect(
            intrinsics,
            &RayInputs {
                easting_drone: planar.easting,
                northing_drone: planar.northing,
                agl: record.rel_alt,
                x_px: record.x,
                y_px: record.y,
                yaw: record.yaw,
                pitch: record.pitch,
                roll: record.roll,
            },
        )?;
        observations.push(Observation {
            easting_drone: planar.easting,
            northing_drone: planar.northing,
            agl: record.rel_alt,
            easting_target,
            northing_target,
            std_dev_m: record.position_uncertainty,
        });
    }

    let estimate = if observations.len() == 1 {
        warn!(class, "single observation, passing resected fix through");
        PlanarEstimate {
            easting: observations[0].easting_target,
            northing: observations[0].northing_target,
        }
    } else {
        adjust(&observations, config)?
    };

    let (lat, lon) = to_geographic(estimate.easting, estimate.northing, anchor.zone, anchor.north)?;
    let refined = RefinedEstimate { lat, lon };
    store.set_refined(class, refined.clone())?;
    info!(class, lat, lon, observations = observations.len(), "refined estimate stored");
    Ok(refined)
}
