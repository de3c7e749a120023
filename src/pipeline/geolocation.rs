//! Geolocation worker
//!
//! Consumes one detection at a time, pairs it with the pose captured
//! alongside its image, projects the detection ray to a ground fix, and
//! persists both the fix and the raw observation. Any failure drops only
//! the detection that caused it.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::{Fix, TargetObservation};
use crate::geodesy::{
    resect, to_geographic, to_planar, CameraIntrinsics, ProjectionError, RayInputs, ResectionError,
};
use crate::storage::{PoseError, PoseSource, StoreError, TargetStore};
use crate::validation::ValidationError;

use super::{GeoMessage, TaggedDetection};

/// Why a single detection could not be turned into a stored fix.
#[derive(Debug, Error)]
pub enum GeolocateError {
    #[error("no pose record for capture")]
    MissingPose,

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Resection(#[from] ResectionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Geolocation worker loop.
pub(crate) fn run(
    geo_rx: Receiver<GeoMessage>,
    poses: Arc<dyn PoseSource>,
    store: Arc<TargetStore>,
    intrinsics: CameraIntrinsics,
) {
    loop {
        match geo_rx.recv() {
            Ok(GeoMessage::Detection(tagged)) => {
                if let Err(error) = geolocate(&tagged, poses.as_ref(), &store, &intrinsics) {
                    warn!(capture = %tagged.capture, %error, "detection dropped");
                }
            }
            Ok(GeoMessage::Shutdown) | Err(_) => return,
        }
    }
}

/// Resolve one detection into a geographic fix and persist it.
pub fn geolocate(
    tagged: &TaggedDetection,
    poses: &dyn PoseSource,
    store: &TargetStore,
    intrinsics: &CameraIntrinsics,
) -> Result<Fix, GeolocateError> {
    tagged.detection.validate()?;

    let pose = poses
        .pose_for(&tagged.capture)?
        .ok_or(GeolocateError::MissingPose)?;

    let planar = to_planar(pose.lat, pose.lon)?;
    let (easting, northing) = resect(
        intrinsics,
        &RayInputs {
            easting_drone: planar.easting,
            northing_drone: planar.northing,
            agl: pose.rel_alt,
            x_px: tagged.detection.x,
            y_px: tagged.detection.y,
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
        },
    )?;
    let (lat, lon) = to_geographic(easting, northing, planar.zone, planar.north)?;

    let fix = Fix {
        lat,
        lon,
        confidence: tagged.detection.confidence,
    };
    store.append_fix(&tagged.detection.class, fix.clone())?;
    store.append_observation(
        &tagged.detection.class,
        TargetObservation::from_pose(&pose, tagged.detection.x, tagged.detection.y),
    )?;

    debug!(
        capture = %tagged.capture,
        class = %tagged.detection.class,
        lat,
        lon,
        "fix recorded"
    );
    Ok(fix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pose;
    use crate::detector::Detection;

    // Pixel coordinates that land exactly on the fiducial center for the
    // default intrinsics.
    const FIDUCIAL_X_PX: f64 = 728.0;
    const FIDUCIAL_Y_PX: f64 = 544.0;

    struct FixedPose(Option<Pose>);

    impl PoseSource for FixedPose {
        fn pose_for(&self, _capture: &str) -> Result<Option<Pose>, PoseError> {
            Ok(self.0.clone())
        }
    }

    fn nadir_pose(lat: f64, lon: f64, agl: f64) -> Pose {
        Pose {
            lat,
            lon,
            alt: 380.0,
            rel_alt: agl,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            heading: 0.0,
            position_uncertainty: 0.5,
            alt_uncertainty: 0.8,
            speed_uncertainty: 0.1,
            heading_uncertainty: 0.05,
        }
    }

    fn tagged(x: f64, y: f64) -> TaggedDetection {
        TaggedDetection {
            capture: "0001.png".into(),
            detection: Detection {
                class: "car".into(),
                confidence: 0.87,
                x,
                y,
            },
        }
    }

    #[test]
    fn nadir_fiducial_detection_fixes_at_the_drone_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = TargetStore::open(dir.path()).unwrap();
        let poses = FixedPose(Some(nadir_pose(43.4723, -80.5449, 50.0)));

        let fix = geolocate(
            &tagged(FIDUCIAL_X_PX, FIDUCIAL_Y_PX),
            &poses,
            &store,
            &CameraIntrinsics::default(),
        )
        .unwrap();

        assert!((fix.lat - 43.4723).abs() < 1e-6);
        assert!((fix.lon - -80.5449).abs() < 1e-6);
        assert_eq!(store.fixes("car").unwrap().len(), 1);
        assert_eq!(store.observations("car").unwrap().len(), 1);
    }

    #[test]
    fn missing_pose_record_drops_the_detection() {
        let dir = tempfile::tempdir().unwrap();
        let store = TargetStore::open(dir.path()).unwrap();
        let poses = FixedPose(None);

        let result = geolocate(
            &tagged(FIDUCIAL_X_PX, FIDUCIAL_Y_PX),
            &poses,
            &store,
            &CameraIntrinsics::default(),
        );

        assert!(matches!(result, Err(GeolocateError::MissingPose)));
        assert!(store.fixes("car").is_none());
    }

    #[test]
    fn invalid_detection_is_rejected_before_any_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = TargetStore::open(dir.path()).unwrap();
        let poses = FixedPose(Some(nadir_pose(43.4723, -80.5449, 50.0)));

        let mut bad = tagged(FIDUCIAL_X_PX, FIDUCIAL_Y_PX);
        bad.detection.confidence = 1.5;

        let result = geolocate(&bad, &poses, &store, &CameraIntrinsics::default());
        assert!(matches!(result, Err(GeolocateError::Validation(_))));
    }
}
