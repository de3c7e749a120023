//! Geodetic and photogrammetric math
//!
//! Pure, stateless leaf utilities: the WGS84/UTM coordinate transform and the
//! single-ray resection model that intersects a detection ray with the
//! assumed-flat ground plane.

pub mod resection;
pub mod utm;

pub use resection::{resect, CameraIntrinsics, RayInputs, ResectionError};
pub use utm::{to_geographic, to_planar, PlanarCoordinate, ProjectionError};
