//! Single-ray resection onto the ground plane
//!
//! Recovers the planar position of the ground point a pixel-space detection
//! looks at, from the drone's planar position, its height above ground, and
//! its attitude. The imaging convention puts the image y axis along the
//! direction of travel, so the conventional aircraft roll and pitch axes are
//! swapped: roll rotates about y, pitch about x. Positive pitch raises the
//! nose, positive roll is right wing down, positive yaw is nose right of
//! true north.

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Ray component below which the detection ray is treated as parallel to the
/// ground plane.
const RAY_VERTICAL_EPSILON: f64 = 1e-9;

/// Fixed camera intrinsics used to convert pixel offsets to metric rays.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in meters
    pub focal_length_m: f64,
    /// Pixel pitch in millimeters per pixel
    pub pixel_spacing_mm: f64,
    /// Fiducial center offset in millimeters, x component
    pub fiducial_center_x_mm: f64,
    /// Fiducial center offset in millimeters, y component
    pub fiducial_center_y_mm: f64,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            focal_length_m: 0.004425,
            pixel_spacing_mm: 0.00345,
            fiducial_center_x_mm: 2.5116,
            fiducial_center_y_mm: -1.8768,
        }
    }
}

/// Inputs for one resection: drone planar position, height above ground,
/// pixel centroid of the detection, and vehicle attitude in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayInputs {
    pub easting_drone: f64,
    pub northing_drone: f64,
    pub agl: f64,
    pub x_px: f64,
    pub y_px: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Failure intersecting the detection ray with the ground plane.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResectionError {
    #[error("detection ray is parallel to the ground plane (vertical component {ray_z})")]
    DegenerateRay { ray_z: f64 },
}

/// Compute the planar ground position a detection ray intersects.
///
/// The pixel centroid is converted to a millimeter offset from the fiducial
/// center, scaled by `agl / focal_length` into a camera-relative ray with a
/// synthetic vertical component of `agl`, rotated into the world frame by
/// `R = Rz(yaw) * Rx(pitch) * Ry(roll)`, then scaled so it meets the flat
/// ground plane exactly `agl` meters below the drone.
pub fn resect(
    intrinsics: &CameraIntrinsics,
    inputs: &RayInputs,
) -> Result<(f64, f64), ResectionError> {
    let scale = inputs.agl / intrinsics.focal_length_m;

    // Detection offset from the fiducial center, in millimeters
    let image_x = inputs.x_px * intrinsics.pixel_spacing_mm - intrinsics.fiducial_center_x_mm;
    let image_y = -inputs.y_px * intrinsics.pixel_spacing_mm - intrinsics.fiducial_center_y_mm;

    // Camera-relative ray in meters, vertical component pinned to AGL
    let ray = Vector3::new(scale * image_x / 1000.0, scale * image_y / 1000.0, inputs.agl);

    let (pitch, roll, yaw) = (inputs.pitch, inputs.roll, inputs.yaw);

    let rx = Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, pitch.cos(), pitch.sin(),
        0.0, -pitch.sin(), pitch.cos(),
    );
    let ry = Matrix3::new(
        roll.cos(), 0.0, -roll.sin(),
        0.0, 1.0, 0.0,
        roll.sin(), 0.0, roll.cos(),
    );
    let rz = Matrix3::new(
        yaw.cos(), yaw.sin(), 0.0,
        -yaw.sin(), yaw.cos(), 0.0,
        0.0, 0.0, 1.0,
    );

    let world = rz * rx * ry * ray;

    let ray_z = world.z;
    if ray_z.abs() < RAY_VERTICAL_EPSILON {
        return Err(ResectionError::DegenerateRay { ray_z });
    }

    // Scale so the ray intersects the ground plane AGL meters below
    let t = inputs.agl / ray_z;

    Ok((
        inputs.easting_drone + world.x * t,
        inputs.northing_drone + world.y * t,
    ))
}
