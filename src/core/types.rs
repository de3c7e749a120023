//! Core data types for the target-geolocation system

use serde::{Deserialize, Serialize};

use crate::validation::{check_finite, check_latitude, check_longitude, ValidationError};

/// Vehicle pose record as written by the capture collaborator.
///
/// Angles are radians, distances meters, uncertainties millimeters. This is
/// the on-disk shape; [`Pose`] is the validated in-memory form with
/// uncertainties converted to meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub rel_alt: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub heading: f64,
    pub position_uncertainty: f64,
    pub alt_uncertainty: f64,
    pub speed_uncertainty: f64,
    pub heading_uncertainty: f64,
}

/// Validated vehicle pose at capture time. Immutable once constructed.
///
/// Uncertainties are in meters here.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub rel_alt: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub heading: f64,
    pub position_uncertainty: f64,
    pub alt_uncertainty: f64,
    pub speed_uncertainty: f64,
    pub heading_uncertainty: f64,
}

const MM_PER_M: f64 = 1000.0;

impl TryFrom<PoseRecord> for Pose {
    type Error = ValidationError;

    fn try_from(record: PoseRecord) -> Result<Self, Self::Error> {
        check_latitude("lat", record.lat)?;
        check_longitude("lon", record.lon)?;
        check_finite("alt", record.alt)?;
        check_finite("rel_alt", record.rel_alt)?;
        check_finite("roll", record.roll)?;
        check_finite("pitch", record.pitch)?;
        check_finite("yaw", record.yaw)?;
        check_finite("heading", record.heading)?;
        check_finite("position_uncertainty", record.position_uncertainty)?;
        check_finite("alt_uncertainty", record.alt_uncertainty)?;
        check_finite("speed_uncertainty", record.speed_uncertainty)?;
        check_finite("heading_uncertainty", record.heading_uncertainty)?;

        Ok(Pose {
            lat: record.lat,
            lon: record.lon,
            alt: record.alt,
            rel_alt: record.rel_alt,
            roll: record.roll,
            pitch: record.pitch,
            yaw: record.yaw,
            heading: record.heading,
            position_uncertainty: record.position_uncertainty / MM_PER_M,
            alt_uncertainty: record.alt_uncertainty / MM_PER_M,
            speed_uncertainty: record.speed_uncertainty / MM_PER_M,
            heading_uncertainty: record.heading_uncertainty / MM_PER_M,
        })
    }
}

/// One accumulated, unrefined geolocation estimate for an object class.
///
/// Appended to the per-class fix history by the geolocation worker; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    pub confidence: f64,
}

/// Refined per-class estimate produced by the adjustment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedEstimate {
    pub lat: f64,
    pub lon: f64,
}

/// Full geolocation input for one detection, persisted per class so the
/// adjustment engine can rebuild its observations later.
///
/// Drone position in geographic degrees, angles in radians, pixel centroid
/// in the detector's image frame, position uncertainty in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetObservation {
    pub lat: f64,
    pub lon: f64,
    pub rel_alt: f64,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub position_uncertainty: f64,
}

impl TargetObservation {
    /// Build the persisted observation record from a pose and a pixel centroid.
    pub fn from_pose(pose: &Pose, x_px: f64, y_px: f64) -> Self {
        Self {
            lat: pose.lat,
            lon: pose.lon,
            rel_alt: pose.rel_alt,
            x: x_px,
            y: y_px,
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
            position_uncertainty: pose.position_uncertainty,
        }
    }
}
