//! WGS84 geographic to UTM planar projection
//!
//! Zone-based Universal Transverse Mercator, implemented with the standard
//! truncated Transverse Mercator series (Snyder). Forward and inverse agree
//! to well under 1e-6 degrees inside a zone, which is the round-trip
//! contract callers rely on.

use thiserror::Error;

use crate::validation::{check_latitude, check_longitude};

/// Semi-major axis in meters (WGS84)
pub const EARTH_RADIUS_WGS84: f64 = 6378137.0;

/// Earth flattening factor (WGS84)
pub const EARTH_FLATTENING_WGS84: f64 = 1.0 / 298.257223563;

/// First eccentricity squared (WGS84)
pub const ECCENTRICITY_SQUARED_WGS84: f64 =
    2.0 * EARTH_FLATTENING_WGS84 - EARTH_FLATTENING_WGS84 * EARTH_FLATTENING_WGS84;

/// UTM central scale factor
const SCALE_FACTOR: f64 = 0.9996;

/// False easting applied to every zone (meters)
const FALSE_EASTING: f64 = 500_000.0;

/// False northing applied in the southern hemisphere (meters)
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Planar position in a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    /// True for the northern hemisphere
    pub north: bool,
}

/// Failure converting between geographic and planar coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("invalid UTM zone {zone}: must be between 1 and 60")]
    InvalidZone { zone: u8 },

    #[error("non-finite {what} input to projection")]
    NonFiniteInput { what: &'static str },

    #[error("geographic input out of range: {0}")]
    OutOfRange(#[from] crate::validation::ValidationError),
}

/// UTM zone for a longitude; zones are 6 degrees wide.
pub fn zone_for_longitude(lon: f64) -> u8 {
    (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8
}

/// Central meridian of a zone, in radians.
fn central_meridian(zone: u8) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Meridional arc length from the equator to latitude `lat_rad`.
fn meridional_arc(lat_rad: f64) -> f64 {
    let e2 = ECCENTRICITY_SQUARED_WGS84;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    EARTH_RADIUS_WGS84
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat_rad
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat_rad).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat_rad).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat_rad).sin())
}

/// Convert geographic coordinates to UTM easting/northing.
///
/// The zone is selected from the longitude and the hemisphere from the sign
/// of the latitude.
pub fn to_planar(lat: f64, lon: f64) -> Result<PlanarCoordinate, ProjectionError> {
    check_latitude("lat", lat)?;
    check_longitude("lon", lon)?;

    let zone = zone_for_longitude(lon);
    let north = lat >= 0.0;

    let e2 = ECCENTRICITY_SQUARED_WGS84;
    let ep2 = e2 / (1.0 - e2);

    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let n = EARTH_RADIUS_WGS84 / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();
    let t = lat_rad.tan().powi(2);
    let c = ep2 * lat_rad.cos().powi(2);
    let a = lat_rad.cos() * (lon_rad - central_meridian(zone));

    let easting = FALSE_EASTING
        + SCALE_FACTOR
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);

    let m = meridional_arc(lat_rad);
    let mut northing = SCALE_FACTOR
        * (m + n
            * lat_rad.tan()
            * (a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !north {
        northing += FALSE_NORTHING_SOUTH;
    }

    Ok(PlanarCoordinate {
        easting,
        northing,
        zone,
        north,
    })
}

/// Convert UTM easting/northing back to geographic coordinates.
pub fn to_geographic(
    easting: f64,
    northing: f64,
    zone: u8,
    north: bool,
) -> Result<(f64, f64), ProjectionError> {
    if !(1..=60).contains(&zone) {
        return Err(ProjectionError::InvalidZone { zone });
    }
    if !easting.is_finite() {
        return Err(ProjectionError::NonFiniteInput { what: "easting" });
    }
    if !northing.is_finite() {
        return Err(ProjectionError::NonFiniteInput { what: "northing" });
    }

    let e2 = ECCENTRICITY_SQUARED_WGS84;
    let ep2 = e2 / (1.0 - e2);

    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    // Footpoint latitude from the inverse meridional arc series
    let m = y / SCALE_FACTOR;
    let mu = m / (EARTH_RADIUS_WGS84 * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let fp = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let c1 = ep2 * fp.cos().powi(2);
    let t1 = fp.tan().powi(2);
    let n1 = EARTH_RADIUS_WGS84 / (1.0 - e2 * fp.sin().powi(2)).sqrt();
    let r1 = EARTH_RADIUS_WGS84 * (1.0 - e2) / (1.0 - e2 * fp.sin().powi(2)).powf(1.5);
    let d = x / (n1 * SCALE_FACTOR);

    let lat_rad = fp
        - (n1 * fp.tan() / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon_rad = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / fp.cos();

    Ok((lat_rad.to_degrees(), lon_rad.to_degrees()))
}
