//! Record validation for externally supplied data
//!
//! Pose and detection records arrive from collaborators the core does not
//! control. Every record is checked field by field before use so that a
//! malformed record fails with the offending field named instead of an
//! undifferentiated lookup failure downstream.

use thiserror::Error;

/// Validation failure for an externally supplied record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field '{field}' is not a finite number")]
    NonFiniteField { field: &'static str },

    #[error("field '{field}' out of range: {value} (expected {min} to {max})")]
    FieldOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("detection confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { value: f64 },
}

pub(crate) fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFiniteField { field })
    }
}

pub(crate) fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(ValidationError::FieldOutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_latitude(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_range(field, value, -90.0, 90.0)
}

pub(crate) fn check_longitude(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_range(field, value, -180.0, 180.0)
}
