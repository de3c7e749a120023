//! External object-detector capability
//!
//! The detector is an opaque collaborator: given a batch of capture
//! identifiers it returns, per capture, a list of detections. The concrete
//! network client is injected by the caller; the core never assumes a
//! protocol, a model, or a timeout (a collaborator-level timeout surfaces
//! here as an ordinary call failure).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{check_finite, ValidationError};

/// One detection as returned by the external detector.
///
/// Pixel coordinates are relative to the detector's fixed image frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
}

impl Detection {
    /// Fail fast on a malformed detection record, naming the bad field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_finite("x", self.x)?;
        check_finite("y", self.y)?;
        check_finite("confidence", self.confidence)?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.confidence,
            });
        }
        Ok(())
    }
}

/// Failure of one batched detector invocation. Always recoverable: the
/// caller discards the batch and keeps going.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("detector call failed: {reason}")]
    CallFailed { reason: String },

    #[error("detector returned {got} result lists for a batch of {expected}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Capability interface for the external detection service.
///
/// One invocation per batch; whether the concrete client makes one network
/// call per image inside the batch is its own business.
pub trait ObjectDetector: Send + Sync {
    /// Run detection over a batch of captures, returning one detection list
    /// per capture in batch order.
    fn detect_batch(&self, captures: &[String]) -> Result<Vec<Vec<Detection>>, DetectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_detection_passes() {
        let det = Detection {
            class: "car".into(),
            confidence: 0.9,
            x: 320.0,
            y: 240.0,
        };
        assert!(det.validate().is_ok());
    }

    #[test]
    fn confidence_outside_unit_interval_is_rejected() {
        let det = Detection {
            class: "car".into(),
            confidence: 1.2,
            x: 320.0,
            y: 240.0,
        };
        assert_eq!(
            det.validate(),
            Err(ValidationError::ConfidenceOutOfRange { value: 1.2 })
        );
    }

    #[test]
    fn non_finite_pixel_coordinate_is_rejected() {
        let det = Detection {
            class: "car".into(),
            confidence: 0.5,
            x: f64::NAN,
            y: 240.0,
        };
        assert!(det.validate().is_err());
    }
}
