//! Parametric adjustment of redundant target observations
//!
//! Iterative weighted least squares over the 2D range model, with IQR
//! pre-filtering and Student-t data snooping for outlier control. The engine
//! is pure computation: stateless between invocations and safe to call from
//! any thread, including concurrently for different object classes.

pub mod engine;
pub mod stats;

use thiserror::Error;

pub use engine::adjust;

/// Number of unknown parameters solved for (target easting and northing).
pub const UNKNOWN_COUNT: usize = 2;

/// One independently resected observation of the same real-world object.
///
/// Ephemeral: built for a single adjustment run and discarded afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub easting_drone: f64,
    pub northing_drone: f64,
    pub agl: f64,
    pub easting_target: f64,
    pub northing_target: f64,
    /// A-priori standard deviation of the observation, meters
    pub std_dev_m: f64,
}

impl Observation {
    /// Observed horizontal range from the drone to the resected target point.
    pub fn observed_range(&self) -> f64 {
        let de = self.easting_drone - self.easting_target;
        let dn = self.northing_drone - self.northing_target;
        (de * de + dn * dn).sqrt()
    }
}

/// Refined planar estimate of the target position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarEstimate {
    pub easting: f64,
    pub northing: f64,
}

/// Tuning parameters for one adjustment run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdjustmentConfig {
    /// Parameter update magnitude below which the least-squares iteration
    /// has converged, meters
    pub convergence_threshold_m: f64,
    /// Two-tailed significance level for data snooping
    pub significance_level: f64,
    /// IQR multiplier for the pre-filter bounds
    pub iqr_multiplier: f64,
    /// Standard-deviation inflation applied to each flagged observation
    pub inflation_factor: f64,
    /// Cap on snooping passes before the adjustment is abandoned
    pub max_passes: usize,
    /// Cap on least-squares iterations within one pass
    pub max_iterations: usize,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            convergence_threshold_m: 1e-4,
            significance_level: 0.10,
            iqr_multiplier: 1.5,
            inflation_factor: 1.5,
            max_passes: 20,
            max_iterations: 50,
        }
    }
}

/// Failure of one adjustment run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdjustmentError {
    #[error("insufficient observations: {available} available, {required} required")]
    InsufficientObservations { available: usize, required: usize },

    #[error("normal matrix singular at iteration {iteration}")]
    SingularNormalMatrix { iteration: usize },

    #[error("least-squares iteration failed to converge within {iterations} iterations")]
    IterationLimitExceeded { iterations: usize },

    #[error("data snooping still flagging residuals after {passes} passes")]
    SnoopingDidNotConverge { passes: usize },

    #[error("Student-t critical value unavailable for {dof} degrees of freedom")]
    CriticalValueUnavailable { dof: usize },
}
