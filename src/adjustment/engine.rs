//! Weighted least-squares adjustment with data snooping

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::stats;
use super::{AdjustmentConfig, AdjustmentError, Observation, PlanarEstimate, UNKNOWN_COUNT};

/// Refine a set of independently resected observations of one object into a
/// single planar estimate.
///
/// With more than three observations an IQR fence on each target axis drops
/// gross outliers up front. The surviving set is adjusted by iterative
/// weighted least squares on the linearized range model; after convergence
/// the residuals are standardized and tested against the two-tailed
/// Student-t critical value. Flagged observations have their standard
/// deviation inflated and the whole pass restarts, bounded by
/// `config.max_passes`. The observation set is treated as unordered.
pub fn adjust(
    observations: &[Observation],
    config: &AdjustmentConfig,
) -> Result<PlanarEstimate, AdjustmentError> {
    let observations = if observations.len() > 3 {
        iqr_prefilter(observations, config.iqr_multiplier)
    } else {
        observations.to_vec()
    };

    let n = observations.len();
    if n <= UNKNOWN_COUNT {
        return Err(AdjustmentError::InsufficientObservations {
            available: n,
            required: UNKNOWN_COUNT + 1,
        });
    }
    let dof = n - UNKNOWN_COUNT;
    let critical = stats::student_t_critical(dof, config.significance_level)?;

    // Observed ranges are fixed for the whole run; only the weights change
    // between snooping passes.
    let observed: Vec<f64> = observations.iter().map(Observation::observed_range).collect();
    let mut std_devs: Vec<f64> = observations.iter().map(|o| o.std_dev_m).collect();

    for pass in 0..config.max_passes {
        let outcome = run_pass(&observations, &observed, &std_devs, dof, config)?;

        let flagged: Vec<usize> = outcome
            .standardized
            .iter()
            .enumerate()
            .filter(|(_, s)| s.abs() > critical)
            .map(|(i, _)| i)
            .collect();

        if flagged.is_empty() {
            debug!(
                pass,
                easting = outcome.estimate.easting,
                northing = outcome.estimate.northing,
                "adjustment converged"
            );
            return Ok(outcome.estimate);
        }

        debug!(
            pass,
            flagged = flagged.len(),
            critical,
            "standardized residuals exceed critical value; inflating"
        );
        for i in flagged {
            std_devs[i] *= config.inflation_factor;
        }
    }

    Err(AdjustmentError::SnoopingDidNotConverge {
        passes: config.max_passes,
    })
}

/// Drop observations whose target easting or northing falls outside the IQR
/// fence of its axis.
fn iqr_prefilter(observations: &[Observation], multiplier: f64) -> Vec<Observation> {
    let eastings: Vec<f64> = observations.iter().map(|o| o.easting_target).collect();
    let northings: Vec<f64> = observations.iter().map(|o| o.northing_target).collect();
    let (e_lower, e_upper) = stats::iqr_bounds(&eastings, multiplier);
    let (n_lower, n_upper) = stats::iqr_bounds(&northings, multiplier);

    observations
        .iter()
        .copied()
        .filter(|o| {
            o.easting_target > e_lower
                && o.easting_target < e_upper
                && o.northing_target > n_lower
                && o.northing_target < n_upper
        })
        .collect()
}

struct PassOutcome {
    estimate: PlanarEstimate,
    standardized: DVector<f64>,
}

/// One full least-squares pass: solve, then standardize the residuals for
/// the snooping test.
fn run_pass(
    observations: &[Observation],
    observed: &[f64],
    std_devs: &[f64],
    dof: usize,
    config: &AdjustmentConfig,
) -> Result<PassOutcome, AdjustmentError> {
    let n = observations.len();

    let mut cl = DMatrix::<f64>::from_diagonal(&DVector::from_iterator(
        n,
        std_devs.iter().map(|s| s * s),
    ));
    let weight = cl
        .clone()
        .try_inverse()
        .ok_or(AdjustmentError::SingularNormalMatrix { iteration: 0 })?;

    // Initial estimate: mean of the resected target coordinates
    let mut easting = observations.iter().map(|o| o.easting_target).sum::<f64>() / n as f64;
    let mut northing = observations.iter().map(|o| o.northing_target).sum::<f64>() / n as f64;

    let mut design = DMatrix::<f64>::zeros(n, UNKNOWN_COUNT);
    let mut misclosure = DVector::<f64>::zeros(n);
    let mut delta = DVector::<f64>::zeros(UNKNOWN_COUNT);
    let mut converged = false;

    for iteration in 0..config.max_iterations {
        for (i, obs) in observations.iter().enumerate() {
            let de = obs.easting_drone - easting;
            let dn = obs.northing_drone - northing;
            let predicted = (de * de + dn * dn).sqrt();
            design[(i, 0)] = -de / predicted;
            design[(i, 1)] = -dn / predicted;
            misclosure[i] = observed[i] - predicted;
        }

        let normal = design.transpose() * &weight * &design;
        let inverse = normal
            .try_inverse()
            .ok_or(AdjustmentError::SingularNormalMatrix { iteration })?;
        delta = inverse * (design.transpose() * &weight * &misclosure);

        easting += delta[0];
        northing += delta[1];

        if delta.amax() < config.convergence_threshold_m {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(AdjustmentError::IterationLimitExceeded {
            iterations: config.max_iterations,
        });
    }

    // Residuals and the a-posteriori variance factor
    let residuals = &design * &delta + &misclosure;
    let variance_factor =
        (residuals.transpose() * &weight * &residuals)[(0, 0)] / dof as f64;

    // Rescale the observation covariance so the standardized residuals are
    // tested against properly scaled confidence bounds
    cl *= variance_factor;
    let weight = cl
        .clone()
        .try_inverse()
        .ok_or(AdjustmentError::SingularNormalMatrix { iteration: 0 })?;
    let rescaled_factor =
        (residuals.transpose() * &weight * &residuals)[(0, 0)] / dof as f64;

    let normal = design.transpose() * &weight * &design;
    let estimate_covariance = normal
        .try_inverse()
        .ok_or(AdjustmentError::SingularNormalMatrix { iteration: 0 })?
        * rescaled_factor;
    let fitted_covariance = &design * estimate_covariance * design.transpose();
    let residual_covariance = &cl - &fitted_covariance;

    let standardized =
        DVector::from_fn(n, |i, _| residuals[i] / residual_covariance[(i, i)].sqrt());

    Ok(PassOutcome {
        estimate: PlanarEstimate { easting, northing },
        standardized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUE_EASTING: f64 = 500_010.0;
    const TRUE_NORTHING: f64 = 5_640_010.0;

    /// Five observations of the true point with sub-meter deterministic noise
    /// from distinct drone positions.
    fn clustered_observations() -> Vec<Observation> {
        let offsets = [
            (0.30, -0.20),
            (-0.40, 0.10),
            (0.20, 0.35),
            (-0.10, -0.45),
            (0.05, 0.25),
        ];
        offsets
            .iter()
            .enumerate()
            .map(|(i, (de, dn))| Observation {
                easting_drone: 500_000.0 + 7.0 * i as f64,
                northing_drone: 5_640_000.0 - 4.0 * i as f64,
                agl: 50.0,
                easting_target: TRUE_EASTING + de,
                northing_target: TRUE_NORTHING + dn,
                std_dev_m: 0.5,
            })
            .collect()
    }

    #[test]
    fn clustered_observations_converge_near_the_true_point() {
        let config = AdjustmentConfig {
            max_iterations: 15,
            ..AdjustmentConfig::default()
        };
        let estimate = adjust(&clustered_observations(), &config).unwrap();
        assert!(
            (estimate.easting - TRUE_EASTING).abs() < 0.5,
            "easting {}",
            estimate.easting
        );
        assert!(
            (estimate.northing - TRUE_NORTHING).abs() < 0.5,
            "northing {}",
            estimate.northing
        );
    }

    #[test]
    fn gross_outlier_does_not_move_the_estimate() {
        let mut observations = clustered_observations();
        observations.push(Observation {
            easting_drone: 500_020.0,
            northing_drone: 5_640_020.0,
            agl: 50.0,
            easting_target: TRUE_EASTING + 50.0,
            northing_target: TRUE_NORTHING + 50.0,
            std_dev_m: 0.5,
        });

        let estimate = adjust(&observations, &AdjustmentConfig::default()).unwrap();
        assert!((estimate.easting - TRUE_EASTING).abs() < 1.0);
        assert!((estimate.northing - TRUE_NORTHING).abs() < 1.0);
    }

    #[test]
    fn iqr_prefilter_drops_only_the_outlier() {
        let mut observations = clustered_observations();
        observations.push(Observation {
            easting_drone: 500_020.0,
            northing_drone: 5_640_020.0,
            agl: 50.0,
            easting_target: TRUE_EASTING + 50.0,
            northing_target: TRUE_NORTHING + 50.0,
            std_dev_m: 0.5,
        });

        let kept = iqr_prefilter(&observations, 1.5);
        assert_eq!(kept.len(), 5);
        assert!(kept.iter().all(|o| (o.easting_target - TRUE_EASTING).abs() < 1.0));
    }

    /// One observation from a ring of vantage points, with the target
    /// displaced `radial` meters along the view direction and `tangential`
    /// meters across it.
    fn ring_observation(theta: f64, radial: f64, tangential: f64) -> Observation {
        let (sin, cos) = theta.sin_cos();
        Observation {
            easting_drone: TRUE_EASTING + 100.0 * cos,
            northing_drone: TRUE_NORTHING + 100.0 * sin,
            agl: 50.0,
            easting_target: TRUE_EASTING + radial * cos - tangential * sin,
            northing_target: TRUE_NORTHING + radial * sin + tangential * cos,
            std_dev_m: 0.5,
        }
    }

    /// Eleven consistent observations plus one whose target sits two meters
    /// along its own line of sight. The tangential scatter keeps every
    /// target inside the IQR fences on both axes, so only the snooping test
    /// can catch the bad range.
    fn range_outlier_observations() -> Vec<Observation> {
        let radials = [
            0.4, -0.4, 0.3, -0.3, 0.35, -0.35, 0.25, -0.25, 0.45, -0.45, 0.2,
        ];
        let mut observations: Vec<Observation> = radials
            .iter()
            .enumerate()
            .map(|(i, &radial)| {
                let theta = i as f64 * std::f64::consts::FRAC_PI_6;
                let tangential = if i % 2 == 0 { 1.0 } else { -1.0 };
                ring_observation(theta, radial, tangential)
            })
            .collect();
        observations.push(ring_observation(std::f64::consts::FRAC_PI_4, 2.0, 0.0));
        observations
    }

    #[test]
    fn range_outlier_survives_the_prefilter() {
        let observations = range_outlier_observations();
        assert_eq!(iqr_prefilter(&observations, 1.5).len(), observations.len());
    }

    #[test]
    fn data_snooping_inflates_a_moderate_range_outlier() {
        let estimate =
            adjust(&range_outlier_observations(), &AdjustmentConfig::default()).unwrap();
        assert!(
            (estimate.easting - TRUE_EASTING).abs() < 1.0,
            "easting {}",
            estimate.easting
        );
        assert!(
            (estimate.northing - TRUE_NORTHING).abs() < 1.0,
            "northing {}",
            estimate.northing
        );
    }

    #[test]
    fn flagged_residual_consumes_a_snooping_pass() {
        // Pass zero flags the bad range and inflates it; with the budget
        // capped at one pass the re-weighted solve never runs.
        let config = AdjustmentConfig {
            max_passes: 1,
            ..AdjustmentConfig::default()
        };
        assert_eq!(
            adjust(&range_outlier_observations(), &config),
            Err(AdjustmentError::SnoopingDidNotConverge { passes: 1 })
        );
    }

    #[test]
    fn empty_observation_set_is_insufficient() {
        let err = adjust(&[], &AdjustmentConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AdjustmentError::InsufficientObservations {
                available: 0,
                required: 3
            }
        );
    }

    #[test]
    fn one_or_two_observations_are_insufficient() {
        let observations = clustered_observations();
        assert!(matches!(
            adjust(&observations[..1], &AdjustmentConfig::default()),
            Err(AdjustmentError::InsufficientObservations { available: 1, .. })
        ));
        assert!(matches!(
            adjust(&observations[..2], &AdjustmentConfig::default()),
            Err(AdjustmentError::InsufficientObservations { available: 2, .. })
        ));
    }

    #[test]
    fn exhausted_pass_budget_is_a_terminal_error() {
        let config = AdjustmentConfig {
            max_passes: 0,
            ..AdjustmentConfig::default()
        };
        assert_eq!(
            adjust(&clustered_observations(), &config),
            Err(AdjustmentError::SnoopingDidNotConverge { passes: 0 })
        );
    }

    #[test]
    fn duplicate_drone_positions_make_the_system_singular() {
        // All rays from the same spot toward the same target give a design
        // matrix of rank one.
        let observations: Vec<Observation> = (0..3)
            .map(|_| Observation {
                easting_drone: 500_000.0,
                northing_drone: 5_640_000.0,
                agl: 50.0,
                easting_target: TRUE_EASTING,
                northing_target: TRUE_NORTHING,
                std_dev_m: 0.5,
            })
            .collect();
        assert!(matches!(
            adjust(&observations, &AdjustmentConfig::default()),
            Err(AdjustmentError::SingularNormalMatrix { .. })
        ));
    }
}
