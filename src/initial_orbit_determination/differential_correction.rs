//! Least-squares refinement of a heliocentric state against every sighting.
//!
//! The unknown is the 6-component equatorial state `x = (r, v)` at a fixed epoch. The
//! residual vector stacks `(Δα cos δ, Δδ)` for each sighting, computed by two-body
//! propagation of `x`. Each Gauss–Newton step:
//!
//! 1. builds the Jacobian by forward finite differences,
//! 2. solves `J δx = −ρ` in the least-squares sense through an SVD,
//! 3. tries `x + λ δx` with `λ = 1, ½, ¼, …` and keeps the first trial that lowers the RMS.
//!
//! The loop ends when the relative RMS improvement falls below `dc_tolerance`, when the
//! RMS is at round-off level, when no step length lowers the RMS, or after `dc_max_iter`
//! iterations. The procedure is fully deterministic.
use nalgebra::{DMatrix, DVector, Vector3, Vector6};
use tracing::debug;

use crate::comet_errors::CometError;
use crate::constants::MJD;
use crate::initial_orbit_determination::gauss_result::EquatorialState;
use crate::kepler::propagate_two_body;
use crate::observations::Sighting;

/// Number of step halvings tried before an iteration is declared stalled.
const MAX_STEP_HALVINGS: usize = 8;

/// RMS (radians) under which the fit is exact to round-off.
const RMS_FLOOR: f64 = 1e-14;

/// Result of [`differential_correction`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedState {
    pub state: EquatorialState,
    /// angular RMS of the residuals, radians
    pub rms: f64,
    pub iterations: usize,
}

/// Stacked `(Δα cos δ, Δδ)` residuals, radians, of a state against all sightings.
pub(crate) fn residuals(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    epoch: MJD,
    sightings: &[Sighting],
    convergency: f64,
) -> Result<DVector<f64>, CometError> {
    let mut out = DVector::zeros(2 * sightings.len());
    for (i, sighting) in sightings.iter().enumerate() {
        let propagated = propagate_two_body(position, velocity, sighting.time - epoch, convergency)?;
        let (dra, ddec) = sighting.residual(&propagated.position);
        out[2 * i] = dra;
        out[2 * i + 1] = ddec;
    }
    Ok(out)
}

fn rms_of(residuals: &DVector<f64>) -> f64 {
    if residuals.is_empty() {
        0.0
    } else {
        (residuals.norm_squared() / residuals.len() as f64).sqrt()
    }
}

/// Angular RMS, radians, of a state against all sightings.
pub fn residual_rms(
    state: &EquatorialState,
    sightings: &[Sighting],
    convergency: f64,
) -> Result<f64, CometError> {
    residuals(&state.position, &state.velocity, state.epoch, sightings, convergency)
        .map(|r| rms_of(&r))
}

fn split(x: &Vector6<f64>) -> (Vector3<f64>, Vector3<f64>) {
    (x.fixed_rows::<3>(0).into_owned(), x.fixed_rows::<3>(3).into_owned())
}

fn jacobian(
    x: &Vector6<f64>,
    base: &DVector<f64>,
    epoch: MJD,
    sightings: &[Sighting],
    convergency: f64,
) -> Result<DMatrix<f64>, CometError> {
    let mut jac = DMatrix::zeros(base.len(), 6);
    for k in 0..6 {
        let floor = if k < 3 { 1e-3 } else { 1e-5 };
        let h = 1e-7 * x[k].abs().max(floor);

        let mut shifted = *x;
        shifted[k] += h;
        let (pos, vel) = split(&shifted);
        let perturbed = residuals(&pos, &vel, epoch, sightings, convergency)?;

        jac.set_column(k, &((perturbed - base) / h));
    }
    Ok(jac)
}

/// Refine `initial` so that it best reproduces every sighting.
///
/// Arguments
/// -----------------
/// * `initial`: starting state, typically the best Gauss solution.
/// * `sightings`: all sightings of the comet, time-sorted.
/// * `max_iter`: cap on Gauss–Newton iterations.
/// * `tolerance`: relative RMS improvement below which the loop stops.
/// * `convergency`: tolerance of the universal Kepler solver.
///
/// Return
/// ----------
/// * The refined state with its RMS. The RMS never exceeds the starting one.
/// * `Err(CometError::ComputationError)` when the starting state cannot be propagated.
pub fn differential_correction(
    initial: &EquatorialState,
    sightings: &[Sighting],
    max_iter: usize,
    tolerance: f64,
    convergency: f64,
) -> Result<CorrectedState, CometError> {
    let epoch = initial.epoch;
    let mut x = Vector6::new(
        initial.position.x,
        initial.position.y,
        initial.position.z,
        initial.velocity.x,
        initial.velocity.y,
        initial.velocity.z,
    );
    let mut current = residuals(&initial.position, &initial.velocity, epoch, sightings, convergency)?;
    let mut rms = rms_of(&current);
    let mut iterations = 0;

    while iterations < max_iter && rms > RMS_FLOOR {
        iterations += 1;

        let jac = jacobian(&x, &current, epoch, sightings, convergency)?;
        let Ok(step) = jac.svd(true, true).solve(&(-&current), 1e-14) else {
            break;
        };

        let mut accepted = None;
        let mut lambda = 1.0;
        for _ in 0..=MAX_STEP_HALVINGS {
            let trial = x + Vector6::from_iterator(step.iter().map(|s| s * lambda));
            let (pos, vel) = split(&trial);
            if let Ok(trial_residuals) = residuals(&pos, &vel, epoch, sightings, convergency) {
                let trial_rms = rms_of(&trial_residuals);
                if trial_rms.is_finite() && trial_rms < rms {
                    accepted = Some((trial, trial_residuals, trial_rms));
                    break;
                }
            }
            lambda *= 0.5;
        }

        let Some((trial, trial_residuals, trial_rms)) = accepted else {
            debug!(iterations, rms, "differential correction stalled");
            break;
        };

        let improvement = (rms - trial_rms) / rms;
        debug!(iterations, rms = trial_rms, lambda, "differential correction step");

        x = trial;
        current = trial_residuals;
        rms = trial_rms;

        if improvement < tolerance {
            break;
        }
    }

    let (position, velocity) = split(&x);
    Ok(CorrectedState {
        state: EquatorialState {
            position,
            velocity,
            epoch,
        },
        rms,
        iterations,
    })
}
