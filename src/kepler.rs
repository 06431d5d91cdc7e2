//! # Two-body propagation
//!
//! Solvers for every flavour of Kepler's equation used by the crate:
//!
//! - [`solve_kepler_equation`] – elliptic `M = E − e sin E`,
//! - [`solve_hyperbolic_kepler_equation`] – hyperbolic `M = e sinh H − H`,
//! - [`solve_barker_equation`] – parabolic `W = D + D³/3`, closed form,
//! - [`solve_kepuni`] – the **universal** formulation, valid across all conic types,
//!   driving the state-vector propagator [`propagate_two_body`].
//!
//! Every iterative loop carries a hard iteration cap so that degenerate input can
//! never stall a request; non-convergence is reported, never looped on.
use nalgebra::Vector3;
use std::f64::consts::PI;

use crate::comet_errors::CometError;
use crate::constants::{DPI, GAUSS_GRAV_SQUARED};
use crate::orb_elem::eccentricity_control;

/// Maximum Newton iterations for the scalar Kepler solvers.
pub const KEPLER_MAX_ITER: usize = 100;

/// Convergence threshold on the anomaly update (radians).
pub const KEPLER_TOLERANCE: f64 = 1e-14;

/// Stumpff-like functions `(s0, s1, s2, s3)` of the universal anomaly `psi`.
///
/// `alpha = v² − 2μ/r` is twice the orbital energy; it is negative for bound orbits.
/// For small `|alpha psi²|` the series are summed directly; otherwise `psi` is halved
/// until the series converge and the duplication formulas rebuild the full value.
fn s_funct(psi: f64, alpha: f64) -> (f64, f64, f64, f64) {
    const JMAX: usize = 70;
    const HALFMAX: usize = 30;
    const BETACONTR: f64 = 100.0;

    let contr = 100.0 * f64::EPSILON;
    let overfl = 1.0 / f64::EPSILON;

    // Sum a power series whose successive terms are built by `ratio(j)`.
    let series = |first: f64, beta: f64, ratio: &dyn Fn(f64) -> f64| {
        let mut term = first;
        let mut sum = first;
        for j in 1..=JMAX {
            term *= beta / ratio(j as f64);
            sum += term;
            if term.abs() < contr || term.abs() > overfl {
                break;
            }
        }
        sum
    };

    let beta = alpha * psi.powi(2);

    if beta.abs() < BETACONTR {
        let s2 = series(psi.powi(2) / 2.0, beta, &|j| (2.0 * j + 1.0) * (2.0 * j + 2.0));
        let s3 = series(psi.powi(3) / 6.0, beta, &|j| (2.0 * j + 2.0) * (2.0 * j + 3.0));
        (1.0 + alpha * s2, psi + alpha * s3, s2, s3)
    } else {
        let mut psi_half = psi;
        let mut nhalf = 0;
        for _ in 0..HALFMAX {
            psi_half *= 0.5;
            nhalf += 1;
            if (alpha * psi_half.powi(2)).abs() < BETACONTR {
                break;
            }
        }
        let beta_half = alpha * psi_half.powi(2);

        let mut s0 = series(1.0, beta_half, &|j| (2.0 * j - 1.0) * (2.0 * j));
        let mut s1 = series(psi_half, beta_half, &|j| (2.0 * j) * (2.0 * j + 1.0));

        // duplication: s0(2x) = 2 s0² − 1, s1(2x) = 2 s0 s1
        for _ in 0..nhalf {
            let s02 = 2.0 * s0.powi(2) - 1.0;
            let s12 = 2.0 * s0 * s1;
            s0 = s02;
            s1 = s12;
        }

        (s0, s1, (s0 - 1.0) / alpha, (s1 - psi) / alpha)
    }
}

/// Principal value of an angle in radians, in `[0, 2π)`.
pub(crate) fn principal_angle(a: f64) -> f64 {
    a.rem_euclid(DPI)
}

/// Solve the elliptic Kepler equation `M = E − e sin E` for the eccentric anomaly.
///
/// The mean anomaly is **not** required to be reduced: whole revolutions are carried
/// through so that `E − M` stays bounded by `e`.
///
/// Arguments
/// -----------------
/// * `mean_anomaly`: mean anomaly `M` in radians (any value).
/// * `eccentricity`: `0 ≤ e < 1`.
/// * `tolerance`: convergence threshold on the Newton step.
/// * `max_iter`: hard cap on the Newton iterations.
///
/// Return
/// ----------
/// * The eccentric anomaly `E` (radians, same revolution as `M`).
pub fn solve_kepler_equation(
    mean_anomaly: f64,
    eccentricity: f64,
    tolerance: f64,
    max_iter: usize,
) -> f64 {
    let revolutions = ((mean_anomaly + PI) / DPI).floor();
    let m = mean_anomaly - revolutions * DPI;

    let mut ea = if eccentricity < 0.8 {
        m
    } else {
        PI.copysign(m)
    };

    for _ in 0..max_iter {
        let delta = (ea - eccentricity * ea.sin() - m) / (1.0 - eccentricity * ea.cos());
        ea -= delta;
        if delta.abs() < tolerance {
            break;
        }
    }

    ea + revolutions * DPI
}

/// Solve the hyperbolic Kepler equation `M = e sinh H − H` for the hyperbolic anomaly.
///
/// Starts from the `sign(M) ln(2|M|/e + 1.8)` guess, which lies on the convex side of
/// the root and keeps Newton from overshooting when `e` is close to 1.
pub fn solve_hyperbolic_kepler_equation(
    mean_anomaly: f64,
    eccentricity: f64,
    tolerance: f64,
    max_iter: usize,
) -> f64 {
    if mean_anomaly == 0.0 {
        return 0.0;
    }
    let mut h = (2.0 * mean_anomaly.abs() / eccentricity + 1.8)
        .ln()
        .copysign(mean_anomaly);

    for _ in 0..max_iter {
        let delta =
            (eccentricity * h.sinh() - h - mean_anomaly) / (eccentricity * h.cosh() - 1.0);
        h -= delta;
        if delta.abs() < tolerance * h.abs().max(1.0) {
            break;
        }
    }
    h
}

/// Closed-form solution of Barker's equation `W = D + D³/3`, with `D = tan(ν/2)`.
pub fn solve_barker_equation(w: f64) -> f64 {
    let y = (1.5 * w + (2.25 * w * w + 1.0).sqrt()).cbrt();
    y - 1.0 / y
}

/// Starting guess for the universal anomaly.
///
/// Bound and unbound cases go through the classical anomaly (eccentric or hyperbolic)
/// so that the guess is already within the convergence basin of Newton's method,
/// including over several revolutions.
fn prelim_kepuni(dt: f64, r0: f64, sig0: f64, alpha: f64, e0: f64, contr: f64) -> f64 {
    let mu = GAUSS_GRAV_SQUARED;

    if alpha < 0.0 {
        let a0 = -mu / alpha;
        let enne = (-alpha.powi(3)).sqrt() / mu;
        if e0 < contr {
            return enne * dt / (-alpha).sqrt();
        }

        let cosu0 = ((1.0 - r0 / a0) / e0).clamp(-1.0, 1.0);
        let u0 = cosu0.acos().copysign(if sig0 < 0.0 { -1.0 } else { 1.0 });
        let ell0 = u0 - e0 * u0.sin();
        let u = solve_kepler_equation(ell0 + enne * dt, e0, contr, KEPLER_MAX_ITER);

        (u - u0) / (-alpha).sqrt()
    } else if alpha > 0.0 {
        let a0 = -mu / alpha;
        let enne = alpha.powi(3).sqrt() / mu;
        let coshf0 = (1.0 - r0 / a0) / e0;
        let f0 = if coshf0 > 1.0 { coshf0.acosh() } else { 0.0 };
        let f0 = if sig0 < 0.0 { -f0 } else { f0 };

        let ell0 = e0 * f0.sinh() - f0;
        let f = solve_hyperbolic_kepler_equation(ell0 + enne * dt, e0, contr, KEPLER_MAX_ITER);

        (f - f0) / alpha.sqrt()
    } else {
        dt / r0
    }
}

/// Solve the universal Kepler equation
/// `r0 s1(ψ) + σ0 s2(ψ) + μ s3(ψ) = Δt` for the universal anomaly `ψ`.
///
/// Arguments
/// -----------------
/// * `dt`: propagation interval (days).
/// * `r0`: initial heliocentric distance (AU).
/// * `sig0`: `r0 · v0` (AU²/day).
/// * `alpha`: `v0² − 2μ/r0`.
/// * `e0`: osculating eccentricity at the initial state.
/// * `convergency`: relative tolerance on the Newton step.
///
/// Return
/// ----------
/// * `Some((psi, s0, s1, s2, s3))` on convergence, `None` if the iteration diverged or
///   exhausted its budget.
pub(crate) fn solve_kepuni(
    dt: f64,
    r0: f64,
    sig0: f64,
    alpha: f64,
    e0: f64,
    convergency: f64,
) -> Option<(f64, f64, f64, f64, f64)> {
    const JMAX: usize = 100;
    let mu = GAUSS_GRAV_SQUARED;

    let mut psi = prelim_kepuni(dt, r0, sig0, alpha, e0, convergency);

    for _ in 0..JMAX {
        let (s0, s1, s2, s3) = s_funct(psi, alpha);

        let fun = r0 * s1 + sig0 * s2 + mu * s3 - dt;
        let funp = r0 * s0 + sig0 * s1 + mu * s2;
        let dpsi = -fun / funp;

        if !dpsi.is_finite() || s3.abs() > 1e-2 / f64::EPSILON {
            return None;
        }

        let psi1 = psi + dpsi;
        psi = if psi1 * psi < 0.0 { psi / 2.0 } else { psi1 };

        if dpsi.abs() < convergency || dpsi.abs() < convergency * 10.0 * psi.abs() {
            return Some((psi, s0, s1, s2, s3));
        }
    }

    None
}

/// Heliocentric state propagated by [`propagate_two_body`], with the Lagrange
/// coefficients relating it to the initial state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagatedState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// `r(t) = f r0 + g v0`
    pub f: f64,
    pub g: f64,
}

/// Propagate a heliocentric state vector over `dt` days on a two-body conic.
///
/// Return
/// ----------
/// * `Err(CometError::ComputationError)` when the state has no angular momentum or the
///   universal Kepler equation fails to converge.
pub fn propagate_two_body(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    dt: f64,
    convergency: f64,
) -> Result<PropagatedState, CometError> {
    let mu = GAUSS_GRAV_SQUARED;

    let r0 = position.norm();
    let sig0 = position.dot(velocity);
    let alpha = velocity.norm_squared() - 2.0 * mu / r0;

    let (_, e0, _, _) = eccentricity_control(position, velocity, f64::INFINITY, f64::INFINITY)
        .ok_or_else(|| {
            CometError::ComputationError("state vector has zero angular momentum".into())
        })?;

    let (_, s0, s1, s2, s3) = solve_kepuni(dt, r0, sig0, alpha, e0, convergency)
        .ok_or_else(|| {
            CometError::ComputationError(format!(
                "universal Kepler equation did not converge over {dt} days"
            ))
        })?;

    let f = 1.0 - mu * s2 / r0;
    let g = dt - mu * s3;
    let r = r0 * s0 + sig0 * s1 + mu * s2;
    let fdot = -mu * s1 / (r * r0);
    let gdot = 1.0 - mu * s2 / r;

    Ok(PropagatedState {
        position: position * f + velocity * g,
        velocity: position * fdot + velocity * gdot,
        f,
        g,
    })
}

/// Velocity at the central epoch implied by a second position through the f–g series.
///
/// Propagates `(central_position, central_velocity)` over `dt` to obtain `f` and `g`, then
/// solves `other_position = f r + g v` for `v`.
///
/// Return
/// ----------
/// * `Ok((velocity, f, g))`, or an error if the state is dynamically unacceptable
///   (eccentricity or perihelion above the caps) or the propagation fails.
pub(crate) fn velocity_correction(
    other_position: &Vector3<f64>,
    central_position: &Vector3<f64>,
    central_velocity: &Vector3<f64>,
    dt: f64,
    peri_max: f64,
    ecc_max: f64,
    convergency: f64,
) -> Result<(Vector3<f64>, f64, f64), CometError> {
    let accepted =
        eccentricity_control(central_position, central_velocity, peri_max, ecc_max)
            .is_some_and(|(ok, _, _, _)| ok);
    if !accepted {
        return Err(CometError::SpuriousRootDetected);
    }

    let state = propagate_two_body(central_position, central_velocity, dt, convergency)?;
    if !state.g.is_finite() || state.g.abs() < f64::EPSILON {
        return Err(CometError::ComputationError(
            "degenerate Lagrange coefficient g".into(),
        ));
    }

    let velocity = (other_position - central_position * state.f) / state.g;
    Ok((velocity, state.f, state.g))
}
