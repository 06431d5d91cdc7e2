//! # Gauss method
//!
//! Preliminary orbit from three angle-only sightings taken from the geocenter.
//!
//! [`GaussObs`] carries one triplet: the three lines of sight (RA/Dec), their epochs and
//! the heliocentric observer positions, all in the equatorial mean J2000 frame.
//!
//! ## Algorithm outline
//!
//! 1. Build the matrix `S` of line-of-sight unit vectors and invert it. A (near-)singular
//!    `S` means the three directions are coplanar with the origin and the triplet cannot
//!    constrain the distances.
//! 2. Form the degree-8 distance polynomial
//!    `r⁸ + c₆ r⁶ + c₃ r³ + c₀ = 0` for the heliocentric distance `r₂` at the central
//!    epoch; skip it outright when Descartes' rule excludes positive roots, otherwise solve
//!    it with Aberth's method.
//! 3. For every admissible root, recover the three heliocentric positions, estimate the
//!    central velocity with the Herrick–Gibbs formula and screen the state on
//!    eccentricity and perihelion.
//! 4. Refine positions and velocity with the f/g series evaluated through universal
//!    variables, stopping when the update no longer shrinks.
//!
//! Solutions are returned as [`GaussResult`] values holding equatorial state vectors.
//!
//! ## References
//!
//! * Milani & Gronchi (2010), *Theory of Orbit Determination*
use std::ops::ControlFlow;

use aberth::{aberth, StopReason};
use nalgebra::{Matrix3, Vector3};
use smallvec::SmallVec;
use tracing::debug;

use crate::comet_errors::CometError;
use crate::constants::{Radian, GAUSS_GRAV, MJD, VLIGHT_AU};
use crate::initial_orbit_determination::gauss_result::{EquatorialState, GaussResult};
use crate::initial_orbit_determination::IODParams;
use crate::kepler::velocity_correction;
use crate::orb_elem::eccentricity_control;
use crate::ref_system::radec_to_unit_vector;

/// Observation triplet for the Gauss method.
///
/// Fields
/// -----------------
/// * `idx_obs`: indices of the three sightings in the time-sorted set.
/// * `ra`, `dec`: line-of-sight angles, radians, equatorial mean J2000.
/// * `time`: epochs, MJD (TT).
/// * `observer_helio_position`: one column per epoch, AU, equatorial mean J2000.
#[derive(Debug, PartialEq, Clone)]
pub struct GaussObs {
    pub(crate) idx_obs: Vector3<usize>,
    pub(crate) ra: Vector3<Radian>,
    pub(crate) dec: Vector3<Radian>,
    pub(crate) time: Vector3<MJD>,
    pub(crate) observer_helio_position: Matrix3<f64>,
}

/// Quantities shared by every root of one triplet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPrelim {
    /// `k (t1 − t2)`
    pub tau1: f64,
    /// `k (t3 − t2)`
    pub tau3: f64,
    pub unit_matrix: Matrix3<f64>,
    pub inv_unit_matrix: Matrix3<f64>,
    pub vector_a: Vector3<f64>,
    pub vector_b: Vector3<f64>,
}

/// Upper bound on the number of positive roots of `x⁸ + c₆x⁶ + c₃x³ + c₀`
/// (Descartes' rule of signs). Coefficients with `|c| ≤ zero_eps` are skipped.
#[inline]
fn descartes_upper_bound_deg8_sparse(c0: f64, c3: f64, c6: f64, zero_eps: f64) -> u32 {
    #[inline]
    fn sign(v: f64, eps: f64) -> i8 {
        if v.abs() <= eps {
            0
        } else if v.is_sign_positive() {
            1
        } else {
            -1
        }
    }

    [1_i8, sign(c6, zero_eps), sign(c3, zero_eps), sign(c0, zero_eps)]
        .into_iter()
        .filter(|&s| s != 0)
        .fold((0_i8, 0_u32), |(last, count), cur| {
            if last != 0 && cur != last {
                (cur, count + 1)
            } else {
                (cur, count)
            }
        })
        .1
}

impl GaussObs {
    /// Assemble a triplet from precomputed angles, epochs and observer positions.
    ///
    /// Element `i` of `ra`, `dec`, `mjd_time` and column `i` of
    /// `observer_helio_position` describe the same sighting.
    pub fn with_observer_position(
        idx_obs: Vector3<usize>,
        ra: Vector3<Radian>,
        dec: Vector3<Radian>,
        mjd_time: Vector3<MJD>,
        observer_helio_position: Matrix3<f64>,
    ) -> GaussObs {
        GaussObs {
            idx_obs,
            ra,
            dec,
            time: mjd_time,
            observer_helio_position,
        }
    }

    /// Indices of the three sightings in the time-sorted set.
    pub fn indices(&self) -> (usize, usize, usize) {
        (self.idx_obs[0], self.idx_obs[1], self.idx_obs[2])
    }

    /// Line-of-sight unit vectors as columns.
    fn unit_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[
            radec_to_unit_vector(self.ra[0], self.dec[0]),
            radec_to_unit_vector(self.ra[1], self.dec[1]),
            radec_to_unit_vector(self.ra[2], self.dec[2]),
        ])
    }

    /// Time intervals, direction matrix and its inverse, and the `a`, `b` vectors of the
    /// Gauss reduction.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::SingularDirectionMatrix)` when `|det S|` is below
    ///   `min_direction_determinant` or `S` cannot be inverted.
    pub fn gauss_prelim(&self, min_direction_determinant: f64) -> Result<GaussPrelim, CometError> {
        let tau1 = GAUSS_GRAV * (self.time[0] - self.time[1]);
        let tau3 = GAUSS_GRAV * (self.time[2] - self.time[1]);
        let tau13 = tau3 - tau1;
        let vector_a = Vector3::new(tau3 / tau13, -1.0, -(tau1 / tau13));
        let vector_b = Vector3::new(
            vector_a[0] * (tau13.powi(2) - tau3.powi(2)) / 6.0,
            0.0,
            vector_a[2] * (tau13.powi(2) - tau1.powi(2)) / 6.0,
        );

        let unit_matrix = self.unit_matrix();
        let determinant = unit_matrix.determinant();
        if !determinant.is_finite() || determinant.abs() < min_direction_determinant {
            return Err(CometError::SingularDirectionMatrix);
        }
        let inv_unit_matrix = unit_matrix
            .try_inverse()
            .ok_or(CometError::SingularDirectionMatrix)?;

        Ok(GaussPrelim {
            tau1,
            tau3,
            unit_matrix,
            inv_unit_matrix,
            vector_a,
            vector_b,
        })
    }

    /// Non-zero coefficients `(c₆, c₃, c₀)` of the distance polynomial.
    pub fn coeff_eight_poly(&self, prelim: &GaussPrelim) -> (f64, f64, f64) {
        let ra = self.observer_helio_position * prelim.vector_a;
        let rb = self.observer_helio_position * prelim.vector_b;

        let second_row = prelim.inv_unit_matrix.row(1).transpose();
        let a2star = second_row.dot(&ra);
        let b2star = second_row.dot(&rb);

        let central_observer = self.observer_helio_position.column(1);
        let r22 = central_observer.norm_squared();
        let s2r2 = prelim.unit_matrix.column(1).dot(&central_observer);

        (
            -(a2star.powi(2)) - r22 - (2.0 * a2star * s2r2),
            -(2.0 * b2star * (a2star + s2r2)),
            -(b2star.powi(2)),
        )
    }

    /// Run Aberth on `poly` and hand every real positive root to `on_root`.
    ///
    /// A root is "real" when its imaginary part is below `root_imag_eps`. Hitting the
    /// iteration cap still yields the current approximations; only an outright solver
    /// failure is an error.
    fn visit_real_positive_roots(
        poly: &[f64; 9],
        max_iterations: u32,
        aberth_epsilon: f64,
        root_imag_eps: f64,
        mut on_root: impl FnMut(f64) -> ControlFlow<()>,
    ) -> Result<(), CometError> {
        let roots = aberth(poly, max_iterations, aberth_epsilon);

        match roots.stop_reason {
            StopReason::Converged(_) | StopReason::MaxIteration(_) => {
                for z in roots.iter() {
                    if z.re > 0.0 && z.im.abs() < root_imag_eps && on_root(z.re).is_break() {
                        break;
                    }
                }
                Ok(())
            }
            StopReason::Failed(_) => Err(CometError::PolynomialRootFindingFailed),
        }
    }

    /// Heliocentric positions at the three epochs for a given `c` vector, and the epoch
    /// of the central position.
    ///
    /// `ρ = −(S⁻¹ P c) ./ c` gives the topocentric distances; positions are `P + ρ s`.
    /// The epoch is `t₂`, moved back by the light time `ρ₂/c` when
    /// `light_time_correction` is set.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::SpuriousRootDetected)` when `ρ₂` is below `min_rho2_au`.
    pub fn position_vector_and_reference_epoch(
        &self,
        iod_params: &IODParams,
        prelim: &GaussPrelim,
        vector_c: &Vector3<f64>,
    ) -> Result<(Matrix3<f64>, MJD), CometError> {
        let gcap = self.observer_helio_position * vector_c;
        let crhom = prelim.inv_unit_matrix * gcap;
        let rho: Vector3<f64> = -crhom.component_div(vector_c);
        if rho[1].is_nan() || rho[1] < iod_params.min_rho2_au {
            return Err(CometError::SpuriousRootDetected);
        }

        let rho_unit = Matrix3::from_columns(&[
            prelim.unit_matrix.column(0) * rho[0],
            prelim.unit_matrix.column(1) * rho[1],
            prelim.unit_matrix.column(2) * rho[2],
        ]);

        let reference_epoch = if iod_params.light_time_correction {
            self.time[1] - rho[1] / VLIGHT_AU
        } else {
            self.time[1]
        };

        Ok((self.observer_helio_position + rho_unit, reference_epoch))
    }

    /// Herrick–Gibbs velocity at the central epoch from the three positions.
    pub fn gibbs_correction(&self, ast_pos_vector: &Matrix3<f64>, tau1: f64, tau3: f64) -> Vector3<f64> {
        let tau13 = tau3 - tau1;

        let r1m3 = 1.0 / ast_pos_vector.column(0).norm().powi(3);
        let r2m3 = 1.0 / ast_pos_vector.column(1).norm().powi(3);
        let r3m3 = 1.0 / ast_pos_vector.column(2).norm().powi(3);

        let d1 = tau3 * (r1m3 / 12.0 - 1.0 / (tau1 * tau13));
        let d2 = (tau1 + tau3) * (r2m3 / 12.0 - 1.0 / (tau1 * tau3));
        let d3 = -tau1 * (r3m3 / 12.0 + 1.0 / (tau3 * tau13));

        ast_pos_vector * Vector3::new(-d1, d2, d3) * GAUSS_GRAV
    }

    /// Turn one polynomial root `r₂` into a screened preliminary state.
    ///
    /// Return
    /// ----------
    /// * `Some((positions, central velocity, epoch))` when `ρ₂` is large enough and the
    ///   state passes the eccentricity/perihelion caps, `None` otherwise.
    pub fn accept_root(
        &self,
        iod_params: &IODParams,
        prelim: &GaussPrelim,
        root: f64,
    ) -> Option<(Matrix3<f64>, Vector3<f64>, MJD)> {
        let r2m3 = 1.0 / root.powi(3);
        let vector_c = Vector3::new(
            prelim.vector_a[0] + prelim.vector_b[0] * r2m3,
            -1.0,
            prelim.vector_a[2] + prelim.vector_b[2] * r2m3,
        );

        let (positions, reference_epoch) = self
            .position_vector_and_reference_epoch(iod_params, prelim, &vector_c)
            .ok()?;

        let velocity = self.gibbs_correction(&positions, prelim.tau1, prelim.tau3);

        let (accepted, _, _, _) = eccentricity_control(
            &positions.column(1).into_owned(),
            &velocity,
            iod_params.max_perihelion_au,
            iod_params.max_ecc,
        )?;

        accepted.then_some((positions, velocity, reference_epoch))
    }

    /// Iterative f/g refinement of a preliminary solution.
    ///
    /// Each pass propagates the central state to the outer epochs through universal
    /// variables, averages the two implied central velocities, rebuilds the `c` vector from
    /// the Lagrange coefficients and recomputes the positions. The loop stops when the
    /// relative change of the position matrix drops below `newton_eps`, when
    /// `newton_max_it` passes are spent, or as soon as the change grows instead of
    /// shrinking; in that last case the previous iterate is kept.
    ///
    /// Return
    /// ----------
    /// * `Some((positions, central velocity, epoch))` after at least one accepted pass.
    /// * `None` when no pass could be completed or the refined state fails the
    ///   eccentricity/perihelion caps.
    pub fn pos_and_vel_correction(
        &self,
        iod_params: &IODParams,
        prelim: &GaussPrelim,
        asteroid_position: &Matrix3<f64>,
        asteroid_velocity: &Vector3<f64>,
        reference_epoch: MJD,
    ) -> Option<(Matrix3<f64>, Vector3<f64>, MJD)> {
        let peri_max = iod_params.max_perihelion_au;
        let ecc_max = iod_params.max_ecc;

        let mut pos = *asteroid_position;
        let mut vel = *asteroid_velocity;
        let mut epoch = reference_epoch;
        let mut last_rel_err = f64::INFINITY;
        let mut committed = false;

        let dt_01 = self.time[0] - self.time[1];
        let dt_21 = self.time[2] - self.time[1];
        if dt_01.abs() <= f64::EPSILON || dt_21.abs() <= f64::EPSILON {
            return None;
        }

        for iteration in 0..iod_params.newton_max_it {
            let r1 = pos.column(0).into_owned();
            let r2 = pos.column(1).into_owned();
            let r3 = pos.column(2).into_owned();

            let left = velocity_correction(
                &r1,
                &r2,
                &vel,
                dt_01,
                peri_max,
                ecc_max,
                iod_params.kepler_eps,
            );
            let right = velocity_correction(
                &r3,
                &r2,
                &vel,
                dt_21,
                peri_max,
                ecc_max,
                iod_params.kepler_eps,
            );
            let ((v1, f1, g1), (v3, f3, g3)) = match (left, right) {
                (Ok(l), Ok(r)) => (l, r),
                _ => break,
            };

            let new_vel = (v1 + v3) * 0.5;

            let fl = f1 * g3 - f3 * g1;
            if !fl.is_finite() || fl.abs() < f64::EPSILON {
                break;
            }
            let c_vec = Vector3::new(g3 / fl, -1.0, -g1 / fl);

            let Ok((new_pos, new_epoch)) =
                self.position_vector_and_reference_epoch(iod_params, prelim, &c_vec)
            else {
                break;
            };

            let r_mid = new_pos.column(1).into_owned();
            match eccentricity_control(&r_mid, &new_vel, peri_max, ecc_max) {
                Some((true, _, _, _)) => {}
                _ => return None,
            }

            let denom = new_pos.norm();
            if !denom.is_finite() || denom <= f64::EPSILON {
                break;
            }
            let rel_err = (new_pos - pos).norm() / denom;
            if rel_err > last_rel_err {
                debug!(iteration, rel_err, last_rel_err, "f/g correction stopped growing");
                break;
            }

            pos = new_pos;
            vel = new_vel;
            epoch = new_epoch;
            last_rel_err = rel_err;
            committed = true;

            if rel_err <= iod_params.newton_eps {
                break;
            }
        }

        committed.then_some((pos, vel, epoch))
    }

    /// All admissible Gauss solutions for this triplet, up to `max_tested_solutions`.
    ///
    /// Each accepted root goes through [`GaussObs::pos_and_vel_correction`]; the corrected
    /// state is kept when the correction succeeds, the preliminary one otherwise.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::SingularDirectionMatrix)` for a degenerate triplet.
    /// * `Err(CometError::PolynomialRootFindingFailed)` if Aberth fails.
    /// * `Err(CometError::GaussNoRootsFound)` when no root survives the filters.
    pub fn prelim_orbit_all(&self, iod_params: &IODParams) -> Result<Vec<GaussResult>, CometError> {
        let prelim = self.gauss_prelim(iod_params.min_direction_determinant)?;

        let (c6, c3, c0) = self.coeff_eight_poly(&prelim);
        if descartes_upper_bound_deg8_sparse(c0, c3, c6, 0.0) == 0 {
            return Err(CometError::GaussNoRootsFound);
        }
        let poly = [c0, 0.0, 0.0, c3, 0.0, 0.0, c6, 0.0, 1.0];

        let mut solutions: SmallVec<[GaussResult; 4]> = SmallVec::new();

        Self::visit_real_positive_roots(
            &poly,
            iod_params.aberth_max_iter,
            iod_params.aberth_eps,
            iod_params.root_imag_eps,
            |r2| {
                if !(iod_params.r2_min_au..=iod_params.r2_max_au).contains(&r2) {
                    return ControlFlow::Continue(());
                }

                let Some((positions, velocity, epoch)) = self.accept_root(iod_params, &prelim, r2)
                else {
                    return ControlFlow::Continue(());
                };

                let result = match self.pos_and_vel_correction(
                    iod_params, &prelim, &positions, &velocity, epoch,
                ) {
                    Some((pos, vel, epoch)) => GaussResult::CorrectedOrbit(EquatorialState {
                        position: pos.column(1).into_owned(),
                        velocity: vel,
                        epoch,
                    }),
                    None => GaussResult::PrelimOrbit(EquatorialState {
                        position: positions.column(1).into_owned(),
                        velocity,
                        epoch,
                    }),
                };
                debug!(r2, corrected = result.is_corrected(), "Gauss root accepted");
                solutions.push(result);

                if solutions.len() >= iod_params.max_tested_solutions {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )?;

        if solutions.is_empty() {
            Err(CometError::GaussNoRootsFound)
        } else {
            Ok(solutions.into_vec())
        }
    }

    /// The first corrected solution if any, else the first preliminary one.
    pub fn prelim_orbit(&self, iod_params: &IODParams) -> Result<GaussResult, CometError> {
        let all = self.prelim_orbit_all(iod_params)?;
        all.iter()
            .find(|s| s.is_corrected())
            .or_else(|| all.first())
            .copied()
            .ok_or(CometError::GaussNoRootsFound)
    }
}
