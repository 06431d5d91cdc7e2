//! # Orbit solver
//!
//! [`OrbitSolver`] is the capability the comet state manager calls to turn a comet's
//! observations into [`OrbitalElements`]. Two implementations are provided:
//!
//! * [`GaussOrbitSolver`]: Gauss method on the best-spaced triplets, candidate selection by
//!   angular RMS over the whole set, then differential correction.
//! * [`FixedOrbitSolver`]: returns preset elements once the input preconditions hold, for
//!   deterministic orchestration tests.
//!
//! Both enforce the same preconditions, in this order:
//!
//! 1. at least `min_observations` observations ([`CometError::NotEnoughObservations`]),
//! 2. angles finite and in range ([`CometError::InvalidInput`]),
//! 3. one angular convention for the whole set ([`CometError::InvalidInput`]),
//! 4. horizontal sets need an observer site ([`CometError::InvalidInput`]),
//! 5. distinct timestamps ([`CometError::DegenerateGeometry`]).
//!
//! Failures internal to the Gauss method (singular line-of-sight matrix, no admissible
//! polynomial root) surface as [`CometError::DegenerateGeometry`].
use std::fmt;

use tracing::{debug, info, instrument};

use crate::comet_errors::CometError;
use crate::earth_orbit::{CircularEarth, EarthEphemeris, MeanElementsEarth};
use crate::initial_orbit_determination::differential_correction::{
    differential_correction, residual_rms,
};
use crate::initial_orbit_determination::gauss_result::EquatorialState;
use crate::initial_orbit_determination::IODParams;
use crate::observations::triplets::generate_triplets;
use crate::observations::{prepare_sightings, Observation, ObserverSite, Sighting};
use crate::orbit_type::OrbitalElements;
use crate::ref_system::equatorial_to_ecliptic;
use crate::time::mjd_tt_to_datetime;

/// Fits orbital elements to a set of observations of one comet.
///
/// Implementations are pure: no I/O, no hidden state, identical input gives identical
/// output.
pub trait OrbitSolver: Send + Sync {
    fn fit(&self, observations: &[Observation]) -> Result<OrbitalElements, CometError>;

    /// Smallest observation set [`OrbitSolver::fit`] accepts.
    fn min_observations(&self) -> usize;
}

fn check_count(observations: &[Observation], required: usize) -> Result<(), CometError> {
    if observations.len() < required {
        return Err(CometError::NotEnoughObservations {
            found: observations.len(),
            required,
        });
    }
    Ok(())
}

/// Gauss initial orbit determination followed by differential correction.
pub struct GaussOrbitSolver {
    params: IODParams,
    earth: Box<dyn EarthEphemeris>,
}

impl fmt::Debug for GaussOrbitSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaussOrbitSolver")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Default for GaussOrbitSolver {
    fn default() -> Self {
        Self::new(IODParams::default())
    }
}

impl GaussOrbitSolver {
    /// Solver with the mean-elements Earth model.
    pub fn new(params: IODParams) -> Self {
        Self::with_earth(params, MeanElementsEarth::default())
    }

    pub fn with_earth(params: IODParams, earth: impl EarthEphemeris + 'static) -> Self {
        GaussOrbitSolver {
            params,
            earth: Box::new(earth),
        }
    }

    pub fn params(&self) -> &IODParams {
        &self.params
    }

    /// Best Gauss candidate over the selected triplets, by RMS over all sightings.
    ///
    /// Candidates are visited triplet by triplet in ranking order; a later candidate
    /// replaces the current best only with a strictly lower RMS.
    fn best_candidate(&self, sightings: &[Sighting]) -> Result<(EquatorialState, f64), CometError> {
        let triplets = generate_triplets(sightings, &self.params)?;
        debug!(triplets = triplets.len(), "candidate triplets selected");

        let mut best: Option<(EquatorialState, f64)> = None;
        let mut last_failure = None;

        for triplet in &triplets {
            let solutions = match triplet.prelim_orbit_all(&self.params) {
                Ok(solutions) => solutions,
                Err(err) => {
                    debug!(indices = ?triplet.indices(), %err, "triplet rejected");
                    last_failure = Some(err);
                    continue;
                }
            };

            for solution in solutions {
                let state = solution.into_state();
                let Ok(rms) = residual_rms(&state, sightings, self.params.kepler_eps) else {
                    continue;
                };
                if !rms.is_finite() {
                    continue;
                }
                debug!(indices = ?triplet.indices(), rms, corrected = solution.is_corrected(), "Gauss candidate");
                if best.as_ref().map_or(true, |(_, best_rms)| rms < *best_rms) {
                    best = Some((state, rms));
                }
            }
        }

        best.ok_or_else(|| {
            CometError::DegenerateGeometry(match last_failure {
                Some(CometError::SingularDirectionMatrix) => {
                    "lines of sight are coplanar with the observer; distances are unconstrained"
                        .to_string()
                }
                Some(err) => format!("no admissible Gauss solution ({err})"),
                None => "no admissible Gauss solution".to_string(),
            })
        })
    }

    fn to_elements(&self, state: &EquatorialState) -> Result<OrbitalElements, CometError> {
        let rotation = equatorial_to_ecliptic();
        let epoch = mjd_tt_to_datetime(state.epoch)?;
        OrbitalElements::from_state(&(rotation * state.position), &(rotation * state.velocity), epoch)
    }
}

impl OrbitSolver for GaussOrbitSolver {
    #[instrument(level = "debug", skip_all, fields(observations = observations.len()))]
    fn fit(&self, observations: &[Observation]) -> Result<OrbitalElements, CometError> {
        check_count(observations, self.params.min_observations)?;

        let sightings = prepare_sightings(
            observations,
            self.params.observer_site.as_ref(),
            self.earth.as_ref(),
        )?;

        let (candidate, gauss_rms) = self.best_candidate(&sightings)?;

        let corrected = differential_correction(
            &candidate,
            &sightings,
            self.params.dc_max_iter,
            self.params.dc_tolerance,
            self.params.kepler_eps,
        )?;

        let elements = self.to_elements(&corrected.state)?;
        info!(
            gauss_rms,
            rms = corrected.rms,
            dc_iterations = corrected.iterations,
            a = elements.semi_major_axis,
            e = elements.eccentricity,
            "orbit fitted"
        );
        Ok(elements)
    }

    fn min_observations(&self) -> usize {
        self.params.min_observations
    }
}

/// Deterministic solver returning preset elements.
#[derive(Debug, Clone)]
pub struct FixedOrbitSolver {
    elements: OrbitalElements,
    min_observations: usize,
    observer_site: Option<ObserverSite>,
}

impl FixedOrbitSolver {
    pub fn new(elements: OrbitalElements, min_observations: usize) -> Self {
        FixedOrbitSolver {
            elements,
            min_observations,
            observer_site: None,
        }
    }

    /// Accept horizontal observation sets, as a [`GaussOrbitSolver`] configured with `site`.
    pub fn with_observer_site(mut self, site: ObserverSite) -> Self {
        self.observer_site = Some(site);
        self
    }
}

impl OrbitSolver for FixedOrbitSolver {
    fn fit(&self, observations: &[Observation]) -> Result<OrbitalElements, CometError> {
        check_count(observations, self.min_observations)?;
        prepare_sightings(
            observations,
            self.observer_site.as_ref(),
            &CircularEarth::default(),
        )?;
        Ok(self.elements.clone())
    }

    fn min_observations(&self) -> usize {
        self.min_observations
    }
}

#[cfg(test)]
mod orbit_solver_test {
    use super::*;
    use crate::ephemeris::predict_radec;
    use crate::observations::AngularPosition;
    use crate::orbit_type::orbit_type_test::halley_like;
    use crate::time::add_days;
    use approx::assert_abs_diff_eq;

    fn synthetic(days: &[f64]) -> Vec<Observation> {
        let elements = halley_like(60.0);
        let earth = MeanElementsEarth::default();
        days.iter()
            .enumerate()
            .map(|(i, d)| {
                let observed_at = add_days(&elements.epoch, *d).unwrap();
                let (ra, dec) = predict_radec(
                    &elements,
                    &earth,
                    crate::time::datetime_to_mjd_tt(&observed_at),
                    false,
                )
                .unwrap();
                Observation {
                    id: i as u64 + 1,
                    comet_id: Some(1),
                    user_id: 1,
                    position: AngularPosition::equatorial(ra, dec),
                    observed_at,
                    photo_url: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_not_enough_observations() {
        let solver = GaussOrbitSolver::default();
        let err = solver.fit(&synthetic(&[0.0, 1.0])).unwrap_err();
        assert_eq!(
            err,
            CometError::NotEnoughObservations {
                found: 2,
                required: 3
            }
        );
    }

    #[test]
    fn test_fit_recovers_halley_fixture() {
        let solver = GaussOrbitSolver::default();
        let elements = solver.fit(&synthetic(&[0.0, 0.5, 1.0, 1.5, 2.0])).unwrap();

        assert_abs_diff_eq!(elements.semi_major_axis, 17.8, epsilon = 1e-3);
        assert_abs_diff_eq!(elements.eccentricity, 0.967, epsilon = 1e-5);
        assert_abs_diff_eq!(elements.inclination, 162.3, epsilon = 1e-4);
        assert_abs_diff_eq!(elements.ascending_node_longitude, 58.42, epsilon = 1e-4);
        assert_abs_diff_eq!(elements.periapsis_argument, 111.33, epsilon = 1e-4);
    }

    #[test]
    fn test_fit_is_deterministic_and_order_independent() {
        let solver = GaussOrbitSolver::default();
        let mut observations = synthetic(&[0.0, 0.5, 1.0, 1.5, 2.0]);
        let first = solver.fit(&observations).unwrap();
        observations.reverse();
        let second = solver.fit(&observations).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_directions_are_degenerate() {
        let mut observations = synthetic(&[0.0, 1.0, 2.0]);
        let first = observations[0].position;
        for obs in &mut observations {
            obs.position = first;
        }
        let err = GaussOrbitSolver::default().fit(&observations).unwrap_err();
        assert!(matches!(err, CometError::DegenerateGeometry(_)), "{err:?}");
    }

    #[test]
    fn test_fixed_solver_enforces_preconditions() {
        let solver = FixedOrbitSolver::new(halley_like(0.0), 5);
        assert!(matches!(
            solver.fit(&synthetic(&[0.0, 1.0, 2.0])),
            Err(CometError::NotEnoughObservations { found: 3, required: 5 })
        ));
        assert_eq!(
            solver.fit(&synthetic(&[0.0, 0.5, 1.0, 1.5, 2.0])).unwrap(),
            halley_like(0.0)
        );
    }
}
