//! # Orbit determination parameters
//!
//! [`IODParams`] gathers every tunable of the angles-only fit performed by
//! [`GaussOrbitSolver`](crate::orbit_solver::GaussOrbitSolver):
//!
//! - **Preconditions**: minimum number of observations, optional ground site used to
//!   convert horizontal sightings.
//! - **Triplet selection**: span window (`dt_min`, `dt_max_triplet`), preferred spacing
//!   (`optimal_interval_time`), downsampling cap and number of triplets tried.
//! - **Physical filters**: eccentricity and perihelion caps, bounds on the heliocentric
//!   distance `r₂` and the topocentric distance `ρ₂` at the central epoch.
//! - **Gauss numerics**: Aberth iterations and tolerance, real-root filter, universal Kepler
//!   tolerance, f/g correction loop, singularity threshold on the direction matrix.
//! - **Differential correction**: iteration cap and relative RMS tolerance.
//!
//! ## Pipeline
//!
//! 1. **Triplets**: candidate triplets are ranked by spacing and truncated.
//! 2. **Gauss**: each triplet yields up to `max_tested_solutions` preliminary orbits
//!    ([`gauss::GaussObs::prelim_orbit_all`]).
//! 3. **Scoring**: every candidate is propagated to all sightings and the lowest angular
//!    RMS wins.
//! 4. **Refinement**: the winner is polished by
//!    [`differential_correction::differential_correction`].
//!
//! ## Example
//!
//! ```rust
//! use cometfit::initial_orbit_determination::IODParams;
//!
//! let params = IODParams::builder()
//!     .min_observations(5)
//!     .dt_max_triplet(60.0)
//!     .max_ecc(2.0)
//!     .dc_max_iter(10)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(params.min_observations, 5);
//! ```
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::comet_errors::CometError;
use crate::observations::ObserverSite;

pub mod differential_correction;
pub mod gauss;
pub mod gauss_result;

/// Configuration of the angles-only orbit fit.
///
/// Build it with [`IODParams::builder`] to get validation, or use
/// [`IODParams::default`] for the standard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IODParams {
    // --- Preconditions ---
    /// Smallest observation set accepted by the solver (≥ 3).
    pub min_observations: usize,
    /// Ground site used to convert azimuth/altitude sightings.
    pub observer_site: Option<ObserverSite>,

    // --- Triplet selection ---
    /// Minimum span `t3 − t1` of a triplet, days.
    pub dt_min: f64,
    /// Maximum span `t3 − t1` of a triplet, days.
    pub dt_max_triplet: f64,
    /// Preferred gap between consecutive sightings of a triplet, days.
    pub optimal_interval_time: f64,
    /// Sightings kept (uniformly in time) before enumerating triplets.
    pub max_obs_for_triplets: usize,
    /// Number of best-ranked triplets run through the Gauss method.
    pub max_triplets: u32,

    // --- Physical plausibility ---
    pub max_ecc: f64,
    pub max_perihelion_au: f64,
    pub min_rho2_au: f64,
    pub r2_min_au: f64,
    pub r2_max_au: f64,

    // --- Gauss numerics ---
    pub aberth_max_iter: u32,
    pub aberth_eps: f64,
    pub root_imag_eps: f64,
    pub kepler_eps: f64,
    pub newton_eps: f64,
    pub newton_max_it: usize,
    pub max_tested_solutions: usize,
    /// |det| of the line-of-sight matrix below which a triplet is degenerate.
    pub min_direction_determinant: f64,
    /// Date the orbit at `t2 − ρ₂/c` instead of `t2`.
    pub light_time_correction: bool,

    // --- Differential correction ---
    pub dc_max_iter: usize,
    /// Relative RMS change below which the correction stops.
    pub dc_tolerance: f64,
}

impl IODParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> IODParamsBuilder {
        IODParamsBuilder::new()
    }

    /// Apply the builder checks to an existing value, e.g. one loaded with serde.
    pub fn validate(&self) -> Result<(), CometError> {
        IODParamsBuilder {
            params: self.clone(),
        }
        .build()
        .map(|_| ())
    }
}

impl Default for IODParams {
    fn default() -> Self {
        IODParams {
            min_observations: 3,
            observer_site: None,

            dt_min: 0.03,
            dt_max_triplet: 150.0,
            optimal_interval_time: 20.0,
            max_obs_for_triplets: 100,
            max_triplets: 10,

            max_ecc: 5.0,
            max_perihelion_au: 1.0e3,
            min_rho2_au: 0.01,
            r2_min_au: 0.05,
            r2_max_au: 200.0,

            aberth_max_iter: 100,
            aberth_eps: 1.0e-10,
            root_imag_eps: 1.0e-6,
            kepler_eps: 1e3 * f64::EPSILON,
            newton_eps: 1.0e-10,
            newton_max_it: 50,
            max_tested_solutions: 3,
            min_direction_determinant: 1.0e-15,
            light_time_correction: false,

            dc_max_iter: 20,
            dc_tolerance: 1.0e-10,
        }
    }
}

/// Fluent, validating builder for [`IODParams`].
#[derive(Debug, Clone, Default)]
pub struct IODParamsBuilder {
    params: IODParams,
}

impl IODParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: IODParams::default(),
        }
    }

    pub fn min_observations(mut self, v: usize) -> Self {
        self.params.min_observations = v;
        self
    }
    pub fn observer_site(mut self, v: ObserverSite) -> Self {
        self.params.observer_site = Some(v);
        self
    }

    pub fn dt_min(mut self, v: f64) -> Self {
        self.params.dt_min = v;
        self
    }
    pub fn dt_max_triplet(mut self, v: f64) -> Self {
        self.params.dt_max_triplet = v;
        self
    }
    pub fn optimal_interval_time(mut self, v: f64) -> Self {
        self.params.optimal_interval_time = v;
        self
    }
    pub fn max_obs_for_triplets(mut self, v: usize) -> Self {
        self.params.max_obs_for_triplets = v;
        self
    }
    pub fn max_triplets(mut self, v: u32) -> Self {
        self.params.max_triplets = v;
        self
    }

    pub fn max_ecc(mut self, v: f64) -> Self {
        self.params.max_ecc = v;
        self
    }
    pub fn max_perihelion_au(mut self, v: f64) -> Self {
        self.params.max_perihelion_au = v;
        self
    }
    pub fn min_rho2_au(mut self, v: f64) -> Self {
        self.params.min_rho2_au = v;
        self
    }
    pub fn r2_min_au(mut self, v: f64) -> Self {
        self.params.r2_min_au = v;
        self
    }
    pub fn r2_max_au(mut self, v: f64) -> Self {
        self.params.r2_max_au = v;
        self
    }

    pub fn aberth_max_iter(mut self, v: u32) -> Self {
        self.params.aberth_max_iter = v;
        self
    }
    pub fn aberth_eps(mut self, v: f64) -> Self {
        self.params.aberth_eps = v;
        self
    }
    pub fn root_imag_eps(mut self, v: f64) -> Self {
        self.params.root_imag_eps = v;
        self
    }
    pub fn kepler_eps(mut self, v: f64) -> Self {
        self.params.kepler_eps = v;
        self
    }
    pub fn newton_eps(mut self, v: f64) -> Self {
        self.params.newton_eps = v;
        self
    }
    pub fn newton_max_it(mut self, v: usize) -> Self {
        self.params.newton_max_it = v;
        self
    }
    pub fn max_tested_solutions(mut self, v: usize) -> Self {
        self.params.max_tested_solutions = v;
        self
    }
    pub fn min_direction_determinant(mut self, v: f64) -> Self {
        self.params.min_direction_determinant = v;
        self
    }
    pub fn light_time_correction(mut self, v: bool) -> Self {
        self.params.light_time_correction = v;
        self
    }

    pub fn dc_max_iter(mut self, v: usize) -> Self {
        self.params.dc_max_iter = v;
        self
    }
    pub fn dc_tolerance(mut self, v: f64) -> Self {
        self.params.dc_tolerance = v;
        self
    }

    // NaN never passes these comparisons.

    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    #[inline]
    fn le(a: f64, b: f64) -> bool {
        matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
    }

    pub fn build(self) -> Result<IODParams, CometError> {
        let p = &self.params;
        let invalid = |msg: &str| Err(CometError::InvalidParameter(msg.into()));

        if p.min_observations < 3 {
            return invalid("min_observations must be >= 3");
        }

        if !Self::ge0(p.dt_min) || !Self::le(p.dt_min, p.dt_max_triplet) {
            return invalid("require 0 <= dt_min <= dt_max_triplet");
        }
        if !Self::gt0(p.optimal_interval_time) {
            return invalid("optimal_interval_time must be > 0");
        }
        if p.max_obs_for_triplets < 3 || p.max_triplets == 0 {
            return invalid("max_obs_for_triplets must be >= 3 and max_triplets >= 1");
        }

        if !Self::ge0(p.max_ecc) {
            return invalid("max_ecc must be >= 0");
        }
        if !Self::gt0(p.max_perihelion_au) {
            return invalid("max_perihelion_au must be > 0");
        }
        if !Self::gt0(p.min_rho2_au) {
            return invalid("min_rho2_au must be > 0");
        }
        if !(Self::gt0(p.r2_min_au) && Self::le(p.r2_min_au, p.r2_max_au)) {
            return invalid("require 0 < r2_min_au <= r2_max_au");
        }

        if !Self::ge0(p.root_imag_eps) || !Self::ge0(p.min_direction_determinant) {
            return invalid("root_imag_eps and min_direction_determinant must be >= 0");
        }
        if !Self::gt0(p.aberth_eps) || !Self::gt0(p.kepler_eps) || !Self::gt0(p.newton_eps) {
            return invalid("aberth_eps, kepler_eps and newton_eps must be > 0");
        }
        if p.aberth_max_iter == 0 || p.newton_max_it == 0 || p.max_tested_solutions == 0 {
            return invalid("iteration counts and max_tested_solutions must be >= 1");
        }

        if !Self::gt0(p.dc_tolerance) {
            return invalid("dc_tolerance must be > 0");
        }

        Ok(self.params)
    }
}

impl fmt::Display for IODParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 50;
            writeln!(f, "Orbit Determination Parameters")?;
            writeln!(f, "------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Preconditions]")?;
            line!(
                "min_observations     = {}",
                self.min_observations,
                "Smallest set accepted by the fit"
            )?;
            match &self.observer_site {
                Some(site) => line!(
                    "observer_site        = {}",
                    format!("({:.4}°, {:.4}°)", site.latitude, site.longitude),
                    "Site for horizontal sightings"
                )?,
                None => line!(
                    "observer_site        = {}",
                    "none",
                    "Horizontal sightings rejected"
                )?,
            }

            writeln!(f, "\n[Triplet selection]")?;
            line!("dt_min               = {:.3} d", self.dt_min, "Minimum triplet span")?;
            line!(
                "dt_max_triplet       = {:.3} d",
                self.dt_max_triplet,
                "Maximum triplet span"
            )?;
            line!(
                "optimal_interval_time= {:.3} d",
                self.optimal_interval_time,
                "Target spacing inside triplet"
            )?;
            line!(
                "max_obs_for_triplets = {}",
                self.max_obs_for_triplets,
                "Cap on obs used to build triplets"
            )?;
            line!(
                "max_triplets         = {}",
                self.max_triplets,
                "Triplets run through Gauss"
            )?;

            writeln!(f, "\n[Physical plausibility / filtering]")?;
            line!("max_ecc              = {:.3}", self.max_ecc, "Maximum eccentricity accepted")?;
            line!(
                "max_perihelion_au    = {:.3} AU",
                self.max_perihelion_au,
                "Maximum perihelion distance"
            )?;
            line!(
                "min_rho2_au          = {:.3} AU",
                self.min_rho2_au,
                "Minimum topocentric distance"
            )?;
            line!(
                "r2_min_au            = {:.3} AU",
                self.r2_min_au,
                "Minimum heliocentric distance"
            )?;
            line!(
                "r2_max_au            = {:.3} AU",
                self.r2_max_au,
                "Maximum heliocentric distance"
            )?;

            writeln!(f, "\n[Gauss numerics]")?;
            line!(
                "aberth_max_iter      = {}",
                self.aberth_max_iter,
                "Max iterations for Aberth solver"
            )?;
            line!(
                "aberth_eps           = {:.1e}",
                self.aberth_eps,
                "Convergence tolerance for Aberth solver"
            )?;
            line!(
                "root_imag_eps        = {:.1e}",
                self.root_imag_eps,
                "Max imaginary part for promoted roots"
            )?;
            line!("kepler_eps           = {:.1e}", self.kepler_eps, "Tolerance in Kepler solver")?;
            line!(
                "newton_eps           = {:.1e}",
                self.newton_eps,
                "f/g correction convergence"
            )?;
            line!(
                "newton_max_it        = {}",
                self.newton_max_it,
                "Max f/g correction iterations"
            )?;
            line!(
                "max_tested_solutions = {}",
                self.max_tested_solutions,
                "Max Gauss solutions kept per triplet"
            )?;
            line!(
                "min_direction_det    = {:.1e}",
                self.min_direction_determinant,
                "Degenerate line-of-sight threshold"
            )?;
            line!(
                "light_time_correction= {}",
                self.light_time_correction,
                "Epoch at t2 - rho2/c"
            )?;

            writeln!(f, "\n[Differential correction]")?;
            line!("dc_max_iter          = {}", self.dc_max_iter, "Max Gauss-Newton iterations")?;
            line!(
                "dc_tolerance         = {:.1e}",
                self.dc_tolerance,
                "Relative RMS change to stop"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "IODParams(min_obs={}, dt_min={:.2}d, dt_max_triplet={:.1}d, max_triplets={}, max_ecc={:.2}, perihelion≤{:.1}AU, r2∈[{:.2},{:.1}]AU, dc_max_iter={})",
                self.min_observations,
                self.dt_min,
                self.dt_max_triplet,
                self.max_triplets,
                self.max_ecc,
                self.max_perihelion_au,
                self.r2_min_au,
                self.r2_max_au,
                self.dc_max_iter,
            )
        }
    }
}

#[cfg(test)]
mod iod_params_test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let built = IODParams::builder().build().unwrap();
        assert_eq!(built, IODParams::default());
        assert_eq!(built.min_observations, 3);
        assert!(!built.light_time_correction);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let cases = [
            IODParams::builder().min_observations(2),
            IODParams::builder().dt_min(-1.0),
            IODParams::builder().dt_min(200.0),
            IODParams::builder().r2_min_au(10.0).r2_max_au(1.0),
            IODParams::builder().aberth_eps(f64::NAN),
            IODParams::builder().max_tested_solutions(0),
            IODParams::builder().dc_tolerance(0.0),
        ];
        for builder in cases {
            assert!(matches!(
                builder.build(),
                Err(CometError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_display_forms() {
        let params = IODParams::default();
        let compact = format!("{params}");
        assert!(compact.starts_with("IODParams(min_obs=3"));

        let table = format!("{params:#}");
        assert!(table.contains("[Triplet selection]"));
        assert!(table.contains("[Differential correction]"));
        assert!(table.contains("Horizontal sightings rejected"));
    }

    #[test]
    fn test_serde_defaults_missing_fields() {
        let params: IODParams = serde_json::from_str(r#"{"min_observations": 5}"#).unwrap();
        assert_eq!(params.min_observations, 5);
        assert_eq!(params.max_triplets, IODParams::default().max_triplets);
    }
}
