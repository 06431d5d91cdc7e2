//! # Orbital elements
//!
//! The crate stores orbits in a single **canonical parameterization**: perihelion
//! distance, eccentricity, three orientation angles and the **true anomaly at epoch**,
//! heliocentric ecliptic mean J2000, angles in degrees.
//!
//! Other parameterizations are derived at the boundary rather than stored:
//!
//! - [`OrbitalElements::mean_anomaly`] for elliptic/hyperbolic orbits,
//! - [`OrbitalElements::time_of_perihelion`] for every conic type,
//! - [`OrbitalElements::period_days`] for bound orbits.
//!
//! ## Typical workflow
//!
//! ```rust, no_run
//! use chrono::{TimeZone, Utc};
//! use nalgebra::Vector3;
//! use cometfit::orbit_type::OrbitalElements;
//!
//! // heliocentric ecliptic J2000 state, AU and AU/day
//! let r = Vector3::new(1.0, 0.0, 0.0);
//! let v = Vector3::new(0.0, 0.0172, 0.0);
//! let epoch = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
//!
//! let elements = OrbitalElements::from_state(&r, &v, epoch).unwrap();
//! let in_ten_days = elements.position_at(elements.epoch_mjd_tt() + 10.0).unwrap();
//! println!("{elements}\n{in_ten_days}");
//! ```
use std::fmt;

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::comet_errors::CometError;
use crate::constants::{
    Degree, DPI, GAUSS_GRAV, GAUSS_GRAV_SQUARED, MJD, PARABOLIC_ECC_TOLERANCE, RADEG,
};
use crate::kepler::{
    solve_barker_equation, solve_hyperbolic_kepler_equation, solve_kepler_equation,
    KEPLER_MAX_ITER, KEPLER_TOLERANCE,
};
use crate::orb_elem::state_to_elements;
use crate::ref_system::perifocal_rotation;
use crate::time::{add_days, datetime_to_mjd_tt};

/// Conic class of an orbit, decided from the eccentricity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConicKind {
    Elliptic,
    Parabolic,
    Hyperbolic,
}

/// Heliocentric Keplerian elements of a comet (ecliptic mean J2000).
///
/// Fields
/// -----------------
/// * `epoch` – instant at which `true_anomaly` holds.
/// * `semi_major_axis` – AU; negative for hyperbolic orbits, `+∞` for a parabola.
/// * `perihelion_distance` – AU, always finite and positive.
/// * `eccentricity` – `≥ 0`; `≥ 1` denotes an unbound orbit.
/// * `inclination`, `ascending_node_longitude`, `periapsis_argument`, `true_anomaly` –
///   degrees, each normalized into `[0, 360)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    pub epoch: DateTime<Utc>,
    pub semi_major_axis: f64,
    pub perihelion_distance: f64,
    pub eccentricity: f64,
    pub inclination: Degree,
    pub ascending_node_longitude: Degree,
    pub periapsis_argument: Degree,
    pub true_anomaly: Degree,
}

/// Normalize an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(angle: Degree) -> Degree {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

impl OrbitalElements {
    /// Build elements from a heliocentric ecliptic J2000 state vector.
    ///
    /// Arguments
    /// -----------------
    /// * `position`: AU.
    /// * `velocity`: AU/day.
    /// * `epoch`: instant of the state.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::ComputationError)` for radial or non-finite states.
    pub fn from_state(
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        epoch: DateTime<Utc>,
    ) -> Result<Self, CometError> {
        let conic = state_to_elements(position, velocity)?;

        let elements = OrbitalElements {
            epoch,
            semi_major_axis: conic.semi_major_axis,
            perihelion_distance: conic.perihelion_distance,
            eccentricity: conic.eccentricity,
            inclination: normalize_degrees(conic.inclination / RADEG),
            ascending_node_longitude: normalize_degrees(conic.ascending_node_longitude / RADEG),
            periapsis_argument: normalize_degrees(conic.periapsis_argument / RADEG),
            true_anomaly: normalize_degrees(conic.true_anomaly / RADEG),
        };
        elements.validate()?;
        Ok(elements)
    }

    /// Check the output invariants of a fit: finite values, `e ≥ 0`, `q > 0` and every
    /// angle inside `[0, 360)`.
    pub fn validate(&self) -> Result<(), CometError> {
        if !self.eccentricity.is_finite() || self.eccentricity < 0.0 {
            return Err(CometError::ComputationError(format!(
                "invalid eccentricity {}",
                self.eccentricity
            )));
        }
        if !self.perihelion_distance.is_finite() || self.perihelion_distance <= 0.0 {
            return Err(CometError::ComputationError(format!(
                "invalid perihelion distance {}",
                self.perihelion_distance
            )));
        }
        if self.semi_major_axis.is_nan() {
            return Err(CometError::ComputationError(
                "semi-major axis is NaN".into(),
            ));
        }
        let angles = [
            ("inclination", self.inclination),
            ("ascending node longitude", self.ascending_node_longitude),
            ("periapsis argument", self.periapsis_argument),
            ("true anomaly", self.true_anomaly),
        ];
        for (name, value) in angles {
            if !(0.0..360.0).contains(&value) {
                return Err(CometError::ComputationError(format!(
                    "{name} {value} outside [0, 360)"
                )));
            }
        }
        Ok(())
    }

    pub fn conic_kind(&self) -> ConicKind {
        if (self.eccentricity - 1.0).abs() <= PARABOLIC_ECC_TOLERANCE {
            ConicKind::Parabolic
        } else if self.eccentricity < 1.0 {
            ConicKind::Elliptic
        } else {
            ConicKind::Hyperbolic
        }
    }

    pub fn is_bound(&self) -> bool {
        self.conic_kind() == ConicKind::Elliptic
    }

    /// Epoch as a Modified Julian Date in the TT scale.
    pub fn epoch_mjd_tt(&self) -> MJD {
        datetime_to_mjd_tt(&self.epoch)
    }

    /// `|a|` recomputed from `q` and `e`, which stays accurate near `e = 1`.
    fn abs_semi_major_axis(&self) -> f64 {
        self.perihelion_distance / (1.0 - self.eccentricity).abs()
    }

    /// Mean motion in radians per day (`None` for a parabola).
    pub fn mean_motion(&self) -> Option<f64> {
        match self.conic_kind() {
            ConicKind::Parabolic => None,
            _ => Some(GAUSS_GRAV / self.abs_semi_major_axis().powf(1.5)),
        }
    }

    /// Orbital period in days, for bound orbits only.
    pub fn period_days(&self) -> Option<f64> {
        if self.is_bound() {
            self.mean_motion().map(|n| DPI / n)
        } else {
            None
        }
    }

    /// Mean anomaly at epoch in radians, in `(−π, π]` for ellipses.
    fn mean_anomaly_rad(&self) -> Result<Option<f64>, CometError> {
        let e = self.eccentricity;
        let nu = self.true_anomaly * RADEG;
        match self.conic_kind() {
            ConicKind::Elliptic => {
                let ea = ((1.0 - e * e).sqrt() * nu.sin()).atan2(e + nu.cos());
                Ok(Some(ea - e * ea.sin()))
            }
            ConicKind::Hyperbolic => {
                let h = self.hyperbolic_anomaly_at_epoch()?;
                Ok(Some(e * h.sinh() - h))
            }
            ConicKind::Parabolic => Ok(None),
        }
    }

    fn hyperbolic_anomaly_at_epoch(&self) -> Result<f64, CometError> {
        let e = self.eccentricity;
        let arg = ((e - 1.0) / (e + 1.0)).sqrt() * (self.true_anomaly * RADEG / 2.0).tan();
        if arg.abs() >= 1.0 {
            return Err(CometError::ComputationError(format!(
                "true anomaly {}° lies beyond the asymptote of a hyperbola with e = {e}",
                self.true_anomaly
            )));
        }
        Ok(2.0 * arg.atanh())
    }

    /// Barker variable `W = D + D³/3` at epoch, with `D = tan(ν/2)`.
    fn barker_at_epoch(&self) -> f64 {
        let d = (self.true_anomaly * RADEG / 2.0).tan();
        d + d.powi(3) / 3.0
    }

    /// Rate of change of the Barker variable, per day.
    fn barker_rate(&self) -> f64 {
        (GAUSS_GRAV_SQUARED / (2.0 * self.perihelion_distance.powi(3))).sqrt()
    }

    /// Mean anomaly at epoch in degrees (`[0, 360)` for ellipses), `None` for a parabola.
    pub fn mean_anomaly(&self) -> Result<Option<Degree>, CometError> {
        Ok(self.mean_anomaly_rad()?.map(|m| match self.conic_kind() {
            ConicKind::Elliptic => normalize_degrees(m / RADEG),
            _ => m / RADEG,
        }))
    }

    /// Time of the perihelion passage nearest to the epoch (the only one for unbound orbits).
    ///
    /// This is the alternative parameterization of the anomaly, derived from the stored
    /// true anomaly through Kepler's equation (or Barker's for a parabola).
    pub fn time_of_perihelion(&self) -> Result<DateTime<Utc>, CometError> {
        let since_perihelion = match (self.mean_anomaly_rad()?, self.mean_motion()) {
            (Some(m), Some(n)) => m / n,
            _ => self.barker_at_epoch() / self.barker_rate(),
        };
        add_days(&self.epoch, -since_perihelion)
    }

    /// Heliocentric ecliptic position (AU) at `mjd_tt`, by two-body propagation from the epoch.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::ComputationError)` for inconsistent hyperbolic anomalies or a
    ///   non-finite result.
    pub fn position_at(&self, mjd_tt: MJD) -> Result<Vector3<f64>, CometError> {
        let dt = mjd_tt - self.epoch_mjd_tt();
        let e = self.eccentricity;
        let q = self.perihelion_distance;

        let perifocal = match self.conic_kind() {
            ConicKind::Elliptic => {
                let a = self.abs_semi_major_axis();
                let n = GAUSS_GRAV / a.powf(1.5);
                let m = self.mean_anomaly_rad()?.unwrap_or(0.0) + n * dt;
                let ea = solve_kepler_equation(m, e, KEPLER_TOLERANCE, KEPLER_MAX_ITER);
                Vector3::new(
                    a * (ea.cos() - e),
                    a * (1.0 - e * e).sqrt() * ea.sin(),
                    0.0,
                )
            }
            ConicKind::Hyperbolic => {
                let a = self.abs_semi_major_axis();
                let n = GAUSS_GRAV / a.powf(1.5);
                let m = self.mean_anomaly_rad()?.unwrap_or(0.0) + n * dt;
                let h = solve_hyperbolic_kepler_equation(m, e, KEPLER_TOLERANCE, KEPLER_MAX_ITER);
                Vector3::new(
                    a * (e - h.cosh()),
                    a * (e * e - 1.0).sqrt() * h.sinh(),
                    0.0,
                )
            }
            ConicKind::Parabolic => {
                let d = solve_barker_equation(self.barker_at_epoch() + self.barker_rate() * dt);
                Vector3::new(q * (1.0 - d * d), 2.0 * q * d, 0.0)
            }
        };

        let position = self.perifocal_to_ecliptic() * perifocal;
        if position.iter().all(|x| x.is_finite()) {
            Ok(position)
        } else {
            Err(CometError::ComputationError(format!(
                "non-finite position at MJD {mjd_tt}"
            )))
        }
    }

    /// Heliocentric ecliptic state `(position, velocity)` at the epoch.
    pub fn state_at_epoch(&self) -> (Vector3<f64>, Vector3<f64>) {
        let e = self.eccentricity;
        let nu = self.true_anomaly * RADEG;
        let p = self.perihelion_distance * (1.0 + e);
        let r = p / (1.0 + e * nu.cos());
        let speed = (GAUSS_GRAV_SQUARED / p).sqrt();

        let rotation = self.perifocal_to_ecliptic();
        (
            rotation * Vector3::new(r * nu.cos(), r * nu.sin(), 0.0),
            rotation * Vector3::new(-speed * nu.sin(), speed * (e + nu.cos()), 0.0),
        )
    }

    fn perifocal_to_ecliptic(&self) -> nalgebra::Matrix3<f64> {
        perifocal_rotation(
            self.ascending_node_longitude * RADEG,
            self.inclination * RADEG,
            self.periapsis_argument * RADEG,
        )
    }
}

impl fmt::Display for OrbitalElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Orbital Elements @ epoch {}", self.epoch.to_rfc3339())?;
        writeln!(f, "-------------------------------------------")?;
        writeln!(
            f,
            "  a   (semi-major axis)       = {:.6} AU",
            self.semi_major_axis
        )?;
        writeln!(
            f,
            "  q   (perihelion distance)   = {:.6} AU",
            self.perihelion_distance
        )?;
        writeln!(f, "  e   (eccentricity)          = {:.6}", self.eccentricity)?;
        writeln!(f, "  i   (inclination)           = {:.6}°", self.inclination)?;
        writeln!(
            f,
            "  Ω   (longitude of node)     = {:.6}°",
            self.ascending_node_longitude
        )?;
        writeln!(
            f,
            "  ω   (argument of perihelion) = {:.6}°",
            self.periapsis_argument
        )?;
        write!(f, "  ν   (true anomaly)          = {:.6}°", self.true_anomaly)
    }
}

#[cfg(test)]
pub(crate) mod orbit_type_test {

    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    pub(crate) fn halley_like(true_anomaly: Degree) -> OrbitalElements {
        OrbitalElements {
            epoch: Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
            semi_major_axis: 17.8,
            perihelion_distance: 17.8 * (1.0 - 0.967),
            eccentricity: 0.967,
            inclination: 162.3,
            ascending_node_longitude: 58.42,
            periapsis_argument: 111.33,
            true_anomaly,
        }
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(-1e-17), 0.0);
        assert_relative_eq!(normalize_degrees(-90.0), 270.0);
        assert_relative_eq!(normalize_degrees(725.0), 5.0);
    }

    #[test]
    fn test_state_round_trip() {
        let elements = halley_like(60.0);
        let (r, v) = elements.state_at_epoch();
        let back = OrbitalElements::from_state(&r, &v, elements.epoch).unwrap();

        assert_relative_eq!(back.semi_major_axis, 17.8, max_relative = 1e-9);
        assert_relative_eq!(back.eccentricity, 0.967, epsilon = 1e-12);
        assert_relative_eq!(back.inclination, 162.3, epsilon = 1e-9);
        assert_relative_eq!(back.ascending_node_longitude, 58.42, epsilon = 1e-9);
        assert_relative_eq!(back.periapsis_argument, 111.33, epsilon = 1e-9);
        assert_relative_eq!(back.true_anomaly, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_position_at_epoch_matches_state() {
        let elements = halley_like(300.0);
        let (r, _) = elements.state_at_epoch();
        let p = elements.position_at(elements.epoch_mjd_tt()).unwrap();
        assert_relative_eq!(p, r, epsilon = 1e-10);
    }

    #[test]
    fn test_position_after_one_period() {
        let elements = halley_like(60.0);
        let period = elements.period_days().unwrap();
        assert_relative_eq!(period, DPI / GAUSS_GRAV * 17.8f64.powf(1.5), max_relative = 1e-9);

        let t0 = elements.epoch_mjd_tt();
        let p0 = elements.position_at(t0).unwrap();
        let p1 = elements.position_at(t0 + period).unwrap();
        assert_relative_eq!(p0, p1, epsilon = 1e-7);
    }

    #[test]
    fn test_time_of_perihelion() {
        let at_perihelion = halley_like(0.0);
        let tp = at_perihelion.time_of_perihelion().unwrap();
        assert!((tp - at_perihelion.epoch).num_milliseconds().abs() <= 1);

        // past perihelion: the passage lies before the epoch, at distance q
        let elements = halley_like(40.0);
        let tp = elements.time_of_perihelion().unwrap();
        assert!(tp < elements.epoch);
        let q = elements
            .position_at(datetime_to_mjd_tt(&tp))
            .unwrap()
            .norm();
        assert_relative_eq!(q, elements.perihelion_distance, max_relative = 1e-8);
    }

    #[test]
    fn test_parabolic_and_hyperbolic_propagation() {
        let mut parabola = halley_like(30.0);
        parabola.eccentricity = 1.0;
        parabola.semi_major_axis = f64::INFINITY;
        assert_eq!(parabola.conic_kind(), ConicKind::Parabolic);
        assert!(parabola.mean_anomaly().unwrap().is_none());
        let (r, _) = parabola.state_at_epoch();
        let p = parabola.position_at(parabola.epoch_mjd_tt()).unwrap();
        assert_relative_eq!(p, r, epsilon = 1e-10);

        let mut hyperbola = halley_like(30.0);
        hyperbola.eccentricity = 1.5;
        hyperbola.semi_major_axis = -hyperbola.perihelion_distance / 0.5;
        let (r, _) = hyperbola.state_at_epoch();
        let p = hyperbola.position_at(hyperbola.epoch_mjd_tt()).unwrap();
        assert_relative_eq!(p, r, epsilon = 1e-10);
        // receding: farther away a year later
        let later = hyperbola
            .position_at(hyperbola.epoch_mjd_tt() + 365.0)
            .unwrap();
        assert!(later.norm() > r.norm());
    }

    #[test]
    fn test_hyperbola_beyond_asymptote_is_rejected() {
        let mut hyperbola = halley_like(170.0);
        hyperbola.eccentricity = 1.5;
        hyperbola.semi_major_axis = -1.0;
        assert!(matches!(
            hyperbola.position_at(hyperbola.epoch_mjd_tt()),
            Err(CometError::ComputationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_negative_eccentricity() {
        let mut elements = halley_like(10.0);
        elements.eccentricity = -0.1;
        assert!(matches!(
            elements.validate(),
            Err(CometError::ComputationError(_))
        ));
    }
}
