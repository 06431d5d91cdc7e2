//! Earth's heliocentric position from an analytic orbit approximation.
//!
//! [`MeanElementsEarth`] evaluates the J2000 mean elements of the Earth–Moon barycenter
//! with their secular rates (Standish, *Keplerian Elements for Approximate Positions of
//! the Major Planets*, valid 1800–2050 AD, ~20″ accuracy) and solves Kepler's equation.
//! [`CircularEarth`] is a 1 AU circle, deterministic and cheap, intended for tests.
use nalgebra::Vector3;

use crate::constants::{DAYS_PER_JULIAN_CENTURY, DPI, MJD, RADEG, T2000};
use crate::kepler::{solve_kepler_equation, KEPLER_MAX_ITER, KEPLER_TOLERANCE};
use crate::ref_system::perifocal_rotation;

/// Source of Earth's heliocentric position, ecliptic mean J2000, in AU.
pub trait EarthEphemeris: Send + Sync {
    fn heliocentric_position(&self, mjd_tt: MJD) -> Vector3<f64>;
}

/// Mean orbital elements with linear rates per Julian century.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanElementsEarth {
    /// (value at J2000, rate per century) for a (AU)
    pub semi_major_axis: (f64, f64),
    pub eccentricity: (f64, f64),
    /// degrees
    pub inclination: (f64, f64),
    /// degrees
    pub mean_longitude: (f64, f64),
    /// degrees
    pub perihelion_longitude: (f64, f64),
    /// degrees
    pub ascending_node_longitude: (f64, f64),
}

impl Default for MeanElementsEarth {
    fn default() -> Self {
        MeanElementsEarth {
            semi_major_axis: (1.00000261, 0.00000562),
            eccentricity: (0.01671123, -0.00004392),
            inclination: (-0.00001531, -0.01294668),
            mean_longitude: (100.46457166, 35999.37244981),
            perihelion_longitude: (102.93768193, 0.32327364),
            ascending_node_longitude: (0.0, 0.0),
        }
    }
}

impl EarthEphemeris for MeanElementsEarth {
    fn heliocentric_position(&self, mjd_tt: MJD) -> Vector3<f64> {
        let t = (mjd_tt - T2000) / DAYS_PER_JULIAN_CENTURY;
        let at = |(value, rate): (f64, f64)| value + rate * t;

        let a = at(self.semi_major_axis);
        let e = at(self.eccentricity);
        let node = at(self.ascending_node_longitude) * RADEG;
        let varpi = at(self.perihelion_longitude) * RADEG;
        let mean_anomaly = at(self.mean_longitude) * RADEG - varpi;

        let ea = solve_kepler_equation(mean_anomaly, e, KEPLER_TOLERANCE, KEPLER_MAX_ITER);
        let perifocal = Vector3::new(
            a * (ea.cos() - e),
            a * (1.0 - e * e).sqrt() * ea.sin(),
            0.0,
        );

        perifocal_rotation(node, at(self.inclination) * RADEG, varpi - node) * perifocal
    }
}

/// Earth on a circular 1 AU orbit in the ecliptic plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularEarth {
    /// heliocentric longitude at J2000, degrees
    pub longitude_at_j2000: f64,
    /// sidereal period in days
    pub period_days: f64,
}

impl Default for CircularEarth {
    fn default() -> Self {
        CircularEarth {
            longitude_at_j2000: 100.46457166,
            period_days: 365.256363004,
        }
    }
}

impl EarthEphemeris for CircularEarth {
    fn heliocentric_position(&self, mjd_tt: MJD) -> Vector3<f64> {
        let longitude =
            self.longitude_at_j2000 * RADEG + DPI * (mjd_tt - T2000) / self.period_days;
        Vector3::new(longitude.cos(), longitude.sin(), 0.0)
    }
}
