//! Forward model: where a comet with known elements is, and where it appears on the sky.
//!
//! Positions come from two-body propagation of [`OrbitalElements`]; the observer is at
//! the geocenter, placed by an [`EarthEphemeris`].
use nalgebra::Vector3;

use crate::comet_errors::CometError;
use crate::constants::{Degree, MJD, VLIGHT_AU};
use crate::earth_orbit::EarthEphemeris;
use crate::orbit_type::OrbitalElements;
use crate::ref_system::{cartesian_to_radec, ecliptic_to_equatorial};

/// Heliocentric ecliptic J2000 position of the comet at `mjd_tt`, AU.
pub fn comet_position(elements: &OrbitalElements, mjd_tt: MJD) -> Result<Vector3<f64>, CometError> {
    elements.position_at(mjd_tt)
}

/// Geocentric ecliptic vector from Earth to the comet at `mjd_tt`, AU.
pub fn geocentric_position(
    elements: &OrbitalElements,
    earth: &dyn EarthEphemeris,
    mjd_tt: MJD,
) -> Result<Vector3<f64>, CometError> {
    Ok(comet_position(elements, mjd_tt)? - earth.heliocentric_position(mjd_tt))
}

/// Earth–comet distance at `mjd_tt`, AU.
pub fn earth_distance(
    elements: &OrbitalElements,
    earth: &dyn EarthEphemeris,
    mjd_tt: MJD,
) -> Result<f64, CometError> {
    Ok(geocentric_position(elements, earth, mjd_tt)?.norm())
}

/// Apparent equatorial coordinates of the comet seen from the geocenter.
///
/// Arguments
/// -----------------
/// * `elements`: orbit of the comet.
/// * `earth`: Earth position model.
/// * `mjd_tt`: instant of the observation (MJD, TT).
/// * `light_time`: when set, the comet is taken at the emission time `t − Δ/c`.
///
/// Return
/// ----------
/// * `(right ascension, declination)` in degrees, mean equator J2000, RA in `[0, 360)`.
pub fn predict_radec(
    elements: &OrbitalElements,
    earth: &dyn EarthEphemeris,
    mjd_tt: MJD,
    light_time: bool,
) -> Result<(Degree, Degree), CometError> {
    let earth_position = earth.heliocentric_position(mjd_tt);
    let mut line_of_sight = comet_position(elements, mjd_tt)? - earth_position;

    if light_time {
        for _ in 0..2 {
            let emission = mjd_tt - line_of_sight.norm() / VLIGHT_AU;
            line_of_sight = comet_position(elements, emission)? - earth_position;
        }
    }

    let (ra, dec, _) = cartesian_to_radec(&(ecliptic_to_equatorial() * line_of_sight));
    let ra = ra.to_degrees();
    Ok((if ra >= 360.0 { 0.0 } else { ra }, dec.to_degrees()))
}
