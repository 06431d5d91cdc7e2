//! # Reference frames
//!
//! Rotations between the frames used by the crate:
//!
//! - **Ecliptic mean J2000**: the frame of all orbital elements and of trajectory output,
//! - **Equatorial mean J2000**: the frame of the angular observations, where the Gauss
//!   method runs,
//! - **Horizontal (azimuth/altitude)**: local frame of a ground observer, tied to the
//!   mean equator of date through the local sidereal time,
//! - **Equatorial mean of date**: reached from J2000 with the IAU 1976 precession
//!   matrix [`prec`].
//!
//! Nutation is ignored.
use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::constants::{Radian, DPI, RADEG, RADSEC, T2000};

/// Compute the mean obliquity of the ecliptic at a given epoch.
///
/// ```text
/// ε(t) = ε₀ + ε₁·T + ε₂·T² + ε₃·T³,   T = (tjm − T2000) / 36525
/// ```
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date (TT).
///
/// Returns
/// --------
/// * The mean obliquity in radians (IAU 1976 coefficients).
pub fn obleq(tjm: f64) -> Radian {
    let ob0 = ((23.0 * 3600.0 + 26.0 * 60.0) + 21.448) * RADSEC;
    let ob1 = -46.815 * RADSEC;
    let ob2 = -0.0006 * RADSEC;
    let ob3 = 0.00181 * RADSEC;

    let t = (tjm - T2000) / 36525.0;

    ((ob3 * t + ob2) * t + ob1) * t + ob0
}

/// Active right-handed rotation by `alpha` radians about the principal axis `axis`
/// (`0` = X, `1` = Y, `2` = Z; any other value is treated as Z).
pub fn rotmt(alpha: f64, axis: usize) -> Matrix3<f64> {
    let axis = match axis {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        _ => Vector3::z_axis(),
    };

    Rotation3::from_axis_angle(&axis, alpha).into()
}

/// Rotation taking ecliptic mean J2000 vectors to equatorial mean J2000.
pub fn ecliptic_to_equatorial() -> Matrix3<f64> {
    rotmt(obleq(T2000), 0)
}

/// Rotation taking equatorial mean J2000 vectors to ecliptic mean J2000.
pub fn equatorial_to_ecliptic() -> Matrix3<f64> {
    ecliptic_to_equatorial().transpose()
}

/// Rotation from the perifocal frame of an orbit to the frame of its angular elements.
///
/// `R = Rz(Ω) · Rx(i) · Rz(ω)`, all angles in radians.
pub fn perifocal_rotation(
    ascending_node: Radian,
    inclination: Radian,
    periapsis_argument: Radian,
) -> Matrix3<f64> {
    rotmt(ascending_node, 2) * rotmt(inclination, 0) * rotmt(periapsis_argument, 2)
}

/// IAU 1976 precession matrix.
///
/// Takes vectors expressed on the mean equator and equinox of J2000 to the mean equator
/// and equinox of date; its transpose goes back to J2000.
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date (TT) of the target equinox.
pub fn prec(tjm: f64) -> Matrix3<f64> {
    let t = (tjm - T2000) / 36525.0;

    let zeta = ((0.0000050 * t + 0.0000839) * t + 0.6406161) * t * RADEG;
    let z = ((0.0000051 * t + 0.0003041) * t + 0.6406161) * t * RADEG;
    let theta = ((-0.0000116 * t - 0.0001185) * t + 0.5567530) * t * RADEG;

    rotmt(z, 2) * rotmt(-theta, 1) * rotmt(zeta, 2)
}

/// Unit direction vector for a right ascension / declination pair (radians).
pub fn radec_to_unit_vector(ra: Radian, dec: Radian) -> Vector3<f64> {
    let cos_dec = dec.cos();
    Vector3::new(ra.cos() * cos_dec, ra.sin() * cos_dec, dec.sin())
}

/// Convert a Cartesian position vector into right ascension, declination and norm.
///
/// Returns `(α, δ, ρ)` with `α ∈ [0, 2π)`, `δ ∈ [−π/2, π/2]`. A null vector maps to
/// `(0, 0, 0)`.
pub fn cartesian_to_radec(cartesian_position: &Vector3<f64>) -> (Radian, Radian, f64) {
    let pos_norm = cartesian_position.norm();
    if pos_norm == 0. {
        return (0.0, 0.0, pos_norm);
    }

    let delta = (cartesian_position.z / pos_norm).clamp(-1.0, 1.0).asin();
    let alpha = cartesian_position.y.atan2(cartesian_position.x);

    (alpha.rem_euclid(DPI), delta, pos_norm)
}

/// Convert a horizontal sighting into equatorial coordinates.
///
/// Arguments
/// ---------
/// * `azimuth`: measured from North through East (radians).
/// * `altitude`: elevation above the horizon (radians).
/// * `latitude`: geodetic latitude of the site (radians).
/// * `local_sidereal_time`: local mean sidereal time at the instant of the sighting (radians).
///
/// Returns
/// --------
/// * `(α, δ)` in radians, `α ∈ [0, 2π)`.
pub fn horizontal_to_equatorial(
    azimuth: Radian,
    altitude: Radian,
    latitude: Radian,
    local_sidereal_time: Radian,
) -> (Radian, Radian) {
    let (sin_alt, cos_alt) = altitude.sin_cos();
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_az, cos_az) = azimuth.sin_cos();

    let sin_dec = (sin_lat * sin_alt + cos_lat * cos_alt * cos_az).clamp(-1.0, 1.0);
    let hour_angle = (-sin_az * cos_alt).atan2(cos_lat * sin_alt - sin_lat * cos_alt * cos_az);

    (
        (local_sidereal_time - hour_angle).rem_euclid(DPI),
        sin_dec.asin(),
    )
}

/// Convert equatorial coordinates of date into a horizontal sighting.
///
/// Inverse of [`horizontal_to_equatorial`]: returns `(azimuth, altitude)` in radians,
/// azimuth from North through East in `[0, 2π)`.
pub fn equatorial_to_horizontal(
    ra: Radian,
    dec: Radian,
    latitude: Radian,
    local_sidereal_time: Radian,
) -> (Radian, Radian) {
    let hour_angle = local_sidereal_time - ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_ha, cos_ha) = hour_angle.sin_cos();

    let sin_alt = (sin_lat * sin_dec + cos_lat * cos_dec * cos_ha).clamp(-1.0, 1.0);
    let azimuth = (-sin_ha * cos_dec).atan2(cos_lat * sin_dec - sin_lat * cos_dec * cos_ha);

    (azimuth.rem_euclid(DPI), sin_alt.asin())
}

#[cfg(test)]
mod ref_system_test {

    use super::*;
    use crate::constants::RADEG;
    use approx::assert_relative_eq;

    #[test]
    fn test_obliquity() {
        assert_relative_eq!(obleq(T2000), 0.40909280422232897, epsilon = 1e-15);
    }

    #[test]
    fn test_ecliptic_round_trip() {
        let v = Vector3::new(0.3, -1.2, 0.4);
        let back = equatorial_to_ecliptic() * (ecliptic_to_equatorial() * v);
        assert_relative_eq!(back, v, epsilon = 1e-14);

        // the ecliptic pole tilts toward −Y in the equatorial frame
        let pole = ecliptic_to_equatorial() * Vector3::z();
        assert_relative_eq!(pole.y, -obleq(T2000).sin(), epsilon = 1e-15);
    }

    #[test]
    fn test_cartesian_to_radec() {
        let (ra, dec, rho) = cartesian_to_radec(&radec_to_unit_vector(5.5, -0.3).scale(2.0));
        assert_relative_eq!(ra, 5.5, epsilon = 1e-14);
        assert_relative_eq!(dec, -0.3, epsilon = 1e-14);
        assert_relative_eq!(rho, 2.0, epsilon = 1e-14);
        assert_eq!(cartesian_to_radec(&Vector3::zeros()), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_horizontal_zenith_and_meridian() {
        let lat = 45.0 * RADEG;
        let lst = 2.0;

        // zenith: δ = φ, α = LST
        let (ra, dec) = horizontal_to_equatorial(0.0, 90.0 * RADEG, lat, lst);
        assert_relative_eq!(dec, lat, epsilon = 1e-12);
        assert_relative_eq!(ra, lst, epsilon = 1e-9);

        // due South on the meridian at altitude 30°: δ = φ + alt − 90°
        let (ra, dec) = horizontal_to_equatorial(180.0 * RADEG, 30.0 * RADEG, lat, lst);
        assert_relative_eq!(dec, -15.0 * RADEG, epsilon = 1e-12);
        assert_relative_eq!(ra, lst, epsilon = 1e-12);
    }

    #[test]
    fn test_precession_of_the_equinox() {
        assert_relative_eq!(prec(T2000), Matrix3::identity(), epsilon = 1e-15);

        // 2024-12-01: about a quarter of a century of precession
        let p = prec(60645.0);
        assert_relative_eq!(p * p.transpose(), Matrix3::identity(), epsilon = 1e-14);

        let (ra, dec, _) = cartesian_to_radec(&(p * Vector3::x()));
        // general precession in RA is about 46.1" per year, 20.0" per year in Dec
        let years = (60645.0 - T2000) / 365.25;
        assert_relative_eq!(ra / RADSEC, 46.12 * years, max_relative = 1e-2);
        assert_relative_eq!(dec / RADSEC, 20.04 * years, max_relative = 1e-2);
    }

    #[test]
    fn test_equatorial_horizontal_round_trip() {
        let lat = -33.9 * RADEG;
        for (ra, dec) in [(0.3, 0.1), (4.0, -1.2), (6.0, 0.7)] {
            let (az, alt) = equatorial_to_horizontal(ra, dec, lat, 1.7);
            assert!((0.0..DPI).contains(&az));
            let (ra_back, dec_back) = horizontal_to_equatorial(az, alt, lat, 1.7);
            assert_relative_eq!(ra_back, ra, epsilon = 1e-12);
            assert_relative_eq!(dec_back, dec, epsilon = 1e-12);
        }
    }
}
