use nalgebra::Vector3;

use crate::comet_errors::CometError;
use crate::constants::{Radian, GAUSS_GRAV_SQUARED};
use crate::kepler::principal_angle;

/// Below this norm a vector (node line, eccentricity vector) is treated as null.
const SINGULARITY_EPS: f64 = 1e-12;

/// Conic parameters extracted from a heliocentric state vector.
///
/// Angles in radians, distances in AU. `semi_major_axis` is negative for hyperbolic
/// motion and infinite for an exactly parabolic state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ConicElements {
    pub semi_major_axis: f64,
    pub perihelion_distance: f64,
    pub eccentricity: f64,
    pub inclination: Radian,
    pub ascending_node_longitude: Radian,
    pub periapsis_argument: Radian,
    pub true_anomaly: Radian,
}

/// Convert a heliocentric position/velocity pair into conic elements.
///
/// The eccentricity comes from the Lenz vector, the orientation from the angular
/// momentum. Singular geometries are resolved with the usual conventions:
///
/// * equatorial orbit (`i = 0` or `π`): node longitude set to 0,
/// * circular orbit (`e = 0`): periapsis argument set to 0 and the anomaly measured
///   from the node (or from the X axis when the orbit is also equatorial).
///
/// Return
/// ----------
/// * `Err(CometError::ComputationError)` when the angular momentum vanishes (radial
///   motion) or the inputs are not finite.
pub(crate) fn state_to_elements(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
) -> Result<ConicElements, CometError> {
    let mu = GAUSS_GRAV_SQUARED;

    if !(position.iter().chain(velocity.iter()).all(|x| x.is_finite())) {
        return Err(CometError::ComputationError(
            "non-finite state vector".into(),
        ));
    }

    let r = position.norm();
    let angular_momentum = position.cross(velocity);
    let h = angular_momentum.norm();
    if r == 0.0 || h == 0.0 {
        return Err(CometError::ComputationError(
            "state vector has zero angular momentum".into(),
        ));
    }
    let h_unit = angular_momentum / h;

    let lenz = velocity.cross(&angular_momentum) / mu - position / r;
    let eccentricity = lenz.norm();

    let inclination = (h_unit.z).clamp(-1.0, 1.0).acos();

    // node line: z × h
    let node = Vector3::new(-angular_momentum.y, angular_momentum.x, 0.0);
    let node_norm = node.norm();
    let has_node = node_norm > SINGULARITY_EPS * h;

    let ascending_node_longitude = if has_node {
        principal_angle(angular_momentum.x.atan2(-angular_momentum.y))
    } else {
        0.0
    };

    // reference direction in the orbital plane from which ω is counted
    let reference = if has_node {
        node / node_norm
    } else {
        Vector3::x()
    };

    let signed_angle = |from: &Vector3<f64>, to: &Vector3<f64>| {
        from.cross(to).dot(&h_unit).atan2(from.dot(to))
    };

    let (periapsis_argument, true_anomaly) = if eccentricity > SINGULARITY_EPS {
        (
            principal_angle(signed_angle(&reference, &lenz)),
            principal_angle(signed_angle(&lenz, position)),
        )
    } else {
        (0.0, principal_angle(signed_angle(&reference, position)))
    };

    let energy = velocity.norm_squared() / 2.0 - mu / r;
    let semi_major_axis = if energy == 0.0 {
        f64::INFINITY
    } else {
        -mu / (2.0 * energy)
    };

    Ok(ConicElements {
        semi_major_axis,
        perihelion_distance: h * h / (mu * (1.0 + eccentricity)),
        eccentricity,
        inclination,
        ascending_node_longitude,
        periapsis_argument,
        true_anomaly,
    })
}

/// Lenz-vector screening of a candidate state.
///
/// Returns `(accepted, eccentricity, perihelion distance, energy)` where `accepted` is
/// `e < ecc_max && q < peri_max`, or `None` for a state with no angular momentum.
pub fn eccentricity_control(
    asteroid_position: &Vector3<f64>,
    asteroid_velocity: &Vector3<f64>,
    peri_max: f64,
    ecc_max: f64,
) -> Option<(bool, f64, f64, f64)> {
    let ast_vel_2 = asteroid_velocity.norm_squared();
    let distance_to_center = asteroid_position.norm();

    let angular_momentum = asteroid_position.cross(asteroid_velocity);
    let angmom_norm = angular_momentum.norm_squared();
    if angmom_norm == 0. {
        return None;
    }

    let lenz_vector = asteroid_velocity.cross(&angular_momentum) / GAUSS_GRAV_SQUARED
        - asteroid_position / distance_to_center;

    let eccentricity = lenz_vector.norm();
    let perihelie = angmom_norm / (GAUSS_GRAV_SQUARED * (1. + eccentricity));
    let energy = ast_vel_2 / 2. - GAUSS_GRAV_SQUARED / distance_to_center;
    Some((
        eccentricity < ecc_max && perihelie < peri_max,
        eccentricity,
        perihelie,
        energy,
    ))
}

#[cfg(test)]
mod orb_elem_test {

    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_eccentricity_control() {
        let asteroid_position = Vector3::new(
            -0.62355005100316385,
            1.0112601855976919,
            0.71310036350624140,
        );

        let asteroid_velocity = Vector3::new(
            -1.5549845137774663E-002,
            -3.8769361098376577E-003,
            -2.7014074002979964E-003,
        );

        let (accept_ecc, ecc, peri, energy) =
            eccentricity_control(&asteroid_position, &asteroid_velocity, 1e3, 2.).unwrap();

        assert!(accept_ecc);
        assert_relative_eq!(ecc, 0.2892182648825829, epsilon = 1e-12);
        assert_relative_eq!(peri, 1.2904453621438048, epsilon = 1e-12);
        assert_relative_eq!(energy, -0.00008149473004352595, epsilon = 1e-15);
    }

    #[test]
    fn test_state_to_elements_circular_equatorial() {
        let v = GAUSS_GRAV_SQUARED.sqrt();
        let elem = state_to_elements(&Vector3::new(0.0, 1.0, 0.0), &Vector3::new(-v, 0.0, 0.0))
            .unwrap();

        assert_relative_eq!(elem.semi_major_axis, 1.0, epsilon = 1e-12);
        assert!(elem.eccentricity < 1e-12);
        assert_eq!(elem.inclination, 0.0);
        assert_eq!(elem.ascending_node_longitude, 0.0);
        assert_relative_eq!(elem.true_anomaly, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_state_to_elements_at_perihelion() {
        // perihelion on +X, motion toward +Y tilted by 30° about X
        let q = 0.5;
        let e = 0.8;
        let vp = (GAUSS_GRAV_SQUARED * (1.0 + e) / q).sqrt();
        let tilt = 30f64.to_radians();
        let elem = state_to_elements(
            &Vector3::new(q, 0.0, 0.0),
            &Vector3::new(0.0, vp * tilt.cos(), vp * tilt.sin()),
        )
        .unwrap();

        assert_relative_eq!(elem.eccentricity, e, epsilon = 1e-12);
        assert_relative_eq!(elem.perihelion_distance, q, epsilon = 1e-12);
        assert_relative_eq!(elem.semi_major_axis, q / (1.0 - e), epsilon = 1e-9);
        assert_relative_eq!(elem.inclination, tilt, epsilon = 1e-12);
        assert_relative_eq!(elem.ascending_node_longitude, 0.0, epsilon = 1e-12);
        assert_relative_eq!(elem.periapsis_argument, 0.0, epsilon = 1e-12);
        assert!(elem.true_anomaly < 1e-9 || elem.true_anomaly > std::f64::consts::TAU - 1e-9);
    }

    #[test]
    fn test_state_to_elements_rejects_radial_motion() {
        let err = state_to_elements(&Vector3::new(1.0, 0.0, 0.0), &Vector3::new(0.02, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, CometError::ComputationError(_)));
    }
}
