//! # Angular observations
//!
//! An [`Observation`] is a single sighting of a comet: two angles, an instant and an
//! optional photo. The angles follow one of two conventions, carried explicitly by
//! [`AngularPosition`] so that a horizontal (azimuth/altitude) pair can never be read as
//! right ascension/declination by mistake.
//!
//! Before any numerics, a set of observations is turned into [`Sighting`]s by
//! [`prepare_sightings`]:
//!
//! 1. the set must use **one convention only**,
//! 2. horizontal pairs are converted to equatorial using the configured [`ObserverSite`]
//!    (and rejected when no site is configured),
//! 3. timestamps are converted to MJD (TT) and the set is sorted by time,
//! 4. two sightings at the same instant make the geometry degenerate,
//! 5. the observer's heliocentric position is attached: the geocenter for equatorial
//!    sightings, the ground site for horizontal ones.
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::comet_errors::CometError;
use crate::constants::{
    CometId, Degree, ObservationId, Radian, UserId, DPI, EARTH_MAJOR_AXIS, EARTH_MINOR_AXIS,
    ERAU, MJD, RADEG,
};
use crate::earth_orbit::EarthEphemeris;
use crate::ref_system::{
    cartesian_to_radec, ecliptic_to_equatorial, equatorial_to_horizontal,
    horizontal_to_equatorial, prec, radec_to_unit_vector,
};
use crate::time::{datetime_to_mjd_tt, datetime_to_mjd_utc, gmst, parse_utc_timestamp};

pub(crate) mod triplets;

/// Two angles locating a comet on the sky, tagged with their convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "convention", rename_all = "snake_case")]
pub enum AngularPosition {
    /// Right ascension in `[0, 360)`, declination in `[−90, 90]`, degrees, mean J2000.
    Equatorial {
        right_ascension: Degree,
        declination: Degree,
    },
    /// Azimuth in `[0, 360)` from North through East, altitude in `[−90, 90]`, degrees.
    Horizontal { azimuth: Degree, altitude: Degree },
}

impl AngularPosition {
    pub fn equatorial(right_ascension: Degree, declination: Degree) -> Self {
        AngularPosition::Equatorial {
            right_ascension,
            declination,
        }
    }

    pub fn horizontal(azimuth: Degree, altitude: Degree) -> Self {
        AngularPosition::Horizontal { azimuth, altitude }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, AngularPosition::Horizontal { .. })
    }

    /// Check both angles are finite and inside their ranges.
    pub fn validate(&self) -> Result<(), CometError> {
        let (longitude, latitude, names) = match *self {
            AngularPosition::Equatorial {
                right_ascension,
                declination,
            } => (right_ascension, declination, ("right ascension", "declination")),
            AngularPosition::Horizontal { azimuth, altitude } => {
                (azimuth, altitude, ("azimuth", "altitude"))
            }
        };

        if !longitude.is_finite() || !(0.0..360.0).contains(&longitude) {
            return Err(CometError::InvalidInput(format!(
                "{} {longitude} outside [0, 360)",
                names.0
            )));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CometError::InvalidInput(format!(
                "{} {latitude} outside [-90, 90]",
                names.1
            )));
        }
        Ok(())
    }
}

/// Ground site from which horizontal sightings were taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverSite {
    /// geodetic latitude, degrees, North positive
    pub latitude: Degree,
    /// longitude, degrees, East positive
    pub longitude: Degree,
}

impl ObserverSite {
    pub fn new(latitude: Degree, longitude: Degree) -> Result<Self, CometError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CometError::InvalidParameter(format!(
                "site latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=360.0).contains(&longitude) {
            return Err(CometError::InvalidParameter(format!(
                "site longitude {longitude} outside [-180, 360]"
            )));
        }
        Ok(ObserverSite {
            latitude,
            longitude,
        })
    }

    /// Local mean sidereal time at `instant`, radians.
    pub fn local_sidereal_time(&self, instant: &DateTime<Utc>) -> Radian {
        (gmst(datetime_to_mjd_utc(instant)) + self.longitude * RADEG).rem_euclid(DPI)
    }

    /// Geocentric position of the site at `instant`, equatorial mean J2000, AU.
    ///
    /// The site sits on the WGS 84 ellipsoid at zero height.
    pub fn geocentric_position(&self, instant: &DateTime<Utc>) -> Vector3<f64> {
        let lat = self.latitude * RADEG;
        let (sin_lat, cos_lat) = lat.sin_cos();
        let flattening = EARTH_MINOR_AXIS / EARTH_MAJOR_AXIS;
        let c = 1.0 / (cos_lat.powi(2) + (flattening * sin_lat).powi(2)).sqrt();
        let s = flattening.powi(2) * c;

        let (sin_lst, cos_lst) = self.local_sidereal_time(instant).sin_cos();
        let of_date = Vector3::new(
            c * cos_lat * cos_lst,
            c * cos_lat * sin_lst,
            s * sin_lat,
        )
        .scale(ERAU);

        prec(datetime_to_mjd_tt(instant)).transpose() * of_date
    }

    /// Equatorial mean J2000 `(α, δ)` in radians of a horizontal sighting made from
    /// this site.
    pub fn horizontal_to_equatorial(
        &self,
        azimuth: Degree,
        altitude: Degree,
        instant: &DateTime<Utc>,
    ) -> (Radian, Radian) {
        let (ra, dec) = horizontal_to_equatorial(
            azimuth * RADEG,
            altitude * RADEG,
            self.latitude * RADEG,
            self.local_sidereal_time(instant),
        );
        let j2000 = prec(datetime_to_mjd_tt(instant)).transpose() * radec_to_unit_vector(ra, dec);
        let (ra, dec, _) = cartesian_to_radec(&j2000);
        (ra, dec)
    }

    /// Azimuth and altitude in degrees, as seen from this site at `instant`, of a
    /// direction given in equatorial mean J2000 degrees.
    pub fn equatorial_to_horizontal(
        &self,
        right_ascension: Degree,
        declination: Degree,
        instant: &DateTime<Utc>,
    ) -> (Degree, Degree) {
        let of_date = prec(datetime_to_mjd_tt(instant))
            * radec_to_unit_vector(right_ascension * RADEG, declination * RADEG);
        let (ra, dec, _) = cartesian_to_radec(&of_date);
        let (azimuth, altitude) = equatorial_to_horizontal(
            ra,
            dec,
            self.latitude * RADEG,
            self.local_sidereal_time(instant),
        );
        let azimuth = azimuth.to_degrees();
        (
            if azimuth >= 360.0 { 0.0 } else { azimuth },
            altitude.to_degrees(),
        )
    }
}

/// A stored sighting of a comet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    /// `None` until the observation is attached to a comet
    pub comet_id: Option<CometId>,
    pub user_id: UserId,
    pub position: AngularPosition,
    pub observed_at: DateTime<Utc>,
    pub photo_url: Option<String>,
}

/// Fields supplied by a user when recording or editing an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObservation {
    pub comet_id: Option<CometId>,
    pub position: AngularPosition,
    pub observed_at: DateTime<Utc>,
    pub photo_url: Option<String>,
}

impl NewObservation {
    /// Build a request from a user-supplied RFC 3339 timestamp.
    ///
    /// Return
    /// ----------
    /// * `Err(CometError::InvalidInput)` when the timestamp cannot be parsed or the angles
    ///   are out of range.
    pub fn from_rfc3339(
        comet_id: Option<CometId>,
        position: AngularPosition,
        observed_at: &str,
    ) -> Result<Self, CometError> {
        let observation = NewObservation {
            comet_id,
            position,
            observed_at: parse_utc_timestamp(observed_at)?,
            photo_url: None,
        };
        observation.validate()?;
        Ok(observation)
    }

    pub fn validate(&self) -> Result<(), CometError> {
        self.position.validate()
    }

    /// Build the stored record once an identifier and owner are known.
    pub fn into_observation(self, id: ObservationId, user_id: UserId) -> Observation {
        Observation {
            id,
            comet_id: self.comet_id,
            user_id,
            position: self.position,
            observed_at: self.observed_at,
            photo_url: self.photo_url,
        }
    }
}

/// An equatorial sighting prepared for orbit determination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub ra: Radian,
    pub dec: Radian,
    /// MJD, TT scale
    pub time: MJD,
    /// heliocentric observer position, equatorial mean J2000, AU
    pub observer_position: Vector3<f64>,
}

impl Sighting {
    /// Angular residual `(Δα cos δ, Δδ)` in radians between this sighting and a predicted
    /// heliocentric equatorial position of the comet.
    pub fn residual(&self, comet_position: &Vector3<f64>) -> (f64, f64) {
        let (ra, dec, _) = cartesian_to_radec(&(comet_position - self.observer_position));
        let dra = (ra - self.ra + std::f64::consts::PI).rem_euclid(DPI) - std::f64::consts::PI;
        (dra * self.dec.cos(), dec - self.dec)
    }
}

/// Validate, convert and order a set of observations for the orbit solver.
///
/// Arguments
/// -----------------
/// * `observations`: the raw records, in any order.
/// * `site`: ground site used to convert horizontal sightings, if any.
/// * `earth`: Earth position model. Equatorial sightings are geocentric; horizontal
///   ones are observed from `site`.
///
/// Return
/// ----------
/// * Sightings sorted by time.
/// * `Err(CometError::InvalidInput)` for out-of-range angles, mixed conventions, or
///   horizontal sightings without a site.
/// * `Err(CometError::DegenerateGeometry)` for two sightings at the same instant.
pub fn prepare_sightings(
    observations: &[Observation],
    site: Option<&ObserverSite>,
    earth: &dyn EarthEphemeris,
) -> Result<Vec<Sighting>, CometError> {
    for obs in observations {
        obs.position.validate()?;
    }

    let horizontal = observations
        .first()
        .is_some_and(|obs| obs.position.is_horizontal());
    if observations
        .iter()
        .any(|obs| obs.position.is_horizontal() != horizontal)
    {
        return Err(CometError::InvalidInput(
            "observations mix equatorial and horizontal coordinates".into(),
        ));
    }
    let to_equatorial = ecliptic_to_equatorial();

    let mut sightings = observations
        .iter()
        .map(|obs| {
            let (ra, dec, site_offset) = match (obs.position, site) {
                (
                    AngularPosition::Equatorial {
                        right_ascension,
                        declination,
                    },
                    _,
                ) => (right_ascension * RADEG, declination * RADEG, Vector3::zeros()),
                (AngularPosition::Horizontal { azimuth, altitude }, Some(site)) => {
                    let (ra, dec) =
                        site.horizontal_to_equatorial(azimuth, altitude, &obs.observed_at);
                    (ra, dec, site.geocentric_position(&obs.observed_at))
                }
                (AngularPosition::Horizontal { .. }, None) => {
                    return Err(CometError::InvalidInput(
                        "horizontal observations require a configured observer site".into(),
                    ))
                }
            };
            let time = datetime_to_mjd_tt(&obs.observed_at);
            Ok(Sighting {
                ra,
                dec,
                time,
                observer_position: to_equatorial * earth.heliocentric_position(time)
                    + site_offset,
            })
        })
        .collect::<Result<Vec<_>, CometError>>()?;

    sightings.sort_by(|a, b| a.time.total_cmp(&b.time));

    if sightings.windows(2).any(|pair| pair[1].time <= pair[0].time) {
        return Err(CometError::DegenerateGeometry(
            "two observations share the same timestamp".into(),
        ));
    }

    Ok(sightings)
}

#[cfg(test)]
mod observations_test {
    use super::*;
    use crate::earth_orbit::CircularEarth;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn obs(id: u64, position: AngularPosition, hour: u32) -> Observation {
        Observation {
            id,
            comet_id: Some(1),
            user_id: 1,
            position,
            observed_at: Utc.with_ymd_and_hms(2024, 12, 1, hour, 0, 0).unwrap(),
            photo_url: None,
        }
    }

    #[test]
    fn test_angular_position_validation() {
        assert!(AngularPosition::equatorial(359.9, -90.0).validate().is_ok());
        assert!(matches!(
            AngularPosition::equatorial(360.0, 0.0).validate(),
            Err(CometError::InvalidInput(_))
        ));
        assert!(matches!(
            AngularPosition::horizontal(10.0, 91.0).validate(),
            Err(CometError::InvalidInput(_))
        ));
        assert!(AngularPosition::equatorial(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_prepare_sightings_sorts_by_time() {
        let set = vec![
            obs(1, AngularPosition::equatorial(10.0, 5.0), 12),
            obs(2, AngularPosition::equatorial(11.0, 6.0), 0),
            obs(3, AngularPosition::equatorial(12.0, 7.0), 6),
        ];
        let sightings = prepare_sightings(&set, None, &CircularEarth::default()).unwrap();
        assert_eq!(sightings.len(), 3);
        assert!(sightings.windows(2).all(|p| p[0].time < p[1].time));
        assert_relative_eq!(sightings[0].ra, 11.0 * RADEG);
        assert_relative_eq!(sightings[0].observer_position.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prepare_sightings_rejects_mixed_conventions() {
        let set = vec![
            obs(1, AngularPosition::equatorial(10.0, 5.0), 0),
            obs(2, AngularPosition::horizontal(120.0, 30.0), 1),
        ];
        let site = ObserverSite::new(48.0, 2.3).unwrap();
        let err = prepare_sightings(&set, Some(&site), &CircularEarth::default()).unwrap_err();
        assert!(matches!(err, CometError::InvalidInput(_)));
    }

    #[test]
    fn test_prepare_sightings_horizontal_needs_site() {
        let set = vec![
            obs(1, AngularPosition::horizontal(120.0, 30.0), 0),
            obs(2, AngularPosition::horizontal(121.0, 31.0), 1),
        ];
        let earth = CircularEarth::default();
        assert!(matches!(
            prepare_sightings(&set, None, &earth),
            Err(CometError::InvalidInput(_))
        ));

        let site = ObserverSite::new(48.0, 2.3).unwrap();
        let sightings = prepare_sightings(&set, Some(&site), &earth).unwrap();
        assert!(sightings
            .iter()
            .all(|s| (0.0..DPI).contains(&s.ra) && s.dec.abs() <= std::f64::consts::FRAC_PI_2));
    }

    #[test]
    fn test_horizontal_sightings_are_precessed_to_j2000() {
        let site = ObserverSite::new(43.7, 7.3).unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 12, 1, 21, 0, 0).unwrap();

        let (az, alt) = site.equatorial_to_horizontal(83.6, 22.0, &instant);
        let (ra, dec) = site.horizontal_to_equatorial(az, alt, &instant);
        assert_relative_eq!(ra / RADEG, 83.6, epsilon = 1e-9);
        assert_relative_eq!(dec / RADEG, 22.0, epsilon = 1e-9);

        // ignoring precession would leave the direction about 0.3° off in 2024
        let of_date = horizontal_to_equatorial(
            az * RADEG,
            alt * RADEG,
            site.latitude * RADEG,
            site.local_sidereal_time(&instant),
        );
        let shift = radec_to_unit_vector(ra, dec).angle(&radec_to_unit_vector(of_date.0, of_date.1));
        assert!(shift / RADEG > 0.25 && shift / RADEG < 0.4, "shift = {shift}");
    }

    #[test]
    fn test_horizontal_sightings_are_observed_from_the_site() {
        let site = ObserverSite::new(-24.6, 289.6).unwrap();
        let set = vec![
            obs(1, AngularPosition::horizontal(120.0, 30.0), 0),
            obs(2, AngularPosition::horizontal(121.0, 31.0), 1),
        ];
        let earth = CircularEarth::default();
        let sightings = prepare_sightings(&set, Some(&site), &earth).unwrap();

        let to_equatorial = ecliptic_to_equatorial();
        for (sighting, raw) in sightings.iter().zip(&set) {
            let geocenter = to_equatorial * earth.heliocentric_position(sighting.time);
            let offset = sighting.observer_position - geocenter;
            assert_relative_eq!(offset, site.geocentric_position(&raw.observed_at), epsilon = 1e-15);
            assert!(offset.norm() > 0.99 * ERAU && offset.norm() <= ERAU * (1.0 + 1e-12));
        }
    }

    #[test]
    fn test_prepare_sightings_rejects_duplicate_timestamps() {
        let set = vec![
            obs(1, AngularPosition::equatorial(10.0, 5.0), 3),
            obs(2, AngularPosition::equatorial(10.5, 5.5), 3),
        ];
        assert!(matches!(
            prepare_sightings(&set, None, &CircularEarth::default()),
            Err(CometError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_residual_is_zero_on_the_line_of_sight() {
        let sighting = Sighting {
            ra: 1.0,
            dec: 0.2,
            time: 60645.0,
            observer_position: Vector3::new(1.0, 0.0, 0.0),
        };
        let comet = sighting.observer_position
            + crate::ref_system::radec_to_unit_vector(1.0, 0.2).scale(0.7);
        let (dra, ddec) = sighting.residual(&comet);
        assert!(dra.abs() < 1e-14 && ddec.abs() < 1e-14);
    }
}
