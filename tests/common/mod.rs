#![allow(dead_code)]

use approx::assert_abs_diff_eq;
use chrono::{DateTime, TimeZone, Utc};

use cometfit::comet_state::{
    CometStateManager, InMemoryPhotoStorage, InMemoryStore, ServiceConfig, StaticTokenVerifier,
};
use cometfit::earth_orbit::{EarthEphemeris, MeanElementsEarth};
use cometfit::ephemeris::{comet_position, predict_radec};
use cometfit::observations::{AngularPosition, NewObservation, Observation, ObserverSite};
use cometfit::orbit_type::OrbitalElements;
use cometfit::ref_system::{cartesian_to_radec, ecliptic_to_equatorial};
use cometfit::time::{add_days, datetime_to_mjd_tt};

pub const TOKEN: &str = "owner-token";
pub const OWNER: u64 = 1;
pub const INTRUDER: u64 = 2;

pub type TestManager =
    CometStateManager<InMemoryStore, InMemoryStore, StaticTokenVerifier, InMemoryPhotoStorage>;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()
}

/// 1P/Halley-like orbit, 60° past perihelion on 2024-12-01.
pub fn halley() -> OrbitalElements {
    OrbitalElements {
        epoch: epoch(),
        semi_major_axis: 17.8,
        perihelion_distance: 17.8 * (1.0 - 0.967),
        eccentricity: 0.967,
        inclination: 162.3,
        ascending_node_longitude: 58.42,
        periapsis_argument: 111.33,
        true_anomaly: 60.0,
    }
}

/// Geocentric equatorial sightings of `elements`, `days` after its epoch.
pub fn sightings(elements: &OrbitalElements, days: &[f64]) -> Vec<NewObservation> {
    let earth = MeanElementsEarth::default();
    days.iter()
        .map(|d| {
            let observed_at = add_days(&elements.epoch, *d).unwrap();
            let (ra, dec) =
                predict_radec(elements, &earth, datetime_to_mjd_tt(&observed_at), false).unwrap();
            NewObservation {
                comet_id: None,
                position: AngularPosition::equatorial(ra, dec),
                observed_at,
                photo_url: None,
            }
        })
        .collect()
}

/// Azimuth/altitude sightings of `elements` taken from `site`, `days` after its epoch.
pub fn horizontal_sightings(
    elements: &OrbitalElements,
    days: &[f64],
    site: &ObserverSite,
) -> Vec<NewObservation> {
    let earth = MeanElementsEarth::default();
    let to_equatorial = ecliptic_to_equatorial();
    days.iter()
        .map(|d| {
            let observed_at = add_days(&elements.epoch, *d).unwrap();
            let t = datetime_to_mjd_tt(&observed_at);
            let geocentric = to_equatorial
                * (comet_position(elements, t).unwrap() - earth.heliocentric_position(t));
            let topocentric = geocentric - site.geocentric_position(&observed_at);
            let (ra, dec, _) = cartesian_to_radec(&topocentric);
            let (azimuth, altitude) =
                site.equatorial_to_horizontal(ra.to_degrees(), dec.to_degrees(), &observed_at);
            NewObservation {
                comet_id: None,
                position: AngularPosition::horizontal(azimuth, altitude),
                observed_at,
                photo_url: None,
            }
        })
        .collect()
}

pub fn stored(observations: Vec<NewObservation>) -> Vec<Observation> {
    observations
        .into_iter()
        .enumerate()
        .map(|(i, obs)| obs.into_observation(i as u64 + 1, OWNER))
        .collect()
}

/// Five sightings spread over 2024-12-01 .. 2024-12-03.
pub fn five_day_spread() -> Vec<f64> {
    vec![0.0, 0.5, 1.0, 1.5, 2.0]
}

pub fn manager(config: ServiceConfig) -> (TestManager, InMemoryStore, InMemoryPhotoStorage) {
    let store = InMemoryStore::new();
    let photos = InMemoryPhotoStorage::new();
    let manager = CometStateManager::new(
        config,
        store.clone(),
        store.clone(),
        StaticTokenVerifier::new().with_token(TOKEN, OWNER),
        photos.clone(),
    )
    .unwrap();
    (manager, store, photos)
}

pub fn assert_elements_close(actual: &OrbitalElements, expected: &OrbitalElements, epsilon: f64) {
    assert_abs_diff_eq!(
        actual.semi_major_axis / expected.semi_major_axis,
        1.0,
        epsilon = epsilon
    );
    assert_abs_diff_eq!(actual.eccentricity, expected.eccentricity, epsilon = epsilon);
    assert_abs_diff_eq!(actual.inclination, expected.inclination, epsilon = epsilon);
    assert_abs_diff_eq!(
        actual.ascending_node_longitude,
        expected.ascending_node_longitude,
        epsilon = epsilon
    );
    assert_abs_diff_eq!(
        actual.periapsis_argument,
        expected.periapsis_argument,
        epsilon = epsilon
    );
}

pub fn assert_output_invariants(elements: &OrbitalElements) {
    assert!(elements.eccentricity >= 0.0);
    for angle in [
        elements.inclination,
        elements.ascending_node_longitude,
        elements.periapsis_argument,
        elements.true_anomaly,
    ] {
        assert!((0.0..360.0).contains(&angle), "angle {angle}");
    }
}
