mod common;

use approx::assert_relative_eq;
use chrono::Duration;

use common::{epoch, halley};

use cometfit::close_approach::{
    ApproachParams, CloseApproachProjector, KeplerCloseApproachProjector,
};
use cometfit::comet_errors::CometError;
use cometfit::earth_orbit::{CircularEarth, MeanElementsEarth};
use cometfit::ephemeris::earth_distance;
use cometfit::time::{datetime_to_mjd_tt, days_between};
use cometfit::trajectory::{KeplerTrajectorySampler, TrajectoryParams, TrajectorySampler};

#[test]
fn test_approach_is_a_true_minimum() {
    let projector = KeplerCloseApproachProjector::default();
    let elements = halley();
    let approach = projector.project(&elements, None).unwrap();

    let earth = MeanElementsEarth::default();
    let t = datetime_to_mjd_tt(&approach.date);
    assert_relative_eq!(
        earth_distance(&elements, &earth, t).unwrap(),
        approach.distance_au,
        epsilon = 1e-9
    );
    let start = elements.epoch_mjd_tt();
    let horizon = elements.period_days().unwrap();
    for dt in [-1.0, -0.01, 0.01, 1.0] {
        if t + dt < start || t + dt > start + horizon {
            continue;
        }
        assert!(earth_distance(&elements, &earth, t + dt).unwrap() >= approach.distance_au - 1e-12);
    }

    let offset = days_between(&elements.epoch, &approach.date);
    assert!((-1e-6..=horizon + 1e-6).contains(&offset));
}

#[test]
fn test_open_orbit_stays_inside_capped_horizon() {
    let mut open = halley();
    open.eccentricity = 1.05;
    open.semi_major_axis = -open.perihelion_distance / 0.05;

    let projector = KeplerCloseApproachProjector::new(
        ApproachParams::builder()
            .max_horizon_days(2000.0)
            .build()
            .unwrap(),
    );
    let approach = projector.project(&open, None).unwrap();
    let offset = days_between(&open.epoch, &approach.date);
    assert!((-1e-6..=2000.0 + 1e-6).contains(&offset), "offset = {offset}");
    assert!(approach.distance_au.is_finite() && approach.distance_au > 0.0);
}

#[test]
fn test_invalid_elements_are_rejected() {
    let mut broken = halley();
    broken.eccentricity = -0.1;
    assert!(matches!(
        KeplerCloseApproachProjector::default().project(&broken, None),
        Err(CometError::ComputationError(_))
    ));
}

#[test]
fn test_trajectory_window_contract() {
    let sampler = KeplerTrajectorySampler::with_earth(TrajectoryParams::default(), CircularEarth::default());
    let start = epoch();
    let end = start + Duration::days(365);

    for k in [10, 137, 1000] {
        let trajectory = sampler.sample(&halley(), start, end, k).unwrap();
        assert_eq!(trajectory.comet.len(), k);
        assert_eq!(trajectory.earth.len(), k);
        assert_eq!(trajectory.comet.first().unwrap().epoch, start);
        assert_eq!(trajectory.comet.last().unwrap().epoch, end);
        assert_eq!(trajectory.earth.first().unwrap().epoch, start);
        assert_eq!(trajectory.earth.last().unwrap().epoch, end);
    }

    assert!(matches!(
        sampler.sample(&halley(), start, start + Duration::days(400), 100),
        Err(CometError::InvalidInput(_))
    ));
}

#[test]
fn test_trajectory_spacing_is_even() {
    let sampler = KeplerTrajectorySampler::default();
    let start = epoch();
    let end = start + Duration::days(100);
    let trajectory = sampler.sample(&halley(), start, end, 11).unwrap();

    for pair in trajectory.comet.windows(2) {
        assert_relative_eq!(days_between(&pair[0].epoch, &pair[1].epoch), 10.0, epsilon = 1e-9);
    }
}
