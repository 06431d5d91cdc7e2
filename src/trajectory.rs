//! # Trajectory sampling
//!
//! Time-ordered heliocentric ecliptic J2000 positions of a comet and of the Earth, for
//! plotting. Both paths share the same timestamps, evenly spaced over the requested
//! window with the window endpoints reproduced exactly.
use std::fmt;

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comet_errors::CometError;
use crate::earth_orbit::{EarthEphemeris, MeanElementsEarth};
use crate::ephemeris::comet_position;
use crate::orbit_type::OrbitalElements;
use crate::time::{add_days, datetime_to_mjd_tt, days_between};

/// One sampled position, AU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub epoch: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TrajectoryPoint {
    fn new(epoch: DateTime<Utc>, position: Vector3<f64>) -> Self {
        TrajectoryPoint {
            epoch,
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Comet and Earth paths over the same timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub comet: Vec<TrajectoryPoint>,
    pub earth: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.comet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comet.is_empty()
    }
}

pub trait TrajectorySampler: Send + Sync {
    /// Sample `num_points` positions over `[start, end]`, both ends included.
    fn sample(
        &self,
        elements: &OrbitalElements,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        num_points: usize,
    ) -> Result<Trajectory, CometError>;
}

/// Bounds on what a caller may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryParams {
    pub min_points: usize,
    pub max_points: usize,
    pub max_span_days: f64,
}

impl Default for TrajectoryParams {
    fn default() -> Self {
        TrajectoryParams {
            min_points: 10,
            max_points: 1000,
            max_span_days: 365.0,
        }
    }
}

impl fmt::Display for TrajectoryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrajectoryParams(points={}..={}, max_span={}d)",
            self.min_points, self.max_points, self.max_span_days
        )
    }
}

impl TrajectoryParams {
    pub fn builder() -> TrajectoryParamsBuilder {
        TrajectoryParamsBuilder::default()
    }

    pub fn validate(&self) -> Result<(), CometError> {
        TrajectoryParamsBuilder {
            params: self.clone(),
        }
        .build()
        .map(|_| ())
    }

    /// Check a request window against these bounds.
    ///
    /// Return
    /// ----------
    /// * The span of the window in days.
    /// * `Err(CometError::InvalidInput)` for an empty or reversed window, a point count
    ///   outside `[min_points, max_points]` or a span over `max_span_days`.
    pub fn check_request(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        num_points: usize,
    ) -> Result<f64, CometError> {
        if end <= start {
            return Err(CometError::InvalidInput(format!(
                "end time {} must be after start time {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        if !(self.min_points..=self.max_points).contains(&num_points) {
            return Err(CometError::InvalidInput(format!(
                "number of points {num_points} outside [{}, {}]",
                self.min_points, self.max_points
            )));
        }
        let span = days_between(start, end);
        if span > self.max_span_days {
            return Err(CometError::InvalidInput(format!(
                "time span of {span:.3} days exceeds the {} day limit",
                self.max_span_days
            )));
        }
        Ok(span)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrajectoryParamsBuilder {
    params: TrajectoryParams,
}

impl TrajectoryParamsBuilder {
    pub fn min_points(mut self, v: usize) -> Self {
        self.params.min_points = v;
        self
    }
    pub fn max_points(mut self, v: usize) -> Self {
        self.params.max_points = v;
        self
    }
    pub fn max_span_days(mut self, v: f64) -> Self {
        self.params.max_span_days = v;
        self
    }

    pub fn build(self) -> Result<TrajectoryParams, CometError> {
        let p = &self.params;
        if p.min_points < 2 || p.max_points < p.min_points {
            return Err(CometError::InvalidParameter(format!(
                "point bounds must satisfy 2 <= min_points <= max_points (got {}..={})",
                p.min_points, p.max_points
            )));
        }
        if !(p.max_span_days.is_finite() && p.max_span_days > 0.0) {
            return Err(CometError::InvalidParameter(
                "max_span_days must be finite and > 0".into(),
            ));
        }
        Ok(self.params)
    }
}

/// `num_points` timestamps from `start` to `end`; the endpoints are the inputs themselves.
fn sample_epochs(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span_days: f64,
    num_points: usize,
) -> Result<Vec<DateTime<Utc>>, CometError> {
    let last = num_points - 1;
    let step = span_days / last as f64;
    (0..num_points)
        .map(|i| match i {
            0 => Ok(start),
            i if i == last => Ok(end),
            i => add_days(&start, step * i as f64),
        })
        .collect()
}

/// Two-body comet path against an analytic Earth orbit.
pub struct KeplerTrajectorySampler {
    params: TrajectoryParams,
    earth: Box<dyn EarthEphemeris>,
}

impl fmt::Debug for KeplerTrajectorySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeplerTrajectorySampler")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Default for KeplerTrajectorySampler {
    fn default() -> Self {
        Self::new(TrajectoryParams::default())
    }
}

impl KeplerTrajectorySampler {
    pub fn new(params: TrajectoryParams) -> Self {
        Self::with_earth(params, MeanElementsEarth::default())
    }

    pub fn with_earth(params: TrajectoryParams, earth: impl EarthEphemeris + 'static) -> Self {
        KeplerTrajectorySampler {
            params,
            earth: Box::new(earth),
        }
    }

    pub fn params(&self) -> &TrajectoryParams {
        &self.params
    }
}

impl TrajectorySampler for KeplerTrajectorySampler {
    fn sample(
        &self,
        elements: &OrbitalElements,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        num_points: usize,
    ) -> Result<Trajectory, CometError> {
        let span = self.params.check_request(&start, &end, num_points)?;
        elements.validate()?;

        let mut trajectory = Trajectory {
            comet: Vec::with_capacity(num_points),
            earth: Vec::with_capacity(num_points),
        };
        for epoch in sample_epochs(start, end, span, num_points)? {
            let t = datetime_to_mjd_tt(&epoch);
            trajectory
                .comet
                .push(TrajectoryPoint::new(epoch, comet_position(elements, t)?));
            trajectory
                .earth
                .push(TrajectoryPoint::new(epoch, self.earth.heliocentric_position(t)));
        }

        debug!(points = num_points, span_days = span, "trajectory sampled");
        Ok(trajectory)
    }
}

/// Deterministic sampler: both bodies sit at fixed positions.
///
/// Requests are still validated against its [`TrajectoryParams`].
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTrajectorySampler {
    params: TrajectoryParams,
    comet: Vector3<f64>,
    earth: Vector3<f64>,
}

impl FixedTrajectorySampler {
    pub fn new(params: TrajectoryParams, comet: Vector3<f64>, earth: Vector3<f64>) -> Self {
        FixedTrajectorySampler {
            params,
            comet,
            earth,
        }
    }
}

impl TrajectorySampler for FixedTrajectorySampler {
    fn sample(
        &self,
        _elements: &OrbitalElements,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        num_points: usize,
    ) -> Result<Trajectory, CometError> {
        let span = self.params.check_request(&start, &end, num_points)?;
        let epochs = sample_epochs(start, end, span, num_points)?;
        Ok(Trajectory {
            comet: epochs
                .iter()
                .map(|&e| TrajectoryPoint::new(e, self.comet))
                .collect(),
            earth: epochs
                .iter()
                .map(|&e| TrajectoryPoint::new(e, self.earth))
                .collect(),
        })
    }
}

#[cfg(test)]
mod trajectory_test {
    use super::*;
    use crate::earth_orbit::CircularEarth;
    use crate::orbit_type::orbit_type_test::halley_like;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn window(days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        (start, start + chrono::Duration::days(days))
    }

    #[test]
    fn test_endpoints_and_count() {
        let sampler = KeplerTrajectorySampler::default();
        let (start, end) = window(90);
        let trajectory = sampler.sample(&halley_like(60.0), start, end, 37).unwrap();

        assert_eq!(trajectory.comet.len(), 37);
        assert_eq!(trajectory.earth.len(), 37);
        assert_eq!(trajectory.comet[0].epoch, start);
        assert_eq!(trajectory.comet[36].epoch, end);
        assert_eq!(trajectory.earth[36].epoch, end);
        assert!(trajectory
            .comet
            .windows(2)
            .all(|w| w[0].epoch < w[1].epoch));
        for (c, e) in trajectory.comet.iter().zip(&trajectory.earth) {
            assert_eq!(c.epoch, e.epoch);
        }
    }

    #[test]
    fn test_positions_follow_the_orbit() {
        let sampler = KeplerTrajectorySampler::with_earth(
            TrajectoryParams::default(),
            CircularEarth::default(),
        );
        let halley = halley_like(60.0);
        let (start, end) = window(30);
        let trajectory = sampler.sample(&halley, start, end, 10).unwrap();

        let expected = halley.position_at(halley.epoch_mjd_tt()).unwrap();
        assert_relative_eq!(trajectory.comet[0].position(), expected, epsilon = 1e-12);
        for point in &trajectory.earth {
            assert_relative_eq!(point.position().norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_span_over_a_year_is_rejected() {
        let sampler = KeplerTrajectorySampler::default();
        let (start, end) = window(400);
        assert!(matches!(
            sampler.sample(&halley_like(60.0), start, end, 100),
            Err(CometError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_requests() {
        let sampler = KeplerTrajectorySampler::default();
        let halley = halley_like(60.0);
        let (start, end) = window(10);

        for (s, e, n) in [(end, start, 100), (start, start, 100), (start, end, 9), (start, end, 1001)] {
            assert!(
                matches!(sampler.sample(&halley, s, e, n), Err(CometError::InvalidInput(_))),
                "n = {n}"
            );
        }
        assert!(sampler.sample(&halley, start, end, 10).is_ok());
        assert!(sampler.sample(&halley, start, end, 1000).is_ok());
    }

    #[test]
    fn test_params_builder() {
        assert!(TrajectoryParams::builder().min_points(1).build().is_err());
        assert!(TrajectoryParams::builder().max_points(5).build().is_err());
        assert!(TrajectoryParams::builder().max_span_days(0.0).build().is_err());
        let params = TrajectoryParams::builder().max_span_days(30.0).build().unwrap();
        assert_eq!(params.to_string(), "TrajectoryParams(points=10..=1000, max_span=30d)");
    }

    #[test]
    fn test_fixed_sampler() {
        let sampler = FixedTrajectorySampler::new(
            TrajectoryParams::default(),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        );
        let (start, end) = window(5);
        let trajectory = sampler.sample(&halley_like(0.0), start, end, 10).unwrap();
        assert_eq!(trajectory.len(), 10);
        assert_eq!(trajectory.comet[9].x, 2.0);
        assert_eq!(trajectory.earth[9].epoch, end);
    }
}
